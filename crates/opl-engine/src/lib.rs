//! Playback engine for oplplay.
//!
//! Turns a stream of [`opl_ir::Instruction`]s into PCM: register writes go
//! straight to a [`Synth`], delays are converted to exact frame counts by
//! [`TimingState`] and rendered in fixed-size blocks by [`ChunkedRenderer`]
//! into a [`Sink`].

mod activity;
mod block;
mod frame;
pub mod opl;
mod renderer;
mod session;
mod sink;
mod synth;
mod timing;

pub use activity::{
    ActivitySnapshot, ActivityTrigger, ChannelActivity, RegisterObserver, SharedActivity,
    MELODIC_CHANNELS, PERCUSSION_VOICES,
};
pub use block::AudioBlock;
pub use frame::Frame;
pub use opl::OplSynth;
pub use renderer::{ChunkedRenderer, DEFAULT_BLOCK_FRAMES};
pub use session::{Outcome, PlaybackSession, SessionError, SessionOptions, Transport};
pub use sink::{MemorySink, Sink, SinkError};
pub use synth::{EngineError, Synth, MIN_RENDER_FRAMES};
pub use timing::{TimingState, MILLIS_PER_SECOND};
