//! Synthesis backend trait and engine errors.

use opl_ir::PcmFormat;

use crate::block::AudioBlock;

/// Fewest frames the bundled backend can produce in one render call.
pub const MIN_RENDER_FRAMES: usize = 2;

/// Errors raised while constructing engine components.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unsupported PCM format: {sample_width} bytes x {channels} channels @ {sample_rate} Hz")]
    UnsupportedFormat {
        sample_rate: u32,
        sample_width: u8,
        channels: u16,
    },

    #[error("block size {frames} is below the synth minimum of {min} frames")]
    InvalidBlockSize { frames: usize, min: usize },

    #[error("tick rate must be non-zero")]
    InvalidTickRate,
}

impl EngineError {
    pub(crate) fn unsupported(format: PcmFormat) -> Self {
        EngineError::UnsupportedFormat {
            sample_rate: format.sample_rate,
            sample_width: format.sample_width,
            channels: format.channels,
        }
    }
}

/// An FM chip that accepts register writes and produces PCM.
///
/// Writes and renders mutate the same chip state, so a synth must only ever
/// be driven from one place at a time.
pub trait Synth {
    /// Layout of the PCM this synth renders.
    fn format(&self) -> PcmFormat;

    /// Set register `address` (0..512, bank in bit 8) to `value`.
    fn write_register(&mut self, address: u16, value: u8);

    /// Fill every frame of `block` with audio.
    ///
    /// Callers never pass fewer than [`Synth::min_render_frames`] frames.
    fn render(&mut self, block: &mut AudioBlock);

    /// Smallest frame count a single `render` call supports.
    fn min_render_frames(&self) -> usize {
        MIN_RENDER_FRAMES
    }
}

impl<S: Synth + ?Sized> Synth for Box<S> {
    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn write_register(&mut self, address: u16, value: u8) {
        (**self).write_register(address, value)
    }

    fn render(&mut self, block: &mut AudioBlock) {
        (**self).render(block)
    }

    fn min_render_frames(&self) -> usize {
        (**self).min_render_frames()
    }
}
