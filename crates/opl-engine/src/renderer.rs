//! Fixed-size block rendering.

use crate::block::AudioBlock;
use crate::session::Transport;
use crate::sink::{Sink, SinkError};
use crate::synth::{EngineError, Synth};

/// Default block size in frames.
pub const DEFAULT_BLOCK_FRAMES: usize = 512;

/// Drives a synth in fixed-size blocks and forwards them to a sink.
///
/// Full blocks reuse one buffer; the final partial block of a request gets a
/// freshly sized buffer.
#[derive(Clone, Debug)]
pub struct ChunkedRenderer {
    block: AudioBlock,
    block_frames: usize,
    min_frames: usize,
}

impl ChunkedRenderer {
    /// Create a renderer producing `block_frames`-frame blocks of `channels`
    /// channels for a synth that needs at least `min_frames` per call.
    pub fn new(block_frames: usize, channels: u16, min_frames: usize) -> Result<Self, EngineError> {
        if block_frames < min_frames.max(1) {
            return Err(EngineError::InvalidBlockSize {
                frames: block_frames,
                min: min_frames.max(1),
            });
        }
        Ok(Self {
            block: AudioBlock::new(block_frames, channels),
            block_frames,
            min_frames,
        })
    }

    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Render `frames` frames into `sink`.
    ///
    /// Returns the frames left unrendered, either because they were fewer
    /// than the synth minimum or because `transport` asked to stop between
    /// blocks; the caller carries them into the next delay. Every accepted
    /// block is counted on `transport` as soon as the sink takes it.
    pub fn render<S, K>(
        &mut self,
        frames: u64,
        synth: &mut S,
        sink: &mut K,
        transport: Option<&Transport>,
    ) -> Result<u64, SinkError>
    where
        S: Synth + ?Sized,
        K: Sink + ?Sized,
    {
        let full = self.block_frames as u64;
        let stopped = || transport.is_some_and(Transport::stop_requested);
        let mut remaining = frames;

        while remaining >= full {
            if stopped() {
                return Ok(remaining);
            }
            synth.render(&mut self.block);
            sink.accept(&self.block)?;
            remaining -= full;
            if let Some(transport) = transport {
                transport.add_frames(full);
            }
        }

        if remaining > 0 && remaining >= self.min_frames as u64 {
            if stopped() {
                return Ok(remaining);
            }
            let mut tail = AudioBlock::new(remaining as usize, self.block.channels());
            synth.render(&mut tail);
            sink.accept(&tail)?;
            if let Some(transport) = transport {
                transport.add_frames(remaining);
            }
            remaining = 0;
        }

        Ok(remaining)
    }
}
