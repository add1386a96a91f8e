//! Destinations for rendered audio.

use crate::block::AudioBlock;

/// Error returned by a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The output device failed.
    #[error("audio device error: {0}")]
    Device(String),
    /// The sink was already closed.
    #[error("sink is closed")]
    Closed,
    /// A bounded sink reached its limit.
    #[error("sink limit of {limit} bytes reached")]
    Full { limit: usize },
}

/// Where rendered blocks go.
///
/// The renderer is agnostic to the implementation: a live device blocks in
/// `accept` until it has room, an accumulator just appends.
pub trait Sink {
    /// Take one block of interleaved PCM.
    fn accept(&mut self, block: &AudioBlock) -> Result<(), SinkError>;

    /// Flush and release the sink. Called once when playback ends.
    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    fn accept(&mut self, block: &AudioBlock) -> Result<(), SinkError> {
        (**self).accept(block)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

/// Accumulates little-endian PCM bytes in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    bytes: Vec<u8>,
    limit: Option<usize>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that refuses to grow past `limit` bytes. The block that would
    /// cross the limit is stored up to the limit, then [`SinkError::Full`] is
    /// returned.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Everything accepted so far.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Sink for MemorySink {
    fn accept(&mut self, block: &AudioBlock) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        block.write_le_bytes(&mut self.bytes);
        if let Some(limit) = self.limit {
            if self.bytes.len() >= limit {
                self.bytes.truncate(limit);
                return Err(SinkError::Full { limit });
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        Ok(())
    }
}
