//! Playback driver: applies instructions to a synth and renders delays.

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use opl_ir::{Delay, Instruction, REGISTER_SPACE};
use tracing::debug;

use crate::activity::RegisterObserver;
use crate::renderer::{ChunkedRenderer, DEFAULT_BLOCK_FRAMES};
use crate::sink::{Sink, SinkError};
use crate::synth::{EngineError, Synth};
use crate::timing::{TimingState, MILLIS_PER_SECOND};

/// Per-session settings.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Rate of `DelayUnit::Ticks` delays, in ticks per second.
    pub source_tick_rate: u32,
    /// Frames per rendered block.
    pub block_frames: usize,
    /// Zero all 512 registers before the first instruction.
    pub reset_registers: bool,
    /// Writes `(address, value)` applied before the first instruction, after
    /// the reset.
    pub init_writes: Vec<(u16, u8)>,
}

impl SessionOptions {
    /// IMF playback: enable waveform select up front.
    pub fn imf(tick_rate: u32) -> Self {
        Self {
            source_tick_rate: tick_rate,
            init_writes: vec![(0x01, 0x20)],
            ..Self::default()
        }
    }

    /// DRO playback: millisecond delays, registers cleared first.
    pub fn dro() -> Self {
        Self {
            source_tick_rate: MILLIS_PER_SECOND,
            reset_registers: true,
            ..Self::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            source_tick_rate: MILLIS_PER_SECOND,
            block_frames: DEFAULT_BLOCK_FRAMES,
            reset_registers: false,
            init_writes: Vec::new(),
        }
    }
}

/// State shared between a running session and whoever controls it.
#[derive(Debug, Default)]
pub struct Transport {
    stop: AtomicBool,
    frames: AtomicU64,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the session to stop before its next block.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Frames delivered to the sink so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub(crate) fn add_frames(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Relaxed);
    }
}

/// How [`PlaybackSession::run`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The instruction stream was exhausted.
    Finished,
    /// A stop was requested.
    Interrupted,
}

/// Errors that end a session early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("instruction stream error: {0}")]
    Source(Box<dyn Error + Send + Sync>),
}

/// Owns a synth and a sink and drives them from an instruction stream.
pub struct PlaybackSession<S, K> {
    synth: S,
    sink: K,
    timing: TimingState,
    renderer: ChunkedRenderer,
    min_frames: usize,
    reset_registers: bool,
    init_writes: Vec<(u16, u8)>,
    primed: bool,
    observer: Option<Box<dyn RegisterObserver + Send>>,
    frames_rendered: u64,
}

impl<S: Synth, K: Sink> PlaybackSession<S, K> {
    pub fn new(synth: S, sink: K, options: SessionOptions) -> Result<Self, EngineError> {
        let format = synth.format();
        let min_frames = synth.min_render_frames();
        let timing = TimingState::new(options.source_tick_rate, format.sample_rate)?;
        let renderer = ChunkedRenderer::new(options.block_frames, format.channels, min_frames)?;

        Ok(Self {
            synth,
            sink,
            timing,
            renderer,
            min_frames,
            reset_registers: options.reset_registers,
            init_writes: options.init_writes,
            primed: false,
            observer: None,
            frames_rendered: 0,
        })
    }

    /// Notify `observer` of every register write after it reaches the synth.
    pub fn with_observer(mut self, observer: Box<dyn RegisterObserver + Send>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Apply a single instruction.
    pub fn apply(&mut self, instruction: Instruction) -> Result<(), SinkError> {
        self.step(instruction, None)
    }

    fn step(&mut self, instruction: Instruction, transport: Option<&Transport>) -> Result<(), SinkError> {
        self.prime();
        match instruction {
            Instruction::RegisterWrite { bank, register, value } => {
                self.synth.write_register(Instruction::address(bank, register), value);
                if let Some(observer) = self.observer.as_mut() {
                    observer.on_register_write(bank, register, value);
                }
                Ok(())
            }
            Instruction::Delay(delay) => self.advance(delay, transport),
        }
    }

    /// Play `instructions` until they run out or `transport` asks to stop.
    ///
    /// The stop flag is checked before each instruction is pulled and
    /// between the blocks of a delay. Frames a stop leaves unrendered are
    /// carried, so a later `run` picks the delay up where it stopped.
    pub fn run<I, E>(&mut self, instructions: I, transport: &Transport) -> Result<Outcome, SessionError>
    where
        I: IntoIterator<Item = Result<Instruction, E>>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        debug!(
            sample_rate = self.timing.sample_rate(),
            tick_rate = self.timing.source_tick_rate(),
            block = self.renderer.block_frames(),
            "session start"
        );

        let mut instructions = instructions.into_iter();
        let outcome = loop {
            if transport.stop_requested() {
                break Outcome::Interrupted;
            }
            let Some(next) = instructions.next() else {
                break Outcome::Finished;
            };
            let instruction = next.map_err(|e| SessionError::Source(e.into()))?;
            self.step(instruction, Some(transport))?;
        };

        debug!(?outcome, frames = self.frames_rendered, "session stop");
        Ok(outcome)
    }

    /// Close the sink and hand it back.
    pub fn finish(mut self) -> Result<K, SessionError> {
        self.sink.close()?;
        Ok(self.sink)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn timing(&self) -> &TimingState {
        &self.timing
    }

    pub fn synth(&self) -> &S {
        &self.synth
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn prime(&mut self) {
        if self.primed {
            return;
        }
        self.primed = true;
        if self.reset_registers {
            for address in 0..REGISTER_SPACE {
                self.synth.write_register(address, 0);
            }
        }
        for &(address, value) in &self.init_writes {
            self.synth.write_register(address, value);
        }
    }

    fn advance(&mut self, delay: Delay, transport: Option<&Transport>) -> Result<(), SinkError> {
        let frames = self.timing.convert(delay, self.min_frames);
        if frames == 0 {
            return Ok(());
        }
        let leftover = self
            .renderer
            .render(frames, &mut self.synth, &mut self.sink, transport)?;
        self.timing.defer(leftover);
        self.frames_rendered += frames - leftover;
        Ok(())
    }
}
