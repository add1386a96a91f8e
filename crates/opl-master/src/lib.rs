//! Headless controller for oplplay.
//!
//! Loads IMF/DRO captures and either plays them on the default audio device
//! from a dedicated thread or renders them offline to PCM and WAV. The CLI
//! only talks to this crate.

mod error;
mod song;

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use opl_audio::CpalOutput;
use opl_engine::{
    ChannelActivity, MemorySink, OplSynth, PlaybackSession, SessionError, SinkError, Synth, DEFAULT_BLOCK_FRAMES,
};
use tracing::{debug, info};

use song::Song;

// Re-export common types so callers don't need the lower crates directly.
pub use error::ControllerError;
pub use opl_engine::{ActivitySnapshot, ActivityTrigger, Outcome, SharedActivity, Transport};
pub use opl_formats::{DroHardware, DroInfo, FormatError, ImfInfo, ImfTickRate};
pub use opl_ir::PcmFormat;
pub use song::{SongFormat, SongInfo, IMF_SAMPLE_RATE};

/// Output settings, typically filled from the command line.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Output rate; `None` picks the format default (DRO 49716 Hz, IMF 44100 Hz).
    pub sample_rate: Option<u32>,
    pub channels: u16,
    pub block_frames: usize,
    /// IMF tick rate; `None` derives it from the file extension.
    pub tick_rate: Option<ImfTickRate>,
    pub trigger: ActivityTrigger,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sample_rate: None,
            channels: 2,
            block_frames: DEFAULT_BLOCK_FRAMES,
            tick_rate: None,
            trigger: ActivityTrigger::default(),
        }
    }
}

/// Headless player: owns a song and manages playback.
pub struct Controller {
    config: PlayerConfig,
    song: Option<Song>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    transport: Arc<Transport>,
    activity: SharedActivity,
    finished: Arc<AtomicBool>,
    sample_rate: u32,
    thread: Option<JoinHandle<Result<Outcome, ControllerError>>>,
}

impl Controller {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            song: None,
            playback: None,
        }
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // --- Song management ---

    pub fn song_info(&self) -> Option<&SongInfo> {
        self.song.as_ref().map(Song::info)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), ControllerError> {
        let data = std::fs::read(path).map_err(|source| ControllerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let tick_rate = self.config.tick_rate.unwrap_or_else(|| ImfTickRate::from_path(path));
        self.load_bytes(data, tick_rate)
    }

    pub fn load_bytes(&mut self, data: Vec<u8>, tick_rate: ImfTickRate) -> Result<(), ControllerError> {
        self.stop();
        self.song = Some(Song::parse(data, tick_rate)?);
        Ok(())
    }

    /// PCM layout used for playback and rendering of the loaded song.
    pub fn output_format(&self) -> Result<PcmFormat, ControllerError> {
        let song = self.song()?;
        let rate = self
            .config
            .sample_rate
            .unwrap_or_else(|| song.info().format().default_sample_rate());
        Ok(PcmFormat {
            sample_rate: rate,
            sample_width: 2,
            channels: self.config.channels,
        })
    }

    fn song(&self) -> Result<&Song, ControllerError> {
        self.song.as_ref().ok_or(ControllerError::NoSong)
    }

    // --- Real-time playback ---

    /// Start playback on the default device.
    ///
    /// Without a configured rate, a device that cannot play the format's
    /// default rate is driven at its own default rate instead. Returns once
    /// the device is open (or failed to open); the song then plays on its
    /// own thread.
    pub fn play(&mut self) -> Result<(), ControllerError> {
        self.stop();

        let song = self.song()?.clone();
        let mut format = self.output_format()?;
        if self.config.sample_rate.is_none() {
            format = CpalOutput::playable_format(format)?;
        }
        let options = song.session_options(self.config.block_frames);
        let activity = ChannelActivity::new(self.config.trigger);
        let shared = activity.shared();
        let transport = Arc::new(Transport::new());
        let finished = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_transport = transport.clone();
        let done = finished.clone();

        let thread = std::thread::spawn(move || {
            let result = audio_thread(song, format, options, activity, &thread_transport, ready_tx);
            done.store(true, Ordering::Relaxed);
            result
        });

        let started = ready_rx.recv().unwrap_or(Err(ControllerError::NotStarted));
        if let Err(err) = started {
            let _ = thread.join();
            return Err(err);
        }

        self.playback = Some(PlaybackHandle {
            transport,
            activity: shared,
            finished,
            sample_rate: format.sample_rate,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Stop playback after the current block and wait for the thread.
    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.transport.request_stop();
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
    }

    /// Wait for playback to end on its own (or via [`Transport::request_stop`]).
    /// Returns `Finished` immediately when nothing is playing.
    pub fn wait(&mut self) -> Result<Outcome, ControllerError> {
        let Some(mut pb) = self.playback.take() else {
            return Ok(Outcome::Finished);
        };
        match pb.thread.take() {
            Some(handle) => join_playback(handle),
            None => Err(ControllerError::NotStarted),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    /// Rate the device is being driven at.
    pub fn playback_rate(&self) -> Option<u32> {
        self.playback.as_ref().map(|p| p.sample_rate)
    }

    /// Stop handle that can be moved to another thread.
    pub fn transport(&self) -> Option<Arc<Transport>> {
        self.playback.as_ref().map(|p| p.transport.clone())
    }

    /// Audio time delivered to the device so far.
    pub fn position(&self) -> Option<Duration> {
        let pb = self.playback.as_ref()?;
        let frames = pb.transport.frames_rendered();
        Some(Duration::from_secs_f64(frames as f64 / pb.sample_rate as f64))
    }

    pub fn activity(&self) -> Option<ActivitySnapshot> {
        self.playback.as_ref().map(|p| p.activity.snapshot())
    }

    // --- Offline rendering ---

    /// Render the whole song (or its first `max_frames` frames) with the
    /// bundled synth.
    pub fn render_pcm(&self, max_frames: Option<u64>) -> Result<Vec<u8>, ControllerError> {
        let synth = OplSynth::new(self.output_format()?)?;
        self.render_pcm_with(synth, max_frames)
    }

    /// Render through a caller-supplied synth; its format decides the output.
    pub fn render_pcm_with<S: Synth>(&self, synth: S, max_frames: Option<u64>) -> Result<Vec<u8>, ControllerError> {
        let song = self.song()?;
        let block_align = synth.format().block_align();
        let sink = match max_frames {
            Some(frames) => MemorySink::with_limit(frames as usize * block_align),
            None => MemorySink::new(),
        };

        let mut session = PlaybackSession::new(synth, sink, song.session_options(self.config.block_frames))?;
        match session.run(song.instructions()?, &Transport::new()) {
            Ok(_) | Err(SessionError::Sink(SinkError::Full { .. })) => {}
            Err(err) => return Err(err.into()),
        }
        let frames = session.frames_rendered();
        let pcm = session.finish()?.into_bytes();
        debug!(frames, bytes = pcm.len(), "offline render complete");
        Ok(pcm)
    }

    /// Render to an in-memory WAV file.
    pub fn render_to_wav(&self, max_seconds: Option<u32>) -> Result<Vec<u8>, ControllerError> {
        let format = self.output_format()?;
        let max_frames = max_seconds.map(|s| s as u64 * format.sample_rate as u64);
        let pcm = self.render_pcm(max_frames)?;
        Ok(opl_formats::pcm_to_wav(&pcm, format))
    }

    /// Render to a WAV file on disk; returns the number of frames written.
    pub fn export_wav(&self, path: &Path, max_seconds: Option<u32>) -> Result<u64, ControllerError> {
        let format = self.output_format()?;
        let max_frames = max_seconds.map(|s| s as u64 * format.sample_rate as u64);
        let pcm = self.render_pcm(max_frames)?;

        let write_err = |source| ControllerError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(write_err)?);
        opl_formats::write_wav(&mut file, &pcm, format).map_err(write_err)?;
        file.flush().map_err(write_err)?;

        let frames = (pcm.len() / format.block_align()) as u64;
        info!(path = %path.display(), frames, "wrote WAV");
        Ok(frames)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_playback(handle: JoinHandle<Result<Outcome, ControllerError>>) -> Result<Outcome, ControllerError> {
    handle.join().unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ControllerError::PlaybackPanicked(message))
    })
}

fn audio_thread(
    song: Song,
    format: PcmFormat,
    options: opl_engine::SessionOptions,
    activity: ChannelActivity,
    transport: &Transport,
    ready: mpsc::Sender<Result<(), ControllerError>>,
) -> Result<Outcome, ControllerError> {
    let setup = || -> Result<_, ControllerError> {
        let synth = OplSynth::new(format)?;
        let output = CpalOutput::open(format)?;
        let session = PlaybackSession::new(synth, output, options)?.with_observer(Box::new(activity));
        Ok((session, song.instructions()?))
    };

    let (mut session, instructions) = match setup() {
        Ok(parts) => {
            let _ = ready.send(Ok(()));
            parts
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return Err(ControllerError::NotStarted);
        }
    };

    let outcome = session.run(instructions, transport);
    // Close even after an error so the device drains and pauses.
    let closed = session.finish();
    let outcome = outcome?;
    closed?;
    debug!(?outcome, "playback thread done");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn dro_file(pairs: &[(u8, u8)]) -> Vec<u8> {
        let mut out = b"DBRAWOPL".to_vec();
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(pairs.len() as u32).to_le_bytes());
        out.extend_from_slice(&20u32.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 1, 1, 0xB0]);
        for &(a, b) in pairs {
            out.extend_from_slice(&[a, b]);
        }
        out
    }

    /// Header-less IMF: key-on, then 560 ticks.
    const IMF_ONE_SECOND: [u8; 8] = [0, 0, 0, 0, 0xB0, 0x20, 0x30, 0x02];

    #[test]
    fn no_song_errors() {
        let ctrl = Controller::default();
        assert!(matches!(ctrl.render_pcm(None), Err(ControllerError::NoSong)));
        assert!(ctrl.song_info().is_none());
        assert!(!ctrl.is_playing());
        assert!(ctrl.position().is_none());
    }

    #[test]
    fn panicked_playback_thread_is_reported() {
        let handle = std::thread::spawn(|| -> Result<Outcome, ControllerError> { panic!("synth blew up") });
        match join_playback(handle) {
            Err(ControllerError::PlaybackPanicked(message)) => assert_eq!(message, "synth blew up"),
            other => panic!("expected PlaybackPanicked, got {other:?}"),
        }
    }

    #[test]
    fn formatted_panic_message_is_kept() {
        let handle = std::thread::spawn(|| -> Result<Outcome, ControllerError> { panic!("block {} failed", 3) });
        let err = join_playback(handle).unwrap_err();
        assert_eq!(err.to_string(), "playback thread panicked: block 3 failed");
    }

    #[test]
    fn finished_playback_thread_returns_its_outcome() {
        let handle = std::thread::spawn(|| -> Result<Outcome, ControllerError> { Ok(Outcome::Finished) });
        assert!(matches!(join_playback(handle), Ok(Outcome::Finished)));
    }

    #[test]
    fn play_without_song_fails() {
        let mut ctrl = Controller::default();
        assert!(matches!(ctrl.play(), Err(ControllerError::NoSong)));
    }

    #[test]
    fn load_dro_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.dro");
        fs::write(&path, dro_file(&[(0, 9)])).unwrap();

        let mut ctrl = Controller::default();
        ctrl.load_file(&path).unwrap();
        let info = ctrl.song_info().unwrap();
        assert_eq!(info.format(), SongFormat::Dro);
        assert_eq!(info.declared_duration(), Some(Duration::from_millis(20)));
        assert_eq!(ctrl.output_format().unwrap(), PcmFormat::stereo16(49716));
    }

    #[test]
    fn wlf_extension_selects_700hz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wlf");
        fs::write(&path, IMF_ONE_SECOND).unwrap();

        let mut ctrl = Controller::default();
        ctrl.load_file(&path).unwrap();
        match ctrl.song_info().unwrap() {
            SongInfo::Imf { tick_rate, .. } => assert_eq!(tick_rate.hz(), 700),
            other => panic!("expected IMF, got {other:?}"),
        }
        // 560 ticks at 700 Hz = 0.8 s
        assert_eq!(ctrl.render_pcm(None).unwrap().len(), 35280 * 4);
    }

    #[test]
    fn configured_tick_rate_overrides_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wlf");
        fs::write(&path, IMF_ONE_SECOND).unwrap();

        let mut ctrl = Controller::new(PlayerConfig {
            tick_rate: Some(ImfTickRate::STANDARD),
            ..PlayerConfig::default()
        });
        ctrl.load_file(&path).unwrap();
        assert_eq!(ctrl.render_pcm(None).unwrap().len(), 44100 * 4);
    }

    #[test]
    fn missing_file_reports_path() {
        let mut ctrl = Controller::default();
        let err = ctrl.load_file(Path::new("/nonexistent/song.imf")).unwrap_err();
        assert!(matches!(err, ControllerError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/song.imf"));
    }

    #[test]
    fn dro_render_carries_remainder() {
        let mut ctrl = Controller::default();
        ctrl.load_bytes(dro_file(&[(0, 9), (0, 9)]), ImfTickRate::STANDARD).unwrap();
        // 2 x 497.16 frames
        assert_eq!(ctrl.render_pcm(None).unwrap().len(), 994 * 4);
    }

    #[test]
    fn frame_limit_truncates_render() {
        let mut ctrl = Controller::default();
        ctrl.load_bytes(IMF_ONE_SECOND.to_vec(), ImfTickRate::STANDARD).unwrap();
        assert_eq!(ctrl.render_pcm(Some(1000)).unwrap().len(), 1000 * 4);
    }

    #[test]
    fn configured_rate_and_mono() {
        let mut ctrl = Controller::new(PlayerConfig {
            sample_rate: Some(22050),
            channels: 1,
            ..PlayerConfig::default()
        });
        ctrl.load_bytes(IMF_ONE_SECOND.to_vec(), ImfTickRate::STANDARD).unwrap();
        assert_eq!(ctrl.render_pcm(None).unwrap().len(), 22050 * 2);
    }

    #[test]
    fn unsupported_channel_count() {
        let mut ctrl = Controller::new(PlayerConfig {
            channels: 6,
            ..PlayerConfig::default()
        });
        ctrl.load_bytes(IMF_ONE_SECOND.to_vec(), ImfTickRate::STANDARD).unwrap();
        assert!(matches!(ctrl.render_pcm(None), Err(ControllerError::Engine(_))));
    }

    #[test]
    fn wav_export() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wav");
        let mut ctrl = Controller::default();
        ctrl.load_bytes(IMF_ONE_SECOND.to_vec(), ImfTickRate::STANDARD).unwrap();

        let frames = ctrl.export_wav(&out, None).unwrap();
        assert_eq!(frames, 44100);

        let wav = opl_formats::load_wav(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(wav.format, PcmFormat::stereo16(44100));
        assert_eq!(wav.frames(), 44100);
        assert_eq!(fs::read(&out).unwrap(), ctrl.render_to_wav(None).unwrap());
    }

    #[test]
    fn wav_length_cap() {
        let mut ctrl = Controller::default();
        ctrl.load_bytes(dro_file(&[(1, 0xFF), (1, 0xFF)]), ImfTickRate::STANDARD).unwrap();
        let wav = ctrl.render_to_wav(Some(1)).unwrap();
        assert_eq!(wav.len(), 44 + 49716 * 4);
    }
}
