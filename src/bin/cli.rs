//! oplplay CLI: live playback and WAV export of IMF and DRO captures.
//!
//! Usage:
//!   opl-cli path/to/song.imf
//!   opl-cli path/to/song.dro --wav output.wav

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use opl_master::{ActivityTrigger, Controller, DroHardware, ImfTickRate, Outcome, PlayerConfig, SongInfo};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opl-cli")]
#[command(about = "Play or render OPL register captures (IMF, DRO v2)")]
struct Args {
    /// IMF (.imf, .wlf) or DRO (.dro) file
    file: PathBuf,

    /// Render to this WAV file instead of playing
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Output sample rate in Hz (default: 49716 for DRO, 44100 for IMF)
    #[arg(long)]
    rate: Option<u32>,

    /// Frames rendered per block
    #[arg(long, default_value_t = opl_master::PlayerConfig::default().block_frames)]
    block: usize,

    /// IMF tick rate in Hz (default: 700 for .wlf, otherwise 560)
    #[arg(long)]
    tick_rate: Option<u32>,

    /// Stop WAV rendering after this many seconds
    #[arg(long)]
    max_seconds: Option<u32>,

    /// Which register writes update the channel display
    #[arg(long, value_enum, default_value_t = Trigger::Masked)]
    trigger: Trigger,

    /// No channel display; warnings only
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Trigger {
    Masked,
    AnyBits,
}

impl From<Trigger> for ActivityTrigger {
    fn from(t: Trigger) -> Self {
        match t {
            Trigger::Masked => ActivityTrigger::Masked,
            Trigger::AnyBits => ActivityTrigger::AnyBits,
        }
    }
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            std::process::exit(0);
        }
    };

    let default_level = if args.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let config = PlayerConfig {
        sample_rate: args.rate,
        block_frames: args.block,
        tick_rate: args.tick_rate.map(ImfTickRate),
        trigger: args.trigger.into(),
        ..PlayerConfig::default()
    };
    debug!(?config, "player config");

    let mut ctrl = Controller::new(config);
    ctrl.load_file(&args.file)
        .with_context(|| format!("failed to load {}", args.file.display()))?;
    print_info(&ctrl)?;

    match &args.wav {
        Some(path) => render_to_wav(&ctrl, path, args.max_seconds),
        None => play_audio(&mut ctrl, args.quiet),
    }
}

fn print_info(ctrl: &Controller) -> Result<()> {
    match ctrl.song_info() {
        Some(SongInfo::Imf { info, tick_rate }) => {
            if info.headered {
                println!("Format:   IMF type 1 ({} bytes)", info.data_length);
            } else {
                println!("Format:   IMF type 0");
            }
            println!("Ticks:    {} Hz", tick_rate.hz());
        }
        Some(SongInfo::Dro(info)) => {
            let hardware = match info.hardware {
                DroHardware::Opl2 => "OPL2".to_string(),
                DroHardware::DualOpl2 => "dual OPL2".to_string(),
                DroHardware::Opl3 => "OPL3".to_string(),
                DroHardware::Unknown(n) => format!("unknown ({n})"),
            };
            println!("Format:   DRO v{}.{} ({hardware})", info.version.0, info.version.1);
            println!("Length:   {}", clock(Duration::from_millis(info.length_ms as u64)));
        }
        None => {}
    }

    let format = ctrl.output_format()?;
    println!("Output:   {} Hz, {} channels", format.sample_rate, format.channels);
    println!();
    Ok(())
}

fn play_audio(ctrl: &mut Controller, quiet: bool) -> Result<()> {
    ctrl.play().context("failed to start playback")?;
    let transport = ctrl.transport().context("playback did not start")?;
    if let (Some(rate), Ok(format)) = (ctrl.playback_rate(), ctrl.output_format()) {
        if rate != format.sample_rate {
            println!("Device:   {rate} Hz (device default)");
        }
    }

    // Enter stops playback after the current block.
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        transport.request_stop();
    });

    println!("Playing, press Enter to stop...");
    while ctrl.is_playing() {
        if !quiet {
            if let (Some(activity), Some(pos)) = (ctrl.activity(), ctrl.position()) {
                print!("\r{:<15} {}", activity.to_string(), clock(pos));
                let _ = std::io::stdout().flush();
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    let outcome = ctrl.wait().context("playback failed")?;
    match outcome {
        Outcome::Finished => println!("\nDone."),
        Outcome::Interrupted => println!("\nStopped."),
    }
    Ok(())
}

fn render_to_wav(ctrl: &Controller, path: &Path, max_seconds: Option<u32>) -> Result<()> {
    let format = ctrl.output_format()?;
    println!("Rendering to {} at {} Hz...", path.display(), format.sample_rate);

    let frames = ctrl.export_wav(path, max_seconds)?;
    let length = Duration::from_secs_f64(frames as f64 / format.sample_rate as f64);
    println!("Rendered {frames} frames ({}).", clock(length));
    Ok(())
}

fn clock(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}.{}", secs / 60, secs % 60, d.subsec_millis() / 100)
}
