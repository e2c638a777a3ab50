use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use beacon_wake::config::file::config_file_path;
use beacon_wake::voice::{
    AudioCapture, AudioFrame, AudioPlayback, ConfirmationTone, FrameSource, WavFrameSource,
    frame_duration, read_wav_frames, samples_to_wav,
};
use beacon_wake::wake::{EnergyAnalyzer, WakeDetector};
use beacon_wake::{ActivationEvent, Config, DetectorController};

/// Beacon Wake - clap, voice and speech wake detection
#[derive(Parser)]
#[command(name = "beacon-wake", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/omni/beacon/wake.toml)
    #[arg(short, long, env = "BEACON_WAKE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for wake activations (default)
    Listen {
        /// Replay a WAV file instead of the microphone
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Scan a WAV file and print every activation
    DetectFile {
        /// WAV file to scan
        path: PathBuf,
        /// Print activations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Record the captured audio to a WAV file
        #[arg(short, long)]
        save: Option<PathBuf>,
    },
    /// Play the confirmation tone
    TestTone,
    /// List available input devices
    ListDevices,
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_wake=info",
        1 => "info,beacon_wake=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Listen { input: None }) {
        Command::Listen { input } => listen(config, input.as_deref()).await,
        Command::DetectFile { path, json } => detect_file(config, &path, json),
        Command::TestMic { duration, save } => test_mic(&config, duration, save.as_deref()).await,
        Command::TestTone => test_tone(&config),
        Command::ListDevices => list_devices(),
        Command::ShowConfig => {
            show_config(&config, cli.config.as_deref());
            Ok(())
        }
    }
}

/// Run the detector until Ctrl-C or the end of a replayed file
async fn listen(config: Config, input: Option<&Path>) -> anyhow::Result<()> {
    let mut finished = None;
    let source: Box<dyn FrameSource> = match input {
        Some(path) => {
            let wav = WavFrameSource::open(path, config.capture.frame_samples, true)?;
            tracing::info!(path = %path.display(), frames = wav.len(), "replaying wav file");
            finished = Some(wav.finished_flag());
            Box::new(wav)
        }
        None => Box::new(AudioCapture::new(&config.capture)),
    };

    let controller = Arc::new(DetectorController::new(config.detector.clone(), source)?);

    let playback = if config.feedback.enabled {
        AudioPlayback::new()
            .inspect_err(|e| tracing::warn!(error = %e, "confirmation tone disabled"))
            .ok()
    } else {
        None
    };
    let tone = ConfirmationTone::from_config(&config.feedback);
    let settle = config.feedback.settle;

    controller.register_on_activate(move |event: ActivationEvent| {
        println!(
            "[{}] wake: {} at {:.2}s",
            event.detected_at.format("%H:%M:%S"),
            event.source,
            event.timestamp.as_secs_f64()
        );

        if let Some(playback) = &playback {
            if let Err(e) = playback.play_tone(&tone) {
                tracing::warn!(error = %e, "failed to play confirmation tone");
            }
            // Let the tone die out before the microphone is used for a command
            std::thread::sleep(settle);
        }

        tracing::info!(source = %event.source, "ready for command");
    });

    controller.start()?;
    spawn_manual_trigger(Arc::clone(&controller))?;

    tracing::info!("beacon wake ready - clap twice, speak, or press Enter");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("interrupted");
        }
        () = wait_finished(finished) => {
            tracing::info!("input finished");
        }
    }

    controller.stop();
    let stats = controller.stats();
    println!(
        "{} frames, {} activations, {} dropped",
        stats.frames, stats.activations, stats.dropped
    );

    Ok(())
}

/// Fire a manual activation on every line read from stdin
///
/// Reading stdin blocks, so this gets its own thread which dies with the
/// process.
fn spawn_manual_trigger(controller: Arc<DetectorController>) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("wake-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if line.is_err() {
                    break;
                }
                if !controller.trigger_manual() {
                    tracing::info!("manual trigger suppressed");
                }
            }
        })?;
    Ok(())
}

async fn wait_finished(flag: Option<Arc<AtomicBool>>) {
    let Some(flag) = flag else {
        return std::future::pending().await;
    };
    while !flag.load(Ordering::Acquire) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Scan a WAV file offline
fn detect_file(config: Config, path: &Path, json: bool) -> anyhow::Result<()> {
    let frame_samples = config.capture.frame_samples;
    let (sample_rate, frames) = read_wav_frames(path, frame_samples)?;
    let detector_config = config
        .detector
        .with_frame_duration(frame_duration(frame_samples, sample_rate));
    let mut detector = WakeDetector::from_config(detector_config)?;

    let events: Vec<ActivationEvent> = frames
        .iter()
        .filter_map(|frame| detector.process_frame(frame))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }

    for event in &events {
        println!("{:>8.3}s  {}", event.timestamp.as_secs_f64(), event.source);
    }
    println!(
        "{} activation(s) in {} frames ({sample_rate} Hz)",
        events.len(),
        frames.len()
    );

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64, save: Option<&Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone, then clap twice!\n");

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut capture = AudioCapture::new(&config.capture);
    capture.start(Box::new(move |frame: AudioFrame| {
        let _ = tx.send(frame);
    }))?;

    let detector = &config.detector;
    println!("Sample rate: {} Hz", capture.sample_rate());
    println!(
        "Clap threshold (peak): {:.3} | Voice threshold (RMS): {:.3}",
        detector.clap_threshold, detector.voice_energy_threshold
    );
    println!("---");

    let mut recorded = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut rms = 0.0f32;
        let mut peak = 0.0f32;
        while let Ok(frame) = rx.try_recv() {
            let energy = EnergyAnalyzer::analyze(&frame);
            rms = rms.max(energy.rms);
            peak = peak.max(energy.peak);
            if save.is_some() {
                recorded.extend_from_slice(&frame.samples);
            }
        }

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (rms * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        let mut marks = Vec::new();
        if peak > detector.clap_threshold {
            marks.push("clap");
        }
        if rms > detector.voice_energy_threshold {
            marks.push("voice");
        }

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}] {}",
            i + 1,
            rms,
            peak,
            meter,
            marks.join(" ")
        );
    }

    capture.stop();

    if let Some(path) = save {
        std::fs::write(path, samples_to_wav(&recorded, capture.sample_rate())?)?;
        println!("\nSaved {} samples to {}", recorded.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: beacon-wake list-devices");
    println!("  3. Set BEACON_WAKE_DEVICE to pick another input");

    Ok(())
}

/// Play the confirmation tone once
fn test_tone(config: &Config) -> anyhow::Result<()> {
    let tone = ConfirmationTone::from_config(&config.feedback);
    println!(
        "Playing {} Hz tone for {} ms at volume {:.2}...",
        tone.frequency_hz,
        tone.duration.as_millis(),
        tone.volume
    );

    AudioPlayback::new()?.play_tone(&tone)?;

    println!("If you heard the beep, your speakers are working!");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let devices = AudioCapture::list_input_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

fn show_config(config: &Config, path: Option<&Path>) {
    let path = path.map(Path::to_path_buf).or_else(config_file_path);
    match path {
        Some(p) if p.exists() => println!("# config file: {}", p.display()),
        Some(p) => println!("# config file: {} (not found, using defaults)", p.display()),
        None => println!("# config file: none"),
    }
    println!("{config:#?}");
}
