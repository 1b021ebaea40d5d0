//! mrz-capture - Command line front end
//!
//! Replays recorded frames through the scan pipeline, checks MRZ lines, and
//! prints the default configuration.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, RecvTimeoutError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mrz_capture::capture::{DisplayTarget, ReplayDriver};
use mrz_capture::config::{self, AppConfig};
use mrz_capture::mrz::{self, IcaoValidator, MrzPayload};
use mrz_capture::pipeline::SessionEvent;
use mrz_capture::vision::ScriptedRecognizer;
use mrz_capture::ScanSession;

/// mrz-capture - Scan machine readable zones from a frame stream
#[derive(Parser, Debug)]
#[command(name = "mrz-capture")]
#[command(about = "Capture and decode machine readable zones")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scan session over recorded frames with scripted recognition
    Replay {
        /// Directory of frame images, replayed in file name order
        #[arg(long)]
        frames: PathBuf,

        /// TOML transcript of recognition results
        #[arg(long)]
        transcript: PathBuf,

        /// Capture on demand instead of scanning continuously
        #[arg(long)]
        single_shot: bool,

        /// Replay frame rate
        #[arg(long, default_value = "15")]
        fps: u32,

        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,

        /// Configuration file (default: config.toml in the config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate MRZ lines and print the decoded fields as JSON
    Check {
        /// One argument per zone line
        #[arg(required = true)]
        lines: Vec<String>,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Replay {
            frames,
            transcript,
            single_shot,
            fps,
            timeout_secs,
            config,
        } => {
            let (mut config, source) = config::load_or_default(config.as_deref())?;
            init_logging(&config.logging.level)?;
            match source {
                Some(path) => info!("Loaded configuration from {}", path.display()),
                None => info!("Using default configuration"),
            }
            if single_shot {
                config.capture.continuous = false;
            }
            run_replay(&config, &frames, &transcript, fps, Duration::from_secs(timeout_secs))
        }
        Command::Check { lines } => {
            init_logging("warn")?;
            let payload = mrz::parse_mrz(&lines.join("\n"))
                .context("Lines are not a valid machine readable zone")?;
            print_payload(&payload)
        }
        Command::DefaultConfig => {
            print!("{}", toml::to_string_pretty(&AppConfig::default())?);
            Ok(())
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the configured level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn print_payload(payload: &MrzPayload) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

fn run_replay(
    config: &AppConfig,
    frames: &std::path::Path,
    transcript: &std::path::Path,
    fps: u32,
    timeout: Duration,
) -> Result<()> {
    let driver = ReplayDriver::from_dir(frames, fps)
        .with_context(|| format!("Failed to load frames from {}", frames.display()))?;
    let recognizer = ScriptedRecognizer::from_file(transcript)?;
    let size = driver.frame_size();
    info!("Replaying {} frames at {} fps", driver.frame_count(), fps);

    let (sink, events) = unbounded();
    let mut session = match ScanSession::start_with_sink(
        config,
        Arc::new(driver),
        DisplayTarget::new(size.width, size.height),
        Box::new(recognizer),
        Box::new(IcaoValidator),
        sink,
    ) {
        Ok(session) => session,
        Err(e) => {
            while let Ok(event) = events.try_recv() {
                report(&event)?;
            }
            return Err(e.into());
        }
    };

    let handle = session.handle();
    let single_shot = !config.capture.continuous;
    if single_shot {
        handle.shutter();
    }

    let deadline = Instant::now() + timeout;
    let mut completed = false;
    loop {
        let event = match events.recv_deadline(deadline) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                warn!("No result within {:?}", timeout);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };
        report(&event)?;

        match event {
            SessionEvent::SessionComplete(_) => completed = true,
            SessionEvent::DecodeAccepted(_) if single_shot => {
                completed = true;
                handle.quit();
            }
            SessionEvent::DecodeFailed if single_shot => {
                handle.shutter();
            }
            SessionEvent::RecognitionFault(_) => {
                handle.quit();
            }
            SessionEvent::Stopped => break,
            _ => {}
        }
    }

    session.shutdown();
    if !completed {
        bail!("Session ended without a result");
    }
    Ok(())
}

fn report(event: &SessionEvent) -> Result<()> {
    match event {
        SessionEvent::ContinuousResult(result) => info!(
            "Recognized {} lines at confidence {} in {:?}",
            result.line_count(),
            result.mean_confidence,
            result.time_required
        ),
        SessionEvent::ContinuousFailure(failure) => {
            info!("Nothing recognized in {:?}", failure.time_required)
        }
        SessionEvent::DecodeAccepted(result) => println!("{}", result.text),
        SessionEvent::DecodeFailed => warn!("Capture failed, try again"),
        SessionEvent::DeviceUnavailable(reason) => eprintln!("Capture device unavailable: {}", reason),
        SessionEvent::RecognitionFault(reason) => eprintln!("Recognition failed: {}", reason),
        SessionEvent::SessionComplete(payload) => print_payload(payload)?,
        SessionEvent::CaptureAffordance(_) | SessionEvent::DrawViewfinder | SessionEvent::Stopped => {}
    }
    Ok(())
}
