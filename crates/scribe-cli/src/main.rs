//! # scribe
//!
//! Command-line front end for the long-form transcription pipeline.
//!
//! - `scribe transcribe <file>`: decode an audio file and print the stitched
//!   transcript (or every protocol message as JSON lines with `--json`)
//! - `scribe worker`: speak the host/worker protocol over stdin/stdout, one
//!   JSON message per line
//! - `scribe models`: list supported model identifiers
//! - `scribe plan <seconds>`: show the windows a recording would be split into

#![deny(unsafe_code)]

mod output;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use scribe_core::{HostMessage, SAMPLE_RATE, WorkerMessage};
use scribe_engine::WhisperLoader;
use scribe_runtime::{EngineAdapter, Worker, plan_windows};
use scribe_settings::ScribeSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Long-form speech transcription with overlapping windows.
#[derive(Parser, Debug)]
#[command(name = "scribe", version, about)]
struct Cli {
    /// Settings file (defaults to `~/.scribe/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Window overrides shared by the commands that plan windows.
#[derive(clap::Args, Debug, Default)]
struct WindowArgs {
    /// Window length in seconds.
    #[arg(long)]
    window: Option<f64>,

    /// Overlap between consecutive windows in seconds.
    #[arg(long)]
    stride: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transcribe an audio file.
    Transcribe {
        /// Audio file (wav, flac, ogg, m4a).
        file: PathBuf,

        /// Model identifier (overrides settings).
        #[arg(long)]
        model: Option<String>,

        /// Print every protocol message as a JSON line instead of the
        /// final transcript.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        window: WindowArgs,
    },
    /// Run the message protocol over stdin/stdout.
    Worker {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// List supported models.
    Models,
    /// Show the window plan for a recording of the given length.
    Plan {
        /// Recording length in seconds.
        seconds: f64,

        #[command(flatten)]
        window: WindowArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => scribe_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => scribe_settings::load_settings().context("failed to load settings")?,
    };
    match cli.log_format {
        LogFormat::Text => scribe_core::logging::init_subscriber(&settings.log_level),
        LogFormat::Json => scribe_core::logging::init_json_subscriber(&settings.log_level),
    }
    let _ = scribe_settings::init_settings(settings);
    let settings = scribe_settings::get_settings();
    debug!(?settings, "settings loaded");

    match cli.command {
        Command::Transcribe {
            file,
            model,
            json,
            window,
        } => transcribe(settings, &file, model, json, &window).await,
        Command::Worker { window } => run_worker(settings, &window).await,
        Command::Models => {
            print!("{}", output::render_models(scribe_engine::MODELS));
            Ok(())
        }
        Command::Plan { seconds, window } => plan(settings, seconds, &window),
    }
}

/// Settings with command-line window overrides applied and validated.
fn effective_settings(base: &ScribeSettings, window: &WindowArgs) -> Result<ScribeSettings> {
    let mut settings = base.clone();
    if let Some(w) = window.window {
        settings.window_length_s = w;
    }
    if let Some(s) = window.stride {
        settings.stride_s = s;
    }
    settings.validate().context("invalid window settings")?;
    Ok(settings)
}

fn adapter_for(settings: &ScribeSettings) -> Result<Arc<EngineAdapter>> {
    let loader = WhisperLoader::new(settings.resolved_cache_dir())
        .with_intra_threads(settings.engine.intra_threads)
        .with_max_new_tokens(settings.engine.max_new_tokens);
    let window = settings.window_spec()?;
    Ok(Arc::new(EngineAdapter::new(Arc::new(loader), window)))
}

async fn transcribe(
    base: &ScribeSettings,
    file: &std::path::Path,
    model: Option<String>,
    json: bool,
    window: &WindowArgs,
) -> Result<()> {
    let settings = effective_settings(base, window)?;
    let model = model.unwrap_or_else(|| settings.model.clone());

    let path = file.to_path_buf();
    let audio = tokio::task::spawn_blocking(move || scribe_engine::audio::decode_file(&path))
        .await
        .context("audio decode task failed")?
        .with_context(|| format!("failed to decode {}", file.display()))?;
    info!(
        file = %file.display(),
        duration_s = audio.duration_s(),
        source_rate = audio.source_rate,
        "audio decoded"
    );

    let adapter = adapter_for(&settings)?;
    let mut messages = adapter.stream(audio.samples, model);
    let mut stdout = std::io::stdout().lock();

    loop {
        let message = tokio::select! {
            message = messages.next() => match message {
                Some(message) => message,
                None => bail!("transcription ended without a result"),
            },
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted; stopping at the next window");
                bail!("interrupted");
            }
        };

        if json {
            writeln!(stdout, "{}", serde_json::to_string(&message)?)?;
            if message.is_terminal() {
                return failure(&message);
            }
            continue;
        }

        match &message {
            WorkerMessage::Downloading { .. } | WorkerMessage::LoadingModel { .. } => {
                if let Some(line) = output::status_line(&message) {
                    eprintln!("{line}");
                }
            }
            WorkerMessage::Done { transcript } => {
                write!(stdout, "{}", output::render_transcript(transcript))?;
                return Ok(());
            }
            WorkerMessage::Failed { .. } => return failure(&message),
            _ => {}
        }
    }
}

fn failure(message: &WorkerMessage) -> Result<()> {
    match message {
        WorkerMessage::Failed { reason, message } => bail!("{reason}: {message}"),
        _ => Ok(()),
    }
}

/// Read [`HostMessage`] JSON lines from stdin; write `WorkerEvent` JSON
/// lines to stdout. Runs until stdin closes and every start request has been
/// answered with a terminal message.
async fn run_worker(base: &ScribeSettings, window: &WindowArgs) -> Result<()> {
    let settings = effective_settings(base, window)?;
    let adapter = adapter_for(&settings)?;
    let mut handle = Worker::spawn(adapter);
    let sender = handle.sender();

    // Resolves to the number of start requests forwarded.
    let mut reader = tokio::spawn(async move {
        let mut starts = 0_usize;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HostMessage>(&line) {
                Ok(message) => {
                    let is_start = matches!(message, HostMessage::StartTranscription { .. });
                    if sender.send(message).is_err() {
                        break;
                    }
                    if is_start {
                        starts += 1;
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed host message"),
            }
        }
        Ok::<_, std::io::Error>(starts)
    });

    let mut expected: Option<usize> = None;
    let mut answered = 0_usize;
    while expected.is_none_or(|n| answered < n) {
        tokio::select! {
            finished = &mut reader, if expected.is_none() => {
                let starts = finished
                    .context("stdin reader panicked")?
                    .context("failed to read stdin")?;
                debug!(starts, "stdin closed");
                expected = Some(starts);
            }
            event = handle.recv() => {
                let Some(event) = event else { break };
                if event.message.is_terminal() {
                    answered += 1;
                }
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn plan(base: &ScribeSettings, seconds: f64, window: &WindowArgs) -> Result<()> {
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("recording length must be a non-negative number of seconds");
    }
    let settings = effective_settings(base, window)?;
    let spec = settings.window_spec()?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = (seconds * f64::from(SAMPLE_RATE)).round() as usize;
    let windows = plan_windows(total, &spec, SAMPLE_RATE);
    print!("{}", output::render_plan(&windows, SAMPLE_RATE));
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clap::CommandFactory;
    use scribe_core::FailureReason;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_transcribe_with_overrides() {
        let cli = Cli::parse_from([
            "scribe",
            "transcribe",
            "talk.wav",
            "--model",
            "openai/whisper-base",
            "--window",
            "20",
            "--stride",
            "4",
            "--json",
        ]);
        assert_matches!(
            cli.command,
            Command::Transcribe { ref file, ref model, json: true, ref window }
                if file == &PathBuf::from("talk.wav")
                    && model.as_deref() == Some("openai/whisper-base")
                    && window.window == Some(20.0)
                    && window.stride == Some(4.0)
        );
    }

    #[test]
    fn log_format_is_global() {
        let cli = Cli::parse_from(["scribe", "models", "--log-format", "json"]);
        assert_matches!(cli.log_format, LogFormat::Json);
        assert_matches!(cli.command, Command::Models);
    }

    #[test]
    fn effective_settings_applies_overrides() {
        let args = WindowArgs {
            window: Some(20.0),
            stride: Some(2.0),
        };
        let settings = effective_settings(&ScribeSettings::default(), &args).unwrap();
        assert_eq!(settings.window_length_s, 20.0);
        assert_eq!(settings.stride_s, 2.0);
    }

    #[test]
    fn effective_settings_rejects_stride_not_below_window() {
        let args = WindowArgs {
            window: Some(5.0),
            stride: Some(5.0),
        };
        assert!(effective_settings(&ScribeSettings::default(), &args).is_err());
    }

    #[test]
    fn failure_turns_failed_into_error() {
        let failed = WorkerMessage::failed(FailureReason::Busy, "transcription already in progress");
        let err = failure(&failed).unwrap_err();
        assert_eq!(err.to_string(), "Busy: transcription already in progress");
        assert!(failure(&WorkerMessage::Queued).is_ok());
    }

    #[test]
    fn plan_rejects_negative_length() {
        assert!(plan(&ScribeSettings::default(), -1.0, &WindowArgs::default()).is_err());
    }
}
