//! Human-readable rendering for the terminal.
#![allow(clippy::cast_precision_loss)]

use std::fmt::Write;

use scribe_core::{Transcript, WorkerMessage};
use scribe_engine::ModelSpec;
use scribe_runtime::AudioWindow;

/// `mm:ss`, or `h:mm:ss` from one hour on.
pub fn format_clock(seconds: u32) -> String {
    let (h, m, s) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// One `[start → end] text` line per segment.
pub fn render_transcript(transcript: &Transcript) -> String {
    let mut out = String::new();
    for chunk in transcript {
        let _ = writeln!(
            out,
            "[{} → {}] {}",
            format_clock(chunk.start_s),
            format_clock(chunk.end_s),
            chunk.text
        );
    }
    out
}

/// Progress line for model acquisition messages; `None` for everything else.
pub fn status_line(message: &WorkerMessage) -> Option<String> {
    match message {
        WorkerMessage::LoadingModel { model } => Some(format!("loading {model}")),
        WorkerMessage::Downloading {
            file,
            loaded,
            total,
            progress,
        } => Some(format!(
            "downloading {file}: {progress:.0}% ({:.1} / {:.1} MB)",
            *loaded as f64 / 1_048_576.0,
            *total as f64 / 1_048_576.0
        )),
        _ => None,
    }
}

/// Table of supported models.
pub fn render_models(models: &[ModelSpec]) -> String {
    let mut out = String::new();
    for m in models {
        let _ = writeln!(
            out,
            "{:<26} {:>6} MB  {}",
            m.id,
            m.approx_size_mb,
            if m.english_only { "english" } else { "multilingual" }
        );
    }
    out
}

/// One line per planned window, in seconds.
pub fn render_plan(windows: &[AudioWindow], sample_rate: u32) -> String {
    let rate = f64::from(sample_rate);
    let mut out = String::new();
    for (n, w) in windows.iter().enumerate() {
        let _ = writeln!(
            out,
            "{n:>3}  [{:>8.2}, {:>8.2})  overlap L {:.2} R {:.2}{}",
            w.start as f64 / rate,
            w.end as f64 / rate,
            w.stride.left_s,
            w.stride.right_s,
            if w.is_last { "  last" } else { "" }
        );
    }
    out
}
