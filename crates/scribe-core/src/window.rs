//! Window/stride policy.

use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};

/// Default window length in seconds (the model's context size).
pub const DEFAULT_WINDOW_LENGTH_S: f64 = 30.0;

/// Default overlap between consecutive windows in seconds.
pub const DEFAULT_STRIDE_S: f64 = 5.0;

/// Window length and overlap used to split long audio.
///
/// Invariant: `0 < stride_s < window_length_s`. Without overlap, words that
/// straddle a window boundary are lost.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "UncheckedWindowSpec")]
pub struct WindowSpec {
    window_length_s: f64,
    stride_s: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UncheckedWindowSpec {
    window_length_s: f64,
    stride_s: f64,
}

impl TryFrom<UncheckedWindowSpec> for WindowSpec {
    type Error = CoreError;

    fn try_from(raw: UncheckedWindowSpec) -> Result<Self> {
        Self::new(raw.window_length_s, raw.stride_s)
    }
}

impl WindowSpec {
    /// Create a validated window spec.
    pub fn new(window_length_s: f64, stride_s: f64) -> Result<Self> {
        if !window_length_s.is_finite() || window_length_s <= 0.0 {
            return Err(CoreError::InvalidWindowSpec(format!(
                "window length must be positive, got {window_length_s}"
            )));
        }
        if !stride_s.is_finite() || stride_s <= 0.0 {
            return Err(CoreError::InvalidWindowSpec(format!(
                "stride must be positive, got {stride_s}"
            )));
        }
        if stride_s >= window_length_s {
            return Err(CoreError::InvalidWindowSpec(format!(
                "stride {stride_s}s must be shorter than window {window_length_s}s"
            )));
        }
        Ok(Self {
            window_length_s,
            stride_s,
        })
    }

    /// Window length in seconds.
    pub fn window_length_s(&self) -> f64 {
        self.window_length_s
    }

    /// Overlap between consecutive windows in seconds.
    pub fn stride_s(&self) -> f64 {
        self.stride_s
    }

    /// Distance between consecutive window starts in seconds.
    pub fn step_s(&self) -> f64 {
        self.window_length_s - self.stride_s
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            window_length_s: DEFAULT_WINDOW_LENGTH_S,
            stride_s: DEFAULT_STRIDE_S,
        }
    }
}
