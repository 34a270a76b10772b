//! Core error types.

use thiserror::Error;

/// Errors raised while constructing core values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Window length or stride is out of range.
    #[error("invalid window spec: {0}")]
    InvalidWindowSpec(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
