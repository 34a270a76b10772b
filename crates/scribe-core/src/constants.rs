//! Package-level constants.

/// Current version of scribe (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sample rate of every audio sequence handed to the pipeline (mono).
pub const SAMPLE_RATE: u32 = 16_000;
