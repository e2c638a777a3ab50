//! Error types for Beacon wake detection

use thiserror::Error;

/// Result type alias for wake detection operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the wake detector
///
/// Only configuration and source failures are fatal. Everything that goes
/// wrong while evaluating frames degrades to "no activation".
#[derive(Debug, Error)]
pub enum Error {
    /// Threshold or timing values out of range
    #[error("configuration error: {0}")]
    Config(String),

    /// Frame source could not be opened or started
    #[error("frame source unavailable: {0}")]
    SourceUnavailable(String),

    /// Audio device, stream or file error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
