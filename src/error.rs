//! # Error Types
//!
//! Custom error types for GNSS Logger using `thiserror`.
//!
//! Transport and frame errors are absorbed by the flow that sees them and only
//! show up in counters and warnings. Storage and configuration errors end the
//! run.

use thiserror::Error;

/// Main error type for GNSS Logger
#[derive(Debug, Error)]
pub enum GnssLoggerError {
    /// Receiver or correction-source connectivity loss
    #[error("Transport error: {0}")]
    Transport(String),

    /// Checksum or length failure on a single frame
    #[error("Frame corruption: {0}")]
    FrameCorruption(String),

    /// Log file write, flush or sync failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid settings detected at startup
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed text record (correlation row, leap-second entry)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration file parsing errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GnssLoggerError {
    /// Whether this error must end the run
    ///
    /// Lossless logging is the core guarantee, so storage failures are fatal.
    /// Configuration problems are only ever raised at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Configuration(_) | Self::Config(_)
        )
    }

    /// Wrap an I/O failure on a log file as a storage error
    pub fn storage(context: &str, err: std::io::Error) -> Self {
        Self::Storage(format!("{}: {}", context, err))
    }
}

/// Result type alias for GNSS Logger
pub type Result<T> = std::result::Result<T, GnssLoggerError>;
