//! Error types for Eventalyzer.

use thiserror::Error;

/// Main error type for Eventalyzer operations.
#[derive(Error, Debug)]
pub enum EventalyzerError {
    /// Window settings that cannot describe a sliding window
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tick driver could not be started
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Eventalyzer operations.
pub type Result<T> = std::result::Result<T, EventalyzerError>;
