//! Error types for log endpoints and their configuration.

use std::path::PathBuf;

/// Errors raised while starting a log file.
#[derive(Debug, thiserror::Error)]
pub enum LogFileError {
    /// `start` was called while a file is already open.
    #[error("log file already open")]
    AlreadyOpen,

    /// Every candidate name for this second is taken.
    #[error("unable to create a log file in {dir} without overriding another file")]
    NameExhausted {
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// The wall clock could not be turned into a local timestamp.
    #[error("unable to format log file timestamp")]
    InvalidTimestamp,

    /// Opening the chosen file failed.
    #[error("unable to open log file {path}: {source}")]
    Open {
        /// Path that could not be opened.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read '{path}'")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type alias for log file operations.
pub type Result<T> = std::result::Result<T, LogFileError>;
