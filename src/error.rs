//! Error types for snapshot replay operations.

use thiserror::Error;

/// Primary error type for replay operations.
#[derive(Error, Debug)]
pub enum ReplayError {
    // Storage errors
    #[error("Unable to open snapshot database '{path}': {reason}")]
    StorageUnavailable { path: String, reason: String },

    #[error("Corrupt snapshot record {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Snapshot database error: {0}")]
    Store(String),

    // Model and topology errors
    #[error("{0}")]
    Configuration(String),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // Settings file errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ReplayError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::Configuration(_)
                | Self::InvalidAddress(_)
                | Self::ConfigNotFound { .. }
                | Self::ConfigParse(_)
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::StorageUnavailable { .. } => Some("Check the snapshot database path"),
            Self::InvalidAddress(_) => Some("Use host[/prefix][:port], e.g. 192.168.0.10/24"),
            Self::ConfigNotFound { .. } => Some("Pass --config with an existing .toml or .yaml file"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using ReplayError.
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| ReplayError::Other(format!("{}: {e}", f().into())))
    }
}
