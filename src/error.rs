//! Error types for vmtrigger.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriggerError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Audio format errors
    #[error("Unsupported channel count: {channels} (expected 1 or 2)")]
    UnsupportedChannels { channels: u16 },

    #[error("Unsupported sample width: {bits} bits (only 16-bit PCM is supported)")]
    UnsupportedSampleWidth { bits: u16 },

    #[error("Audio format error: {message}")]
    AudioFormat { message: String },

    // Detection workers
    #[error("Detector worker '{worker}' panicked")]
    WorkerPanicked { worker: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TriggerError {
    /// Shorthand for [`TriggerError::ConfigInvalidValue`].
    pub fn invalid(key: &str, message: impl Into<String>) -> Self {
        TriggerError::ConfigInvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// True for errors that are raised before any audio is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TriggerError::ConfigInvalidValue { .. }
                | TriggerError::ConfigParse(_)
                | TriggerError::UnsupportedChannels { .. }
                | TriggerError::UnsupportedSampleWidth { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TriggerError>;
