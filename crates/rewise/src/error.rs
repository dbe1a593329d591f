use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewiseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Errors raised by the connection channel.
///
/// Clonable because a single connection attempt is shared by every caller
/// that awaits it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The handshake failed before the channel opened.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The channel did not open within the configured window.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),

    /// A send was attempted while the channel was not open.
    #[error("Channel is not ready for sending")]
    NotReady,

    /// Writing a frame to the open channel failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// The outbound payload could not be encoded as JSON.
    #[error("Failed to serialize payload: {0}")]
    Serialize(String),

    /// The channel was disconnected while the attempt was in flight.
    #[error("Connection attempt cancelled by disconnect")]
    Cancelled,
}

impl ChannelError {
    /// Returns true for failures that happened while opening the channel.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(self, ChannelError::Connect(_) | ChannelError::Timeout(_))
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        ChannelError::Serialize(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A processor instance handles exactly one run.
    #[error("Task already started on this processor")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, RewiseError>;
