//! Error types for the workbench core
//!
//! Library code returns [`CoChatError`]; the CLI layers `anyhow` context on
//! top. No variant is fatal to the process; every failure is recoverable
//! at the panel or store level and the user can retry.

use thiserror::Error;

/// Workbench-level errors
#[derive(Debug, Error)]
pub enum CoChatError {
    #[error("panel {0} has no model bound")]
    NoModelBound(usize),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {0}")]
    Http(u16),

    #[error("malformed stream: {0}")]
    MalformedStream(String),

    #[error("no models available: {0}")]
    NoModels(String),

    #[error("voice not available: {0}")]
    VoiceUnavailable(String),

    #[error("TTS returned empty audio")]
    EmptyAudio,

    #[error("store error: {0}")]
    Store(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl CoChatError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoChatError::Cancelled)
    }
}

impl From<reqwest::Error> for CoChatError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => CoChatError::Http(status.as_u16()),
            None => CoChatError::Transport(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoChatError {
    fn from(err: rusqlite::Error) -> Self {
        CoChatError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoChatError>;
