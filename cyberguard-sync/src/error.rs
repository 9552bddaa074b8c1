//! Error types shared by every module of the sync client

/// Errors raised by the sync client.
///
/// None of these is fatal: transport errors feed the reconnect policy,
/// decode errors drop a frame and HTTP errors degrade to stale state.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Backend returned {status} for {path}")]
    Status { status: u16, path: String },
    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Push channel error: {0}")]
    Transport(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True when the backend answered but refused the request
    pub fn is_status(&self) -> bool {
        matches!(self, SyncError::Status { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
