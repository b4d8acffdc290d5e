use thiserror::Error;

/// Failures talking to the backend service
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for BackendError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BackendError::Realtime(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),

    #[error("You must be logged in to upload files.")]
    AuthRequired,

    #[error("session {0} is invalid or has expired")]
    SessionInvalid(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{failed} upload(s) failed, {succeeded} succeeded")]
    PartialBatchFailure { succeeded: usize, failed: usize },
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
