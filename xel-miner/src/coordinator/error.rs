use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// No response: connection, timeout, or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The coordinator answered with a non-success status.
    #[error("HTTP error with status {status}: {message}")]
    Http { status: u16, message: String },

    /// A response arrived but could not be understood.
    #[error("invalid response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    /// True for failures where no usable response was received.
    pub fn is_transport(&self) -> bool {
        !matches!(self, CoordinatorError::Decode(_))
    }
}

impl From<serde_json::Error> for CoordinatorError {
    fn from(e: serde_json::Error) -> Self {
        CoordinatorError::Decode(e.to_string())
    }
}
