//! Error types for text generation.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a generation service.
///
/// Content that arrives successfully but cannot be interpreted is not an
/// error at this layer; callers absorb it with their own defaults.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(String),

    /// Request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Service answered with a non-success status.
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Stream broke off after it was opened.
    #[error("stream error: {0}")]
    Stream(String),

    /// Response envelope could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// No credentials available for the provider.
    #[error("credentials not found: {0}")]
    CredentialsNotFound(String),
}

impl Error {
    /// Whether this error came from the transport rather than local setup.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Error::CredentialsNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Request(err.to_string())
        }
    }
}
