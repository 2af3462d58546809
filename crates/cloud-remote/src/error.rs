use crate::item::ItemId;
use thiserror::Error;

/// Errors raised while talking to a remote content provider.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad credentials, or the provider rejected the session.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network, redirect or status failure while talking to the provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with something that could not be classified.
    #[error("provider format error: {0}")]
    ProviderFormat(String),

    /// The provider does not know the requested identifier.
    #[error("remote item not found: {0}")]
    NotFound(ItemId),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("request timed out: {}", err))
        } else if err.is_decode() {
            Error::ProviderFormat(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ProviderFormat(err.to_string())
    }
}

/// Result type for cloud-remote operations.
pub type Result<T> = std::result::Result<T, Error>;
