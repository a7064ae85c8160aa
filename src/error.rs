//! Client error taxonomy.
//!
//! [`TransportError`] covers everything that goes wrong before a
//! well-formed envelope is in hand. [`ClientError`] adds `ok:false`
//! replies and client-side validation, which never reach the network.

use thiserror::Error;

/// The network call itself failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS failure, timeout, broken body stream.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP error {0}")]
    Status(u16),

    /// The reply was not a `{ok, data, message}` document.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Any failure a page controller has to surface to the user.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered `ok:false`.
    #[error("{message}")]
    Application { action: String, message: String },

    /// Rejected before any request was sent.
    #[error("{0}")]
    Validation(String),
}

impl ClientError {
    pub fn application(action: &str, message: Option<String>, fallback: &str) -> Self {
        ClientError::Application {
            action: action.to_string(),
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| fallback.to_string()),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
