//! Error types for the proxy.

use thiserror::Error;

use crate::socks::ReplyCode;

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving proxy connections.
///
/// Errors are always local to one connection; the supervisor logs them and
/// moves on to the next client.
#[derive(Error, Debug)]
pub enum Error {
    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// A handshake packet did not parse for the current state
    #[error("malformed {0} message")]
    Malformed(&'static str),

    /// The peer closed the connection mid-handshake
    #[error("connection closed during handshake")]
    Closed,

    /// No acceptable authentication method, or credentials rejected
    #[error("authentication failed")]
    Authentication,

    /// The CONNECT request was rejected with a SOCKS5 reply code
    #[error("request rejected: {0}")]
    Rejected(ReplyCode),

    /// No resolver candidate could be bound and listened on
    #[error("bind failed for {0}")]
    Bind(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error indicates an authentication failure
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::Authentication)
    }
}
