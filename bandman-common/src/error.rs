//! Common error types for BandManager

use thiserror::Error;

/// Common result type for BandManager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the BandManager crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unexpected protocol line
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server answered the login handshake with a failure token
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Server refused a request (`notok`, `alreadyin`, `error`)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// No line arrived within the idle timeout
    #[error("Timed out waiting for peer")]
    Timeout,

    /// Peer closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,
}

impl From<tokio_util::codec::LinesCodecError> for Error {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                Error::Protocol("line exceeds maximum length".to_string())
            }
            tokio_util::codec::LinesCodecError::Io(e) => Error::Io(e),
        }
    }
}
