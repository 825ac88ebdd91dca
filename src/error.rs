//! Error types for legacy-postgres.

use thiserror::Error;

/// Result type for legacy-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for legacy-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Library misuse, unsupported authentication, or a protocol violation
    /// (e.g. an unrecognized packet tag from the server).
    #[error("Interface error: {0}")]
    Interface(String),

    /// I/O error on the socket.
    ///
    /// Interrupted system calls are retried internally and never surface
    /// through this variant.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend closed the connection (a receive returned zero bytes).
    #[error("Connection to backend closed")]
    ConnectionClosed,

    /// Server-reported error from an `E` packet.
    #[error("PostgreSQL error: {0}")]
    Database(String),

    /// Caller-side programming error (malformed parameter shape, scroll
    /// target outside the result set).
    #[error("Programming error: {0}")]
    Programming(String),

    /// Field decode error (e.g. an unknown boolean literal).
    #[error("Decode error: {0}")]
    Decode(String),

    /// `wait_for_notify` deadline expired before the server sent anything.
    #[error("Timed out waiting for notification")]
    Timeout,
}

impl Error {
    /// Returns true if the error indicates the connection is broken and
    /// cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ConnectionClosed)
    }

    /// Get the server message if this is a database error.
    pub fn database_message(&self) -> Option<&str> {
        match self {
            Error::Database(msg) => Some(msg),
            _ => None,
        }
    }
}
