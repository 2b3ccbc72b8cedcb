//! Server and session error types.

use crate::message::EncodeError;
use std::io;

/// Errors that end a server's serving call.
#[derive(Debug)]
pub enum ServerError {
    /// The listen address could not be parsed or resolved.
    InvalidAddress {
        addr: String,
        source: Option<io::Error>,
    },
    /// The listening socket could not be created or bound.
    Bind { addr: String, source: io::Error },
    /// A non-temporary accept failure.
    Accept(io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::InvalidAddress { addr, source: Some(e) } => {
                write!(f, "Invalid listen address '{}': {}", addr, e)
            }
            ServerError::InvalidAddress { addr, source: None } => {
                write!(f, "Invalid listen address '{}'", addr)
            }
            ServerError::Bind { addr, source } => {
                write!(f, "Failed to bind '{}': {}", addr, source)
            }
            ServerError::Accept(e) => write!(f, "Failed to accept connection: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::InvalidAddress { source, .. } => {
                source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
            }
            ServerError::Bind { source, .. } => Some(source),
            ServerError::Accept(e) => Some(e),
        }
    }
}

/// Errors local to a single session.
#[derive(Debug)]
pub enum SessionError {
    /// The session has been torn down; its queue no longer accepts messages.
    Closed,
    /// The outbound queue is at capacity (`try_put` only).
    QueueFull,
    /// Writing to the connection failed. Fatal to the session.
    Write(io::Error),
    /// A queued message could not be framed. Fatal to the session.
    Encode(EncodeError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Closed => write!(f, "Session closed"),
            SessionError::QueueFull => write!(f, "Outbound queue full"),
            SessionError::Write(e) => write!(f, "Write failed: {}", e),
            SessionError::Encode(e) => write!(f, "Encode failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Write(e) => Some(e),
            SessionError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        SessionError::Write(e)
    }
}

impl From<EncodeError> for SessionError {
    fn from(e: EncodeError) -> Self {
        SessionError::Encode(e)
    }
}
