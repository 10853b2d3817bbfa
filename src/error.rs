//! Error types

use crate::auth::ScramError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// mongo-wire error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection string does not use the `mongodb` scheme
    #[error("unknown connection string scheme: {0}")]
    UnknownScheme(String),

    /// Resolving, dialing or TLS-upgrading a candidate failed
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Candidate host
        host: String,
        /// Shared port
        port: u16,
        /// Underlying cause
        #[source]
        source: io::Error,
    },

    /// Authentication protocol failure
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Credentials were rejected for the target database
    #[error("access to database {database} denied for user {user}")]
    NoPermission {
        /// Authentication database
        database: String,
        /// Rejected user
        user: String,
    },

    /// Malformed or unexpected server reply
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Every candidate was tried and none satisfied the read preference
    #[error("no suitable candidate among {attempted} host(s) for read preference '{read_preference}'")]
    NoSuitableCandidate {
        /// Read preference that could not be satisfied
        read_preference: String,
        /// Number of candidates that were tried
        attempted: usize,
    },

    /// Invalid configuration or connection string
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error on an established transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Send or receive exceeded the socket timeout
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection mid-message
    #[error("connection closed")]
    ConnectionClosed,

    /// No socket is attached to the connection
    #[error("not connected")]
    NotConnected,

    /// Invalid state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },
}

impl Error {
    /// Short, stable label for metrics and log fields
    pub fn category(&self) -> &'static str {
        match self {
            Error::UnknownScheme(_) | Error::Config(_) => "config",
            Error::Connect { .. } => "connect",
            Error::Authentication(_) | Error::NoPermission { .. } => "auth",
            Error::Protocol(_) => "protocol",
            Error::NoSuitableCandidate { .. } => "selection",
            Error::Io(_) | Error::ConnectionClosed => "io",
            Error::Timeout(_) => "timeout",
            Error::NotConnected | Error::InvalidState { .. } => "state",
        }
    }

    /// Whether a fresh connect attempt could plausibly succeed
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. } | Error::Timeout(_) | Error::ConnectionClosed
        )
    }

    pub(crate) fn connect(host: &str, port: u16, source: io::Error) -> Self {
        Error::Connect {
            host: host.to_string(),
            port,
            source,
        }
    }
}

impl From<ScramError> for Error {
    fn from(e: ScramError) -> Self {
        Error::Authentication(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(Error::UnknownScheme("http".into()).category(), "config");
        assert_eq!(
            Error::connect("db", 27017, io::ErrorKind::ConnectionRefused.into()).category(),
            "connect"
        );
        assert_eq!(
            Error::NoPermission {
                database: "admin".into(),
                user: "bob".into()
            }
            .category(),
            "auth"
        );
        assert_eq!(Error::ConnectionClosed.category(), "io");
    }

    #[test]
    fn test_retriable() {
        assert!(Error::Timeout(Duration::from_millis(5)).is_retriable());
        assert!(Error::connect("db", 1, io::ErrorKind::TimedOut.into()).is_retriable());
        assert!(!Error::Protocol("bad".into()).is_retriable());
        assert!(!Error::NotConnected.is_retriable());
    }

    #[test]
    fn test_no_permission_message() {
        let err = Error::NoPermission {
            database: "reports".into(),
            user: "alice".into(),
        };
        assert_eq!(
            err.to_string(),
            "access to database reports denied for user alice"
        );
    }

    #[test]
    fn test_scram_error_converts_to_authentication() {
        let err: Error = ScramError::InvalidServerProof("mismatch".into()).into();
        assert!(matches!(err, Error::Authentication(_)));
    }
}
