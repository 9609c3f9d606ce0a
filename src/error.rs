//! Bridge error types
//!
//! Every failure in the bridge falls into one of four categories, and the
//! category decides the recovery policy:
//!
//! - [`Error::Network`]: connection or read failure (RTSP or ONVIF).
//!   Transient; supervisors retry with backoff.
//! - [`Error::Auth`]: the camera rejected our credentials. Permanent until
//!   a reconnect is explicitly requested.
//! - [`Error::Protocol`]: malformed or unexpected response. Transient unless
//!   it repeats, at which point the channel is reported degraded.
//! - [`Error::CommandRejected`]: the camera refused a PTZ command (for
//!   example an unsupported profile). Surfaced to the submitter, not retried.

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge error
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Connection or read failure, retried with backoff
    #[error("network error: {0}")]
    Network(String),

    /// Credentials rejected by the camera, never retried automatically
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Malformed or unexpected response from the camera
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Camera refused a PTZ command
    #[error("command rejected: {0}")]
    CommandRejected(String),
}

/// Failure category, used in [`ConnectionState::Error`] and for retry policy
///
/// [`ConnectionState::Error`]: crate::status::ConnectionState::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Auth,
    Protocol,
    CommandRejected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::Protocol => "protocol",
            ErrorKind::CommandRejected => "command-rejected",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::CommandRejected(_) => ErrorKind::CommandRejected,
        }
    }

    /// Whether a supervisor may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Protocol(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Network(e.to_string())
    }
}
