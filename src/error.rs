//! Error types

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// The connection observed a transport-level failure and must be
    /// discarded. Obtain a new connection.
    #[error("bad connection: discard and reconnect")]
    BadConnection,

    /// Failure reported by the wire layer that does not poison the connection
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Invalid local argument; nothing was sent to the server
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Requested isolation level has no transaction parameter block
    #[error("unsupported isolation level: {0}")]
    UnsupportedIsolationLevel(String),

    /// Wrong number of positional arguments for a prepared statement
    #[error("statement expects {expected} parameters, got {actual}")]
    ParameterCount {
        /// Parameters declared by the prepared statement
        expected: usize,
        /// Arguments supplied by the caller
        actual: usize,
    },

    /// Invalid connection state transition
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },
}

impl Error {
    /// Whether this is the discard sentinel
    pub fn is_bad_connection(&self) -> bool {
        matches!(self, Error::BadConnection)
    }

    /// Wire error kind, if this error came from the wire layer
    pub fn wire_kind(&self) -> Option<WireErrorKind> {
        match self {
            Error::Wire(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Wire(WireError::from(e))
    }
}

/// Kind tag every wire failure carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorKind {
    /// Connection reset, broken pipe, socket failure, timeout
    Network,
    /// Server rejected the request (status vector with a gds code)
    Server,
    /// Malformed or unexpected response
    Protocol,
}

impl fmt::Display for WireErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

/// Error returned by a [`Wire`](crate::protocol::Wire) implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireError {
    /// Classification tag
    pub kind: WireErrorKind,
    /// Diagnostic text as reported
    pub message: String,
    /// Firebird gds (isc) error code, for server errors
    pub gds_code: Option<i32>,
    /// Legacy SQLCODE, for server errors
    pub sql_code: Option<i32>,
}

impl WireError {
    /// Network-level failure
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Network,
            message: message.into(),
            gds_code: None,
            sql_code: None,
        }
    }

    /// Server-side rejection
    pub fn server(message: impl Into<String>, gds_code: i32, sql_code: Option<i32>) -> Self {
        Self {
            kind: WireErrorKind::Server,
            message: message.into(),
            gds_code: Some(gds_code),
            sql_code,
        }
    }

    /// Malformed response
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: WireErrorKind::Protocol,
            message: message.into(),
            gds_code: None,
            sql_code: None,
        }
    }

    /// Round trip exceeded its deadline; the channel framing is unknown afterwards
    pub fn timed_out(limit: std::time::Duration) -> Self {
        Self::network(format!("round trip timed out after {:?}", limit))
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)?;
        if let Some(code) = self.gds_code {
            write!(f, " (gds {})", code)?;
        }
        if let Some(code) = self.sql_code {
            write!(f, " (sqlcode {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for WireError {}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                WireError::protocol(e.to_string())
            }
            _ => WireError::network(e.to_string()),
        }
    }
}
