//! Connection health state machine and error classification

use crate::error::{Error, Result, WireErrorKind};

/// Connection state
///
/// `Poisoned` is terminal except for `Closed`: once a transport-level failure
/// has been observed the connection never becomes healthy again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake and attach in progress
    Connecting,

    /// Attached and usable
    Healthy,

    /// Transport failed; every call fails fast
    Poisoned,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Connecting, Healthy)
                | (Connecting, Poisoned)
                | (Healthy, Poisoned)
                | (Connecting, Closed)
                | (Healthy, Closed)
                | (Poisoned, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether calls may touch the wire
    pub fn is_healthy(&self) -> bool {
        *self == ConnectionState::Healthy
    }

    /// Classify an error before it is returned to the caller.
    ///
    /// A network-kind wire error poisons the connection and is replaced by
    /// [`Error::BadConnection`]. Everything else passes through unchanged and
    /// leaves the state alone.
    pub fn classify(&mut self, err: Error) -> Error {
        match err {
            Error::Wire(e) if e.kind == WireErrorKind::Network => {
                if self.can_transition_to(ConnectionState::Poisoned) {
                    tracing::warn!(error = %e, "network failure, connection poisoned");
                    *self = ConnectionState::Poisoned;
                    crate::metrics::counters::connection_poisoned();
                }
                Error::BadConnection
            }
            other => other,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Poisoned => write!(f, "poisoned"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
