//! Connection state machine

use crate::{Error, Result};

/// Lifecycle status of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No socket; the next step opens one for the current candidate
    Init,

    /// Socket open, connect not yet issued
    SocketOpen,

    /// Non-blocking connect in progress
    Connecting,

    /// SSLRequest sent, awaiting the answer or running the TLS handshake
    TlsNegotiate,

    /// Startup message queued, flushing it
    StartupSent,

    /// Waiting for an authentication request
    AuthWait,

    /// Sending a credential response
    AuthExchange,

    /// Authenticated, reading up to ReadyForQuery
    AuthOk,

    /// Connection established
    Ok,

    /// Connection failed
    Bad,
}

impl ConnectionStatus {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;

        matches!(
            (self, next),
            (Init, SocketOpen)
                | (SocketOpen, Connecting)
                | (SocketOpen, TlsNegotiate)
                | (SocketOpen, StartupSent)
                | (SocketOpen, Init)
                | (Connecting, TlsNegotiate)
                | (Connecting, StartupSent)
                | (Connecting, Init)
                | (TlsNegotiate, StartupSent)
                | (TlsNegotiate, Init)
                | (StartupSent, AuthWait)
                | (AuthWait, AuthExchange)
                | (AuthWait, AuthOk)
                | (AuthExchange, AuthWait)
                | (AuthOk, Ok)
                | (Ok, Init)
                | (Bad, Init)
                | (_, Bad)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionStatus) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Whether this is `Ok` or `Bad`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Bad)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::SocketOpen => write!(f, "socket_open"),
            Self::Connecting => write!(f, "connecting"),
            Self::TlsNegotiate => write!(f, "tls_negotiate"),
            Self::StartupSent => write!(f, "startup_sent"),
            Self::AuthWait => write!(f, "auth_wait"),
            Self::AuthExchange => write!(f, "auth_exchange"),
            Self::AuthOk => write!(f, "auth_ok"),
            Self::Ok => write!(f, "ok"),
            Self::Bad => write!(f, "bad"),
        }
    }
}

/// Socket readiness the caller must wait for before polling again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Wait until the socket is readable
    Reading,
    /// Wait until the socket is writable
    Writing,
}

/// Result of one [`connect_poll`](super::Connection::connect_poll) call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// Wait for readability, then poll again
    Reading,
    /// Wait for writability, then poll again
    Writing,
    /// Connection established
    Ok,
    /// Connection failed; see the handle's error message
    Failed,
}

impl From<Direction> for PollingStatus {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Reading => PollingStatus::Reading,
            Direction::Writing => PollingStatus::Writing,
        }
    }
}

/// Outcome of one state handler
#[derive(Debug)]
pub(crate) enum Step {
    /// Move to another state and keep stepping
    Advance(ConnectionStatus),
    /// Stop until the socket is ready in this direction
    Suspend(Direction),
    /// Move to `Bad` with this error
    Fail(Error),
    /// Startup finished
    Done,
}
