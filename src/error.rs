//! Error types for connection establishment

use std::io;
use thiserror::Error;

/// Main error type for pgconnect operations
///
/// Every variant carries the human-readable text that is also accumulated in
/// the connection handle's error message.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed connection info string
    #[error("{0}")]
    Parse(String),

    /// Keyword not present in the option table
    #[error("invalid connection option \"{0}\"")]
    UnknownOption(String),

    /// Service file could not be read or is malformed
    #[error("{0}")]
    ServiceFile(String),

    /// Host, address or port could not be turned into candidate addresses
    #[error("could not translate address: {0}")]
    AddressResolution(String),

    /// Socket-level failure (create, configure, read, write)
    #[error("{0}")]
    Socket(String),

    /// Connection to a candidate address failed
    #[error("{0}")]
    Connect(String),

    /// Server sent something that does not fit the protocol
    #[error("{0}")]
    Protocol(String),

    /// Authentication exchange failed or is unsupported
    #[error("{0}")]
    Authentication(String),

    /// Server reported an error message
    #[error("{0}")]
    ServerReported(String),

    /// Allocation failure while growing a buffer
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Synchronous or async driver deadline passed
    #[error("timeout expired")]
    Timeout,

    /// TLS configuration error
    #[error("{0}")]
    Config(String),

    /// Operation called in the wrong lifecycle state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Cancel request could not be delivered
    #[error("{0}")]
    Cancel(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Socket(e.to_string())
    }
}

impl Error {
    /// Whether the candidate loop may move on to the next address after this error
    pub fn is_retryable_connect(&self) -> bool {
        matches!(self, Error::Connect(_))
    }

    /// Static category label used for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse",
            Error::UnknownOption(_) => "unknown_option",
            Error::ServiceFile(_) => "service_file",
            Error::AddressResolution(_) => "address_resolution",
            Error::Socket(_) => "socket",
            Error::Connect(_) => "connect",
            Error::Protocol(_) => "protocol",
            Error::Authentication(_) => "authentication",
            Error::ServerReported(_) => "server",
            Error::OutOfMemory(_) => "out_of_memory",
            Error::Timeout => "timeout",
            Error::Config(_) => "config",
            Error::InvalidState { .. } => "invalid_state",
            Error::Cancel(_) => "cancel",
        }
    }
}
