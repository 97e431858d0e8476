//! Connection establishment
//!
//! This module handles:
//! * Candidate address resolution (TCP by address or name, Unix sockets)
//! * The non-blocking startup state machine and its input/output buffers
//! * SSL negotiation and the rustls transport upgrade
//! * Blocking and tokio drivers, reset, and cancel requests

mod address;
mod async_driver;
mod buffer;
mod cancel;
mod conn;
mod driver;
mod session;
mod state;
mod tls;
mod transport;

pub use address::{
    default_socket_dir, resolve_candidates, unix_socket_path, CandidateAddress,
    DEFAULT_SOCKET_DIRS,
};
pub use async_driver::connect_async;
pub use buffer::{Fill, InBuffer};
pub use cancel::{CancelError, CancelToken};
pub use conn::Connection;
pub use driver::{connect, connect_with};
pub use session::{
    default_notice_processor, NoticeProcessor, ReaderOutcome, ResultReader, Session,
    StartupResultReader,
};
pub use state::{ConnectionStatus, Direction, PollingStatus};
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::Transport;
