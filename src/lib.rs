//! pgconnect: Postgres connection establishment
//!
//! Resolves connection parameters the way libpq does (conninfo string,
//! service file, `PG*` environment, password file, built-in defaults) and
//! drives the startup handshake as a non-blocking state machine: candidate
//! address failover, optional SSL negotiation, the startup message,
//! authentication, and the messages up to the first ReadyForQuery.
//!
//! # Blocking
//!
//! ```ignore
//! let conn = pgconnect::connect("host=localhost dbname=app user=app")?;
//! println!("server {:?}", conn.parameter_status("server_version"));
//! conn.finish();
//! ```
//!
//! # Polling
//!
//! ```ignore
//! use pgconnect::{Connection, PollingStatus};
//!
//! let mut conn = Connection::start(params);
//! loop {
//!     match conn.connect_poll() {
//!         PollingStatus::Reading => wait_readable(conn.socket().unwrap()),
//!         PollingStatus::Writing => wait_writable(conn.socket().unwrap()),
//!         PollingStatus::Ok => break,
//!         PollingStatus::Failed => panic!("{}", conn.error_message()),
//!     }
//! }
//! ```
//!
//! # Async
//!
//! ```ignore
//! let conn = pgconnect::connect_async("host=localhost dbname=app").await?;
//! let cancel = conn.cancel_token();
//! ```

pub mod auth;
pub mod connection;
pub mod conninfo;
pub mod error;
pub mod metrics;
pub mod protocol;

pub use connection::{
    connect, connect_async, connect_with, CancelToken, Connection, ConnectionStatus,
    PollingStatus,
};
pub use conninfo::{ConnectionParameters, ConnectionParametersBuilder, ResolveContext};
pub use error::{Error, Result};
