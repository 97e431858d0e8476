//! Async driver: the same state machine, waited on through tokio's reactor

use super::conn::Connection;
use super::state::{ConnectionStatus, PollingStatus};
use crate::conninfo::{resolve, ResolveContext};
use crate::{Error, Result};
use std::os::fd::{AsRawFd, RawFd};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::Instrument;

/// Borrowed descriptor registered with the reactor; the connection owns the socket
struct RawSocketFd(RawFd);

impl AsRawFd for RawSocketFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Connect with a conninfo string without blocking the runtime
///
/// Name resolution and file lookups still run synchronously inside the call.
///
/// # Examples
///
/// ```ignore
/// let conn = pgconnect::connect_async("host=localhost dbname=app").await?;
/// ```
pub async fn connect_async(conninfo: &str) -> Result<Connection> {
    let params = resolve(conninfo, &ResolveContext::from_process())?;
    let mut conn = Connection::start(params);
    conn.complete_async().await?;
    Ok(conn)
}

impl Connection {
    /// Drive the state machine to `Ok` or `Bad` on the tokio reactor
    ///
    /// Must be called from within a tokio runtime with IO and time enabled.
    pub async fn complete_async(&mut self) -> Result<()> {
        let span = tracing::info_span!(
            "connect",
            host = self.host().unwrap_or_default(),
            port = self.port(),
            dbname = self.db().unwrap_or_default(),
        );

        async {
            let deadline = self.deadline().map(tokio::time::Instant::from_std);
            let mut registered: Option<(u64, AsyncFd<RawSocketFd>)> = None;
            let mut poll = PollingStatus::Writing;

            loop {
                match poll {
                    PollingStatus::Ok => return Ok(()),
                    PollingStatus::Failed => return Err(self.async_failure()),
                    PollingStatus::Reading | PollingStatus::Writing => {}
                }
                if self.status() == ConnectionStatus::Bad {
                    return Err(self.async_failure());
                }

                let Some(fd) = self.socket() else {
                    poll = self.connect_poll();
                    continue;
                };

                // Failover and the negotiation fallback replace the socket
                let generation = self.socket_generation();
                if registered.as_ref().map(|(g, _)| *g) != Some(generation) {
                    drop(registered.take());
                    match AsyncFd::with_interest(
                        RawSocketFd(fd),
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        Ok(async_fd) => registered = Some((generation, async_fd)),
                        Err(e) => {
                            let err = Error::Socket(format!(
                                "could not register socket with reactor: {}",
                                e
                            ));
                            self.fail(err.clone());
                            return Err(err);
                        }
                    }
                }
                let Some((_, async_fd)) = registered.as_ref() else {
                    continue;
                };

                let ready = async {
                    match poll {
                        PollingStatus::Reading => async_fd
                            .readable()
                            .await
                            .map(|mut guard| guard.clear_ready()),
                        _ => async_fd
                            .writable()
                            .await
                            .map(|mut guard| guard.clear_ready()),
                    }
                };

                let waited = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, ready).await {
                        Ok(waited) => waited,
                        Err(_) => {
                            self.fail(Error::Timeout);
                            return Err(Error::Timeout);
                        }
                    },
                    None => ready.await,
                };

                if let Err(e) = waited {
                    let err = Error::Socket(format!("could not wait for socket: {}", e));
                    self.fail(err.clone());
                    return Err(err);
                }

                poll = self.connect_poll();
            }
        }
        .instrument(span)
        .await
    }

    fn async_failure(&self) -> Error {
        self.last_error()
            .cloned()
            .unwrap_or_else(|| Error::Connect(self.error_message().trim_end().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::CandidateAddress;
    use crate::conninfo::ConnectionParameters;

    fn params(conninfo: &str) -> ConnectionParameters {
        resolve(conninfo, &ResolveContext::new().with_os_user("alice")).unwrap()
    }

    #[tokio::test]
    async fn test_async_failure_reports_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = Connection::start_with_candidates(
            params("dbname=test"),
            vec![CandidateAddress::Unix(dir.path().join(".s.PGSQL.5432"))],
        );
        let err = conn.complete_async().await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
        assert_eq!(conn.status(), ConnectionStatus::Bad);
    }

    #[tokio::test]
    async fn test_async_timeout_forces_bad() {
        // Accepts the connection but never answers the startup message
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".s.PGSQL.5432");
        let _listener = std::os::unix::net::UnixListener::bind(&path).unwrap();

        let mut conn = Connection::start_with_candidates(
            params("dbname=test connect_timeout=1"),
            vec![CandidateAddress::Unix(path)],
        );
        let err = conn.complete_async().await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(conn.status(), ConnectionStatus::Bad);
        assert!(conn.error_message().contains("timeout expired"));
    }
}
