//! Blocking driver over the non-blocking state machine

use super::conn::Connection;
use super::state::{ConnectionStatus, PollingStatus};
use crate::conninfo::{resolve, ConnectionParameters, ResolveContext};
use crate::{Error, Result};
use std::time::{Duration, Instant};

/// Smallest timeout actually applied, in seconds
const MIN_CONNECT_TIMEOUT_SECS: u64 = 2;

/// Deadline implied by `connect_timeout`
///
/// Missing, zero or non-numeric values mean no deadline. Positive values
/// below two seconds are raised to two.
pub(crate) fn deadline(params: &ConnectionParameters, start: Instant) -> Option<Instant> {
    let secs: u64 = params.connect_timeout()?.trim().parse().ok()?;
    if secs == 0 {
        return None;
    }
    Some(start + Duration::from_secs(secs.max(MIN_CONNECT_TIMEOUT_SECS)))
}

/// Connect with a conninfo string, blocking until the connection is usable
///
/// The process environment, service file and password file are consulted.
///
/// # Examples
///
/// ```ignore
/// let conn = pgconnect::connect("host=localhost dbname=app user=app")?;
/// println!("backend pid {:?}", conn.backend_pid());
/// conn.finish();
/// ```
pub fn connect(conninfo: &str) -> Result<Connection> {
    let params = resolve(conninfo, &ResolveContext::from_process())?;
    connect_with(params)
}

/// Connect with already resolved parameters, blocking until done
pub fn connect_with(params: ConnectionParameters) -> Result<Connection> {
    let mut conn = Connection::start(params);
    conn.complete()?;
    Ok(conn)
}

impl Connection {
    /// Drive the state machine to `Ok` or `Bad`, blocking on the socket
    ///
    /// On failure the handle stays in `Bad` with its error message, and the
    /// error is also returned.
    pub fn complete(&mut self) -> Result<()> {
        let span = tracing::info_span!(
            "connect",
            host = self.host().unwrap_or_default(),
            port = self.port(),
            dbname = self.db().unwrap_or_default(),
        );
        let _enter = span.enter();

        let deadline = self.deadline();
        let mut poll = PollingStatus::Writing;

        loop {
            match poll {
                PollingStatus::Ok => return Ok(()),
                PollingStatus::Failed => return Err(self.failure()),
                PollingStatus::Reading | PollingStatus::Writing => {}
            }
            if self.status() == ConnectionStatus::Bad {
                return Err(self.failure());
            }

            let Some(fd) = self.socket() else {
                // A fresh attempt opens its socket on the next poll
                poll = self.connect_poll();
                continue;
            };

            if let Err(e) = wait(fd, poll, deadline) {
                self.fail(e.clone());
                return Err(e);
            }
            poll = self.connect_poll();
        }
    }

    /// Blocking reset: reconnect with the same parameters
    pub fn reset(&mut self) -> Result<()> {
        self.reset_start()?;
        self.complete()
    }

    fn failure(&self) -> Error {
        self.last_error().cloned().unwrap_or_else(|| {
            Error::Connect(self.error_message().trim_end().to_string())
        })
    }
}

/// Block until `fd` is ready for `direction` or the deadline passes
fn wait(fd: std::os::fd::RawFd, direction: PollingStatus, deadline: Option<Instant>) -> Result<()> {
    let events = match direction {
        PollingStatus::Reading => libc::POLLIN,
        _ => libc::POLLOUT,
    };

    loop {
        let timeout_ms: libc::c_int = match deadline {
            None => -1,
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(Error::Timeout);
                }
                // Round up so a sub-millisecond remainder does not spin
                left.as_millis().saturating_add(1).min(libc::c_int::MAX as u128) as libc::c_int
            }
        };

        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        // SAFETY: one valid pollfd for the duration of the call
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };

        match rc {
            0 => return Err(Error::Timeout),
            n if n > 0 => return Ok(()),
            _ => {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Socket(format!("select() failed: {}", err)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    fn params(conninfo: &str) -> ConnectionParameters {
        resolve(conninfo, &ResolveContext::new().with_os_user("alice")).unwrap()
    }

    #[test]
    fn test_deadline_rules() {
        let now = Instant::now();
        assert_eq!(deadline(&params(""), now), None);
        assert_eq!(deadline(&params("connect_timeout=0"), now), None);
        assert_eq!(deadline(&params("connect_timeout=soon"), now), None);
        assert_eq!(
            deadline(&params("connect_timeout=1"), now),
            Some(now + Duration::from_secs(2))
        );
        assert_eq!(
            deadline(&params("connect_timeout=10"), now),
            Some(now + Duration::from_secs(10))
        );
    }

    #[test]
    fn test_wait_readable_and_timeout() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();

        // Nothing to read yet: an already-passed deadline times out
        let past = Instant::now();
        assert!(matches!(
            wait(ours.as_raw_fd(), PollingStatus::Reading, Some(past)),
            Err(Error::Timeout)
        ));

        std::io::Write::write_all(&mut theirs, b"x").unwrap();
        wait(ours.as_raw_fd(), PollingStatus::Reading, None).unwrap();
        wait(ours.as_raw_fd(), PollingStatus::Writing, None).unwrap();
    }

    #[test]
    fn test_connect_with_failure_returns_error() {
        let err = connect_with(params("host=/nonexistent/socket/dir")).unwrap_err();
        assert!(matches!(err, Error::Connect(ref m) if m.contains("Unix domain socket")));
    }
}
