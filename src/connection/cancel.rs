//! Cancel requests for a running query
//!
//! A [`CancelToken`] copies out the address and backend key of an established
//! connection. [`CancelToken::cancel`] opens a fresh socket, sends the 16-byte
//! CancelRequest packet and closes it. It does not allocate, does not log and
//! restores `errno` before returning, so it may be called from a signal
//! handler.

use super::address::CandidateAddress;
use crate::protocol::encode_cancel_request;
use socket2::{Domain, SockAddr, Socket, Type};
use std::fmt::{self, Write as _};
use std::io;

const ERROR_BUFFER_SIZE: usize = 256;

/// Address and key needed to cancel requests on one connection
#[derive(Clone)]
pub struct CancelToken {
    addr: SockAddr,
    domain: Domain,
    process_id: i32,
    secret_key: i32,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

impl CancelToken {
    /// Token for the server at `address`
    pub fn new(address: &CandidateAddress, process_id: i32, secret_key: i32) -> io::Result<Self> {
        Ok(Self {
            addr: address.sock_addr()?,
            domain: address.domain(),
            process_id,
            secret_key,
        })
    }

    /// Backend process id the request targets
    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    /// Ask the server to cancel whatever the backend is running
    ///
    /// Success means the packet was written, not that anything was
    /// cancelled; the original request still completes through its own
    /// connection.
    pub fn cancel(&self) -> Result<(), CancelError> {
        let saved = errno::get();
        let result = self.send_request();
        errno::set(saved);
        result
    }

    fn send_request(&self) -> Result<(), CancelError> {
        let socket = Socket::new(self.domain, Type::STREAM, None)
            .map_err(|e| CancelError::new("socket()", &e))?;

        loop {
            match socket.connect(&self.addr) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EISCONN) => break,
                Err(e) => return Err(CancelError::new("connect()", &e)),
            }
        }

        let packet = encode_cancel_request(self.process_id, self.secret_key);
        let mut sent = 0;
        while sent < packet.len() {
            match socket.send(&packet[sent..]) {
                Ok(0) => return Err(CancelError::closed()),
                Ok(n) => sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CancelError::new("send()", &e)),
            }
        }
        Ok(())
    }
}

/// Failure to deliver a cancel request
///
/// The text lives in a fixed inline buffer.
#[derive(Clone, Copy)]
pub struct CancelError {
    buf: [u8; ERROR_BUFFER_SIZE],
    len: usize,
    code: Option<i32>,
}

impl CancelError {
    fn new(call: &str, err: &io::Error) -> Self {
        let mut e = Self::empty();
        e.code = err.raw_os_error();
        // io::Error's Display allocates; format the errno number instead
        let _ = match e.code {
            Some(code) => write!(e, "cancel request: {} failed: errno {}", call, code),
            None => write!(e, "cancel request: {} failed", call),
        };
        e
    }

    fn closed() -> Self {
        let mut e = Self::empty();
        let _ = e.write_str("cancel request: send() failed: connection closed");
        e
    }

    fn empty() -> Self {
        Self {
            buf: [0; ERROR_BUFFER_SIZE],
            len: 0,
            code: None,
        }
    }

    /// Error text
    pub fn message(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("cancel request failed")
    }

    /// OS error number, if the failure came from a system call
    pub fn raw_os_error(&self) -> Option<i32> {
        self.code
    }
}

/// Truncates instead of failing once the buffer is full
impl fmt::Write for CancelError {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = ERROR_BUFFER_SIZE - self.len;
        let mut take = s.len().min(room);
        while !s.is_char_boundary(take) {
            take -= 1;
        }
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

impl fmt::Debug for CancelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelError")
            .field("message", &self.message())
            .field("code", &self.code)
            .finish()
    }
}

impl fmt::Display for CancelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CancelError {}

impl From<CancelError> for crate::Error {
    fn from(e: CancelError) -> Self {
        crate::Error::Cancel(e.message().to_string())
    }
}

mod errno {
    use libc::c_int;

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn location() -> *mut c_int {
        // SAFETY: always returns a valid pointer to the calling thread's errno
        unsafe { libc::__errno_location() }
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    fn location() -> *mut c_int {
        // SAFETY: always returns a valid pointer to the calling thread's errno
        unsafe { libc::__error() }
    }

    pub(super) fn get() -> c_int {
        // SAFETY: thread-local errno, see `location`
        unsafe { *location() }
    }

    pub(super) fn set(value: c_int) {
        // SAFETY: thread-local errno, see `location`
        unsafe { *location() = value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_cancel_packet() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut packet = Vec::new();
            stream.read_to_end(&mut packet).unwrap();
            packet
        });

        let token = CancelToken::new(&CandidateAddress::Inet(addr), 4242, 99).unwrap();
        assert_eq!(token.process_id(), 4242);
        token.cancel().unwrap();

        let packet = server.join().unwrap();
        assert_eq!(packet.len(), 16);
        assert_eq!(&packet[0..4], &16i32.to_be_bytes());
        assert_eq!(&packet[4..8], &80877102i32.to_be_bytes());
        assert_eq!(&packet[8..12], &4242i32.to_be_bytes());
        assert_eq!(&packet[12..16], &99i32.to_be_bytes());
    }

    #[test]
    fn test_cancel_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".s.PGSQL.5432");
        let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut packet = [0u8; 16];
            stream.read_exact(&mut packet).unwrap();
            packet
        });

        CancelToken::new(&CandidateAddress::Unix(path), 7, -1)
            .unwrap()
            .cancel()
            .unwrap();

        let packet = server.join().unwrap();
        assert_eq!(&packet[8..12], &7i32.to_be_bytes());
        assert_eq!(&packet[12..16], &(-1i32).to_be_bytes());
    }

    #[test]
    fn test_refused_reports_errno_and_restores_it() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let token = CancelToken::new(
            &CandidateAddress::Inet(([127, 0, 0, 1], port).into()),
            1,
            2,
        )
        .unwrap();

        errno::set(libc::EAGAIN);
        let err = token.cancel().unwrap_err();
        assert_eq!(errno::get(), libc::EAGAIN);

        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
        assert!(err.message().starts_with("cancel request: connect() failed: errno "));
        assert_eq!(err.to_string(), err.message());

        let converted: crate::Error = err.into();
        assert!(matches!(converted, crate::Error::Cancel(_)));
    }

    #[test]
    fn test_long_message_truncates() {
        let mut e = CancelError::empty();
        for _ in 0..100 {
            let _ = e.write_str("0123456789");
        }
        assert_eq!(e.message().len(), ERROR_BUFFER_SIZE);
    }
}
