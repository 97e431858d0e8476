//! Transport abstraction (plain socket vs TLS over the same socket)
//!
//! Both variants are non-blocking. The TLS handshake is stepped by
//! [`Transport::continue_handshake`], which reports the direction to wait
//! for instead of blocking.

use super::state::Direction;
use crate::{Error, Result};
use rustls::{ClientConfig, ClientConnection, StreamOwned};
use rustls_pki_types::ServerName;
use sha2::Digest;
use socket2::Socket;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

/// Connected socket, plain or TLS-encrypted
pub enum Transport {
    /// Plain socket (TCP or Unix domain)
    Plain(Socket),
    /// TLS session over a TCP socket
    Tls(Box<StreamOwned<ClientConnection, Socket>>),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Plain(_) => f.write_str("Transport::Plain(Socket)"),
            Transport::Tls(_) => f.write_str("Transport::Tls(StreamOwned)"),
        }
    }
}

impl Transport {
    /// Underlying socket
    pub fn socket(&self) -> &Socket {
        match self {
            Transport::Plain(socket) => socket,
            Transport::Tls(stream) => &stream.sock,
        }
    }

    /// Whether TLS is active
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }

    /// Wrap a plain socket in a client TLS session; the handshake has not run yet
    pub fn start_tls(self, config: Arc<ClientConfig>, server_name: ServerName<'static>) -> Result<Self> {
        match self {
            Transport::Plain(socket) => {
                let conn = ClientConnection::new(config, server_name)
                    .map_err(|e| Error::Config(format!("could not create SSL context: {}", e)))?;
                Ok(Transport::Tls(Box::new(StreamOwned::new(conn, socket))))
            }
            Transport::Tls(_) => Err(Error::Config(
                "transport is already TLS-encrypted".into(),
            )),
        }
    }

    /// Drive the TLS handshake as far as the socket allows
    ///
    /// Returns `None` once the handshake is complete, or the direction to wait
    /// for before calling again.
    pub fn continue_handshake(&mut self) -> io::Result<Option<Direction>> {
        let Transport::Tls(stream) = self else {
            return Ok(None);
        };
        let StreamOwned { conn, sock } = &mut **stream;

        while conn.is_handshaking() {
            match conn.complete_io(sock) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Some(if conn.wants_write() {
                        Direction::Writing
                    } else {
                        Direction::Reading
                    }));
                }
                Err(e) => return Err(e),
            }
        }

        while conn.wants_write() {
            match conn.write_tls(sock) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Some(Direction::Writing));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    /// `tls-server-end-point` channel binding data: SHA-256 of the server's
    /// DER-encoded certificate. `None` for plain transports.
    pub fn channel_binding_data(&self) -> Option<Vec<u8>> {
        match self {
            Transport::Plain(_) => None,
            Transport::Tls(stream) => {
                let certs = stream.conn.peer_certificates()?;
                let server_cert = certs.first()?;
                Some(sha2::Sha256::digest(server_cert.as_ref()).to_vec())
            }
        }
    }
}

/// Reads decrypted bytes; a TLS peer that closes without `close_notify`
/// reads as end of stream.
impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(socket) => socket.read(buf),
            Transport::Tls(stream) => match stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(0),
                other => other,
            },
        }
    }
}

/// Writes go straight to the socket, or into the TLS session until flushed.
impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(socket) => socket.write(buf),
            Transport::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(_) => Ok(()),
            Transport::Tls(stream) => stream.flush(),
        }
    }
}

impl AsRawFd for Transport {
    fn as_raw_fd(&self) -> RawFd {
        self.socket().as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;

    fn plain_pair() -> (Transport, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        (Transport::Plain(Socket::from(std::os::fd::OwnedFd::from(ours))), theirs)
    }

    #[test]
    fn test_plain_read_write() {
        let (mut transport, mut peer) = plain_pair();
        assert!(!transport.is_tls());
        assert!(transport.as_raw_fd() >= 0);

        assert_eq!(transport.write(b"ping").unwrap(), 4);
        transport.flush().unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        let mut buf = [0u8; 8];
        let err = transport.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        peer.write_all(b"pong").unwrap();
        assert_eq!(transport.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"pong");
    }

    #[test]
    fn test_plain_has_no_channel_binding() {
        let (mut transport, _peer) = plain_pair();
        assert_eq!(transport.channel_binding_data(), None);
        assert_eq!(transport.continue_handshake().unwrap(), None);
    }

    #[test]
    fn test_tls_handshake_waits_for_server() {
        let (transport, _peer) = plain_pair();
        let config = super::super::tls::TlsConfig::builder().build().unwrap();
        let name = || ServerName::try_from("db.example.com".to_string()).unwrap();

        let mut tls = transport.start_tls(config.client_config(), name()).unwrap();
        assert!(tls.is_tls());
        // ClientHello goes out, then the handshake needs the server's answer
        assert_eq!(tls.continue_handshake().unwrap(), Some(Direction::Reading));
        assert!(tls.start_tls(config.client_config(), name()).is_err());
    }
}
