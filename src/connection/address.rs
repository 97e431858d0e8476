//! Candidate address resolution
//!
//! `hostaddr` is used as-is without a name lookup, otherwise `host` goes
//! through the system resolver, otherwise a Unix domain socket path is built
//! from the socket directory and the port.

use crate::conninfo::ConnectionParameters;
use crate::{Error, Result};
use socket2::{Domain, SockAddr};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

/// Socket directories tried, in order, when none is configured
pub const DEFAULT_SOCKET_DIRS: &[&str] = &["/run/postgresql", "/var/run/postgresql", "/tmp"];

/// One endpoint to try
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateAddress {
    /// TCP/IP endpoint
    Inet(SocketAddr),
    /// Unix domain socket file
    Unix(PathBuf),
}

impl CandidateAddress {
    /// Socket domain for this address
    pub fn domain(&self) -> Domain {
        match self {
            Self::Inet(addr) => Domain::for_address(*addr),
            Self::Unix(_) => Domain::UNIX,
        }
    }

    /// Raw socket address
    pub fn sock_addr(&self) -> io::Result<SockAddr> {
        match self {
            Self::Inet(addr) => Ok(SockAddr::from(*addr)),
            Self::Unix(path) => SockAddr::unix(path),
        }
    }

    /// Whether this is a Unix domain socket
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Unix(_))
    }
}

impl fmt::Display for CandidateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{}", addr),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// `<dir>/.s.PGSQL.<port>`
pub fn unix_socket_path(dir: &Path, port: u16) -> PathBuf {
    dir.join(format!(".s.PGSQL.{}", port))
}

/// First existing default socket directory, else `/tmp`
pub fn default_socket_dir() -> &'static Path {
    DEFAULT_SOCKET_DIRS
        .iter()
        .map(Path::new)
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| Path::new("/tmp"))
}

fn parse_port(port: &str) -> Result<u16> {
    port.trim()
        .parse::<u16>()
        .ok()
        .filter(|&p| p != 0)
        .ok_or_else(|| Error::AddressResolution(format!("invalid port number: \"{}\"", port)))
}

/// Turn resolved parameters into an ordered, non-empty candidate list
pub fn resolve_candidates(params: &ConnectionParameters) -> Result<Vec<CandidateAddress>> {
    let port = parse_port(params.port())?;

    if let Some(hostaddr) = params.hostaddr() {
        let ip: IpAddr = hostaddr.parse().map_err(|_| {
            Error::AddressResolution(format!("invalid host address \"{}\"", hostaddr))
        })?;
        return Ok(vec![CandidateAddress::Inet(SocketAddr::new(ip, port))]);
    }

    if let Some(host) = params.host() {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::AddressResolution(format!("{}: {}", host, e)))?
            .map(CandidateAddress::Inet)
            .collect();
        if addrs.is_empty() {
            return Err(Error::AddressResolution(format!(
                "host name \"{}\" has no addresses",
                host
            )));
        }
        tracing::debug!(host, count = addrs.len(), "resolved host name");
        return Ok(addrs);
    }

    let dir = match params.unix_socket() {
        Some(dir) => Path::new(dir),
        None => default_socket_dir(),
    };
    Ok(vec![CandidateAddress::Unix(unix_socket_path(dir, port))])
}
