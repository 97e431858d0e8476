//! TLS configuration for the negotiated transport upgrade
//!
//! The configuration is only built when the server answers an SSLRequest
//! with `S`. Trust roots come from `sslrootcert` when set, otherwise from the
//! platform store, otherwise from the bundled Mozilla roots.

use crate::conninfo::ConnectionParameters;
use crate::{Error, Result};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pemfile::Item;
use rustls_pki_types::ServerName;
use std::fs;
use std::sync::Arc;

/// TLS configuration for one connection handle
///
/// # Examples
///
/// ```ignore
/// use pgconnect::connection::TlsConfig;
///
/// // Platform roots
/// let tls = TlsConfig::builder().build()?;
///
/// // Private CA
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/ssl/private-ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// Path to CA certificate file (None = platform or bundled roots)
    ca_cert_path: Option<String>,
    /// Compiled rustls ClientConfig
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Create a new TLS configuration builder.
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// Configuration implied by the connection parameters (`sslrootcert`)
    pub fn from_params(params: &ConnectionParameters) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(path) = params.sslrootcert() {
            builder = builder.ca_cert_path(path);
        }
        builder.build()
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// CA file in use, if any
    pub fn ca_cert_path(&self) -> Option<&str> {
        self.ca_cert_path.as_deref()
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for TLS configuration.
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
}

impl TlsConfigBuilder {
    /// Set the path to a custom CA certificate file (PEM format).
    ///
    /// If not set, platform root certificates are used, falling back to the
    /// bundled Mozilla roots when the platform store is empty.
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Build the TLS configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the CA file cannot be read or holds no
    /// certificates.
    pub fn build(self) -> Result<TlsConfig> {
        let root_store = match &self.ca_cert_path {
            Some(ca_path) => load_custom_ca(ca_path)?,
            None => platform_roots(),
        };

        let client_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            client_config,
        })
    }
}

fn platform_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    let (added, _ignored) = store.add_parsable_certificates(result.certs);
    if !result.errors.is_empty() {
        tracing::debug!(errors = result.errors.len(), "some platform certificates could not be loaded");
    }

    if added == 0 {
        tracing::debug!("no platform root certificates, using bundled roots");
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}

/// Load a custom CA certificate from a PEM file.
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Config(format!(
            "could not read root certificate file \"{}\": {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "could not parse root certificate file \"{}\"",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "no certificates found in \"{}\"",
            ca_path
        )));
    }

    Ok(root_store)
}

/// Server name for SNI and certificate verification
///
/// Uses `host`, else `hostaddr`. A trailing dot is dropped. IP addresses are
/// accepted and verified against the certificate's IP SANs.
pub fn parse_server_name(params: &ConnectionParameters) -> Result<ServerName<'static>> {
    let hostname = params
        .host()
        .or_else(|| params.hostaddr())
        .ok_or_else(|| Error::Config("TLS requires a host name or address".into()))?;
    let hostname = hostname.trim_end_matches('.');

    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("invalid host name for TLS: \"{}\"", hostname)))
}
