//! Resolved connection parameters

use super::context::ResolveContext;
use super::options::{OptionValues, ENVIRONMENT_OPTIONS};
use super::parser::quote_value;
use super::passfile::password_from_file;
use crate::protocol::constants::DEFAULT_PORT_STR;
use crate::Result;
use std::path::Path;

/// Immutable, fully resolved parameter set for one connection attempt
///
/// `host` and `unix_socket` are never both set: a host given as an absolute
/// path is moved to `unix_socket`.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParameters {
    host: Option<String>,
    hostaddr: Option<String>,
    port: String,
    unix_socket: Option<String>,
    dbname: Option<String>,
    user: Option<String>,
    password: String,
    options: String,
    tty: String,
    connect_timeout: Option<String>,
    require_ssl: bool,
    allow_ssl: bool,
    sslrootcert: Option<String>,
    service: Option<String>,
    authtype: String,
    backend_settings: Vec<(String, String)>,
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_owned)
}

/// Blank values are kept (they block later fallbacks) but read as unset
fn set_str(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.starts_with('1'))
}

impl ConnectionParameters {
    /// Build from a fully resolved working copy
    pub(crate) fn from_values(values: &OptionValues, ctx: &ResolveContext) -> Self {
        let mut host = owned(values.get("host"));
        let mut unix_socket = None;
        if host.as_deref().is_some_and(|h| Path::new(h).is_absolute()) {
            unix_socket = host.take();
        }

        let port = values
            .get("port")
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PORT_STR)
            .to_string();
        let dbname = owned(values.get("dbname"));
        let user = owned(values.get("user"));

        let mut password = values.get("password").unwrap_or_default().to_string();
        if password.is_empty() {
            password = ctx
                .password_file()
                .and_then(|path| {
                    // A socket directory is matched by its path
                    password_from_file(
                        &path,
                        set_str(&host).or(set_str(&unix_socket)),
                        Some(&port),
                        set_str(&dbname),
                        set_str(&user),
                    )
                })
                .unwrap_or_default();
        }

        let backend_settings = ENVIRONMENT_OPTIONS
            .iter()
            .filter_map(|opt| {
                let value = ctx.var(opt.envvar)?;
                (!value.eq_ignore_ascii_case("default"))
                    .then(|| (opt.setting.to_string(), value.to_string()))
            })
            .collect();

        Self {
            host,
            hostaddr: owned(values.get("hostaddr")),
            port,
            unix_socket,
            dbname,
            user,
            password,
            options: values.get("options").unwrap_or_default().to_string(),
            tty: values.get("tty").unwrap_or_default().to_string(),
            connect_timeout: owned(values.get("connect_timeout")),
            require_ssl: flag(values.get("requiressl")),
            allow_ssl: flag(values.get("allowssl")),
            sslrootcert: owned(values.get("sslrootcert")),
            service: owned(values.get("service")),
            authtype: values.get("authtype").unwrap_or_default().to_string(),
            backend_settings,
        }
    }

    /// Start a builder (programmatic construction)
    pub fn builder() -> ConnectionParametersBuilder {
        ConnectionParametersBuilder::default()
    }

    /// Host name to resolve, if any
    pub fn host(&self) -> Option<&str> {
        set_str(&self.host)
    }

    /// Numeric host address, if any
    pub fn hostaddr(&self) -> Option<&str> {
        set_str(&self.hostaddr)
    }

    /// Port, as given (validated by the address resolver)
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Unix socket directory, if any
    pub fn unix_socket(&self) -> Option<&str> {
        set_str(&self.unix_socket)
    }

    /// Database name
    pub fn dbname(&self) -> Option<&str> {
        set_str(&self.dbname)
    }

    /// User name
    pub fn user(&self) -> Option<&str> {
        set_str(&self.user)
    }

    /// Password (empty when none was found anywhere)
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Extra backend command-line options
    pub fn options(&self) -> &str {
        &self.options
    }

    /// Legacy debug tty (ignored by servers)
    pub fn tty(&self) -> &str {
        &self.tty
    }

    /// Raw connect timeout in seconds
    pub fn connect_timeout(&self) -> Option<&str> {
        set_str(&self.connect_timeout)
    }

    /// Fail unless the transport ends up encrypted
    pub fn require_ssl(&self) -> bool {
        self.require_ssl
    }

    /// Try TLS negotiation before startup
    pub fn allow_ssl(&self) -> bool {
        self.allow_ssl
    }

    /// PEM file with trusted root certificates
    pub fn sslrootcert(&self) -> Option<&str> {
        set_str(&self.sslrootcert)
    }

    /// Service name used during resolution
    pub fn service(&self) -> Option<&str> {
        set_str(&self.service)
    }

    /// Legacy authtype option
    pub fn authtype(&self) -> &str {
        &self.authtype
    }

    /// Session settings forwarded from the environment (`datestyle`, `timezone`, ...)
    pub fn backend_settings(&self) -> &[(String, String)] {
        &self.backend_settings
    }

    /// Value by conninfo keyword, exactly as resolved (blank values included)
    ///
    /// `host` reports the Unix socket directory when no host name is set.
    pub fn get(&self, keyword: &str) -> Option<&str> {
        let bool_str = |b: bool| if b { "1" } else { "0" };
        match keyword {
            "host" => self.host.as_deref().or(self.unix_socket.as_deref()),
            "hostaddr" => self.hostaddr.as_deref(),
            "port" => Some(self.port()),
            "dbname" => self.dbname.as_deref(),
            "user" => self.user.as_deref(),
            "password" => Some(self.password()),
            "options" => Some(self.options()),
            "tty" => Some(self.tty()),
            "connect_timeout" => self.connect_timeout.as_deref(),
            "requiressl" => Some(bool_str(self.require_ssl)),
            "allowssl" => Some(bool_str(self.allow_ssl)),
            "sslrootcert" => self.sslrootcert.as_deref(),
            "service" => self.service.as_deref(),
            "authtype" => Some(self.authtype()),
            _ => None,
        }
    }

    /// Canonical conninfo form: every set option, single-quoted
    ///
    /// Resolving this string in the same context yields equal parameters.
    pub fn to_conninfo(&self) -> String {
        super::options::CONN_OPTIONS
            .iter()
            .filter_map(|opt| {
                let value = self.get(opt.keyword)?;
                Some(format!("{}={}", opt.keyword, quote_value(value)))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("hostaddr", &self.hostaddr)
            .field("port", &self.port)
            .field("unix_socket", &self.unix_socket)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("options", &self.options)
            .field("connect_timeout", &self.connect_timeout)
            .field("require_ssl", &self.require_ssl)
            .field("allow_ssl", &self.allow_ssl)
            .field("service", &self.service)
            .field("backend_settings", &self.backend_settings)
            .finish()
    }
}

/// Builder for programmatic connection parameters
///
/// Values given here take the place of conninfo values; everything left
/// unset goes through the usual service/environment/default fallbacks.
#[derive(Debug, Clone, Default)]
pub struct ConnectionParametersBuilder {
    explicit: Vec<(&'static str, String)>,
}

impl ConnectionParametersBuilder {
    fn with(mut self, keyword: &'static str, value: impl Into<String>) -> Self {
        self.explicit.retain(|(k, _)| *k != keyword);
        self.explicit.push((keyword, value.into()));
        self
    }

    /// Host name, or an absolute Unix socket directory
    pub fn host(self, host: impl Into<String>) -> Self {
        self.with("host", host)
    }

    /// Numeric host address
    pub fn hostaddr(self, addr: impl Into<String>) -> Self {
        self.with("hostaddr", addr)
    }

    /// Port
    pub fn port(self, port: impl Into<String>) -> Self {
        self.with("port", port)
    }

    /// Backend command-line options
    pub fn options(self, options: impl Into<String>) -> Self {
        self.with("options", options)
    }

    /// Debug tty
    pub fn tty(self, tty: impl Into<String>) -> Self {
        self.with("tty", tty)
    }

    /// Database name
    pub fn dbname(self, dbname: impl Into<String>) -> Self {
        self.with("dbname", dbname)
    }

    /// User name
    pub fn user(self, user: impl Into<String>) -> Self {
        self.with("user", user)
    }

    /// Password
    pub fn password(self, password: impl Into<String>) -> Self {
        self.with("password", password)
    }

    /// Connect timeout in seconds
    pub fn connect_timeout(self, seconds: u64) -> Self {
        self.with("connect_timeout", seconds.to_string())
    }

    /// Require an encrypted transport
    pub fn require_ssl(self, require: bool) -> Self {
        self.with("requiressl", if require { "1" } else { "0" })
    }

    /// Allow TLS negotiation
    pub fn allow_ssl(self, allow: bool) -> Self {
        self.with("allowssl", if allow { "1" } else { "0" })
    }

    /// Root certificate file
    pub fn sslrootcert(self, path: impl Into<String>) -> Self {
        self.with("sslrootcert", path)
    }

    /// Service name
    pub fn service(self, service: impl Into<String>) -> Self {
        self.with("service", service)
    }

    /// Resolve against `ctx`
    pub fn build(self, ctx: &ResolveContext) -> Result<ConnectionParameters> {
        let mut values = OptionValues::new();
        for (keyword, value) in self.explicit {
            values.set(keyword, value)?;
        }
        super::resolve_values(values, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conninfo::resolve;

    #[test]
    fn test_absolute_host_becomes_socket() {
        let ctx = ResolveContext::new().with_os_user("alice");
        let params = resolve("host=/var/run/pg", &ctx).unwrap();
        assert_eq!(params.host(), None);
        assert_eq!(params.unix_socket(), Some("/var/run/pg"));
        assert_eq!(params.get("host"), Some("/var/run/pg"));
    }

    #[test]
    fn test_flags() {
        let ctx = ResolveContext::new().with_os_user("alice");
        let params = resolve("", &ctx).unwrap();
        assert!(params.allow_ssl());
        assert!(!params.require_ssl());

        let params = resolve("requiressl=1 allowssl=0", &ctx).unwrap();
        assert!(!params.allow_ssl());
        assert!(params.require_ssl());
    }

    #[test]
    fn test_backend_settings_skip_default() {
        let ctx = ResolveContext::new()
            .with_os_user("alice")
            .with_env("PGDATESTYLE", "ISO, DMY")
            .with_env("PGTZ", "Default")
            .with_env("PGGEQO", "on");
        let params = resolve("", &ctx).unwrap();
        assert_eq!(
            params.backend_settings(),
            &[
                ("datestyle".to_string(), "ISO, DMY".to_string()),
                ("geqo".to_string(), "on".to_string())
            ]
        );
    }

    #[test]
    fn test_to_conninfo_round_trip() {
        let ctx = ResolveContext::new().with_os_user("alice");
        let params = resolve(
            r"host=db.internal port=6432 dbname='my db' password='it\'s' options='-c geqo=off'",
            &ctx,
        )
        .unwrap();
        let again = resolve(&params.to_conninfo(), &ctx).unwrap();
        assert_eq!(params, again);
    }

    #[test]
    fn test_builder_matches_conninfo() {
        let ctx = ResolveContext::new().with_os_user("alice");
        let built = ConnectionParameters::builder()
            .host("localhost")
            .port("5433")
            .dbname("test")
            .user("bob")
            .build(&ctx)
            .unwrap();
        let parsed = resolve("host=localhost port=5433 dbname=test user=bob", &ctx).unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_debug_redacts_password() {
        let ctx = ResolveContext::new().with_os_user("alice");
        let params = resolve("password=hunter2", &ctx).unwrap();
        assert!(!format!("{:?}", params).contains("hunter2"));
    }
}
