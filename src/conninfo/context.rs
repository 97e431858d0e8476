//! Outside-world inputs to parameter resolution

use std::collections::HashMap;
use std::path::PathBuf;

/// Directory searched for `pg_service.conf` when `PGSYSCONFDIR` is not set
pub const DEFAULT_SYSCONFDIR: &str = "/usr/local/pgsql/etc";

/// Service file name inside the system configuration directory
pub const SERVICE_FILE_NAME: &str = "pg_service.conf";

/// Password file name inside the home directory
pub const PASSWORD_FILE_NAME: &str = ".pgpass";

/// Snapshot of everything the resolver reads besides the conninfo string
///
/// Production code captures the live process with [`ResolveContext::from_process`];
/// tests build one from scratch so they never depend on the host environment.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    env: HashMap<String, String>,
    service_file: Option<PathBuf>,
    password_file: Option<PathBuf>,
    os_user: Option<String>,
}

impl ResolveContext {
    /// Empty context: no environment, no OS user, default file locations
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current process environment and user
    pub fn from_process() -> Self {
        let env = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        let user = whoami::username();
        Self {
            env,
            service_file: None,
            password_file: None,
            os_user: (!user.is_empty()).then_some(user),
        }
    }

    /// Set an environment variable in the snapshot
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the service file location
    pub fn with_service_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.service_file = Some(path.into());
        self
    }

    /// Override the password file location
    pub fn with_password_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.password_file = Some(path.into());
        self
    }

    /// Set the OS user name used as the last `user` fallback
    pub fn with_os_user(mut self, user: impl Into<String>) -> Self {
        self.os_user = Some(user.into());
        self
    }

    /// Environment variable from the snapshot
    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// OS user name, if known
    pub fn os_user(&self) -> Option<&str> {
        self.os_user.as_deref()
    }

    /// `$PGSYSCONFDIR/pg_service.conf`, else the compiled-in directory
    pub fn service_file(&self) -> PathBuf {
        if let Some(path) = &self.service_file {
            return path.clone();
        }
        let dir = self.var("PGSYSCONFDIR").unwrap_or(DEFAULT_SYSCONFDIR);
        PathBuf::from(dir).join(SERVICE_FILE_NAME)
    }

    /// `$PGPASSFILE`, else `$HOME/.pgpass`; `None` when neither is known
    pub fn password_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.password_file {
            return Some(path.clone());
        }
        if let Some(path) = self.var("PGPASSFILE") {
            return Some(PathBuf::from(path));
        }
        self.var("HOME")
            .map(|home| PathBuf::from(home).join(PASSWORD_FILE_NAME))
    }
}
