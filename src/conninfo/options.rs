//! Recognized connection options
//!
//! `CONN_OPTIONS` is read-only template data. Every resolution works on its
//! own `OptionValues`, an owned slot per table entry.

use crate::{Error, Result};

/// How an option should be presented in a connect dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionDisplay {
    /// Show as-is
    Normal,
    /// Hide the value (passwords)
    Password,
    /// Debug option, normally not shown
    Debug,
}

impl OptionDisplay {
    /// Single-character form used by `PQconndefaults`-style listings
    pub fn as_char(&self) -> &'static str {
        match self {
            Self::Normal => "",
            Self::Password => "*",
            Self::Debug => "D",
        }
    }
}

/// One entry of the option table
#[derive(Debug, Clone, Copy)]
pub struct ConnOption {
    /// Keyword used in conninfo strings
    pub keyword: &'static str,
    /// Environment variable consulted when the keyword is not given
    pub envvar: Option<&'static str>,
    /// Compiled-in default
    pub compiled: Option<&'static str>,
    /// Label for connect dialogs
    pub label: &'static str,
    /// Display hint
    pub display: OptionDisplay,
    /// Field size for connect dialogs
    pub display_size: usize,
}

/// A session setting forwarded from the environment in the startup packet
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentOption {
    /// Environment variable
    pub envvar: &'static str,
    /// Backend setting name
    pub setting: &'static str,
}

const fn opt(
    keyword: &'static str,
    envvar: Option<&'static str>,
    compiled: Option<&'static str>,
    label: &'static str,
    display: OptionDisplay,
    display_size: usize,
) -> ConnOption {
    ConnOption {
        keyword,
        envvar,
        compiled,
        label,
        display,
        display_size,
    }
}

/// The option table. `user` must precede `dbname`: the dbname fallback reads it.
pub static CONN_OPTIONS: &[ConnOption] = &[
    opt("authtype", Some("PGAUTHTYPE"), Some(""), "Database-Authtype", OptionDisplay::Debug, 20),
    opt("service", Some("PGSERVICE"), None, "Database-Service", OptionDisplay::Normal, 20),
    opt("user", Some("PGUSER"), None, "Database-User", OptionDisplay::Normal, 20),
    opt("password", Some("PGPASSWORD"), Some(""), "Database-Password", OptionDisplay::Password, 20),
    opt("connect_timeout", Some("PGCONNECT_TIMEOUT"), None, "Connect-timeout", OptionDisplay::Normal, 10),
    opt("dbname", Some("PGDATABASE"), None, "Database-Name", OptionDisplay::Normal, 20),
    opt("host", Some("PGHOST"), None, "Database-Host", OptionDisplay::Normal, 40),
    opt("hostaddr", Some("PGHOSTADDR"), None, "Database-Host-IP-Address", OptionDisplay::Normal, 45),
    opt("port", Some("PGPORT"), Some(crate::protocol::constants::DEFAULT_PORT_STR), "Database-Port", OptionDisplay::Normal, 6),
    opt("tty", Some("PGTTY"), Some(""), "Backend-Debug-TTY", OptionDisplay::Debug, 40),
    opt("options", Some("PGOPTIONS"), Some(""), "Backend-Debug-Options", OptionDisplay::Debug, 40),
    opt("requiressl", Some("PGREQUIRESSL"), Some("0"), "Require-SSL", OptionDisplay::Normal, 1),
    opt("allowssl", Some("PGALLOWSSL"), Some("1"), "Allow-SSL", OptionDisplay::Normal, 1),
    opt("sslrootcert", Some("PGSSLROOTCERT"), None, "SSL-Root-Certificate", OptionDisplay::Normal, 64),
];

/// Environment-backed session settings sent in the startup packet
pub static ENVIRONMENT_OPTIONS: &[EnvironmentOption] = &[
    // common user-interface settings
    EnvironmentOption {
        envvar: "PGDATESTYLE",
        setting: "datestyle",
    },
    EnvironmentOption {
        envvar: "PGTZ",
        setting: "timezone",
    },
    EnvironmentOption {
        envvar: "PGCLIENTENCODING",
        setting: "client_encoding",
    },
    // internal performance-related settings
    EnvironmentOption {
        envvar: "PGGEQO",
        setting: "geqo",
    },
];

/// Look up a keyword in the option table
pub fn find_option(keyword: &str) -> Option<&'static ConnOption> {
    CONN_OPTIONS.iter().find(|o| o.keyword == keyword)
}

fn index_of(keyword: &str) -> Option<usize> {
    CONN_OPTIONS.iter().position(|o| o.keyword == keyword)
}

/// Per-resolution working copy of the option table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionValues {
    values: Vec<Option<String>>,
}

impl Default for OptionValues {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionValues {
    /// All options unset
    pub fn new() -> Self {
        Self {
            values: vec![None; CONN_OPTIONS.len()],
        }
    }

    /// Current value of `keyword`, if set
    pub fn get(&self, keyword: &str) -> Option<&str> {
        index_of(keyword).and_then(|i| self.values[i].as_deref())
    }

    /// Whether `keyword` has a value
    pub fn is_set(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    /// Store a value, replacing any previous one
    pub fn set(&mut self, keyword: &str, value: impl Into<String>) -> Result<()> {
        let idx = index_of(keyword).ok_or_else(|| Error::UnknownOption(keyword.to_string()))?;
        self.values[idx] = Some(value.into());
        Ok(())
    }

    /// Store a value only if none is present yet
    pub fn set_if_unset(&mut self, keyword: &str, value: impl Into<String>) -> Result<()> {
        let idx = index_of(keyword).ok_or_else(|| Error::UnknownOption(keyword.to_string()))?;
        if self.values[idx].is_none() {
            self.values[idx] = Some(value.into());
        }
        Ok(())
    }

    /// Iterate table entries with their current values
    pub fn iter(&self) -> impl Iterator<Item = (&'static ConnOption, Option<&str>)> + '_ {
        CONN_OPTIONS
            .iter()
            .zip(self.values.iter())
            .map(|(o, v)| (o, v.as_deref()))
    }
}
