//! Connection parameter resolution
//!
//! Precedence for each option, highest first:
//! 1. the conninfo string (or builder value)
//! 2. the `[service]` section of the service file, when a service is named
//! 3. the option's environment variable
//! 4. the compiled-in default
//!
//! `user` then falls back to the OS user, `dbname` to `user`. An empty
//! password is looked up in the password file.

mod context;
mod options;
mod params;
mod parser;
mod passfile;
mod service;

pub use context::ResolveContext;
pub use options::{
    find_option, ConnOption, EnvironmentOption, OptionDisplay, OptionValues, CONN_OPTIONS,
    ENVIRONMENT_OPTIONS,
};
pub use params::{ConnectionParameters, ConnectionParametersBuilder};
pub use parser::{parse_conninfo, quote_value};
pub use passfile::password_from_file;
pub use service::apply_service;

use crate::Result;

/// Resolve a conninfo string into connection parameters
pub fn resolve(conninfo: &str, ctx: &ResolveContext) -> Result<ConnectionParameters> {
    let mut values = OptionValues::new();
    for (keyword, value) in parse_conninfo(conninfo)? {
        values.set(&keyword, value)?;
    }
    resolve_values(values, ctx)
}

pub(crate) fn resolve_values(
    mut values: OptionValues,
    ctx: &ResolveContext,
) -> Result<ConnectionParameters> {
    apply_fallbacks(&mut values, ctx)?;
    Ok(ConnectionParameters::from_values(&values, ctx))
}

/// Service file, environment, compiled defaults, then the user/dbname fallbacks
fn apply_fallbacks(values: &mut OptionValues, ctx: &ResolveContext) -> Result<()> {
    let service = values
        .get("service")
        .or_else(|| ctx.var("PGSERVICE"))
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    if let Some(service) = service {
        apply_service(values, &service, &ctx.service_file())?;
    }

    for option in CONN_OPTIONS {
        if values.is_set(option.keyword) {
            continue;
        }

        if let Some(value) = option.envvar.and_then(|var| ctx.var(var)) {
            values.set(option.keyword, value)?;
            continue;
        }

        if let Some(compiled) = option.compiled {
            values.set(option.keyword, compiled)?;
            continue;
        }

        match option.keyword {
            "user" => {
                if let Some(user) = ctx.os_user() {
                    values.set("user", user)?;
                }
            }
            "dbname" => {
                if let Some(user) = values.get("user").map(str::to_owned) {
                    values.set("dbname", user)?;
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// One row of [`defaults`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDefault {
    /// Option keyword
    pub keyword: &'static str,
    /// Environment variable, if any
    pub envvar: Option<&'static str>,
    /// Compiled-in default, if any
    pub compiled: Option<&'static str>,
    /// Value an empty conninfo string would resolve to
    pub value: Option<String>,
    /// Label for connect dialogs
    pub label: &'static str,
    /// Display hint
    pub display: OptionDisplay,
    /// Field size for connect dialogs
    pub display_size: usize,
}

/// Every recognized option with the value an empty conninfo would give it
pub fn defaults(ctx: &ResolveContext) -> Result<Vec<OptionDefault>> {
    let mut values = OptionValues::new();
    apply_fallbacks(&mut values, ctx)?;
    Ok(values
        .iter()
        .map(|(option, value)| OptionDefault {
            keyword: option.keyword,
            envvar: option.envvar,
            compiled: option.compiled,
            value: value.map(str::to_owned),
            label: option.label,
            display: option.display,
            display_size: option.display_size,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::NamedTempFile;

    fn ctx() -> ResolveContext {
        ResolveContext::new().with_os_user("osuser")
    }

    #[test]
    fn test_precedence_conninfo_over_env() {
        let ctx = ctx().with_env("PGHOST", "envhost").with_env("PGPORT", "7000");
        let params = resolve("host=explicit", &ctx).unwrap();
        assert_eq!(params.host(), Some("explicit"));
        assert_eq!(params.port(), "7000");
    }

    #[test]
    fn test_compiled_defaults() {
        let params = resolve("", &ctx()).unwrap();
        assert_eq!(params.port(), "5432");
        assert_eq!(params.password(), "");
        assert_eq!(params.options(), "");
        assert_eq!(params.host(), None);
    }

    #[test]
    fn test_user_and_dbname_fallbacks() {
        let params = resolve("", &ctx()).unwrap();
        assert_eq!(params.user(), Some("osuser"));
        assert_eq!(params.dbname(), Some("osuser"));

        let params = resolve("user=bob", &ctx()).unwrap();
        assert_eq!(params.dbname(), Some("bob"));

        let params = resolve("", &ctx().with_env("PGUSER", "carol")).unwrap();
        assert_eq!(params.dbname(), Some("carol"));
    }

    #[test]
    fn test_unknown_option() {
        let err = resolve("host=x colour=blue", &ctx()).unwrap_err();
        assert!(matches!(err, Error::UnknownOption(ref k) if k == "colour"));
    }

    #[test]
    fn test_password_from_env_without_file() {
        let ctx = ctx()
            .with_env("PGPASSWORD", "x")
            .with_password_file("/nonexistent/.pgpass");
        let params = resolve("host=localhost port=5432 dbname=test user=alice", &ctx).unwrap();
        assert_eq!(params.password(), "x");
    }

    #[test]
    fn test_password_from_wildcard_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"*:*:*:*:secret\n").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let ctx = ctx().with_password_file(file.path());
        let params = resolve("host=localhost dbname=test user=alice", &ctx).unwrap();
        assert_eq!(params.password(), "secret");
    }

    #[test]
    fn test_password_file_matches_socket_directory() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"/var/run/pg:5432:test:alice:socketpw\nlocalhost:5432:test:alice:localpw\n",
        )
        .unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let ctx = ctx().with_password_file(file.path());
        let params = resolve("host=/var/run/pg dbname=test user=alice", &ctx).unwrap();
        assert_eq!(params.unix_socket(), Some("/var/run/pg"));
        assert_eq!(params.password(), "socketpw");

        // No host at all still falls back to the localhost line
        let params = resolve("dbname=test user=alice", &ctx).unwrap();
        assert_eq!(params.password(), "localpw");
    }

    #[test]
    fn test_service_from_env() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[reporting]\nhost=reports.internal\nport=6543\n")
            .unwrap();

        let ctx = ctx()
            .with_env("PGSERVICE", "reporting")
            .with_env("PGHOST", "envhost")
            .with_service_file(file.path());
        let params = resolve("port=5555", &ctx).unwrap();
        // service beats environment, explicit beats service
        assert_eq!(params.host(), Some("reports.internal"));
        assert_eq!(params.port(), "5555");
        assert_eq!(params.dbname(), Some("reporting"));
        assert_eq!(params.service(), Some("reporting"));
    }

    #[test]
    fn test_missing_service_file_fails() {
        let ctx = ctx().with_service_file("/nonexistent/pg_service.conf");
        let err = resolve("service=nope", &ctx).unwrap_err();
        assert!(matches!(err, Error::ServiceFile(_)));
    }

    #[test]
    fn test_idempotent_resolution() {
        let ctx = ctx().with_env("PGCONNECT_TIMEOUT", "10");
        for conninfo in [
            "",
            "host=localhost port=5432 dbname=test user=alice",
            "host=/tmp dbname=x",
            r"password='a b\\c' options='-c search_path=public'",
            "hostaddr=127.0.0.1 requiressl=1 sslrootcert=/etc/ssl/root.pem",
        ] {
            let first = resolve(conninfo, &ctx).unwrap();
            let second = resolve(&first.to_conninfo(), &ctx).unwrap();
            assert_eq!(first, second, "conninfo: {}", conninfo);
        }
    }

    #[test]
    fn test_defaults_listing() {
        let rows = defaults(&ctx().with_env("PGHOST", "envhost")).unwrap();
        assert_eq!(rows.len(), CONN_OPTIONS.len());
        let host = rows.iter().find(|r| r.keyword == "host").unwrap();
        assert_eq!(host.value.as_deref(), Some("envhost"));
        let password = rows.iter().find(|r| r.keyword == "password").unwrap();
        assert_eq!(password.display, OptionDisplay::Password);
    }
}
