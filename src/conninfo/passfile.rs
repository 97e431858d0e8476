//! Password file lookup (`~/.pgpass`)
//!
//! Each line is `host:port:dbname:user:password`. A field may be `*` to match
//! anything, and `\:` / `\\` escape literal characters. The first matching
//! line wins. The file is skipped entirely when it is missing or readable by
//! anyone other than its owner.

use crate::protocol::constants::DEFAULT_PORT_STR;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::warn;

/// Host used for matching when none was resolved (Unix socket connections)
pub const DEFAULT_HOST: &str = "localhost";

/// Look up a password for the given connection identity
///
/// Returns `None` when no line matches; that is not an error.
pub fn password_from_file(
    path: &Path,
    host: Option<&str>,
    port: Option<&str>,
    dbname: Option<&str>,
    user: Option<&str>,
) -> Option<String> {
    let dbname = dbname.filter(|d| !d.is_empty())?;
    let user = user.filter(|u| !u.is_empty())?;
    let host = host.filter(|h| !h.is_empty()).unwrap_or(DEFAULT_HOST);
    let port = port.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PORT_STR);

    let metadata = std::fs::metadata(path).ok()?;
    if !metadata.is_file() {
        return None;
    }
    if metadata.permissions().mode() & 0o077 != 0 {
        warn!(
            path = %path.display(),
            "password file has group or world access; permissions should be u=rw (0600) or less"
        );
        return None;
    }

    let file = File::open(path).ok()?;
    BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .find_map(|line| match_line(&line, host, port, dbname, user))
}

/// Match one password file line, returning the unescaped password
fn match_line(line: &str, host: &str, port: &str, dbname: &str, user: &str) -> Option<String> {
    let line = line.trim_end_matches('\r');
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut rest = line;
    for token in [host, port, dbname, user] {
        rest = match_field(rest, token)?;
    }
    Some(unescape(rest))
}

/// Match the leading field of `line` against `token`, returning what follows its `:`
fn match_field<'a>(line: &'a str, token: &str) -> Option<&'a str> {
    if let Some(rest) = line.strip_prefix("*:") {
        return Some(rest);
    }

    let mut field = String::new();
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                let (_, escaped) = chars.next()?;
                field.push(escaped);
            }
            ':' => return (field == token).then(|| &line[i + 1..]),
            _ => field.push(c),
        }
    }
    // no terminating ':' (line has fewer than five fields)
    None
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
