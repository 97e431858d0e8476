//! Service file lookup (`pg_service.conf`)
//!
//! INI-like file: `[name]` starts a section, `keyword=value` lines inside it,
//! `#` starts a comment line. Only the first section whose name matches is
//! read; values never override options that are already set.

use super::options::{find_option, OptionValues};
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Line buffer size; a line of `MAX_LINE_LENGTH - 2` bytes or more is rejected
pub const MAX_LINE_LENGTH: usize = 256;

/// Fill unset options from the `[service]` section of the file at `path`
pub fn apply_service(values: &mut OptionValues, service: &str, path: &Path) -> Result<()> {
    let file = File::open(path).map_err(|_| {
        Error::ServiceFile(format!("service file \"{}\" not found", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let syntax_error = |linenr: usize| {
        Error::ServiceFile(format!(
            "syntax error in service file \"{}\", line {}",
            path.display(),
            linenr
        ))
    };

    let mut group_found = false;
    let mut raw = Vec::new();
    let mut linenr = 0;

    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).map_err(|e| {
            Error::ServiceFile(format!(
                "could not read service file \"{}\": {}",
                path.display(),
                e
            ))
        })?;
        if n == 0 {
            break;
        }
        linenr += 1;

        if raw.len() >= MAX_LINE_LENGTH - 2 {
            return Err(Error::ServiceFile(format!(
                "line {} too long in service file \"{}\"",
                linenr,
                path.display()
            )));
        }

        let text = String::from_utf8_lossy(&raw);
        let line = text
            .trim_end_matches('\n')
            .trim_end_matches('\r')
            .trim_start();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(section) = line.strip_prefix('[') {
            if group_found {
                // sections are never merged
                break;
            }
            group_found = section
                .strip_prefix(service)
                .is_some_and(|rest| rest.starts_with(']'));
            continue;
        }

        if !group_found {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| syntax_error(linenr))?;
        if find_option(key).is_none() {
            return Err(syntax_error(linenr));
        }
        values.set_if_unset(key, value)?;
    }

    if group_found {
        debug!(service, path = %path.display(), "applied service file section");
        values.set_if_unset("dbname", service)?;
    } else {
        warn!(service, path = %path.display(), "service not found in service file");
    }

    Ok(())
}
