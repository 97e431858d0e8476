//! Conninfo string parsing
//!
//! Grammar: whitespace-separated `keyword = value` pairs. A value is either a
//! run of non-blank characters or a single-quoted string; in both forms a
//! backslash takes the next character literally.

use crate::{Error, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Blank characters as understood by C `isspace`
fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

fn skip_blanks(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|&c| is_space(c)).is_some() {}
}

/// Split a conninfo string into raw `(keyword, value)` pairs
///
/// Keywords are not validated here.
pub fn parse_conninfo(conninfo: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = conninfo.chars().peekable();

    loop {
        skip_blanks(&mut chars);
        if chars.peek().is_none() {
            break;
        }

        let mut keyword = String::new();
        while let Some(c) = chars.next_if(|&c| c != '=' && !is_space(c)) {
            keyword.push(c);
        }

        skip_blanks(&mut chars);
        if chars.next_if_eq(&'=').is_none() {
            return Err(Error::Parse(format!(
                "missing \"=\" after \"{}\" in connection info string",
                keyword
            )));
        }
        skip_blanks(&mut chars);

        let value = if chars.next_if_eq(&'\'').is_some() {
            parse_quoted(&mut chars)?
        } else {
            parse_unquoted(&mut chars)
        };

        pairs.push((keyword, value));
    }

    Ok(pairs)
}

fn parse_unquoted(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        if is_space(c) {
            break;
        }
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                value.push(escaped);
            }
        } else {
            value.push(c);
        }
    }
    value
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    let mut value = String::new();
    loop {
        match chars.next() {
            None => {
                return Err(Error::Parse(
                    "unterminated quoted string in connection info string".into(),
                ))
            }
            Some('\\') => {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            }
            Some('\'') => return Ok(value),
            Some(c) => value.push(c),
        }
    }
}

/// Quote a value so that `parse_conninfo` returns it unchanged
pub fn quote_value(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
