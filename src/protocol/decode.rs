//! Protocol message decoding
//!
//! Decoders never consume input themselves. They report either how many bytes
//! are needed before the same call can succeed, or the parsed value together
//! with the number of bytes it occupied. The caller owns the cursor.

use super::constants::{auth, limits, tags, tx_status};
use super::message::{AuthFrame, AuthRequest, BackendMessage, ErrorFields};
use crate::{Error, Result};

/// Outcome of a resumable decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// The buffer must hold at least `required` bytes before retrying
    NeedMoreData {
        /// Total bytes needed from the start of the message
        required: usize,
    },
    /// A complete value was parsed
    Parsed {
        /// Decoded value
        value: T,
        /// Bytes occupied by the value, including header
        consumed: usize,
    },
}

/// A framed message borrowed from the input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Message type byte
    pub tag: u8,
    /// Body, excluding the tag and length fields
    pub body: &'a [u8],
}

fn read_length(data: &[u8]) -> usize {
    i32::from_be_bytes([data[1], data[2], data[3], data[4]]) as u32 as usize
}

/// Split one `tag | length | body` frame off the front of `data`
pub fn decode_frame(data: &[u8]) -> Result<Decoded<Frame<'_>>> {
    if data.len() < 5 {
        return Ok(Decoded::NeedMoreData { required: 5 });
    }

    let tag = data[0];
    let len = read_length(data);

    if len < 4 {
        return Err(Error::Protocol(format!(
            "invalid message length {} for message type 0x{:02X}",
            len, tag
        )));
    }

    if len > limits::MAX_MESSAGE_LENGTH {
        return Err(Error::Protocol(format!(
            "message length {} exceeds maximum allowed {}",
            len,
            limits::MAX_MESSAGE_LENGTH
        )));
    }

    let total = len + 1;
    if data.len() < total {
        return Ok(Decoded::NeedMoreData { required: total });
    }

    Ok(Decoded::Parsed {
        value: Frame {
            tag,
            body: &data[5..total],
        },
        consumed: total,
    })
}

/// Decode the next message expected while waiting for authentication
///
/// Only `R` (authentication request) and `E` (error) are acceptable. An `E`
/// whose length field is implausible is read as a legacy NUL-terminated error
/// string that starts right after the type byte.
pub fn decode_auth_frame(data: &[u8]) -> Result<Decoded<AuthFrame>> {
    if data.is_empty() {
        return Ok(Decoded::NeedMoreData { required: 1 });
    }

    let tag = data[0];
    if tag != tags::AUTHENTICATION && tag != tags::ERROR_RESPONSE {
        return Err(Error::Protocol(format!(
            "expected authentication request from server, but received {}",
            printable(tag)
        )));
    }

    if data.len() < 5 {
        return Ok(Decoded::NeedMoreData { required: 5 });
    }

    let len = read_length(data);

    if tag == tags::ERROR_RESPONSE
        && (len < limits::MIN_HANDSHAKE_LENGTH || len > limits::MAX_ERROR_LENGTH)
    {
        return decode_legacy_error(data);
    }

    if tag == tags::AUTHENTICATION
        && (len < limits::MIN_HANDSHAKE_LENGTH || len > limits::MAX_AUTH_REQUEST_LENGTH)
    {
        return Err(Error::Protocol(format!(
            "expected authentication request from server, but received {}",
            printable(tag)
        )));
    }

    let total = len + 1;
    if data.len() < total {
        return Ok(Decoded::NeedMoreData { required: total });
    }

    let body = &data[5..total];
    let value = if tag == tags::AUTHENTICATION {
        AuthFrame::Request(decode_auth_request(body)?)
    } else {
        AuthFrame::Error(decode_error_fields(body)?)
    };

    Ok(Decoded::Parsed {
        value,
        consumed: total,
    })
}

fn printable(tag: u8) -> String {
    if tag.is_ascii_graphic() {
        (tag as char).to_string()
    } else {
        format!("0x{:02X}", tag)
    }
}

fn decode_legacy_error(data: &[u8]) -> Result<Decoded<AuthFrame>> {
    match data[1..].iter().position(|&b| b == 0) {
        Some(end) => {
            let text = String::from_utf8_lossy(&data[1..1 + end])
                .trim_end_matches('\n')
                .to_string();
            Ok(Decoded::Parsed {
                value: AuthFrame::LegacyError(text),
                consumed: end + 2,
            })
        }
        None if data.len() - 1 > limits::MAX_ERROR_LENGTH => Err(Error::Protocol(
            "unterminated error message received from server".into(),
        )),
        None => Ok(Decoded::NeedMoreData {
            required: data.len() + 1,
        }),
    }
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Decode the body of an `R` message
pub fn decode_auth_request(data: &[u8]) -> Result<AuthRequest> {
    if data.len() < 4 {
        return Err(Error::Protocol(
            "authentication request too short".into(),
        ));
    }
    let auth_type = read_i32(data, 0);
    let rest = &data[4..];

    let request = match auth_type {
        auth::OK => AuthRequest::Ok,
        auth::KERBEROS_V4 => AuthRequest::KerberosV4,
        auth::KERBEROS_V5 => AuthRequest::KerberosV5,
        auth::CLEARTEXT_PASSWORD => AuthRequest::CleartextPassword,
        auth::CRYPT_PASSWORD => {
            if rest.len() < auth::CRYPT_SALT_LEN {
                return Err(Error::Protocol("incomplete crypt salt".into()));
            }
            AuthRequest::CryptPassword {
                salt: [rest[0], rest[1]],
            }
        }
        auth::MD5_PASSWORD => {
            if rest.len() < auth::MD5_SALT_LEN {
                return Err(Error::Protocol("incomplete MD5 salt".into()));
            }
            let mut salt = [0u8; 4];
            salt.copy_from_slice(&rest[..4]);
            AuthRequest::Md5Password { salt }
        }
        auth::SCM_CREDENTIAL => AuthRequest::ScmCredential,
        auth::GSS => AuthRequest::Gss,
        auth::GSS_CONTINUE => AuthRequest::GssContinue,
        auth::SSPI => AuthRequest::Sspi,
        auth::SASL => {
            // SASL: read mechanism list (null-terminated strings)
            let mut mechanisms = Vec::new();
            let mut offset = 0;
            while offset < rest.len() {
                match rest[offset..].iter().position(|&b| b == 0) {
                    Some(0) | None => break,
                    Some(end) => {
                        let mechanism =
                            String::from_utf8_lossy(&rest[offset..offset + end]).to_string();
                        mechanisms.push(mechanism);
                        offset += end + 1;
                    }
                }
            }
            AuthRequest::Sasl { mechanisms }
        }
        auth::SASL_CONTINUE => AuthRequest::SaslContinue {
            data: rest.to_vec(),
        },
        auth::SASL_FINAL => AuthRequest::SaslFinal {
            data: rest.to_vec(),
        },
        other => AuthRequest::Unknown(other),
    };

    Ok(request)
}

/// Decode a message received between AuthenticationOk and ReadyForQuery
///
/// Returns `Ok(None)` for a message type that has no business appearing
/// during startup; the caller decides how to report it.
pub fn decode_startup_message(tag: u8, data: &[u8]) -> Result<Option<BackendMessage>> {
    let msg = match tag {
        tags::BACKEND_KEY_DATA => decode_backend_key_data(data)?,
        tags::ERROR_RESPONSE => BackendMessage::ErrorResponse(decode_error_fields(data)?),
        tags::NOTICE_RESPONSE => BackendMessage::NoticeResponse(decode_error_fields(data)?),
        tags::PARAMETER_STATUS => decode_parameter_status(data)?,
        tags::READY_FOR_QUERY => decode_ready_for_query(data)?,
        _ => return Ok(None),
    };
    Ok(Some(msg))
}

fn decode_backend_key_data(data: &[u8]) -> Result<BackendMessage> {
    if data.len() < 8 {
        return Err(Error::Protocol("backend key data too short".into()));
    }
    Ok(BackendMessage::BackendKeyData {
        process_id: read_i32(data, 0),
        secret_key: read_i32(data, 4),
    })
}

/// Decode the field list of an `E` or `N` message
pub fn decode_error_fields(data: &[u8]) -> Result<ErrorFields> {
    let mut fields = ErrorFields::default();
    let mut offset = 0;

    while offset < data.len() {
        let field_type = data[offset];
        offset += 1;
        if field_type == 0 {
            break;
        }

        let end = data[offset..].iter().position(|&b| b == 0).ok_or_else(|| {
            Error::Protocol("missing null terminator in error field".into())
        })?;
        let value = String::from_utf8_lossy(&data[offset..offset + end]).to_string();
        offset += end + 1;

        match field_type {
            b'S' => fields.severity = Some(value),
            b'C' => fields.code = Some(value),
            b'M' => fields.message = Some(value),
            b'D' => fields.detail = Some(value),
            b'H' => fields.hint = Some(value),
            _ => {} // Ignore unknown fields
        }
    }

    Ok(fields)
}

fn read_cstr(data: &[u8], what: &str) -> Result<(String, usize)> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Protocol(format!("missing null terminator in {}", what)))?;
    Ok((String::from_utf8_lossy(&data[..end]).to_string(), end + 1))
}

fn decode_parameter_status(data: &[u8]) -> Result<BackendMessage> {
    let (name, used) = read_cstr(data, "parameter name")?;
    let (value, _) = read_cstr(&data[used..], "parameter value")?;
    Ok(BackendMessage::ParameterStatus { name, value })
}

fn decode_ready_for_query(data: &[u8]) -> Result<BackendMessage> {
    let status = *data
        .first()
        .ok_or_else(|| Error::Protocol("ready for query without status byte".into()))?;
    match status {
        tx_status::IDLE | tx_status::IN_TRANSACTION | tx_status::FAILED => {
            Ok(BackendMessage::ReadyForQuery { status })
        }
        other => Err(Error::Protocol(format!(
            "unknown transaction status 0x{:02X} in ready for query",
            other
        ))),
    }
}
