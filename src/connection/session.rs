//! Server-side session state captured during startup
//!
//! After AuthenticationOk the server sends backend key data, parameter status
//! reports and notices, then ReadyForQuery. A [`ResultReader`] interprets each
//! of those messages and records them in the [`Session`].

use crate::protocol::{decode_startup_message, BackendMessage, ErrorFields};
use crate::{Error, Result};
use std::collections::HashMap;

/// Callback receiving server notices
pub type NoticeProcessor = Box<dyn FnMut(&ErrorFields) + Send>;

/// Default notice processor: forward to the `tracing` warn channel
pub fn default_notice_processor() -> NoticeProcessor {
    Box::new(|notice: &ErrorFields| {
        tracing::warn!(target: "pgconnect::notice", "{}", notice);
    })
}

/// What the reader wants after one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderOutcome {
    /// Keep reading
    Continue,
    /// ReadyForQuery received
    Ready,
}

/// Interprets messages between AuthenticationOk and ReadyForQuery
pub trait ResultReader: Send {
    /// Handle one framed message
    fn handle(&mut self, tag: u8, body: &[u8], session: &mut Session) -> Result<ReaderOutcome>;
}

/// Default reader: accepts only the messages a server sends before the first query
#[derive(Debug, Default, Clone, Copy)]
pub struct StartupResultReader;

impl ResultReader for StartupResultReader {
    fn handle(&mut self, tag: u8, body: &[u8], session: &mut Session) -> Result<ReaderOutcome> {
        let msg = decode_startup_message(tag, body)?.ok_or_else(|| {
            Error::Protocol("unexpected message from server during startup".into())
        })?;

        match msg {
            BackendMessage::BackendKeyData {
                process_id,
                secret_key,
            } => {
                tracing::debug!(pid = process_id, "backend key data received");
                session.backend_pid = Some(process_id);
                session.secret_key = Some(secret_key);
            }
            BackendMessage::ParameterStatus { name, value } => {
                tracing::debug!("parameter status: {} = {}", name, value);
                session.parameters.insert(name, value);
            }
            BackendMessage::NoticeResponse(notice) => {
                (session.notice_processor)(&notice);
            }
            BackendMessage::ErrorResponse(err) => {
                return Err(Error::ServerReported(err.to_string()));
            }
            BackendMessage::ReadyForQuery { status } => {
                session.transaction_status = Some(status);
                return Ok(ReaderOutcome::Ready);
            }
        }
        Ok(ReaderOutcome::Continue)
    }
}

/// State the server reported for this connection
pub struct Session {
    pub(crate) backend_pid: Option<i32>,
    pub(crate) secret_key: Option<i32>,
    pub(crate) parameters: HashMap<String, String>,
    pub(crate) transaction_status: Option<u8>,
    pub(crate) notice_processor: NoticeProcessor,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            backend_pid: None,
            secret_key: None,
            parameters: HashMap::new(),
            transaction_status: None,
            notice_processor: default_notice_processor(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend_pid", &self.backend_pid)
            .field("parameters", &self.parameters)
            .field("transaction_status", &self.transaction_status)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Backend process id from BackendKeyData
    pub fn backend_pid(&self) -> Option<i32> {
        self.backend_pid
    }

    /// Cancel secret from BackendKeyData
    pub fn secret_key(&self) -> Option<i32> {
        self.secret_key
    }

    /// Value of a server parameter reported by ParameterStatus
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Transaction status byte from the last ReadyForQuery
    pub fn transaction_status(&self) -> Option<u8> {
        self.transaction_status
    }

    /// Replace the notice processor, returning the previous one
    pub fn set_notice_processor(&mut self, processor: NoticeProcessor) -> NoticeProcessor {
        std::mem::replace(&mut self.notice_processor, processor)
    }

    /// Forget everything the server reported; the notice processor is kept
    pub(crate) fn clear(&mut self) {
        self.backend_pid = None;
        self.secret_key = None;
        self.parameters.clear();
        self.transaction_status = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{tags, tx_status};
    use std::sync::{Arc, Mutex};

    fn cstr_pair(name: &str, value: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
        body
    }

    #[test]
    fn test_startup_sequence() {
        let mut reader = StartupResultReader;
        let mut session = Session::default();

        let mut key = Vec::new();
        key.extend_from_slice(&4242i32.to_be_bytes());
        key.extend_from_slice(&99i32.to_be_bytes());
        assert_eq!(
            reader.handle(tags::BACKEND_KEY_DATA, &key, &mut session).unwrap(),
            ReaderOutcome::Continue
        );

        let status = cstr_pair("server_version", "16.2");
        assert_eq!(
            reader.handle(tags::PARAMETER_STATUS, &status, &mut session).unwrap(),
            ReaderOutcome::Continue
        );

        assert_eq!(
            reader
                .handle(tags::READY_FOR_QUERY, &[tx_status::IDLE], &mut session)
                .unwrap(),
            ReaderOutcome::Ready
        );

        assert_eq!(session.backend_pid(), Some(4242));
        assert_eq!(session.secret_key(), Some(99));
        assert_eq!(session.parameter("server_version"), Some("16.2"));
        assert_eq!(session.transaction_status(), Some(tx_status::IDLE));

        session.clear();
        assert_eq!(session.backend_pid(), None);
        assert_eq!(session.parameter("server_version"), None);
    }

    #[test]
    fn test_error_response_is_server_reported() {
        let mut reader = StartupResultReader;
        let mut session = Session::default();
        let body = b"SFATAL\0C3D000\0Mdatabase \"nope\" does not exist\0\0";
        let err = reader
            .handle(tags::ERROR_RESPONSE, body, &mut session)
            .unwrap_err();
        assert!(matches!(err, Error::ServerReported(ref m) if m.contains("does not exist")));
    }

    #[test]
    fn test_unexpected_message() {
        let mut reader = StartupResultReader;
        let mut session = Session::default();
        // CommandComplete makes no sense before a query was issued
        let err = reader.handle(b'C', b"SELECT 1\0", &mut session).unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m.contains("unexpected message")));
    }

    #[test]
    fn test_notice_processor_replacement() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let mut session = Session::default();
        let _previous = session.set_notice_processor(Box::new(move |notice: &ErrorFields| {
            sink.lock().unwrap().push(notice.message.clone().unwrap_or_default());
        }));

        let mut reader = StartupResultReader;
        let body = b"SWARNING\0Mcollation version mismatch\0\0";
        reader
            .handle(tags::NOTICE_RESPONSE, body, &mut session)
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["collation version mismatch".to_string()]
        );
    }
}
