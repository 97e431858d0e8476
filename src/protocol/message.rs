//! Protocol message types

/// Frontend message (client → server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// Startup message
    Startup {
        /// Protocol version
        version: i32,
        /// Connection parameters
        params: Vec<(String, String)>,
    },

    /// Password message (cleartext or `md5...` digest)
    Password(String),

    /// Terminate message
    Terminate,

    /// SASL initial response message
    SaslInitialResponse {
        /// SASL mechanism name (e.g., "SCRAM-SHA-256")
        mechanism: String,
        /// SASL client first message data
        data: Vec<u8>,
    },

    /// SASL response message
    SaslResponse {
        /// SASL client final message data
        data: Vec<u8>,
    },

    /// SSLRequest message (TLS negotiation)
    SslRequest,
}

/// Authentication request sent by the server in an `R` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequest {
    /// Authentication OK
    Ok,

    /// Kerberos V4 (rejected)
    KerberosV4,

    /// Kerberos V5 (rejected)
    KerberosV5,

    /// Cleartext password required
    CleartextPassword,

    /// crypt(3) password (rejected)
    CryptPassword {
        /// Salt for crypt
        salt: [u8; 2],
    },

    /// MD5 password required
    Md5Password {
        /// Salt for MD5 hash
        salt: [u8; 4],
    },

    /// SCM credential message (rejected)
    ScmCredential,

    /// GSSAPI (rejected)
    Gss,

    /// GSSAPI continuation (rejected)
    GssContinue,

    /// SSPI (rejected)
    Sspi,

    /// SASL authentication mechanisms available (Postgres 10+)
    Sasl {
        /// List of SASL mechanism names (e.g., ["SCRAM-SHA-256"])
        mechanisms: Vec<String>,
    },

    /// SASL continuation message (server challenge)
    SaslContinue {
        /// SASL server first/continue message data
        data: Vec<u8>,
    },

    /// SASL final message (server verification)
    SaslFinal {
        /// SASL server final message data
        data: Vec<u8>,
    },

    /// A method code this client does not know
    Unknown(i32),
}

impl AuthRequest {
    /// Wire method code
    pub fn code(&self) -> i32 {
        use super::constants::auth;
        match self {
            Self::Ok => auth::OK,
            Self::KerberosV4 => auth::KERBEROS_V4,
            Self::KerberosV5 => auth::KERBEROS_V5,
            Self::CleartextPassword => auth::CLEARTEXT_PASSWORD,
            Self::CryptPassword { .. } => auth::CRYPT_PASSWORD,
            Self::Md5Password { .. } => auth::MD5_PASSWORD,
            Self::ScmCredential => auth::SCM_CREDENTIAL,
            Self::Gss => auth::GSS,
            Self::GssContinue => auth::GSS_CONTINUE,
            Self::Sspi => auth::SSPI,
            Self::Sasl { .. } => auth::SASL,
            Self::SaslContinue { .. } => auth::SASL_CONTINUE,
            Self::SaslFinal { .. } => auth::SASL_FINAL,
            Self::Unknown(code) => *code,
        }
    }
}

/// A complete message read while waiting for authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFrame {
    /// Authentication request
    Request(AuthRequest),

    /// Framed error response
    Error(ErrorFields),

    /// Unframed, NUL-terminated error text from a server that predates the
    /// current protocol
    LegacyError(String),
}

/// Backend message accepted between AuthenticationOk and ReadyForQuery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// Backend key data (for cancellation)
    BackendKeyData {
        /// Process ID
        process_id: i32,
        /// Secret key
        secret_key: i32,
    },

    /// Error response
    ErrorResponse(ErrorFields),

    /// Notice response
    NoticeResponse(ErrorFields),

    /// Parameter status
    ParameterStatus {
        /// Parameter name
        name: String,
        /// Parameter value
        value: String,
    },

    /// Ready for query
    ReadyForQuery {
        /// Transaction status
        status: u8,
    },
}

/// Error/notice fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity (ERROR, WARNING, etc.)
    pub severity: Option<String>,
    /// SQLSTATE code
    pub code: Option<String>,
    /// Human-readable message
    pub message: Option<String>,
    /// Additional detail
    pub detail: Option<String>,
    /// Hint
    pub hint: Option<String>,
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref severity) = self.severity {
            write!(f, "{}:  ", severity)?;
        }
        if let Some(ref msg) = self.message {
            write!(f, "{}", msg)?;
        }
        if let Some(ref detail) = self.detail {
            write!(f, "\nDETAIL:  {}", detail)?;
        }
        if let Some(ref hint) = self.hint {
            write!(f, "\nHINT:  {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_fields_display() {
        let fields = ErrorFields {
            severity: Some("FATAL".into()),
            code: Some("28P01".into()),
            message: Some("password authentication failed for user \"alice\"".into()),
            detail: None,
            hint: Some("check pg_hba.conf".into()),
        };
        assert_eq!(
            fields.to_string(),
            "FATAL:  password authentication failed for user \"alice\"\nHINT:  check pg_hba.conf"
        );
    }

    #[test]
    fn test_auth_request_codes() {
        assert_eq!(AuthRequest::Ok.code(), 0);
        assert_eq!(AuthRequest::Md5Password { salt: [0; 4] }.code(), 5);
        assert_eq!(AuthRequest::Unknown(99).code(), 99);
    }
}
