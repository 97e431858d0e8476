//! Postgres protocol constants

/// Protocol version 3.0
pub const PROTOCOL_VERSION: i32 = 0x0003_0000;

/// SSLRequest code (80877103 = 1234 << 16 | 5679)
pub const SSL_REQUEST_CODE: i32 = 0x04D2_162F;

/// CancelRequest code (80877102 = 1234 << 16 | 5678)
pub const CANCEL_REQUEST_CODE: i32 = 0x04D2_162E;

/// Total size of a cancel request packet
pub const CANCEL_REQUEST_LEN: usize = 16;

/// Default server port
pub const DEFAULT_PORT: u16 = 5432;

/// Default port as it appears in the option table
pub const DEFAULT_PORT_STR: &str = "5432";

/// Message type tags
pub mod tags {
    /// Authentication request
    pub const AUTHENTICATION: u8 = b'R';

    /// Backend key data
    pub const BACKEND_KEY_DATA: u8 = b'K';

    /// Error response
    pub const ERROR_RESPONSE: u8 = b'E';

    /// Notice response
    pub const NOTICE_RESPONSE: u8 = b'N';

    /// Parameter status
    pub const PARAMETER_STATUS: u8 = b'S';

    /// Ready for query
    pub const READY_FOR_QUERY: u8 = b'Z';

    /// Password / SASL response (frontend)
    pub const PASSWORD: u8 = b'p';

    /// Terminate (frontend)
    pub const TERMINATE: u8 = b'X';
}

/// Single-byte answers to an SSLRequest
pub mod ssl_response {
    /// Server is willing to perform TLS
    pub const ACCEPT: u8 = b'S';

    /// Server does not do TLS
    pub const REJECT: u8 = b'N';

    /// Server predates negotiation and sent an error
    pub const ERROR: u8 = b'E';
}

/// Authentication types
pub mod auth {
    /// Authentication successful
    pub const OK: i32 = 0;

    /// Kerberos V4
    pub const KERBEROS_V4: i32 = 1;

    /// Kerberos V5
    pub const KERBEROS_V5: i32 = 2;

    /// Cleartext password required
    pub const CLEARTEXT_PASSWORD: i32 = 3;

    /// crypt(3) password with a 2-byte salt
    pub const CRYPT_PASSWORD: i32 = 4;

    /// MD5 password required
    pub const MD5_PASSWORD: i32 = 5;

    /// SCM credential passing
    pub const SCM_CREDENTIAL: i32 = 6;

    /// GSSAPI
    pub const GSS: i32 = 7;

    /// GSSAPI continuation
    pub const GSS_CONTINUE: i32 = 8;

    /// SSPI
    pub const SSPI: i32 = 9;

    /// SASL mechanisms available (Postgres 10+)
    pub const SASL: i32 = 10;

    /// SASL server challenge
    pub const SASL_CONTINUE: i32 = 11;

    /// SASL server final message
    pub const SASL_FINAL: i32 = 12;

    /// Salt length for crypt
    pub const CRYPT_SALT_LEN: usize = 2;

    /// Salt length for MD5
    pub const MD5_SALT_LEN: usize = 4;
}

/// Transaction status
pub mod tx_status {
    /// Idle (not in transaction)
    pub const IDLE: u8 = b'I';

    /// In transaction block
    pub const IN_TRANSACTION: u8 = b'T';

    /// Failed transaction (queries will be rejected until END)
    pub const FAILED: u8 = b'E';
}

/// Framing limits applied while the handshake is running
pub mod limits {
    /// Largest plausible authentication request (length field included)
    pub const MAX_AUTH_REQUEST_LENGTH: usize = 2000;

    /// Largest plausible error message during startup
    pub const MAX_ERROR_LENGTH: usize = 30000;

    /// Smallest valid authentication request or error (length + 4 bytes)
    pub const MIN_HANDSHAKE_LENGTH: usize = 8;

    /// Maximum message length (1 GB), matching PostgreSQL's `PQ_LARGE_MESSAGE_LIMIT`
    pub const MAX_MESSAGE_LENGTH: usize = 1_073_741_824;
}
