//! Metric names and label values

/// Connection attempts started
pub const CONNECTION_ATTEMPTS: &str = "pgconnect_connection_attempts_total";
/// Candidate addresses that failed and were skipped
pub const CANDIDATE_FAILURES: &str = "pgconnect_candidate_failures_total";
/// Connections that reached the OK state
pub const CONNECTIONS_ESTABLISHED: &str = "pgconnect_connections_established_total";
/// Connections that reached the BAD state
pub const CONNECTION_FAILURES: &str = "pgconnect_connection_failures_total";
/// TLS negotiation outcomes
pub const TLS_NEGOTIATIONS: &str = "pgconnect_tls_negotiations_total";
/// Authentication attempts per mechanism
pub const AUTH_ATTEMPTS: &str = "pgconnect_auth_attempts_total";
/// Successful authentications per mechanism
pub const AUTH_SUCCESS: &str = "pgconnect_auth_success_total";
/// Failed authentications per mechanism and reason
pub const AUTH_FAILURES: &str = "pgconnect_auth_failures_total";
/// Time from start to OK
pub const CONNECT_DURATION_MS: &str = "pgconnect_connect_duration_ms";
/// Time from first auth request to AuthenticationOk
pub const AUTH_DURATION_MS: &str = "pgconnect_auth_duration_ms";

/// No credential exchange (trust)
pub const MECHANISM_NONE: &str = "none";
/// Cleartext password
pub const MECHANISM_CLEARTEXT: &str = "cleartext";
/// MD5 salted password
pub const MECHANISM_MD5: &str = "md5";
/// SCRAM-SHA-256
pub const MECHANISM_SCRAM: &str = "scram-sha-256";
/// SCRAM-SHA-256 with tls-server-end-point channel binding
pub const MECHANISM_SCRAM_PLUS: &str = "scram-sha-256-plus";
/// A method the client rejects
pub const MECHANISM_UNSUPPORTED: &str = "unsupported";

/// Server answered `S`
pub const TLS_ACCEPTED: &str = "accepted";
/// Server answered `N`
pub const TLS_REJECTED: &str = "rejected";
/// Server answered `E`, retrying without negotiation
pub const TLS_FALLBACK: &str = "fallback";
