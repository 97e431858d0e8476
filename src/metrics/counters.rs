//! Counter helpers

use super::labels;

/// A connection attempt was started
pub fn connection_attempted() {
    metrics::counter!(labels::CONNECTION_ATTEMPTS).increment(1);
}

/// A candidate address failed and the next one will be tried
pub fn candidate_failed() {
    metrics::counter!(labels::CANDIDATE_FAILURES).increment(1);
}

/// A connection reached OK
pub fn connection_established() {
    metrics::counter!(labels::CONNECTIONS_ESTABLISHED).increment(1);
}

/// A connection reached BAD
pub fn connection_failed(category: &'static str) {
    metrics::counter!(labels::CONNECTION_FAILURES, "category" => category).increment(1);
}

/// The server answered the TLS negotiation request
pub fn tls_negotiated(outcome: &'static str) {
    metrics::counter!(labels::TLS_NEGOTIATIONS, "outcome" => outcome).increment(1);
}

/// An authentication method was requested by the server
pub fn auth_attempted(mechanism: &'static str) {
    metrics::counter!(labels::AUTH_ATTEMPTS, "mechanism" => mechanism).increment(1);
}

/// Authentication finished with AuthenticationOk
pub fn auth_successful(mechanism: &'static str) {
    metrics::counter!(labels::AUTH_SUCCESS, "mechanism" => mechanism).increment(1);
}

/// Authentication failed
pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
    metrics::counter!(
        labels::AUTH_FAILURES,
        "mechanism" => mechanism,
        "reason" => reason
    )
    .increment(1);
}
