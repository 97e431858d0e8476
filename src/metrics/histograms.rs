//! Histogram helpers

use super::labels;

/// Time from connection start until OK
pub fn connect_duration(duration_ms: u64) {
    metrics::histogram!(labels::CONNECT_DURATION_MS).record(duration_ms as f64);
}

/// Time spent in the authentication exchange
pub fn auth_duration(mechanism: &'static str, duration_ms: u64) {
    metrics::histogram!(labels::AUTH_DURATION_MS, "mechanism" => mechanism)
        .record(duration_ms as f64);
}
