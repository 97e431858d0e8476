//! Metrics for connection establishment
//!
//! Everything is recorded through the `metrics` facade; install any recorder
//! (Prometheus exporter, statsd, ...) in the host application to collect them.
//! The cancel path records nothing.

pub mod counters;
pub mod histograms;
pub mod labels;
