//! Metric helpers for `mcshuttle`.
//!
//! Defines metric names and helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. All functions become no-ops
//! if the optional `metrics` Cargo feature is disabled.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active sessions.
pub const SESSIONS_ACTIVE: &str = "mcshuttle_sessions_active";
/// Name of the counter tracking requests handed to the handler.
pub const REQUESTS_PROCESSED: &str = "mcshuttle_requests_processed_total";
/// Name of the counter tracking error occurrences.
pub const ERRORS_TOTAL: &str = "mcshuttle_errors_total";

/// Increment the active sessions gauge.
#[cfg(feature = "metrics")]
pub fn inc_sessions() {
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

#[cfg(not(feature = "metrics"))]
pub fn inc_sessions() {}

/// Decrement the active sessions gauge.
#[cfg(feature = "metrics")]
pub fn dec_sessions() {
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

#[cfg(not(feature = "metrics"))]
pub fn dec_sessions() {}

/// Record a request handed to the handler.
#[cfg(feature = "metrics")]
pub fn inc_requests() {
    counter!(REQUESTS_PROCESSED).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn inc_requests() {}

/// Record a parse rejection.
#[cfg(feature = "metrics")]
pub fn inc_parse_errors() {
    counter!(ERRORS_TOTAL, "kind" => "parse").increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn inc_parse_errors() {}

/// Record a transport write failure.
#[cfg(feature = "metrics")]
pub fn inc_write_errors() {
    counter!(ERRORS_TOTAL, "kind" => "write").increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn inc_write_errors() {}
