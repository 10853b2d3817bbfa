//! Histogram helpers

use super::labels;

/// Duration of a whole connect call
pub fn connect_duration(outcome: &'static str, duration_ms: u64) {
    ::metrics::histogram!(labels::CONNECT_DURATION, labels::OUTCOME => outcome)
        .record(duration_ms as f64);
}

/// Duration of one authentication conversation
pub fn auth_duration(mechanism: &'static str, duration_ms: u64) {
    ::metrics::histogram!(labels::AUTH_DURATION, labels::MECHANISM => mechanism)
        .record(duration_ms as f64);
}
