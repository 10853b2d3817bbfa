//! Counter helpers

use super::labels;

/// A candidate socket is about to be opened
pub fn connect_attempted(host: &str) {
    ::metrics::counter!(labels::CONNECT_ATTEMPTS, labels::HOST => host.to_string()).increment(1);
}

/// A connect call failed
pub fn connect_failed(category: &'static str) {
    ::metrics::counter!(labels::CONNECT_ERRORS, labels::CATEGORY => category).increment(1);
}

/// An authentication conversation started
pub fn auth_attempted(mechanism: &'static str) {
    ::metrics::counter!(labels::AUTH_ATTEMPTS, labels::MECHANISM => mechanism).increment(1);
}

/// An authentication conversation succeeded
pub fn auth_successful(mechanism: &'static str) {
    ::metrics::counter!(labels::AUTH_SUCCESSES, labels::MECHANISM => mechanism).increment(1);
}

/// An authentication conversation failed
pub fn auth_failed(mechanism: &'static str, reason: &'static str) {
    ::metrics::counter!(
        labels::AUTH_FAILURES,
        labels::MECHANISM => mechanism,
        labels::REASON => reason
    )
    .increment(1);
}

/// A candidate was accepted
pub fn candidate_selected(read_preference: &str) {
    ::metrics::counter!(
        labels::CANDIDATES_SELECTED,
        labels::READ_PREFERENCE => read_preference.to_string()
    )
    .increment(1);
}
