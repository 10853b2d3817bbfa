//! Metric names and label keys

/// Candidate sockets opened
pub const CONNECT_ATTEMPTS: &str = "mongo_wire_connect_attempts_total";

/// Failed connect calls, by error category
pub const CONNECT_ERRORS: &str = "mongo_wire_connect_errors_total";

/// Authentication conversations started
pub const AUTH_ATTEMPTS: &str = "mongo_wire_auth_attempts_total";

/// Authentication conversations that succeeded
pub const AUTH_SUCCESSES: &str = "mongo_wire_auth_successes_total";

/// Authentication conversations that failed
pub const AUTH_FAILURES: &str = "mongo_wire_auth_failures_total";

/// Candidates accepted by the connect algorithm
pub const CANDIDATES_SELECTED: &str = "mongo_wire_candidates_selected_total";

/// Wall time of a whole connect call
pub const CONNECT_DURATION: &str = "mongo_wire_connect_duration_ms";

/// Wall time of one authentication conversation
pub const AUTH_DURATION: &str = "mongo_wire_auth_duration_ms";

/// Label keys
pub const HOST: &str = "host";
/// Error category label
pub const CATEGORY: &str = "category";
/// Auth mechanism label
pub const MECHANISM: &str = "mechanism";
/// Failure reason label
pub const REASON: &str = "reason";
/// Read preference label
pub const READ_PREFERENCE: &str = "read_preference";
/// Outcome label
pub const OUTCOME: &str = "outcome";
