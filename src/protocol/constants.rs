//! Wire protocol constants

/// Default server port
pub const DEFAULT_PORT: u16 = 27017;

/// Database used for administrative commands and as the default auth source
pub const ADMIN_DATABASE: &str = "admin";

/// Size of the standard message header (length, request id, response to, op code)
pub const HEADER_LEN: usize = 16;

/// Largest message the server will ever send (48 MiB)
pub const MAX_MESSAGE_LENGTH: usize = 48 * 1024 * 1024;

/// Suffix appended to a database name to address its command namespace
pub const COMMAND_NAMESPACE_SUFFIX: &str = ".$cmd";

/// Operation codes
pub mod op_codes {
    /// Reply to a query
    pub const REPLY: i32 = 1;

    /// Query (commands are queries against `<db>.$cmd`)
    pub const QUERY: i32 = 2004;
}

/// Command names and reply fields
pub mod commands {
    /// Role probe command
    pub const IS_MASTER: &str = "isMaster";

    /// Role flag in the probe reply
    pub const IS_MASTER_FIELD: &str = "ismaster";

    /// First step of a SASL conversation
    pub const SASL_START: &str = "saslStart";

    /// Subsequent steps of a SASL conversation
    pub const SASL_CONTINUE: &str = "saslContinue";

    /// Command success flag
    pub const OK_FIELD: &str = "ok";
}
