//! Authentication
//!
//! The connect algorithm only depends on the [`Authenticator`] trait. The
//! default [`ScramAuthenticator`] runs a SCRAM-SHA-1 or SCRAM-SHA-256 SASL
//! conversation over the default command codec.

mod sasl;
pub mod scram;

pub use sasl::ScramAuthenticator;
pub use scram::{ScramClient, ScramError, ScramMechanism};

use crate::connection::Connection;
use crate::Result;
use async_trait::async_trait;

/// Mechanism name for SCRAM-SHA-256
pub const AUTH_SCRAM_SHA256: &str = "SCRAM-SHA-256";

/// Mechanism name for SCRAM-SHA-1
pub const AUTH_SCRAM_SHA1: &str = "SCRAM-SHA-1";

/// Default mechanism when the connection string does not name one
pub const DEFAULT_AUTH_MECHANISM: &str = AUTH_SCRAM_SHA1;

/// Username and password from the connection string user info
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password (empty when the user info has no colon)
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Split `user[:password]` on the first colon
    pub fn from_user_info(user_info: &str) -> Self {
        match user_info.split_once(':') {
            Some((user, password)) => Self::new(user, password),
            None => Self::new(user_info, ""),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Performs the authentication protocol on an open connection.
///
/// Returns `Ok(true)` when the server accepted the credentials and
/// `Ok(false)` when it rejected them. `Err` is reserved for transport and
/// protocol failures, which abort the whole connect.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate `credentials` against `database` using `mechanism`
    async fn authenticate(
        &self,
        conn: &mut Connection,
        credentials: &Credentials,
        database: &str,
        mechanism: &str,
    ) -> Result<bool>;
}
