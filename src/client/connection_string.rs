//! Connection string parsing
//!
//! Supports the format:
//! * mongodb://[user[:password]@]host[:port][,host2[:port2],...][/database][?opt=val&...]
//!
//! The host list is produced in one pass. Only the first host's port is
//! honored; it applies to every candidate.

use crate::auth::{Credentials, DEFAULT_AUTH_MECHANISM};
use crate::connection::TlsConfig;
use crate::protocol::constants::{ADMIN_DATABASE, DEFAULT_PORT};
use crate::topology::NodeRole;
use crate::{Error, Result};
use std::borrow::Cow;
use std::time::Duration;

/// Accepted connection string scheme
pub const SCHEME: &str = "mongodb";

/// Read preference requested by the connection string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReadPreference {
    /// Only a node reporting the primary role is acceptable
    #[default]
    Primary,
    /// Any authenticated node is acceptable (see [`ReadPreference::accepts`])
    Secondary,
    /// Unrecognized mode; never satisfied when a probe is required
    Other(String),
}

impl ReadPreference {
    /// Parse a mode name, case-insensitively. Unknown names are kept verbatim.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("primary") {
            ReadPreference::Primary
        } else if s.eq_ignore_ascii_case("secondary") {
            ReadPreference::Secondary
        } else {
            ReadPreference::Other(s.to_string())
        }
    }

    /// Mode name as written in a connection string
    pub fn as_str(&self) -> &str {
        match self {
            ReadPreference::Primary => "primary",
            ReadPreference::Secondary => "secondary",
            ReadPreference::Other(s) => s,
        }
    }

    /// Whether a node with `role` satisfies this preference.
    ///
    /// `Secondary` accepts every role, including a primary: the node is not
    /// checked for actually being a secondary. `Other` is never satisfied.
    pub fn accepts(&self, role: NodeRole) -> bool {
        match self {
            ReadPreference::Primary => role.is_primary(),
            ReadPreference::Secondary => true,
            ReadPreference::Other(_) => false,
        }
    }
}

impl std::fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node to try, in connection string order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Hostname or IP literal (IPv6 without brackets)
    pub host: String,
}

impl Candidate {
    /// Create a candidate
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

/// Options parsed from the connection string query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Encrypt candidate sockets (`ssl` / `tls`)
    pub use_tls: bool,
    /// Per-candidate connect deadline (`connectTimeoutMS`)
    pub connect_timeout: Option<Duration>,
    /// Send/receive deadline after connect (`socketTimeoutMS`)
    pub socket_timeout: Option<Duration>,
    /// Authentication mechanism (`authMechanism`)
    pub auth_mechanism: String,
    /// Authentication database override (`authSource`)
    pub auth_source: Option<String>,
    /// Read preference (`readPreference`)
    pub read_preference: ReadPreference,
    /// Custom CA file for TLS (`tlsCAFile`)
    pub tls_ca_file: Option<String>,
    /// Replica set name (`replicaSet`); informational only
    pub replica_set: Option<String>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            use_tls: false,
            connect_timeout: None,
            socket_timeout: None,
            auth_mechanism: DEFAULT_AUTH_MECHANISM.to_string(),
            auth_source: None,
            read_preference: ReadPreference::default(),
            tls_ca_file: None,
            replica_set: None,
        }
    }
}

impl ConnectionOptions {
    /// Create a builder starting from the defaults
    pub fn builder() -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Apply one `key=value` query option. Unrecognized keys are ignored.
    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "ssl" | "tls" => self.use_tls = parse_bool(key, value)?,
            "connectTimeoutMS" => self.connect_timeout = parse_millis(key, value)?,
            "socketTimeoutMS" => self.socket_timeout = parse_millis(key, value)?,
            "authMechanism" => self.auth_mechanism = value.to_string(),
            "authSource" => self.auth_source = Some(value.to_string()),
            "readPreference" => self.read_preference = ReadPreference::parse(value),
            "tlsCAFile" => self.tls_ca_file = Some(value.to_string()),
            "replicaSet" => self.replica_set = Some(value.to_string()),
            _ => tracing::debug!(option = key, "ignoring unrecognized connection option"),
        }
        Ok(())
    }
}

/// Builder for [`ConnectionOptions`]
#[derive(Debug, Clone)]
pub struct ConnectionOptionsBuilder {
    options: ConnectionOptions,
}

impl ConnectionOptionsBuilder {
    /// Enable or disable TLS
    pub fn use_tls(mut self, enabled: bool) -> Self {
        self.options.use_tls = enabled;
        self
    }

    /// Set the per-candidate connect deadline
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.options.connect_timeout = Some(duration).filter(|d| !d.is_zero());
        self
    }

    /// Set the send/receive deadline
    pub fn socket_timeout(mut self, duration: Duration) -> Self {
        self.options.socket_timeout = Some(duration).filter(|d| !d.is_zero());
        self
    }

    /// Set the authentication mechanism
    pub fn auth_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.options.auth_mechanism = mechanism.into();
        self
    }

    /// Set the authentication database
    pub fn auth_source(mut self, database: impl Into<String>) -> Self {
        self.options.auth_source = Some(database.into());
        self
    }

    /// Set the read preference
    pub fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.options.read_preference = preference;
        self
    }

    /// Set a custom CA file for TLS
    pub fn tls_ca_file(mut self, path: impl Into<String>) -> Self {
        self.options.tls_ca_file = Some(path.into());
        self
    }

    /// Build the options
    pub fn build(self) -> ConnectionOptions {
        self.options
    }
}

/// Parsed connection info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Candidates in trial order
    pub candidates: Vec<Candidate>,
    /// Port shared by every candidate
    pub port: u16,
    /// Database named by the path (`admin` when absent)
    pub database: String,
    /// Query options
    pub options: ConnectionOptions,
    /// Credentials from the user info, if any
    pub credentials: Option<Credentials>,
}

impl ConnectionInfo {
    /// Parse connection string
    pub fn parse(s: &str) -> Result<Self> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| Error::UnknownScheme(s.to_string()))?;
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Err(Error::UnknownScheme(scheme.to_string()));
        }

        // Split off query string before parsing authority and path
        let (rest, query_string) = match rest.split_once('?') {
            Some((r, q)) => (r, q),
            None => (rest, ""),
        };

        let (authority, path) = match rest.find('/') {
            Some(pos) => rest.split_at(pos),
            None => (rest, ""),
        };

        let (user_info, hosts) = match authority.rsplit_once('@') {
            Some((user_info, hosts)) => (Some(user_info), hosts),
            None => (None, authority),
        };

        let credentials = match user_info {
            Some(info) if !info.is_empty() => {
                let raw = Credentials::from_user_info(info);
                Some(Credentials::new(
                    decode(&raw.username)?,
                    decode(&raw.password)?,
                ))
            }
            _ => None,
        };

        let (candidates, port) = parse_hosts(hosts)?;

        let database = decode(path.trim_start_matches('/'))?;
        let database = if database.is_empty() {
            ADMIN_DATABASE.to_string()
        } else {
            database.into_owned()
        };

        let mut options = ConnectionOptions::default();
        for pair in query_string.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) => options.apply(&decode(key)?, &decode(value)?)?,
                None => tracing::debug!(option = pair, "ignoring option without value"),
            }
        }

        Ok(Self {
            candidates,
            port,
            database,
            options,
            credentials,
        })
    }

    /// Database credentials are verified against: `authSource`, else the path database
    pub fn auth_database(&self) -> &str {
        self.options.auth_source.as_deref().unwrap_or(&self.database)
    }

    /// Whether more than one candidate was listed
    pub fn is_multi_host(&self) -> bool {
        self.candidates.len() > 1
    }

    /// Build a `TlsConfig` from parsed connection parameters.
    ///
    /// Returns `None` when TLS is disabled.
    pub fn to_tls_config(&self) -> Result<Option<TlsConfig>> {
        if !self.options.use_tls {
            return Ok(None);
        }

        let mut builder = TlsConfig::builder();
        if let Some(ref ca_path) = self.options.tls_ca_file {
            builder = builder.ca_cert_path(ca_path);
        }
        Ok(Some(builder.build()?))
    }
}

/// Split the host list into candidates and the shared port
fn parse_hosts(hosts: &str) -> Result<(Vec<Candidate>, u16)> {
    if hosts.is_empty() {
        return Err(Error::Config("connection string names no host".into()));
    }

    let mut candidates = Vec::new();
    let mut shared_port = DEFAULT_PORT;

    for (i, entry) in hosts.split(',').enumerate() {
        let (host, port) = split_host_entry(entry)?;
        if host.is_empty() {
            return Err(Error::Config(format!("empty host in '{}'", hosts)));
        }
        if i == 0 {
            if let Some(port) = port {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("invalid port '{}'", port)))?;
                // Port 0 means unspecified
                if port != 0 {
                    shared_port = port;
                }
            }
        }
        candidates.push(Candidate::new(decode(host)?));
    }

    Ok((candidates, shared_port))
}

/// Split `host[:port]` or `[v6]:port`
fn split_host_entry(entry: &str) -> Result<(&str, Option<&str>)> {
    if let Some(rest) = entry.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::Config(format!("unterminated IPv6 literal '{}'", entry)))?;
        return match after {
            "" => Ok((host, None)),
            _ => match after.strip_prefix(':') {
                Some(port) => Ok((host, Some(port))),
                None => Err(Error::Config(format!("invalid host '{}'", entry))),
            },
        };
    }

    Ok(match entry.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (entry, None),
    })
}

fn decode(s: &str) -> Result<Cow<'_, str>> {
    urlencoding::decode(s).map_err(|e| Error::Config(format!("invalid percent-encoding in '{}': {}", s, e)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::Config(format!(
            "invalid value '{}' for {}: expected true or false",
            value, key
        ))),
    }
}

/// Milliseconds option; 0 disables the timeout
fn parse_millis(key: &str, value: &str) -> Result<Option<Duration>> {
    let ms = value
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("invalid value '{}' for {}", value, key)))?;
    Ok(Some(Duration::from_millis(ms)).filter(|d| !d.is_zero()))
}
