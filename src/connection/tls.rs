//! TLS configuration for `ssl=true` connections.
//!
//! Certificate validation itself is delegated to rustls; this module only
//! decides which root certificates the client trusts.

use crate::{Error, Result};
use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pemfile::Item;
use std::fs;
use std::net::IpAddr;
use std::sync::Arc;

/// TLS configuration for encrypted candidate sockets.
///
/// By default, server certificates are validated against the platform's root
/// certificates, falling back to the bundled Mozilla roots when the platform
/// store is empty.
///
/// # Examples
///
/// ```ignore
/// use mongo_wire::connection::TlsConfig;
///
/// // System roots
/// let tls = TlsConfig::builder().build()?;
///
/// // Custom CA certificate (the `tlsCAFile` connection string option)
/// let tls = TlsConfig::builder()
///     .ca_cert_path("/etc/ssl/mongo-ca.pem")
///     .build()?;
/// ```
#[derive(Clone)]
pub struct TlsConfig {
    /// `tlsCAFile`, when given
    ca_cert_path: Option<String>,
    /// Shared by every candidate socket of one connect
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Start from the platform roots
    pub fn builder() -> TlsConfigBuilder {
        TlsConfigBuilder::default()
    }

    /// rustls client configuration handed to `TlsConnector`
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Custom CA path, if one was configured.
    pub fn ca_cert_path(&self) -> Option<&str> {
        self.ca_cert_path.as_deref()
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// Builder for [`TlsConfig`]
#[derive(Debug, Default)]
pub struct TlsConfigBuilder {
    ca_cert_path: Option<String>,
}

impl TlsConfigBuilder {
    /// Trust only the certificates in this PEM bundle
    pub fn ca_cert_path(mut self, path: impl Into<String>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Load the root store and compile the client configuration.
    ///
    /// Fails with [`Error::Config`] when the CA file is unreadable or holds
    /// no certificate.
    pub fn build(self) -> Result<TlsConfig> {
        let root_store = if let Some(ca_path) = &self.ca_cert_path {
            load_custom_ca(ca_path)?
        } else {
            load_system_roots()
        };

        let client_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );

        Ok(TlsConfig {
            ca_cert_path: self.ca_cert_path,
            client_config,
        })
    }
}

fn load_system_roots() -> RootCertStore {
    let result = rustls_native_certs::load_native_certs();

    let mut store = RootCertStore::empty();
    for cert in result.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }

    if store.is_empty() {
        tracing::debug!(
            errors = result.errors.len(),
            "no platform root certificates, using bundled roots"
        );
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    store
}

// Every X.509 item in the file becomes a trust anchor
fn load_custom_ca(ca_path: &str) -> Result<RootCertStore> {
    let ca_cert_data = fs::read(ca_path).map_err(|e| {
        Error::Config(format!(
            "cannot read tlsCAFile '{}': {}",
            ca_path, e
        ))
    })?;

    let mut reader = std::io::Cursor::new(&ca_cert_data);
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            // Private keys and other items are skipped
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Config(format!(
                    "malformed PEM in tlsCAFile '{}'",
                    ca_path
                )));
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config(format!(
            "tlsCAFile '{}' contains no certificate",
            ca_path
        )));
    }

    Ok(root_store)
}

/// Validate a candidate host for use as the TLS server name.
///
/// IP literals are passed through unchanged; hostnames are checked for
/// length and character set.
pub fn parse_server_name(hostname: &str) -> Result<String> {
    if hostname.parse::<IpAddr>().is_ok() {
        return Ok(hostname.to_string());
    }

    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "host '{}' is not a valid TLS server name",
            hostname
        )));
    }

    if !hostname
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(Error::Config(format!(
            "host '{}' is not a valid TLS server name",
            hostname
        )));
    }

    Ok(hostname.to_string())
}
