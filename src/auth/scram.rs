//! SCRAM client (RFC 5802, RFC 7677)
//!
//! Pure message construction and verification; the SASL conversation that
//! carries these messages lives in [`super::sasl`]. SCRAM-SHA-1 hashes the
//! password the way MongoDB servers store it before salting.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2;
use rand::Rng;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

/// GS2 header for clients without channel binding support
const GS2_HEADER: &str = "n,,";

/// SCRAM authentication error types
#[derive(Debug, Clone)]
pub enum ScramError {
    /// Invalid proof from server
    InvalidServerProof(String),
    /// Invalid server message format
    InvalidServerMessage(String),
    /// Server reported an error (`e=` attribute)
    ServerError(String),
    /// Base64 decoding error
    Base64Error(String),
}

impl fmt::Display for ScramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScramError::InvalidServerProof(msg) => write!(f, "invalid server proof: {}", msg),
            ScramError::InvalidServerMessage(msg) => write!(f, "invalid server message: {}", msg),
            ScramError::ServerError(msg) => write!(f, "server error: {}", msg),
            ScramError::Base64Error(msg) => write!(f, "Base64 error: {}", msg),
        }
    }
}

impl std::error::Error for ScramError {}

/// Hash function underneath a SCRAM exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScramMechanism {
    /// `SCRAM-SHA-1`
    #[default]
    Sha1,
    /// `SCRAM-SHA-256`
    Sha256,
}

impl ScramMechanism {
    /// Look up a mechanism by its SASL name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case(super::AUTH_SCRAM_SHA1) {
            Some(ScramMechanism::Sha1)
        } else if name.eq_ignore_ascii_case(super::AUTH_SCRAM_SHA256) {
            Some(ScramMechanism::Sha256)
        } else {
            None
        }
    }

    /// SASL mechanism name
    pub fn name(self) -> &'static str {
        match self {
            ScramMechanism::Sha1 => super::AUTH_SCRAM_SHA1,
            ScramMechanism::Sha256 => super::AUTH_SCRAM_SHA256,
        }
    }

    /// Password as fed to PBKDF2.
    ///
    /// SCRAM-SHA-1 uses the hex MD5 of `user:mongo:password` instead of the
    /// raw password.
    fn prepare_password(self, username: &str, password: &str) -> String {
        match self {
            ScramMechanism::Sha1 => {
                let digest = Md5::digest(format!("{}:mongo:{}", username, password).as_bytes());
                digest.iter().map(|b| format!("{:02x}", b)).collect()
            }
            ScramMechanism::Sha256 => password.to_string(),
        }
    }

    /// SaltedPassword := PBKDF2(password, salt, iterations, HMAC-H)
    fn salt_password(self, password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
        match self {
            ScramMechanism::Sha1 => {
                let mut out = vec![0u8; 20];
                let _ = pbkdf2::<Hmac<Sha1>>(password.as_bytes(), salt, iterations, &mut out);
                out
            }
            ScramMechanism::Sha256 => {
                let mut out = vec![0u8; 32];
                let _ = pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, iterations, &mut out);
                out
            }
        }
    }

    fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            ScramMechanism::Sha1 => mac::<Hmac<Sha1>>(key, data),
            ScramMechanism::Sha256 => mac::<Hmac<Sha256>>(key, data),
        }
    }

    fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            ScramMechanism::Sha1 => Sha1::digest(data).to_vec(),
            ScramMechanism::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    /// ClientProof := ClientKey XOR HMAC(H(ClientKey), AuthMessage)
    fn client_proof(self, salted_password: &[u8], auth_message: &[u8]) -> Vec<u8> {
        let client_key = self.hmac(salted_password, b"Client Key");
        let stored_key = self.hash(&client_key);
        let client_signature = self.hmac(&stored_key, auth_message);

        client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect()
    }
}

impl fmt::Display for ScramMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State carried from the client-final step to server verification
#[derive(Clone, Debug)]
pub struct ScramState {
    mechanism: ScramMechanism,
    auth_message: Vec<u8>,
    server_key: Vec<u8>,
}

/// SCRAM client for either [`ScramMechanism`]
pub struct ScramClient {
    mechanism: ScramMechanism,
    username: String,
    password: String,
    nonce: String,
}

impl fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClient")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ScramClient {
    /// Create a new SCRAM-SHA-1 client with a random 24-byte nonce
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        let nonce_bytes: Vec<u8> = (0..24).map(|_| rng.gen()).collect();
        Self::with_nonce(username, password, BASE64.encode(nonce_bytes))
    }

    /// Create a client with a fixed nonce (deterministic exchanges)
    pub fn with_nonce(
        username: impl Into<String>,
        password: impl Into<String>,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            mechanism: ScramMechanism::default(),
            username: username.into(),
            password: password.into(),
            nonce: nonce.into(),
        }
    }

    /// Switch the hash function
    pub fn with_mechanism(mut self, mechanism: ScramMechanism) -> Self {
        self.mechanism = mechanism;
        self
    }

    /// Hash function in use
    pub fn mechanism(&self) -> ScramMechanism {
        self.mechanism
    }

    fn client_first_bare(&self) -> String {
        format!("n={},r={}", escape_username(&self.username), self.nonce)
    }

    /// Generate client first message
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Process server first message and generate client final message
    ///
    /// Returns (client_final_message, internal_state)
    pub fn client_final(&self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        let (server_nonce, salt, iterations) = parse_server_first(server_first)?;

        if !server_nonce.starts_with(&self.nonce) {
            return Err(ScramError::InvalidServerMessage(
                "server nonce doesn't contain client nonce".to_string(),
            ));
        }

        let salt_bytes = BASE64
            .decode(&salt)
            .map_err(|_| ScramError::Base64Error("invalid salt encoding".to_string()))?;
        let iterations = iterations
            .parse::<u32>()
            .map_err(|_| ScramError::InvalidServerMessage("invalid iteration count".to_string()))?;
        if iterations == 0 {
            return Err(ScramError::InvalidServerMessage(
                "iteration count must be positive".to_string(),
            ));
        }

        let client_final_without_proof =
            format!("c={},r={}", BASE64.encode(GS2_HEADER), server_nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            client_final_without_proof
        );

        let mechanism = self.mechanism;
        let password = mechanism.prepare_password(&self.username, &self.password);
        let salted_password = mechanism.salt_password(&password, &salt_bytes, iterations);
        let proof = mechanism.client_proof(&salted_password, auth_message.as_bytes());
        let server_key = mechanism.hmac(&salted_password, b"Server Key");

        let client_final = format!("{},p={}", client_final_without_proof, BASE64.encode(proof));
        let state = ScramState {
            mechanism,
            auth_message: auth_message.into_bytes(),
            server_key,
        };

        Ok((client_final, state))
    }

    /// Verify server final message and confirm authentication
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(ScramError::ServerError(err.to_string()));
        }

        let server_sig_encoded = server_final
            .split(',')
            .find_map(|part| part.strip_prefix("v="))
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' attribute".to_string()))?;

        let server_signature = BASE64.decode(server_sig_encoded).map_err(|_| {
            ScramError::Base64Error("invalid server signature encoding".to_string())
        })?;

        let expected_signature = state.mechanism.hmac(&state.server_key, &state.auth_message);

        if constant_time_compare(&server_signature, &expected_signature) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

/// RFC 5802 saslname escaping
fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

/// Parse server first message format: r=<nonce>,s=<salt>,i=<iterations>
pub fn parse_server_first(msg: &str) -> Result<(String, String, String), ScramError> {
    let mut nonce = String::new();
    let mut salt = String::new();
    let mut iterations = String::new();

    for part in msg.split(',') {
        if let Some(value) = part.strip_prefix("r=") {
            nonce = value.to_string();
        } else if let Some(value) = part.strip_prefix("s=") {
            salt = value.to_string();
        } else if let Some(value) = part.strip_prefix("i=") {
            iterations = value.to_string();
        }
    }

    if nonce.is_empty() || salt.is_empty() || iterations.is_empty() {
        return Err(ScramError::InvalidServerMessage(
            "missing required fields in server first message".to_string(),
        ));
    }

    Ok((nonce, salt, iterations))
}

fn mac<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = <M as Mac>::new_from_slice(key).expect("HMAC key of any size is valid");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
