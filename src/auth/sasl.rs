//! SASL conversation carrying SCRAM messages over admin commands

use super::scram::{ScramClient, ScramError, ScramMechanism};
use super::{Authenticator, Credentials};
use crate::connection::Connection;
use crate::protocol::constants::commands;
use crate::protocol::{CommandReply, Document};
use crate::{Error, Result};
use async_trait::async_trait;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};

/// Upper bound on empty `saslContinue` rounds after the proof is verified
const MAX_EXTRA_ROUNDS: usize = 2;

/// Default authenticator: SCRAM-SHA-1 or SCRAM-SHA-256 via `saslStart` /
/// `saslContinue`
#[derive(Debug, Clone, Copy, Default)]
pub struct ScramAuthenticator;

impl ScramAuthenticator {
    /// Create the authenticator
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for ScramAuthenticator {
    async fn authenticate(
        &self,
        conn: &mut Connection,
        credentials: &Credentials,
        database: &str,
        mechanism: &str,
    ) -> Result<bool> {
        let mechanism = ScramMechanism::from_name(mechanism).ok_or_else(|| {
            Error::Authentication(format!(
                "unsupported auth mechanism '{}', expected {} or {}",
                mechanism,
                ScramMechanism::Sha1,
                ScramMechanism::Sha256
            ))
        })?;
        let name = mechanism.name();

        crate::metrics::counters::auth_attempted(name);
        let start = std::time::Instant::now();
        let outcome = conversation(conn, credentials, database, mechanism).await;

        match &outcome {
            Ok(true) => {
                crate::metrics::counters::auth_successful(name);
                crate::metrics::histograms::auth_duration(name, start.elapsed().as_millis() as u64);
            }
            Ok(false) => crate::metrics::counters::auth_failed(name, "rejected"),
            Err(e) => crate::metrics::counters::auth_failed(name, e.category()),
        }
        outcome
    }
}

async fn conversation(
    conn: &mut Connection,
    credentials: &Credentials,
    database: &str,
    mechanism: ScramMechanism,
) -> Result<bool> {
    let scram = ScramClient::new(credentials.username.clone(), credentials.password.clone())
        .with_mechanism(mechanism);
    tracing::debug!(user = %credentials.username, database, %mechanism, "starting SCRAM conversation");

    // saslStart carries the client first message
    let mut start = Document::new();
    start.insert(commands::SASL_START, 1i32);
    start.insert("mechanism", mechanism.name());
    start.insert("payload", binary(scram.client_first().as_bytes()));
    start.insert("autoAuthorize", 1i32);
    let reply = conn.run_command(database, start).await?;
    let step = match SaslStep::from_reply(&reply)? {
        Some(step) => step,
        None => return Ok(false),
    };

    // saslContinue carries the client final message
    let server_first = step.payload_str()?;
    let (client_final, state) = scram.client_final(&server_first)?;
    let reply = conn
        .run_command(
            database,
            continue_command(step.conversation_id.clone(), client_final.as_bytes()),
        )
        .await?;
    let mut step = match SaslStep::from_reply(&reply)? {
        Some(step) => step,
        None => return Ok(false),
    };

    let server_final = step.payload_str()?;
    match scram.verify_server_final(&server_final, &state) {
        Ok(()) => {}
        Err(ScramError::InvalidServerProof(msg)) | Err(ScramError::ServerError(msg)) => {
            tracing::warn!(user = %credentials.username, database, "SCRAM verification failed: {}", msg);
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    }

    // Some servers need an empty round to finish the conversation
    let mut rounds = 0;
    while !step.done {
        if rounds == MAX_EXTRA_ROUNDS {
            return Err(Error::Protocol(
                "SASL conversation did not complete".into(),
            ));
        }
        rounds += 1;
        let reply = conn
            .run_command(database, continue_command(step.conversation_id.clone(), b""))
            .await?;
        step = match SaslStep::from_reply(&reply)? {
            Some(step) => step,
            None => return Ok(false),
        };
    }

    tracing::debug!(user = %credentials.username, database, %mechanism, "SCRAM authentication successful");
    Ok(true)
}

fn binary(bytes: &[u8]) -> Binary {
    Binary {
        subtype: BinarySubtype::Generic,
        bytes: bytes.to_vec(),
    }
}

fn continue_command(conversation_id: Bson, payload: &[u8]) -> Document {
    let mut cmd = Document::new();
    cmd.insert(commands::SASL_CONTINUE, 1i32);
    cmd.insert("conversationId", conversation_id);
    cmd.insert("payload", binary(payload));
    cmd
}

/// One server step of the SASL conversation
struct SaslStep {
    conversation_id: Bson,
    payload: Vec<u8>,
    done: bool,
}

impl SaslStep {
    /// `Ok(None)` when the server rejected the step (`ok: 0`)
    fn from_reply(reply: &CommandReply) -> Result<Option<Self>> {
        let doc = reply
            .first()
            .ok_or_else(|| Error::Protocol("empty SASL reply".into()))?;

        if !reply.is_ok() {
            tracing::debug!(
                errmsg = reply.error_message().unwrap_or("unknown"),
                "server rejected SASL step"
            );
            return Ok(None);
        }

        let conversation_id = doc
            .get("conversationId")
            .cloned()
            .ok_or_else(|| Error::Protocol("SASL reply missing conversationId".into()))?;
        let payload = match doc.get("payload") {
            Some(Bson::Binary(binary)) => binary.bytes.clone(),
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "SASL payload is not binary: {:?}",
                    other.element_type()
                )))
            }
            None => Vec::new(),
        };
        let done = doc.get_bool("done").unwrap_or(false);

        Ok(Some(Self {
            conversation_id,
            payload,
            done,
        }))
    }

    fn payload_str(&self) -> Result<String> {
        String::from_utf8(self.payload.clone())
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in SASL payload: {}", e)))
    }
}
