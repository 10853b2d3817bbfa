//! Loopback mock nodes speaking the default command codec

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson};
use bytes::{Buf, BytesMut};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use mongo_wire::connection::{SocketFactory, Transport};
use mongo_wire::protocol::{decode_request, encode_reply, CommandReply, Document};
use mongo_wire::{Error, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const SALT: &[u8] = b"mongo-wire-test-salt";
const ITERATIONS: u32 = 4096;

/// Behavior of one mock node
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Reported by `isMaster`
    pub primary: bool,
    /// The only user/password pair the node accepts
    pub user: Option<(String, String)>,
    /// Accept connections but never answer
    pub silent: bool,
}

impl NodeConfig {
    pub fn primary() -> Self {
        Self {
            primary: true,
            ..Self::default()
        }
    }

    pub fn secondary() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: &str, password: &str) -> Self {
        self.user = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }
}

/// What a node has seen so far
#[derive(Default)]
struct Activity {
    accepted_at: Vec<Instant>,
    closed_at: Vec<Instant>,
    // (database, command name)
    commands: Vec<(String, String)>,
    mechanisms: Vec<String>,
}

/// A running mock node. Clones share the same recorded activity.
#[derive(Clone)]
pub struct MockNode {
    pub addr: SocketAddr,
    activity: Arc<Mutex<Activity>>,
}

impl MockNode {
    pub async fn spawn(config: NodeConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let activity = Arc::new(Mutex::new(Activity::default()));

        let shared = activity.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                shared.lock().expect("lock").accepted_at.push(Instant::now());
                tokio::spawn(serve(stream, config.clone(), shared.clone()));
            }
        });

        Self { addr, activity }
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.activity.lock().expect("lock").accepted_at.len()
    }

    /// When each connection was accepted, in accept order
    pub fn accepted_at(&self) -> Vec<Instant> {
        self.activity.lock().expect("lock").accepted_at.clone()
    }

    /// When each connection was seen closed by its peer, in close order
    pub fn closed_at(&self) -> Vec<Instant> {
        self.activity.lock().expect("lock").closed_at.clone()
    }

    /// Connections accepted and not yet closed by the peer
    pub fn open_connections(&self) -> usize {
        let activity = self.activity.lock().expect("lock");
        activity.accepted_at.len() - activity.closed_at.len()
    }

    /// Wait until every accepted connection has been closed by the peer
    pub async fn wait_all_closed(&self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if self.open_connections() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// `(database, command name)` pairs received so far
    pub fn commands(&self) -> Vec<(String, String)> {
        self.activity.lock().expect("lock").commands.clone()
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands().into_iter().map(|(_, name)| name).collect()
    }

    /// Mechanisms named by `saslStart` requests
    pub fn mechanisms(&self) -> Vec<String> {
        self.activity.lock().expect("lock").mechanisms.clone()
    }
}

async fn serve(mut stream: TcpStream, config: NodeConfig, activity: Arc<Mutex<Activity>>) {
    let mut buf = BytesMut::with_capacity(4096);
    let mut scram = ScramServer::default();

    loop {
        match decode_request(&buf) {
            Ok(Some((request, consumed))) => {
                buf.advance(consumed);
                let name = request.command_name().unwrap_or_default().to_string();
                {
                    let mut activity = activity.lock().expect("lock");
                    activity
                        .commands
                        .push((request.database.clone(), name.clone()));
                    if name == "saslStart" {
                        let mechanism = request.command.get_str("mechanism").unwrap_or_default();
                        activity.mechanisms.push(mechanism.to_string());
                    }
                }
                if config.silent {
                    continue;
                }

                let reply = match name.as_str() {
                    "isMaster" => doc! { "ismaster": config.primary, "ok": 1.0 },
                    "saslStart" => scram.start(&config, &request.command),
                    "saslContinue" => scram.next(&request.command),
                    "echo" => doc! { "ok": 1.0, "echo": request.command.clone() },
                    _ => doc! { "ok": 1.0 },
                };

                let mut out = BytesMut::new();
                encode_reply(
                    &CommandReply::with_documents(vec![reply]),
                    request.request_id,
                    &mut out,
                )
                .expect("encode reply");
                if stream.write_all(&out).await.is_err() {
                    break;
                }
                continue;
            }
            Ok(None) => {}
            Err(_) => break,
        }

        match stream.read_buf(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }

    activity.lock().expect("lock").closed_at.push(Instant::now());
}

fn auth_failed() -> Document {
    doc! { "ok": 0.0, "errmsg": "Authentication failed.", "code": 18 }
}

fn binary(bytes: impl Into<Vec<u8>>) -> Binary {
    Binary {
        subtype: BinarySubtype::Generic,
        bytes: bytes.into(),
    }
}

fn payload(command: &Document) -> String {
    match command.get("payload") {
        Some(Bson::Binary(binary)) => String::from_utf8(binary.bytes.clone()).unwrap_or_default(),
        _ => String::new(),
    }
}

fn mac<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("hmac key");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[derive(Clone, Copy, Default, PartialEq)]
enum Hash {
    #[default]
    Sha1,
    Sha256,
}

impl Hash {
    fn hmac(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            Hash::Sha1 => mac::<Hmac<Sha1>>(key, data),
            Hash::Sha256 => mac::<Hmac<Sha256>>(key, data),
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Hash::Sha1 => Sha1::digest(data).to_vec(),
            Hash::Sha256 => Sha256::digest(data).to_vec(),
        }
    }

    fn salted(self, user: &str, password: &str) -> Vec<u8> {
        match self {
            Hash::Sha1 => {
                let hashed = Md5::digest(format!("{}:mongo:{}", user, password).as_bytes());
                let hex: String = hashed.iter().map(|b| format!("{:02x}", b)).collect();
                let mut out = vec![0u8; 20];
                pbkdf2::pbkdf2::<Hmac<Sha1>>(hex.as_bytes(), SALT, ITERATIONS, &mut out)
                    .expect("pbkdf2");
                out
            }
            Hash::Sha256 => {
                let mut out = vec![0u8; 32];
                pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), SALT, ITERATIONS, &mut out)
                    .expect("pbkdf2");
                out
            }
        }
    }
}

/// Server side of SCRAM-SHA-1 and SCRAM-SHA-256
#[derive(Default)]
struct ScramServer {
    hash: Hash,
    user: String,
    client_first_bare: String,
    server_first: String,
    password: String,
    verified: bool,
}

impl ScramServer {
    fn start(&mut self, config: &NodeConfig, command: &Document) -> Document {
        self.hash = match command.get_str("mechanism") {
            Ok("SCRAM-SHA-1") => Hash::Sha1,
            Ok("SCRAM-SHA-256") => Hash::Sha256,
            _ => {
                return doc! { "ok": 0.0, "errmsg": "Received authentication for mechanism which is not enabled", "code": 334 }
            }
        };

        let message = payload(command);
        let bare = message.strip_prefix("n,,").unwrap_or_default();
        let mut user = "";
        let mut client_nonce = "";
        for part in bare.split(',') {
            if let Some(v) = part.strip_prefix("n=") {
                user = v;
            } else if let Some(v) = part.strip_prefix("r=") {
                client_nonce = v;
            }
        }

        let password = match &config.user {
            Some((expected, password)) if expected == user => password.clone(),
            _ => return auth_failed(),
        };

        self.user = user.to_string();
        self.client_first_bare = bare.to_string();
        self.password = password;
        self.server_first = format!(
            "r={}srvnonce,s={},i={}",
            client_nonce,
            BASE64.encode(SALT),
            ITERATIONS
        );
        doc! {
            "conversationId": 1,
            "done": false,
            "payload": binary(self.server_first.clone()),
            "ok": 1.0,
        }
    }

    fn next(&mut self, command: &Document) -> Document {
        let message = payload(command);
        if self.verified {
            return doc! { "conversationId": 1, "done": true, "payload": binary(Vec::<u8>::new()), "ok": 1.0 };
        }

        let (without_proof, proof) = match message.rsplit_once(",p=") {
            Some(parts) => parts,
            None => return auth_failed(),
        };
        let proof = BASE64.decode(proof).unwrap_or_default();

        let hash = self.hash;
        let salted = hash.salted(&self.user, &self.password);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare, self.server_first, without_proof
        );

        let client_key = hash.hmac(&salted, b"Client Key");
        let stored_key = hash.digest(&client_key);
        let client_signature = hash.hmac(&stored_key, auth_message.as_bytes());
        let expected: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(a, b)| a ^ b)
            .collect();
        if proof != expected {
            return auth_failed();
        }

        self.verified = true;
        let server_key = hash.hmac(&salted, b"Server Key");
        let signature = hash.hmac(&server_key, auth_message.as_bytes());
        doc! {
            "conversationId": 1,
            "done": false,
            "payload": binary(format!("v={}", BASE64.encode(signature))),
            "ok": 1.0,
        }
    }
}

/// Routes candidate host names to loopback nodes.
///
/// Candidates share one port, so distinct mock nodes are told apart by
/// host name instead.
#[derive(Default)]
pub struct RoutedSocketFactory {
    routes: HashMap<String, MockNode>,
    // Hold each dial until the previously dialed node saw all its sockets close
    wait_for_release: Option<Duration>,
    last_dialed: Mutex<Option<MockNode>>,
}

impl RoutedSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, host: &str, node: &MockNode) -> Self {
        self.routes.insert(host.to_string(), node.clone());
        self
    }

    /// Before each dial, wait up to `within` for the previous node to see
    /// its connections closed. A socket released after the next dial then
    /// shows up as a close timestamp later than the next accept.
    pub fn wait_for_release(mut self, within: Duration) -> Self {
        self.wait_for_release = Some(within);
        self
    }
}

#[async_trait]
impl SocketFactory for RoutedSocketFactory {
    async fn create_socket(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        _secure: bool,
    ) -> Result<Transport> {
        let node = match self.routes.get(host) {
            Some(node) => node.clone(),
            None => {
                return Err(Error::Connect {
                    host: host.to_string(),
                    port,
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "no route"),
                })
            }
        };

        if let Some(within) = self.wait_for_release {
            let previous = self.last_dialed.lock().expect("lock").replace(node.clone());
            if let Some(previous) = previous {
                previous.wait_all_closed(within).await;
            }
        }

        Transport::connect_tcp(&node.addr.ip().to_string(), node.addr.port(), connect_timeout).await
    }
}
