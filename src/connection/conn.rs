//! Core connection type

use super::state::ConnectionState;
use super::transport::Transport;
use crate::client::Connector;
use crate::protocol::constants::{ADMIN_DATABASE, DEFAULT_PORT};
use crate::protocol::{CommandReply, CommandRequest, Document, RequestMessage, ResponseMessage};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;

/// A connection to one MongoDB node.
///
/// Owns at most one socket at a time. While connected, [`address`] equals the
/// peer address of that socket. All transport operations take `&mut self`, so
/// one connection cannot be driven from two tasks without external locking.
///
/// Dropping a connection closes its socket; nothing during drop can fail.
///
/// [`address`]: Connection::address
pub struct Connection {
    transport: Option<Transport>,
    address: Option<SocketAddr>,
    state: ConnectionState,
    auth_source: String,
    read_buf: BytesMut,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("state", &self.state)
            .field("auth_source", &self.auth_source)
            .finish()
    }
}

impl Connection {
    /// Create an unconnected connection
    pub fn new() -> Self {
        Self {
            transport: None,
            address: None,
            state: ConnectionState::Unconnected,
            auth_source: ADMIN_DATABASE.to_string(),
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    /// Wrap an already-open transport
    pub fn from_transport(transport: Transport) -> Result<Self> {
        let mut conn = Self::new();
        conn.install(transport)?;
        Ok(conn)
    }

    /// Connect directly to a resolved socket address
    pub async fn connect_addr(addr: SocketAddr) -> Result<Self> {
        let mut conn = Self::new();
        conn.connect(addr).await?;
        Ok(conn)
    }

    /// Connect directly to `host:port`
    pub async fn connect_host_port(host: &str, port: u16) -> Result<Self> {
        let mut conn = Self::new();
        conn.connect_host(host, port).await?;
        Ok(conn)
    }

    /// Connect directly to a `host[:port]` string (port defaults to 27017)
    pub async fn connect_host_and_port(host_and_port: &str) -> Result<Self> {
        let (host, port) = split_host_and_port(host_and_port)?;
        Self::connect_host_port(host, port).await
    }

    /// Run the full connection string algorithm with the given connector
    pub async fn connect_uri(uri: &str, connector: &Connector) -> Result<Self> {
        connector.connect(uri).await
    }

    /// (Re)connect this connection to `addr`.
    ///
    /// The new socket is dialed first. Only once it is open is the current
    /// socket, if any, shut down and replaced. If dialing fails the
    /// connection keeps its current socket, address and state untouched.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<()> {
        let host = addr.ip().to_string();
        let transport = Transport::connect_tcp(&host, addr.port(), None).await?;
        self.adopt(transport).await
    }

    /// (Re)connect this connection to `host:port`.
    ///
    /// Same ordering as [`connect`](Connection::connect): dial, then release
    /// the old socket. A failed dial leaves the existing socket in place.
    pub async fn connect_host(&mut self, host: &str, port: u16) -> Result<()> {
        let transport = Transport::connect_tcp(host, port, None).await?;
        self.adopt(transport).await
    }

    /// Replace the active socket with `transport`.
    ///
    /// The previous socket, if any, is shut down and released first.
    pub async fn adopt(&mut self, transport: Transport) -> Result<()> {
        self.release().await;
        self.install(transport)
    }

    fn install(&mut self, transport: Transport) -> Result<()> {
        self.state.transition(ConnectionState::Connected)?;
        self.address = Some(transport.peer_addr());
        self.transport = Some(transport);
        self.read_buf.clear();
        Ok(())
    }

    /// Best-effort release of the current socket; errors are discarded
    async fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            tracing::debug!(peer = %transport.peer_addr(), "releasing socket");
            let _ = transport.shutdown().await;
        }
    }

    /// Close the connection.
    ///
    /// Closing an unconnected or already closed connection is a no-op.
    /// Shutdown errors are returned to the caller; the socket is released
    /// either way.
    pub async fn close(&mut self) -> Result<()> {
        let transport = self.transport.take();
        if self.state == ConnectionState::Connected {
            self.state.transition(ConnectionState::Closed)?;
        }
        self.read_buf.clear();
        match transport {
            Some(mut transport) => {
                tracing::debug!(peer = %transport.peer_addr(), "closing connection");
                transport.shutdown().await
            }
            None => Ok(()),
        }
    }

    /// Peer address of the active socket (kept after close for diagnostics)
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a socket is attached
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Database the connection authenticated against
    pub fn auth_source(&self) -> &str {
        &self.auth_source
    }

    pub(crate) fn set_auth_source(&mut self, auth_source: impl Into<String>) {
        self.auth_source = auth_source.into();
    }

    /// Active transport, if connected
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }

    /// Mutable access to the active transport, e.g. to adjust timeouts
    pub fn transport_mut(&mut self) -> Option<&mut Transport> {
        self.transport.as_mut()
    }

    /// Serialize `request` onto the socket
    pub async fn send<R>(&mut self, request: &R) -> Result<()>
    where
        R: RequestMessage + ?Sized,
    {
        let mut buf = BytesMut::new();
        request.encode(&mut buf)?;
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
        transport.write_all(&buf).await?;
        transport.flush().await?;
        Ok(())
    }

    /// Send `request`, then read one reply into `response`
    pub async fn send_and_receive<R, S>(&mut self, request: &R, response: &mut S) -> Result<()>
    where
        R: RequestMessage + ?Sized,
        S: ResponseMessage + ?Sized,
    {
        self.send(request).await?;
        self.receive(response).await
    }

    /// Read one reply into `response`
    pub async fn receive<S>(&mut self, response: &mut S) -> Result<()>
    where
        S: ResponseMessage + ?Sized,
    {
        loop {
            if let Some(consumed) = response.decode(&self.read_buf)? {
                self.read_buf.advance(consumed);
                return Ok(());
            }

            // Need more data
            let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;
            let n = transport.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Run a command against `database` using the default command codec
    pub async fn run_command(&mut self, database: &str, command: Document) -> Result<CommandReply> {
        let request = CommandRequest::new(database, command);
        let mut reply = CommandReply::default();
        self.send_and_receive(&request, &mut reply).await?;

        if let Some(header) = reply.header {
            if header.response_to != request.request_id {
                return Err(Error::Protocol(format!(
                    "reply answers request {}, expected {}",
                    header.response_to, request.request_id
                )));
            }
        }
        Ok(reply)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Dropping the stream closes the socket
        if let Some(transport) = self.transport.take() {
            tracing::trace!(peer = %transport.peer_addr(), "dropping connection");
        }
    }
}

/// Split `host[:port]`, handling bracketed IPv6 literals
fn split_host_and_port(s: &str) -> Result<(&str, u16)> {
    let parse_port = |p: &str| {
        p.parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid port in '{}'", s)))
    };

    if let Some(rest) = s.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::Config(format!("unterminated IPv6 literal in '{}'", s)))?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, parse_port(port)?)),
            None if after.is_empty() => Ok((host, DEFAULT_PORT)),
            None => Err(Error::Config(format!("invalid address '{}'", s))),
        };
    }

    match s.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Ok((host, parse_port(port)?)),
        Some(_) => Err(Error::Config(format!("missing host in '{}'", s))),
        None if s.is_empty() => Err(Error::Config("empty address".into())),
        None => Ok((s, DEFAULT_PORT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_request, encode_reply};
    use bson::doc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_split_host_and_port() {
        assert_eq!(split_host_and_port("db1:27018").unwrap(), ("db1", 27018));
        assert_eq!(split_host_and_port("db1").unwrap(), ("db1", 27017));
        assert_eq!(split_host_and_port("[::1]:27019").unwrap(), ("::1", 27019));
        assert_eq!(split_host_and_port("[::1]").unwrap(), ("::1", 27017));
        assert!(split_host_and_port("db1:notaport").is_err());
        assert!(split_host_and_port(":27017").is_err());
        assert!(split_host_and_port("").is_err());
    }

    #[test]
    fn test_new_connection_is_unconnected() {
        let conn = Connection::new();
        assert_eq!(conn.state(), ConnectionState::Unconnected);
        assert!(conn.address().is_none());
        assert_eq!(conn.auth_source(), "admin");
    }

    #[tokio::test]
    async fn test_close_unconnected_is_noop() {
        let mut conn = Connection::new();
        assert!(conn.close().await.is_ok());
        assert_eq!(conn.state(), ConnectionState::Unconnected);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = Connection::connect_addr(addr).await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.address(), Some(addr));

        let _ = conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.close().await.is_ok());
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_send_when_unconnected_fails() {
        let mut conn = Connection::new();
        let result = conn.send(&CommandRequest::is_master()).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = Connection::connect_host_and_port(&format!("127.0.0.1:{}", addr.port()))
            .await
            .unwrap();
        let _ = conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        conn.connect(addr).await.unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.address(), Some(addr));
    }

    #[tokio::test]
    async fn test_adopt_replaces_socket_and_moves_to_connected() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second_addr = second.local_addr().unwrap();

        let transport = Transport::connect_tcp("127.0.0.1", first.local_addr().unwrap().port(), None)
            .await
            .unwrap();
        let mut conn = Connection::from_transport(transport).unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);

        let (mut old_peer, _) = first.accept().await.unwrap();
        let replacement = Transport::connect_tcp("127.0.0.1", second_addr.port(), None)
            .await
            .unwrap();
        conn.adopt(replacement).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.address(), Some(second_addr));

        // The replaced socket was shut down
        let mut byte = [0u8; 1];
        assert_eq!(old_peer.read(&mut byte).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_reconnect_keeps_current_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // A port with nothing listening
        let refused = {
            let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            spare.local_addr().unwrap()
        };

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            let request = loop {
                assert!(socket.read_buf(&mut buf).await.unwrap() > 0);
                if let Some((request, _)) = decode_request(&buf).unwrap() {
                    break request;
                }
            };
            let mut out = BytesMut::new();
            encode_reply(
                &CommandReply::with_documents(vec![doc! { "ok": 1.0 }]),
                request.request_id,
                &mut out,
            )
            .unwrap();
            socket.write_all(&out).await.unwrap();
        });

        let mut conn = Connection::connect_addr(addr).await.unwrap();
        assert!(conn.connect(refused).await.is_err());
        assert!(conn.connect_host("127.0.0.1", refused.port()).await.is_err());

        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_eq!(conn.address(), Some(addr));
        let reply = conn.run_command("admin", doc! { "ping": 1 }).await.unwrap();
        assert!(reply.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_command_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            let request = loop {
                socket.read_buf(&mut buf).await.unwrap();
                if let Some((request, _)) = decode_request(&buf).unwrap() {
                    break request;
                }
            };
            let doc = doc! { "ok": 1.0, "echo": request.command_name().unwrap_or_default() };
            let mut out = BytesMut::new();
            encode_reply(&CommandReply::with_documents(vec![doc]), request.request_id, &mut out)
                .unwrap();
            socket.write_all(&out).await.unwrap();
        });

        let mut conn = Connection::connect_addr(addr).await.unwrap();
        let reply = conn.run_command("admin", doc! { "ping": 1 }).await.unwrap();

        assert!(reply.is_ok());
        assert_eq!(reply.first().unwrap().get_str("echo").unwrap(), "ping");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_peer_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut conn = Connection::connect_addr(addr).await.unwrap();
        server.await.unwrap();
        let mut reply = CommandReply::default();
        let result = conn.receive(&mut reply).await;
        assert!(matches!(
            result,
            Err(Error::ConnectionClosed) | Err(Error::Io(_))
        ));
    }
}
