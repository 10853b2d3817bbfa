//! Transport abstraction (TCP with optional TLS) and the socket factory

use super::tls::{parse_server_name, TlsConfig};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Stream variant: plain or TLS-encrypted
#[allow(clippy::large_enum_variant)]
pub enum StreamVariant {
    /// Plain TCP connection
    Plain(TcpStream),
    /// TLS-encrypted TCP connection
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl std::fmt::Debug for StreamVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamVariant::Plain(_) => f.write_str("StreamVariant::Plain(TcpStream)"),
            StreamVariant::Tls(_) => f.write_str("StreamVariant::Tls(TlsStream)"),
        }
    }
}

impl StreamVariant {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            StreamVariant::Plain(stream) => stream.write_all(buf).await,
            StreamVariant::Tls(stream) => stream.write_all(buf).await,
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        match self {
            StreamVariant::Plain(stream) => stream.flush().await,
            StreamVariant::Tls(stream) => stream.flush().await,
        }
    }

    async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            StreamVariant::Plain(stream) => stream.read_buf(buf).await,
            StreamVariant::Tls(stream) => stream.read_buf(buf).await,
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            StreamVariant::Plain(stream) => stream.shutdown().await,
            StreamVariant::Tls(stream) => stream.shutdown().await,
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            StreamVariant::Plain(stream) => stream,
            StreamVariant::Tls(stream) => stream.get_ref().0,
        }
    }
}

/// An open candidate socket
#[derive(Debug)]
pub struct Transport {
    stream: StreamVariant,
    peer_addr: SocketAddr,
    socket_timeout: Option<Duration>,
}

impl Transport {
    /// Adopt an already-connected TCP stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        Self::from_variant(StreamVariant::Plain(stream))
    }

    fn from_variant(stream: StreamVariant) -> Result<Self> {
        let peer_addr = stream.tcp().peer_addr()?;
        Ok(Self {
            stream,
            peer_addr,
            socket_timeout: None,
        })
    }

    /// Connect via plain TCP, bounded by `connect_timeout` when set
    pub async fn connect_tcp(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let stream = with_deadline(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|e| Error::connect(host, port, e))?;
        Self::from_variant(StreamVariant::Plain(stream))
    }

    /// Connect via TLS-encrypted TCP.
    ///
    /// The deadline covers both the TCP connect and the TLS handshake.
    pub async fn connect_tcp_tls(
        host: &str,
        port: u16,
        tls_config: &TlsConfig,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let server_name = parse_server_name(host)?;
        let server_name = rustls_pki_types::ServerName::try_from(server_name)
            .map_err(|_| Error::Config(format!("Invalid hostname for TLS: {}", host)))?;
        let tls_connector = tokio_rustls::TlsConnector::from(tls_config.client_config());

        let handshake = async {
            let tcp_stream = TcpStream::connect((host, port)).await?;
            tls_connector.connect(server_name, tcp_stream).await
        };
        let tls_stream = with_deadline(connect_timeout, handshake)
            .await
            .map_err(|e| Error::connect(host, port, e))?;

        tracing::debug!(host, port, "TLS connection established");
        Self::from_variant(StreamVariant::Tls(tls_stream))
    }

    /// Peer address recorded when the socket was opened
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether the stream is TLS-encrypted
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, StreamVariant::Tls(_))
    }

    /// Bound every subsequent write and read by `timeout` (`None` = unbounded)
    pub fn set_socket_timeout(&mut self, timeout: Option<Duration>) {
        self.socket_timeout = timeout.filter(|t| !t.is_zero());
    }

    /// Current send/receive timeout
    pub fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout
    }

    /// Write bytes to the transport
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let timeout = self.socket_timeout;
        bounded(timeout, self.stream.write_all(buf)).await
    }

    /// Flush the transport
    pub async fn flush(&mut self) -> Result<()> {
        let timeout = self.socket_timeout;
        bounded(timeout, self.stream.flush()).await
    }

    /// Read bytes into buffer
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let timeout = self.socket_timeout;
        bounded(timeout, self.stream.read_buf(buf)).await
    }

    /// Shutdown the transport
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

// Connect-phase deadline: expiry surfaces as an io::ErrorKind::TimedOut
async fn with_deadline<T, F>(deadline: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline.filter(|d| !d.is_zero()) {
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", d),
            )),
        },
        None => fut.await,
    }
}

// Established-socket deadline: expiry surfaces as Error::Timeout
async fn bounded<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| Error::Timeout(d))?
            .map_err(Error::from),
        None => Ok(fut.await?),
    }
}

/// Opens candidate sockets.
///
/// Implementations must be stateless with respect to the candidates they
/// open: the result depends only on the arguments.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Open a socket to `host:port`, upgrading to TLS when `secure` is set.
    ///
    /// Fails with [`Error::Connect`] on resolution, connect, handshake or
    /// deadline failure.
    async fn create_socket(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        secure: bool,
    ) -> Result<Transport>;
}

/// Default socket factory backed by tokio TCP and rustls
#[derive(Debug, Clone, Default)]
pub struct TcpSocketFactory {
    tls: Option<TlsConfig>,
}

impl TcpSocketFactory {
    /// Factory using the system roots for TLS sockets
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory using a specific TLS configuration for TLS sockets
    pub fn with_tls(tls: TlsConfig) -> Self {
        Self { tls: Some(tls) }
    }
}

#[async_trait]
impl SocketFactory for TcpSocketFactory {
    async fn create_socket(
        &self,
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        secure: bool,
    ) -> Result<Transport> {
        if !secure {
            return Transport::connect_tcp(host, port, connect_timeout).await;
        }
        match &self.tls {
            Some(tls) => Transport::connect_tcp_tls(host, port, tls, connect_timeout).await,
            None => {
                let tls = TlsConfig::builder().build()?;
                Transport::connect_tcp_tls(host, port, &tls, connect_timeout).await
            }
        }
    }
}
