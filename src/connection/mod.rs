//! Connection management
//!
//! This module handles:
//! * Opening candidate sockets (plain TCP or TLS) through a [`SocketFactory`]
//! * Connection lifecycle (unconnected, connected, closed)
//! * The message transport surface (`send`, `send_and_receive`)

mod conn;
mod state;
mod tls;
mod transport;

pub use conn::Connection;
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig, TlsConfigBuilder};
pub use transport::{SocketFactory, StreamVariant, TcpSocketFactory, Transport};
