//! Wire protocol
//!
//! The connection layer only sees the [`RequestMessage`] and
//! [`ResponseMessage`] traits. This module also ships the default command
//! codec used by the role probe and the SCRAM authenticator: a standard
//! 16-byte little-endian header followed by length-prefixed JSON documents.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use decode::{decode_header, decode_reply, decode_request};
pub use encode::{encode_reply, encode_request};
pub use message::{CommandReply, CommandRequest, Document, MessageHeader};

use crate::Result;
use bytes::BytesMut;

/// A message that can be serialized onto the connection's output stream
pub trait RequestMessage {
    /// Append the complete frame to `buf`
    fn encode(&self, buf: &mut BytesMut) -> Result<()>;
}

/// A message that can be read back from the connection's input stream
pub trait ResponseMessage {
    /// Try to decode one complete frame from the front of `data`.
    ///
    /// Returns `Ok(None)` when more bytes are needed and `Ok(Some(n))` with
    /// the number of bytes consumed once the frame is complete.
    fn decode(&mut self, data: &[u8]) -> Result<Option<usize>>;
}
