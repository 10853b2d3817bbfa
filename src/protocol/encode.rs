//! Protocol message encoding

use super::constants::{op_codes, MAX_MESSAGE_LENGTH};
use super::message::{CommandReply, CommandRequest, Document};
use super::RequestMessage;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};

impl RequestMessage for CommandRequest {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        encode_request(self, buf)
    }
}

/// Encode a command request frame
pub fn encode_request(req: &CommandRequest, buf: &mut BytesMut) -> Result<()> {
    let start = begin_frame(buf, req.request_id, 0, op_codes::QUERY);

    // Query flags
    buf.put_i32_le(0);
    put_cstring(buf, &req.namespace())?;
    // numberToSkip, numberToReturn
    buf.put_i32_le(0);
    buf.put_i32_le(1);
    put_document(buf, &req.command)?;

    finish_frame(buf, start)
}

/// Encode a reply frame answering `response_to`
pub fn encode_reply(reply: &CommandReply, response_to: i32, buf: &mut BytesMut) -> Result<()> {
    let request_id = super::message::next_request_id();
    let start = begin_frame(buf, request_id, response_to, op_codes::REPLY);

    buf.put_i32_le(reply.flags);
    // cursorID, startingFrom
    buf.put_i64_le(0);
    buf.put_i32_le(0);
    buf.put_i32_le(reply.documents.len() as i32);
    for doc in &reply.documents {
        put_document(buf, doc)?;
    }

    finish_frame(buf, start)
}

fn begin_frame(buf: &mut BytesMut, request_id: i32, response_to: i32, op_code: i32) -> usize {
    let start = buf.len();
    // Length placeholder, filled in by finish_frame
    buf.put_i32_le(0);
    buf.put_i32_le(request_id);
    buf.put_i32_le(response_to);
    buf.put_i32_le(op_code);
    start
}

fn finish_frame(buf: &mut BytesMut, start: usize) -> Result<()> {
    let len = buf.len() - start;
    if len > MAX_MESSAGE_LENGTH {
        return Err(Error::Protocol(format!(
            "message length {} exceeds maximum allowed {}",
            len, MAX_MESSAGE_LENGTH
        )));
    }
    buf[start..start + 4].copy_from_slice(&(len as i32).to_le_bytes());
    Ok(())
}

fn put_cstring(buf: &mut BytesMut, s: &str) -> Result<()> {
    if s.as_bytes().contains(&0) {
        return Err(Error::Protocol(format!(
            "string contains interior NUL: {:?}",
            s
        )));
    }
    buf.put(s.as_bytes());
    buf.put_u8(0);
    Ok(())
}

// BSON carries its own length prefix
fn put_document(buf: &mut BytesMut, doc: &Document) -> Result<()> {
    let mut body = Vec::new();
    doc.to_writer(&mut body)
        .map_err(|e| Error::Protocol(format!("failed to encode document: {}", e)))?;
    buf.put_slice(&body);
    Ok(())
}
