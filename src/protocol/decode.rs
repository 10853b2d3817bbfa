//! Protocol message decoding
//!
//! Decoders work on a borrowed byte slice and report how many bytes a complete
//! frame occupied, so callers can advance their read buffer. `Ok(None)` means
//! the frame is not complete yet.

use super::constants::{op_codes, COMMAND_NAMESPACE_SUFFIX, HEADER_LEN, MAX_MESSAGE_LENGTH};
use super::message::{CommandReply, CommandRequest, Document, MessageHeader};
use super::ResponseMessage;
use crate::{Error, Result};

impl ResponseMessage for CommandReply {
    fn decode(&mut self, data: &[u8]) -> Result<Option<usize>> {
        match decode_reply(data)? {
            Some((reply, consumed)) => {
                *self = reply;
                Ok(Some(consumed))
            }
            None => Ok(None),
        }
    }
}

/// Decode the message header, validating the declared length
pub fn decode_header(data: &[u8]) -> Result<Option<MessageHeader>> {
    if data.len() < HEADER_LEN {
        return Ok(None);
    }

    let mut reader = Reader::new(&data[..HEADER_LEN]);
    let header = MessageHeader {
        message_length: reader.i32()?,
        request_id: reader.i32()?,
        response_to: reader.i32()?,
        op_code: reader.i32()?,
    };

    let len = header.message_length;
    if len < HEADER_LEN as i32 || len as usize > MAX_MESSAGE_LENGTH {
        return Err(Error::Protocol(format!(
            "invalid message length {} (allowed {}..={})",
            len, HEADER_LEN, MAX_MESSAGE_LENGTH
        )));
    }

    Ok(Some(header))
}

/// Decode a reply frame
pub fn decode_reply(data: &[u8]) -> Result<Option<(CommandReply, usize)>> {
    let (header, body) = match split_frame(data)? {
        Some(frame) => frame,
        None => return Ok(None),
    };
    if header.op_code != op_codes::REPLY {
        return Err(Error::Protocol(format!(
            "expected reply op code {}, got {}",
            op_codes::REPLY,
            header.op_code
        )));
    }

    let mut reader = Reader::new(body);
    let flags = reader.i32()?;
    let _cursor_id = reader.i64()?;
    let _starting_from = reader.i32()?;
    let number_returned = reader.i32()?;
    if number_returned < 0 {
        return Err(Error::Protocol(format!(
            "negative document count {}",
            number_returned
        )));
    }

    let mut documents = Vec::new();
    for _ in 0..number_returned {
        documents.push(reader.document()?);
    }
    reader.finish()?;

    let reply = CommandReply {
        header: Some(header),
        flags,
        documents,
    };
    Ok(Some((reply, header.message_length as usize)))
}

/// Decode a command request frame (server side of the codec)
pub fn decode_request(data: &[u8]) -> Result<Option<(CommandRequest, usize)>> {
    let (header, body) = match split_frame(data)? {
        Some(frame) => frame,
        None => return Ok(None),
    };
    if header.op_code != op_codes::QUERY {
        return Err(Error::Protocol(format!(
            "expected query op code {}, got {}",
            op_codes::QUERY,
            header.op_code
        )));
    }

    let mut reader = Reader::new(body);
    let _flags = reader.i32()?;
    let namespace = reader.cstring()?;
    let _skip = reader.i32()?;
    let _limit = reader.i32()?;
    let command = reader.document()?;
    reader.finish()?;

    let database = namespace
        .strip_suffix(COMMAND_NAMESPACE_SUFFIX)
        .ok_or_else(|| Error::Protocol(format!("not a command namespace: {}", namespace)))?
        .to_string();

    let request = CommandRequest {
        request_id: header.request_id,
        database,
        command,
    };
    Ok(Some((request, header.message_length as usize)))
}

fn split_frame(data: &[u8]) -> Result<Option<(MessageHeader, &[u8])>> {
    let header = match decode_header(data)? {
        Some(header) => header,
        None => return Ok(None),
    };
    let len = header.message_length as usize;
    if data.len() < len {
        return Ok(None);
    }
    Ok(Some((header, &data[HEADER_LEN..len])))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < n {
            return Err(Error::Protocol(format!("truncated {}", what)));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4, "int32")?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> Result<i64> {
        let b = self.take(8, "int64")?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(i64::from_le_bytes(arr))
    }

    fn cstring(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Protocol("unterminated string".into()))?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string: {}", e)))?
            .to_string();
        self.pos += end + 1;
        Ok(s)
    }

    // The length prefix is part of the document and counts itself
    fn document(&mut self) -> Result<Document> {
        let start = self.pos;
        let len = self.i32()?;
        // Smallest document: length plus terminator
        if len < 5 {
            return Err(Error::Protocol(format!("invalid document length {}", len)));
        }
        self.pos = start;
        let mut bytes = self.take(len as usize, "document")?;
        Document::from_reader(&mut bytes)
            .map_err(|e| Error::Protocol(format!("malformed document: {}", e)))
    }

    fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::Protocol(format!(
                "{} trailing bytes after message body",
                self.data.len() - self.pos
            )));
        }
        Ok(())
    }
}
