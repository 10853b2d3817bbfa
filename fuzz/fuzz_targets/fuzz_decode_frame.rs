#![no_main]

use bytes::{Buf, BytesMut};
use libfuzzer_sys::fuzz_target;
use mongo_wire::protocol::{decode_reply, decode_request};

fuzz_target!(|data: &[u8]| {
    // Replies may arrive back to back in one read
    let mut buf = BytesMut::from(data);
    while !buf.is_empty() {
        match decode_reply(&buf) {
            Ok(Some((_, consumed))) if consumed > 0 => buf.advance(consumed),
            _ => break,
        }
    }

    let _ = decode_request(data);
});
