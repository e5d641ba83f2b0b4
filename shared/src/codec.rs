//! Typed field writers and readers for message bodies.
//!
//! Encode and decode for a given message type must touch fields in identical
//! order and width; the ordering is the wire format. Integers are written
//! big-endian. Strings are a u16 length followed by UTF-8 bytes and are
//! truncated to their declared field width on write, mirroring how the
//! fixed-size char arrays of the original protocol behaved; a declared
//! length beyond the field width on *read* is a protocol violation.

use crate::error::NetError;
use crate::message::{MsgType, NetMessage};

/// Builds a message body field by field. Obtain the finished envelope with
/// [`MessageWriter::end`]; size enforcement happens when the message is sent.
pub struct MessageWriter {
    msg: NetMessage,
}

impl MessageWriter {
    pub fn begin(msg_type: MsgType, destination: u8) -> Self {
        MessageWriter {
            msg: NetMessage::new(msg_type, destination),
        }
    }

    /// Begin with an arbitrary type byte (game-layer traffic).
    pub fn begin_raw(msg_type: u8, destination: u8) -> Self {
        MessageWriter {
            msg: NetMessage::new_raw(msg_type, destination),
        }
    }

    pub fn u8(&mut self, value: u8) {
        self.msg.body.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.msg.body.extend_from_slice(&value.to_be_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.msg.body.extend_from_slice(&value.to_be_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.msg.body.extend_from_slice(&value.to_be_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.msg.body.extend_from_slice(&value.to_be_bytes());
    }

    pub fn bool(&mut self, value: bool) {
        self.u8(value as u8);
    }

    /// Writes at most `max` bytes of `value`, truncated at a character
    /// boundary.
    pub fn string(&mut self, value: &str, max: usize) {
        let value = truncate_utf8(value, max);
        self.u16(value.len() as u16);
        self.msg.body.extend_from_slice(value.as_bytes());
    }

    pub fn bytes(&mut self, data: &[u8]) {
        self.u32(data.len() as u32);
        self.msg.body.extend_from_slice(data);
    }

    pub fn end(self) -> NetMessage {
        self.msg
    }
}

/// Reads a message body in the same field order it was written.
#[derive(Debug)]
pub struct MessageReader<'a> {
    body: &'a [u8],
    cursor: usize,
}

impl<'a> MessageReader<'a> {
    /// Fails with a decode-mismatch when the envelope type differs from what
    /// the caller expected to decode.
    pub fn begin(msg: &'a NetMessage, expected: MsgType) -> Result<Self, NetError> {
        Self::begin_raw(msg, expected as u8)
    }

    pub fn begin_raw(msg: &'a NetMessage, expected: u8) -> Result<Self, NetError> {
        if msg.raw_type() != expected {
            return Err(NetError::TypeMismatch {
                expected,
                found: msg.raw_type(),
            });
        }
        Ok(MessageReader {
            body: &msg.body,
            cursor: 0,
        })
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], NetError> {
        if self.cursor + count > self.body.len() {
            return Err(NetError::Truncated);
        }
        let slice = &self.body[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, NetError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, NetError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, NetError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self) -> Result<i32, NetError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, NetError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn bool(&mut self) -> Result<bool, NetError> {
        Ok(self.u8()? != 0)
    }

    pub fn string(&mut self, max: usize) -> Result<String, NetError> {
        let len = self.u16()? as usize;
        if len > max {
            return Err(NetError::Malformed("string length beyond field width"));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::Malformed("string is not valid utf-8"))
    }

    pub fn bytes(&mut self, max: usize) -> Result<Vec<u8>, NetError> {
        let len = self.u32()? as usize;
        if len > max {
            return Err(NetError::Malformed("blob length beyond field width"));
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Fails when fields remain unread, a sign the two sides disagree on
    /// the field order for this message type.
    pub fn end(self) -> Result<(), NetError> {
        if self.cursor != self.body.len() {
            return Err(NetError::Malformed("trailing bytes after final field"));
        }
        Ok(())
    }
}

fn truncate_utf8(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
