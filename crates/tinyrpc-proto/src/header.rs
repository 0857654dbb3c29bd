//! Request and response headers.
//!
//! Field order is serialization order; fixed-width integers are
//! little-endian; strings are varint-length-prefixed raw bytes. Each header
//! travels in its own frame, so parsers always know where a header ends.
//!
//! Unmarshal is total: truncated input and varint overruns yield
//! [`ProtocolError::CorruptHeader`] and leave the destination zero-valued.
//! A corrupt frame can never panic the process.
//!
//! The codecs reuse one header instance per direction and reset it before
//! every parse, so a reused instance never leaks fields from a previous
//! message.

use crate::errors::{ProtocolError, Result};
use crate::wire;

const U16_LEN: usize = 2;
const U32_LEN: usize = 4;

/// Metadata preceding a request body.
///
/// Wire layout:
/// `CompressType:u16le | len(Method):uvarint | Method:bytes | Id:uvarint |
/// RequestLen:uvarint | Checksum:u32le [| Deadline:uvarint]`
///
/// The deadline is absolute unix milliseconds with 0 meaning none; marshal
/// emits the field only when it is nonzero and unmarshal reads it only if
/// bytes remain after the checksum, so deadline-free headers keep their
/// historical byte-exact encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestHeader {
    /// Wire id of the body's compression algorithm.
    pub compress_type: u16,
    /// Dotted `"Service.Method"` target.
    pub method: String,
    /// Client-chosen request identifier, echoed by the response.
    pub id: u64,
    /// Length of the compressed body in bytes.
    pub request_len: u32,
    /// IEEE CRC-32 of the compressed body; 0 disables verification.
    pub checksum: u32,
    /// Absolute call deadline in unix milliseconds; 0 means none.
    pub deadline_ms: u64,
}

impl RequestHeader {
    /// Serialize in field order.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            U16_LEN + U32_LEN + self.method.len() + 4 * wire::MAX_VARINT_LEN,
        );
        buf.extend_from_slice(&self.compress_type.to_le_bytes());
        wire::put_uvarint(&mut buf, self.method.len() as u64);
        buf.extend_from_slice(self.method.as_bytes());
        wire::put_uvarint(&mut buf, self.id);
        wire::put_uvarint(&mut buf, u64::from(self.request_len));
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        if self.deadline_ms != 0 {
            wire::put_uvarint(&mut buf, self.deadline_ms);
        }
        buf
    }

    /// Parse from `data`, replacing every field.
    ///
    /// On failure the header is left zero-valued.
    pub fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        self.reset();
        let mut fields = FieldReader::new(data);
        let parsed = self.unmarshal_fields(&mut fields);
        if parsed.is_err() {
            self.reset();
        }
        parsed
    }

    fn unmarshal_fields(&mut self, fields: &mut FieldReader<'_>) -> Result<()> {
        self.compress_type = fields.u16_le()?;
        self.method = fields.string()?;
        self.id = fields.uvarint()?;
        self.request_len = fields.u32_varint()?;
        self.checksum = fields.u32_le()?;
        if !fields.is_empty() {
            self.deadline_ms = fields.uvarint()?;
        }
        Ok(())
    }

    /// Zero every field.
    pub fn reset(&mut self) {
        self.compress_type = 0;
        self.method.clear();
        self.id = 0;
        self.request_len = 0;
        self.checksum = 0;
        self.deadline_ms = 0;
    }
}

/// Metadata preceding a response body.
///
/// Wire layout:
/// `CompressType:u16le | Id:uvarint | len(Error):uvarint | Error:bytes |
/// ResponseLen:uvarint | Checksum:u32le`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHeader {
    /// Wire id of the body's compression algorithm, echoing the request.
    pub compress_type: u16,
    /// Request identifier this response answers.
    pub id: u64,
    /// Error text; empty means success.
    pub error: String,
    /// Length of the compressed body in bytes.
    pub response_len: u32,
    /// IEEE CRC-32 of the compressed body; 0 disables verification.
    pub checksum: u32,
}

impl ResponseHeader {
    /// Serialize in field order.
    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            U16_LEN + U32_LEN + self.error.len() + 3 * wire::MAX_VARINT_LEN,
        );
        buf.extend_from_slice(&self.compress_type.to_le_bytes());
        wire::put_uvarint(&mut buf, self.id);
        wire::put_uvarint(&mut buf, self.error.len() as u64);
        buf.extend_from_slice(self.error.as_bytes());
        wire::put_uvarint(&mut buf, u64::from(self.response_len));
        buf.extend_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Parse from `data`, replacing every field.
    ///
    /// On failure the header is left zero-valued.
    pub fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        self.reset();
        let mut fields = FieldReader::new(data);
        let parsed = self.unmarshal_fields(&mut fields);
        if parsed.is_err() {
            self.reset();
        }
        parsed
    }

    fn unmarshal_fields(&mut self, fields: &mut FieldReader<'_>) -> Result<()> {
        self.compress_type = fields.u16_le()?;
        self.id = fields.uvarint()?;
        self.error = fields.string()?;
        self.response_len = fields.u32_varint()?;
        self.checksum = fields.u32_le()?;
        Ok(())
    }

    /// Zero every field.
    pub fn reset(&mut self) {
        self.compress_type = 0;
        self.id = 0;
        self.error.clear();
        self.response_len = 0;
        self.checksum = 0;
    }
}

/// Bounds-checked cursor over a header frame's payload.
struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(ProtocolError::CorruptHeader)?;
        let slice = self.data.get(self.pos..end).ok_or(ProtocolError::CorruptHeader)?;
        self.pos = end;
        Ok(slice)
    }

    fn u16_le(&mut self) -> Result<u16> {
        let bytes: [u8; U16_LEN] =
            self.take(U16_LEN)?.try_into().map_err(|_| ProtocolError::CorruptHeader)?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn u32_le(&mut self) -> Result<u32> {
        let bytes: [u8; U32_LEN] =
            self.take(U32_LEN)?.try_into().map_err(|_| ProtocolError::CorruptHeader)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn uvarint(&mut self) -> Result<u64> {
        let rest = self.data.get(self.pos..).ok_or(ProtocolError::CorruptHeader)?;
        let (value, consumed) = wire::uvarint(rest)?;
        self.pos += consumed;
        Ok(value)
    }

    fn u32_varint(&mut self) -> Result<u32> {
        u32::try_from(self.uvarint()?).map_err(|_| ProtocolError::CorruptHeader)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.uvarint()?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::CorruptHeader)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::CorruptHeader)
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}
