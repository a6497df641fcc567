//! Protobuf wire-format primitives.
//!
//! Only the subset needed by the companion-app messages is implemented:
//! base-128 varints, length-delimited fields and skipping of anything else.
//!
//! ```text
//! field key   = (field_number << 3) | wire_type      (varint)
//! varint      = 7 bits per byte, little-endian groups, MSB = continuation
//! len-delim   = varint length followed by that many bytes
//! ```

use crate::protocol::codec::ProtocolError;

/// Maximum number of bytes a 64-bit varint can occupy.
const MAX_VARINT_LEN: usize = 10;

/// Protobuf wire types understood by [`FieldReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn from_bits(bits: u64) -> Result<Self, ProtocolError> {
        match bits {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            // 3 and 4 are the deprecated group markers.
            other => Err(ProtocolError::UnsupportedWireType(other as u8)),
        }
    }

    fn bits(self) -> u64 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

// ── Writing ───────────────────────────────────────────────────────────────────

pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

pub fn write_key(buf: &mut Vec<u8>, field: u32, wire_type: WireType) {
    write_varint(buf, (u64::from(field) << 3) | wire_type.bits());
}

pub fn write_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    write_key(buf, field, WireType::Varint);
    write_varint(buf, value);
}

/// Writes an `int32` field. Negative values are sign-extended to ten bytes,
/// matching what every protobuf runtime emits.
pub fn write_int32_field(buf: &mut Vec<u8>, field: u32, value: i32) {
    write_varint_field(buf, field, i64::from(value) as u64);
}

pub fn write_bool_field(buf: &mut Vec<u8>, field: u32, value: bool) {
    write_varint_field(buf, field, u64::from(value));
}

pub fn write_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    write_key(buf, field, WireType::LengthDelimited);
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

// ── Reading ───────────────────────────────────────────────────────────────────

/// Cursor over the fields of one encoded message.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Reads the next field key, or `None` once the buffer is exhausted.
    pub fn next_key(&mut self) -> Result<Option<(u32, WireType)>, ProtocolError> {
        if self.is_empty() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let field = (key >> 3) as u32;
        if field == 0 {
            return Err(ProtocolError::MalformedPayload(
                "field number 0 is reserved".to_string(),
            ));
        }
        Ok(Some((field, WireType::from_bits(key & 0x07)?)))
    }

    pub fn read_varint(&mut self) -> Result<u64, ProtocolError> {
        let mut value: u64 = 0;
        for index in 0..MAX_VARINT_LEN {
            let byte = *self.buf.get(self.pos).ok_or(ProtocolError::InsufficientData {
                needed: self.pos + 1,
                available: self.buf.len(),
            })?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::MalformedPayload(
            "varint longer than 10 bytes".to_string(),
        ))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        // Protobuf truncates oversized uint32 values; do the same.
        Ok(self.read_varint()? as u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.read_varint()? as i32)
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_varint()? != 0)
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_varint()? as usize;
        let end = self.pos.checked_add(len).ok_or_else(|| {
            ProtocolError::MalformedPayload(format!("length {len} overflows the buffer"))
        })?;
        if end > self.buf.len() {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared: len,
                available: self.buf.len() - self.pos,
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 string: {e}")))
    }

    /// Skips over a field value of the given wire type.
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), ProtocolError> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::Fixed64 => self.advance(8)?,
            WireType::Fixed32 => self.advance(4)?,
        }
        Ok(())
    }

    fn advance(&mut self, count: usize) -> Result<(), ProtocolError> {
        if self.buf.len() - self.pos < count {
            return Err(ProtocolError::InsufficientData {
                needed: self.pos + count,
                available: self.buf.len(),
            });
        }
        self.pos += count;
        Ok(())
    }
}
