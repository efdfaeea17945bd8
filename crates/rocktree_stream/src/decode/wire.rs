//! Protocol-buffer wire format primitives.
//!
//! Rocktree packets are plain protobuf messages. `WireReader` walks fields and
//! skips anything it does not recognise by its declared length, so newer
//! server fields never break decoding. `WireWriter` produces the same format
//! and is used to build fixtures and benchmark inputs.

use crate::error::{DecodeError, DecodeResult};

/// Protobuf wire types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireType {
  Varint,
  Fixed64,
  LengthDelimited,
  StartGroup,
  EndGroup,
  Fixed32,
}

impl WireType {
  fn from_bits(bits: u64) -> DecodeResult<Self> {
    Ok(match bits {
      0 => Self::Varint,
      1 => Self::Fixed64,
      2 => Self::LengthDelimited,
      3 => Self::StartGroup,
      4 => Self::EndGroup,
      5 => Self::Fixed32,
      other => return Err(DecodeError::malformed("tag", format!("wire type {other}"))),
    })
  }

  fn bits(self) -> u64 {
    match self {
      Self::Varint => 0,
      Self::Fixed64 => 1,
      Self::LengthDelimited => 2,
      Self::StartGroup => 3,
      Self::EndGroup => 4,
      Self::Fixed32 => 5,
    }
  }
}

/// Read a base-128 varint at `*offset`, advancing it.
pub fn read_varint(buf: &[u8], offset: &mut usize) -> DecodeResult<u64> {
  let mut value = 0u64;
  let mut shift = 0u32;
  loop {
    let byte = *buf.get(*offset).ok_or(DecodeError::Truncated("varint"))?;
    *offset += 1;
    if shift >= 64 {
      return Err(DecodeError::malformed("varint", "longer than 10 bytes"));
    }
    value |= u64::from(byte & 0x7f) << shift;
    if byte & 0x80 == 0 {
      return Ok(value);
    }
    shift += 7;
  }
}

/// Cursor over one protobuf message.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> WireReader<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self { buf, pos: 0 }
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.pos >= self.buf.len()
  }

  pub fn read_varint(&mut self) -> DecodeResult<u64> {
    read_varint(self.buf, &mut self.pos)
  }

  /// Next field tag, or None at end of message.
  pub fn read_tag(&mut self) -> DecodeResult<Option<(u32, WireType)>> {
    if self.is_empty() {
      return Ok(None);
    }
    let key = self.read_varint()?;
    let field = u32::try_from(key >> 3).map_err(|_| DecodeError::malformed("tag", "field number overflow"))?;
    if field == 0 {
      return Err(DecodeError::malformed("tag", "field number 0"));
    }
    Ok(Some((field, WireType::from_bits(key & 7)?)))
  }

  fn take(&mut self, len: usize, what: &'static str) -> DecodeResult<&'a [u8]> {
    let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated(what))?;
    let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::Truncated(what))?;
    self.pos = end;
    Ok(bytes)
  }

  pub fn read_bytes(&mut self) -> DecodeResult<&'a [u8]> {
    let len = self.read_varint()?;
    let len = usize::try_from(len).map_err(|_| DecodeError::Truncated("length-delimited field"))?;
    self.take(len, "length-delimited field")
  }

  pub fn read_u32(&mut self) -> DecodeResult<u32> {
    Ok(self.read_varint()? as u32)
  }

  pub fn read_fixed32(&mut self) -> DecodeResult<u32> {
    let bytes = self.take(4, "fixed32")?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
  }

  pub fn read_fixed64(&mut self) -> DecodeResult<u64> {
    let bytes = self.take(8, "fixed64")?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(raw))
  }

  pub fn read_f32(&mut self) -> DecodeResult<f32> {
    Ok(f32::from_bits(self.read_fixed32()?))
  }

  pub fn read_f64(&mut self) -> DecodeResult<f64> {
    Ok(f64::from_bits(self.read_fixed64()?))
  }

  /// Append a repeated double field, accepting packed or unpacked encoding.
  pub fn read_repeated_f64(&mut self, wire_type: WireType, out: &mut Vec<f64>) -> DecodeResult<()> {
    match wire_type {
      WireType::Fixed64 => out.push(self.read_f64()?),
      WireType::LengthDelimited => {
        let bytes = self.read_bytes()?;
        if bytes.len() % 8 != 0 {
          return Err(DecodeError::malformed("packed double", "length not a multiple of 8"));
        }
        let mut inner = WireReader::new(bytes);
        while !inner.is_empty() {
          out.push(inner.read_f64()?);
        }
      }
      other => return Err(DecodeError::malformed("packed double", format!("wire type {other:?}"))),
    }
    Ok(())
  }

  /// Append a repeated float field, accepting packed or unpacked encoding.
  pub fn read_repeated_f32(&mut self, wire_type: WireType, out: &mut Vec<f32>) -> DecodeResult<()> {
    match wire_type {
      WireType::Fixed32 => out.push(self.read_f32()?),
      WireType::LengthDelimited => {
        let bytes = self.read_bytes()?;
        if bytes.len() % 4 != 0 {
          return Err(DecodeError::malformed("packed float", "length not a multiple of 4"));
        }
        let mut inner = WireReader::new(bytes);
        while !inner.is_empty() {
          out.push(inner.read_f32()?);
        }
      }
      other => return Err(DecodeError::malformed("packed float", format!("wire type {other:?}"))),
    }
    Ok(())
  }

  /// Append a repeated varint field, accepting packed or unpacked encoding.
  pub fn read_repeated_u32(&mut self, wire_type: WireType, out: &mut Vec<u32>) -> DecodeResult<()> {
    match wire_type {
      WireType::Varint => out.push(self.read_u32()?),
      WireType::LengthDelimited => {
        let mut inner = WireReader::new(self.read_bytes()?);
        while !inner.is_empty() {
          out.push(inner.read_u32()?);
        }
      }
      other => return Err(DecodeError::malformed("packed varint", format!("wire type {other:?}"))),
    }
    Ok(())
  }

  /// Skip a field's payload given its wire type.
  pub fn skip(&mut self, field: u32, wire_type: WireType) -> DecodeResult<()> {
    match wire_type {
      WireType::Varint => {
        self.read_varint()?;
      }
      WireType::Fixed64 => {
        self.take(8, "fixed64")?;
      }
      WireType::Fixed32 => {
        self.take(4, "fixed32")?;
      }
      WireType::LengthDelimited => {
        self.read_bytes()?;
      }
      WireType::StartGroup => loop {
        match self.read_tag()? {
          Some((inner, WireType::EndGroup)) if inner == field => break,
          Some((_, WireType::EndGroup)) => {
            return Err(DecodeError::malformed("group", "mismatched end tag"));
          }
          Some((inner, inner_type)) => self.skip(inner, inner_type)?,
          None => return Err(DecodeError::Truncated("group")),
        }
      },
      WireType::EndGroup => return Err(DecodeError::malformed("group", "unexpected end tag")),
    }
    Ok(())
  }
}

// =============================================================================
// Writer
// =============================================================================

/// Minimal protobuf encoder.
#[derive(Clone, Debug, Default)]
pub struct WireWriter {
  buf: Vec<u8>,
}

impl WireWriter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn finish(self) -> Vec<u8> {
    self.buf
  }

  pub fn varint(&mut self, mut value: u64) -> &mut Self {
    loop {
      let byte = (value & 0x7f) as u8;
      value >>= 7;
      if value == 0 {
        self.buf.push(byte);
        return self;
      }
      self.buf.push(byte | 0x80);
    }
  }

  pub fn tag(&mut self, field: u32, wire_type: WireType) -> &mut Self {
    self.varint((u64::from(field) << 3) | wire_type.bits())
  }

  pub fn uint(&mut self, field: u32, value: u64) -> &mut Self {
    self.tag(field, WireType::Varint).varint(value)
  }

  pub fn bytes(&mut self, field: u32, data: &[u8]) -> &mut Self {
    self.tag(field, WireType::LengthDelimited).varint(data.len() as u64);
    self.buf.extend_from_slice(data);
    self
  }

  pub fn string(&mut self, field: u32, value: &str) -> &mut Self {
    self.bytes(field, value.as_bytes())
  }

  pub fn float(&mut self, field: u32, value: f32) -> &mut Self {
    self.tag(field, WireType::Fixed32);
    self.buf.extend_from_slice(&value.to_le_bytes());
    self
  }

  pub fn packed_doubles(&mut self, field: u32, values: &[f64]) -> &mut Self {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    self.bytes(field, &data)
  }

  pub fn packed_floats(&mut self, field: u32, values: &[f32]) -> &mut Self {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    self.bytes(field, &data)
  }

  /// Embed a nested message as a length-delimited field.
  pub fn message(&mut self, field: u32, inner: &WireWriter) -> &mut Self {
    self.bytes(field, &inner.buf)
  }
}

/// Encode a bare varint sequence (used by index and count streams).
pub fn encode_varints(values: &[u64]) -> Vec<u8> {
  let mut writer = WireWriter::new();
  for &value in values {
    writer.varint(value);
  }
  writer.finish()
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;
