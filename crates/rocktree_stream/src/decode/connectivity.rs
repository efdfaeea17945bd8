//! Index stream decoding and normalization to triangle lists.
//!
//! Indices arrive as a varint count followed by "high-water" coded varints:
//! a 0 introduces the next unseen vertex, any other value `d` refers back to
//! vertex `next - d`. Whether the stream is a strip or a list is resolved
//! once, at decode time.

use serde::Deserialize;

use crate::error::{DecodeError, DecodeResult};

use super::wire::read_varint;

/// How the index stream should be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexEncoding {
  /// Triangle strip with alternating winding (rocktree default).
  #[default]
  Strip,
  /// Plain triangle list.
  List,
}

/// Decoded connectivity before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Connectivity {
  Strip(Vec<u16>),
  List(Vec<u16>),
}

impl Connectivity {
  pub fn indices(&self) -> &[u16] {
    match self {
      Self::Strip(indices) | Self::List(indices) => indices,
    }
  }

  /// Keep only the first `len` entries (renderable layers).
  pub fn truncate(&mut self, len: usize) {
    match self {
      Self::Strip(indices) => indices.truncate(len),
      // Lists keep whole triangles.
      Self::List(indices) => indices.truncate(len - len % 3),
    }
  }

  /// Normalize into a triangle list, validating every index.
  pub fn into_triangle_list(self, vertex_count: usize) -> DecodeResult<Vec<u32>> {
    let indices = match self {
      Self::Strip(strip) => strip_to_triangles(&strip),
      Self::List(list) => {
        if list.len() % 3 != 0 {
          return Err(DecodeError::malformed(
            "indices",
            format!("list length {} is not a multiple of 3", list.len()),
          ));
        }
        list.into_iter().map(u32::from).collect()
      }
    };
    if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
      return Err(DecodeError::malformed(
        "indices",
        format!("index {bad} out of range for {vertex_count} vertices"),
      ));
    }
    Ok(indices)
  }
}

/// Decode the high-water coded index stream.
pub fn unpack_indices(packed: &[u8], encoding: IndexEncoding) -> DecodeResult<Connectivity> {
  let mut offset = 0;
  let len = read_varint(packed, &mut offset)? as usize;
  // Every entry takes at least one byte.
  if len > packed.len() {
    return Err(DecodeError::Truncated("indices"));
  }
  let mut indices = Vec::with_capacity(len);
  let mut zeros = 0u32;
  for _ in 0..len {
    let value = read_varint(packed, &mut offset)?;
    let index = u64::from(zeros)
      .checked_sub(value)
      .ok_or_else(|| DecodeError::malformed("indices", format!("back-reference {value} exceeds {zeros}")))?;
    let index = u16::try_from(index).map_err(|_| DecodeError::malformed("indices", "index exceeds u16"))?;
    indices.push(index);
    if value == 0 {
      zeros += 1;
    }
  }
  Ok(match encoding {
    IndexEncoding::Strip => Connectivity::Strip(indices),
    IndexEncoding::List => Connectivity::List(indices),
  })
}

/// Convert a strip into a list, dropping degenerate triangles.
pub fn strip_to_triangles(strip: &[u16]) -> Vec<u32> {
  let mut out = Vec::with_capacity(strip.len().saturating_sub(2) * 3);
  for i in 2..strip.len() {
    let (a, b, c) = (strip[i - 2], strip[i - 1], strip[i]);
    if a == b || b == c || a == c {
      continue;
    }
    if i % 2 == 0 {
      out.extend([u32::from(a), u32::from(b), u32::from(c)]);
    } else {
      out.extend([u32::from(a), u32::from(c), u32::from(b)]);
    }
  }
  out
}

/// Encode indices with high-water coding (inverse of `unpack_indices`).
///
/// Each new vertex must be introduced in order (index == count seen so far).
pub fn pack_indices(indices: &[u16]) -> Vec<u8> {
  let mut values = Vec::with_capacity(indices.len() + 1);
  values.push(indices.len() as u64);
  let mut zeros = 0u64;
  for &index in indices {
    let index = u64::from(index);
    if index == zeros {
      values.push(0);
      zeros += 1;
    } else {
      debug_assert!(index < zeros, "vertex {index} introduced out of order");
      values.push(zeros - index);
    }
  }
  super::wire::encode_varints(&values)
}
