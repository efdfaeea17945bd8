//! Per-vertex attribute streams of a rocktree mesh.
//!
//! Positions, texture coordinates and normals are stored as byte planes
//! (all x bytes, then all y bytes, ...) with delta coding. Everything here is
//! pure: the same input bytes always produce bit-identical output.

use glam::{DMat3, DMat4, DVec3, Vec2};

use crate::constants::{LAYER_BOUNDS_LEN, NORMAL_BIAS};
use crate::error::{DecodeError, DecodeResult};
use crate::octree::OrientedBoundingBox;

use super::wire::read_varint;

/// Integer vertex position in the node-local quantization grid.
pub type QuantizedPosition = [u32; 3];

/// Unpack delta-coded position planes (x, y, z) into grid coordinates.
pub fn unpack_positions(packed: &[u8]) -> DecodeResult<Vec<QuantizedPosition>> {
  if packed.len() % 3 != 0 {
    return Err(DecodeError::malformed(
      "vertices",
      format!("length {} is not a multiple of 3", packed.len()),
    ));
  }
  let count = packed.len() / 3;
  let (xs, rest) = packed.split_at(count);
  let (ys, zs) = rest.split_at(count);

  let (mut x, mut y, mut z) = (0u8, 0u8, 0u8);
  let mut out = Vec::with_capacity(count);
  for i in 0..count {
    x = x.wrapping_add(xs[i]);
    y = y.wrapping_add(ys[i]);
    z = z.wrapping_add(zs[i]);
    out.push([u32::from(x), u32::from(y), u32::from(z)]);
  }
  Ok(out)
}

/// Maps grid coordinates to globe space.
///
/// Applied exactly once per vertex. Output positions are relative to
/// `origin` so they fit in f32 without losing planet-scale precision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dequantizer {
  pub origin: DVec3,
  pub linear: DMat3,
}

impl Dequantizer {
  /// From the column-major `matrix_globe_from_mesh` sent with node data.
  pub fn from_globe_matrix(values: &[f64]) -> DecodeResult<Self> {
    let cols: [f64; 16] = values.try_into().map_err(|_| {
      DecodeError::malformed(
        "matrix_globe_from_mesh",
        format!("expected 16 values, got {}", values.len()),
      )
    })?;
    let matrix = DMat4::from_cols_array(&cols);
    Ok(Self {
      origin: matrix.w_axis.truncate(),
      linear: DMat3::from_mat4(matrix),
    })
  }

  /// Fallback when no matrix is sent: the grid spans the box's full extent.
  pub fn from_extent(obb: &OrientedBoundingBox, bits: u8) -> Self {
    let steps = ((1u64 << bits) - 1) as f64;
    let scale = obb.extents * 2.0 / steps;
    Self {
      origin: obb.min_corner(),
      linear: obb.orientation * DMat3::from_diagonal(scale),
    }
  }

  #[inline]
  pub fn local(&self, q: QuantizedPosition) -> [f32; 3] {
    let v = self.linear * DVec3::new(f64::from(q[0]), f64::from(q[1]), f64::from(q[2]));
    [v.x as f32, v.y as f32, v.z as f32]
  }
}

/// Texture coordinate transform applied after unpacking: `(uv + offset) * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvTransform {
  pub offset: Vec2,
  pub scale: Vec2,
}

impl UvTransform {
  #[inline]
  pub fn apply(&self, uv: [u16; 2]) -> [f32; 2] {
    let u = (f32::from(uv[0]) + self.offset.x) * self.scale.x;
    let v = (f32::from(uv[1]) + self.offset.y) * self.scale.y;
    [u, v]
  }
}

/// Unpack texture coordinates for `count` vertices.
///
/// The header holds two u16 moduli (minus one), followed by four planes:
/// u low, v low, u high, v high. Coordinates accumulate modulo the moduli.
/// The returned transform has the v axis flipped, which is what the server
/// expects when the mesh carries no explicit `uv_offset_and_scale`.
pub fn unpack_tex_coords(packed: &[u8], count: usize) -> DecodeResult<(Vec<[u16; 2]>, UvTransform)> {
  if packed.len() < 4 || packed.len() != 4 + count * 4 {
    return Err(DecodeError::malformed(
      "texture_coords",
      format!("length {} does not match {} vertices", packed.len(), count),
    ));
  }
  let u_mod = 1 + u32::from(u16::from_le_bytes([packed[0], packed[1]]));
  let v_mod = 1 + u32::from(u16::from_le_bytes([packed[2], packed[3]]));
  let data = &packed[4..];

  let (mut u, mut v) = (0u32, 0u32);
  let mut out = Vec::with_capacity(count);
  for i in 0..count {
    u = (u + u32::from(data[i]) + (u32::from(data[count * 2 + i]) << 8)) % u_mod;
    v = (v + u32::from(data[count + i]) + (u32::from(data[count * 3 + i]) << 8)) % v_mod;
    out.push([u as u16, v as u16]);
  }

  let scale = Vec2::new(1.0 / u_mod as f32, 1.0 / v_mod as f32);
  let mut offset = Vec2::splat(0.5);
  offset.y -= 1.0 / scale.y;
  Ok((
    out,
    UvTransform {
      offset,
      scale: Vec2::new(scale.x, -scale.y),
    },
  ))
}

/// Walk `layer_and_octant_counts`, tagging vertices with their octant.
///
/// Group `i` covers the next N strip entries and assigns octant `i & 7` to
/// the vertices they reference. Every eighth group starts a new layer.
/// Returns the cumulative strip offsets of each layer.
pub fn unpack_octants_and_layers(
  packed: &[u8],
  strip: &[u16],
  octants: &mut [u8],
) -> DecodeResult<[usize; LAYER_BOUNDS_LEN]> {
  let mut offset = 0;
  let groups = read_varint(packed, &mut offset)?;
  let mut bounds = [0usize; LAYER_BOUNDS_LEN];
  let mut filled = 0;
  let mut cursor = 0usize;

  for group in 0..groups {
    if group & 7 == 0 && filled < LAYER_BOUNDS_LEN {
      bounds[filled] = cursor;
      filled += 1;
    }
    let count = read_varint(packed, &mut offset)? as usize;
    let end = cursor
      .checked_add(count)
      .filter(|&end| end <= strip.len())
      .ok_or_else(|| DecodeError::malformed("layer_and_octant_counts", "counts exceed index strip"))?;
    for &index in &strip[cursor..end] {
      let slot = octants
        .get_mut(usize::from(index))
        .ok_or_else(|| DecodeError::malformed("layer_and_octant_counts", format!("vertex {index} out of range")))?;
      *slot = (group & 7) as u8;
    }
    cursor = end;
  }
  for bound in bounds.iter_mut().skip(filled) {
    *bound = cursor;
  }
  Ok(bounds)
}

// =============================================================================
// Normals
// =============================================================================

fn spread_bits(value: i32, shift: i32) -> i32 {
  if shift <= 4 {
    return (value << shift) + (value & ((1 << shift) - 1));
  }
  if shift <= 6 {
    let r = 8 - shift;
    let v = value << shift;
    return v + (v >> r) + (v >> r >> r) + (v >> r >> r >> r);
  }
  -(value & 1)
}

fn clamp_byte(value: f32) -> u8 {
  value.round().clamp(0.0, 255.0) as u8
}

/// Decode the node-level normal lookup table (`for_normals`).
///
/// Each entry is two quantized octahedral coordinates. Returns biased bytes
/// (127 = 0) for x, y, z.
pub fn unpack_normal_table(packed: &[u8]) -> DecodeResult<Vec<[u8; 3]>> {
  if packed.len() <= 2 {
    return Err(DecodeError::Truncated("for_normals"));
  }
  let count = usize::from(u16::from_le_bytes([packed[0], packed[1]]));
  if packed.len() != 3 + count * 2 {
    return Err(DecodeError::malformed(
      "for_normals",
      format!("length {} does not match {} entries", packed.len(), count),
    ));
  }
  let shift = i32::from(packed[2]);
  let data = &packed[3..];

  let mut table = Vec::with_capacity(count);
  for i in 0..count {
    let a = spread_bits(i32::from(data[i]), shift) as f32 / 255.0;
    let f = spread_bits(i32::from(data[count + i]), shift) as f32 / 255.0;

    let (mut b, mut c) = (a, f);
    let mut g = b + c;
    let mut h = b - c;
    let mut sign = 1.0f32;
    if !((0.5..=1.5).contains(&g) && (-0.5..=0.5).contains(&h)) {
      sign = -1.0;
      if g <= 0.5 {
        b = 0.5 - f;
        c = 0.5 - a;
      } else if g >= 1.5 {
        b = 1.5 - f;
        c = 1.5 - a;
      } else if h <= -0.5 {
        b = f - 0.5;
        c = a + 0.5;
      } else {
        b = f + 0.5;
        c = a - 0.5;
      }
      g = b + c;
      h = b - c;
    }
    let x = (2.0 * g - 1.0).min(3.0 - 2.0 * g).min((2.0 * h + 1.0).min(1.0 - 2.0 * h)) * sign;
    let y = 2.0 * b - 1.0;
    let z = 2.0 * c - 1.0;
    let m = NORMAL_BIAS / (x * x + y * y + z * z).sqrt();
    table.push([
      clamp_byte(m * x + NORMAL_BIAS),
      clamp_byte(m * y + NORMAL_BIAS),
      clamp_byte(m * z + NORMAL_BIAS),
    ]);
  }
  Ok(table)
}

/// Resolve per-vertex normal indices (low plane, high plane) through the table.
pub fn unpack_normals(packed: &[u8], table: &[[u8; 3]], count: usize) -> DecodeResult<Vec<[f32; 3]>> {
  if packed.len() != count * 2 {
    return Err(DecodeError::malformed(
      "normals",
      format!("length {} does not match {} vertices", packed.len(), count),
    ));
  }
  let mut out = Vec::with_capacity(count);
  for i in 0..count {
    let j = usize::from(packed[i]) | (usize::from(packed[count + i]) << 8);
    let biased = table
      .get(j)
      .ok_or_else(|| DecodeError::malformed("normals", format!("table index {j} out of range")))?;
    out.push(biased.map(|b| (f32::from(b) - NORMAL_BIAS) / NORMAL_BIAS));
  }
  Ok(out)
}

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;
