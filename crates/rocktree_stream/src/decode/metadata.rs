//! Planetoid and bulk metadata packets.
//!
//! A bulk describes the four levels below its head node: per-node flags,
//! epochs, texture availability and a packed oriented bounding box. The
//! octree shape (which children exist) is implied by which paths appear.

use glam::{DMat3, DVec3};
use smallvec::SmallVec;

use super::wire::WireReader;
use crate::constants::{
  BULK_LEVELS, FLAG_LEAF, FLAG_NODATA, FLAG_USE_IMAGERY_EPOCH, OBB_PACKED_LEN,
};
use crate::error::{DecodeError, DecodeResult};
use crate::octree::{NodePath, OrientedBoundingBox};

/// Root description of the globe.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanetoidMetadata {
  /// Epoch of the root bulk.
  pub root_epoch: u32,
  pub radius: f32,
  pub min_terrain_altitude: f32,
  pub max_terrain_altitude: f32,
}

/// One node record from a bulk, already resolved against bulk defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeMetadata {
  /// Absolute path.
  pub path: NodePath,
  pub flags: u32,
  /// Epoch for node-data requests.
  pub epoch: u32,
  /// Epoch of the child bulk headed by this node, if it has one.
  pub bulk_epoch: Option<u32>,
  pub obb: Option<OrientedBoundingBox>,
  pub meters_per_texel: f32,
  pub imagery_epoch: Option<u32>,
  /// Bit `(format - 1)` set for each available texture format.
  pub texture_formats: u32,
}

impl NodeMetadata {
  #[inline]
  pub fn has_data(&self) -> bool {
    self.flags & FLAG_NODATA == 0
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.flags & FLAG_LEAF != 0
  }

  /// Imagery epoch to send with node-data requests.
  pub fn request_imagery_epoch(&self) -> Option<u32> {
    if self.flags & FLAG_USE_IMAGERY_EPOCH != 0 {
      self.imagery_epoch
    } else {
      None
    }
  }
}

/// Decoded bulk metadata packet.
#[derive(Clone, Debug, PartialEq)]
pub struct BulkMetadata {
  pub head: NodePath,
  pub epoch: u32,
  pub head_node_center: DVec3,
  pub meters_per_texel: Vec<f32>,
  pub nodes: Vec<NodeMetadata>,
}

impl BulkMetadata {
  /// Child mask of `path` implied by the nodes present in this bulk.
  pub fn child_mask_of(&self, path: &NodePath) -> u8 {
    self
      .nodes
      .iter()
      .filter(|node| node.path.parent().as_ref() == Some(path))
      .filter_map(|node| node.path.last_octant())
      .fold(0u8, |mask, octant| mask | (1 << octant))
  }
}

// =============================================================================
// Packed fields
// =============================================================================

/// Split `path_and_flags` into relative octants and flags.
///
/// Low 2 bits hold `level - 1`, then 3 bits per octant, then the flags.
pub fn unpack_path_and_flags(value: u32) -> (SmallVec<[u8; BULK_LEVELS]>, u32) {
  let level = 1 + (value & 3) as usize;
  let mut rest = value >> 2;
  let mut octants = SmallVec::new();
  for _ in 0..level {
    octants.push((rest & 7) as u8);
    rest >>= 3;
  }
  (octants, rest)
}

/// Inverse of `unpack_path_and_flags`. Relative paths hold 1..=4 octants.
pub fn pack_path_and_flags(relative: &[u8], flags: u32) -> u32 {
  debug_assert!((1..=BULK_LEVELS).contains(&relative.len()));
  let mut value = (relative.len() as u32 - 1) & 3;
  let mut shift = 2;
  for &octant in relative {
    value |= u32::from(octant & 7) << shift;
    shift += 3;
  }
  value | (flags << shift)
}

/// Unpack the 15-byte oriented bounding box.
///
/// Layout: center i16 x3 (scaled by meters per texel, offset by the head
/// center), extents u8 x3 (scaled), then three u16 euler angles.
pub fn unpack_obb(packed: &[u8], head_center: DVec3, meters_per_texel: f32) -> DecodeResult<OrientedBoundingBox> {
  if packed.len() != OBB_PACKED_LEN {
    return Err(DecodeError::malformed(
      "oriented_bounding_box",
      format!("expected {OBB_PACKED_LEN} bytes, got {}", packed.len()),
    ));
  }
  let mpt = f64::from(meters_per_texel);
  let i16_at = |i: usize| f64::from(i16::from_le_bytes([packed[i], packed[i + 1]]));
  let u16_at = |i: usize| f64::from(u16::from_le_bytes([packed[i], packed[i + 1]]));

  let center = DVec3::new(i16_at(0), i16_at(2), i16_at(4)) * mpt + head_center;
  let extents = DVec3::new(f64::from(packed[6]), f64::from(packed[7]), f64::from(packed[8])) * mpt;

  let pi = std::f64::consts::PI;
  let euler = [u16_at(9) * pi / 32768.0, u16_at(11) * pi / 65536.0, u16_at(13) * pi / 32768.0];
  let (s0, c0) = euler[0].sin_cos();
  let (s1, c1) = euler[1].sin_cos();
  let (s2, c2) = euler[2].sin_cos();

  let rows = [
    [c0 * c2 - c1 * s0 * s2, c1 * c0 * s2 + c2 * s0, s2 * s1],
    [-c0 * s2 - c2 * c1 * s0, c0 * c1 * c2 - s0 * s2, c2 * s1],
    [s1 * s0, -c0 * s1, c1],
  ];
  let orientation = DMat3::from_cols(
    DVec3::new(rows[0][0], rows[1][0], rows[2][0]),
    DVec3::new(rows[0][1], rows[1][1], rows[2][1]),
    DVec3::new(rows[0][2], rows[1][2], rows[2][2]),
  );

  Ok(OrientedBoundingBox {
    center,
    extents,
    orientation,
  })
}

// =============================================================================
// Packets
// =============================================================================

#[derive(Default)]
struct RawNode<'a> {
  path_and_flags: Option<u32>,
  epoch: Option<u32>,
  bulk_epoch: Option<u32>,
  obb: Option<&'a [u8]>,
  meters_per_texel: Option<f32>,
  imagery_epoch: Option<u32>,
  texture_formats: Option<u32>,
}

fn read_raw_node(bytes: &[u8]) -> DecodeResult<RawNode<'_>> {
  let mut reader = WireReader::new(bytes);
  let mut node = RawNode::default();
  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      1 => node.path_and_flags = Some(reader.read_u32()?),
      2 => node.epoch = Some(reader.read_u32()?),
      3 => node.obb = Some(reader.read_bytes()?),
      4 => node.meters_per_texel = Some(reader.read_f32()?),
      5 => node.bulk_epoch = Some(reader.read_u32()?),
      7 => node.imagery_epoch = Some(reader.read_u32()?),
      8 => node.texture_formats = Some(reader.read_u32()?),
      _ => reader.skip(field, wire_type)?,
    }
  }
  Ok(node)
}

fn read_node_key(bytes: &[u8]) -> DecodeResult<(Option<NodePath>, Option<u32>)> {
  let mut reader = WireReader::new(bytes);
  let (mut path, mut epoch) = (None, None);
  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      1 => {
        let raw = reader.read_bytes()?;
        let text = std::str::from_utf8(raw).map_err(|_| DecodeError::malformed("node_key.path", "not utf-8"))?;
        path = Some(NodePath::parse(text).ok_or_else(|| DecodeError::malformed("node_key.path", text.to_string()))?);
      }
      2 => epoch = Some(reader.read_u32()?),
      _ => reader.skip(field, wire_type)?,
    }
  }
  Ok((path, epoch))
}

/// Decode the `PlanetoidMetadata` packet.
pub fn decode_planetoid(bytes: &[u8]) -> DecodeResult<PlanetoidMetadata> {
  let mut reader = WireReader::new(bytes);
  let mut root_epoch = None;
  let mut planetoid = PlanetoidMetadata {
    root_epoch: 0,
    radius: 0.0,
    min_terrain_altitude: 0.0,
    max_terrain_altitude: 0.0,
  };
  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      1 => root_epoch = read_raw_node(reader.read_bytes()?)?.epoch,
      2 => planetoid.radius = reader.read_f32()?,
      3 => planetoid.min_terrain_altitude = reader.read_f32()?,
      4 => planetoid.max_terrain_altitude = reader.read_f32()?,
      _ => reader.skip(field, wire_type)?,
    }
  }
  planetoid.root_epoch = root_epoch.ok_or_else(|| DecodeError::malformed("root_node_metadata", "missing epoch"))?;
  if !(planetoid.radius.is_finite() && planetoid.radius > 0.0) {
    return Err(DecodeError::malformed("radius", format!("{}", planetoid.radius)));
  }
  Ok(planetoid)
}

/// Decode a `BulkMetadata` packet requested for `head`.
///
/// Node paths are made absolute by joining the head path. Per-node fields
/// missing from a record fall back to the bulk-wide defaults.
pub fn decode_bulk(bytes: &[u8], head: &NodePath) -> DecodeResult<BulkMetadata> {
  let mut reader = WireReader::new(bytes);
  let mut raw_nodes = Vec::new();
  let mut key = (None, None);
  let mut head_center = Vec::new();
  let mut meters_per_texel = Vec::new();
  let mut default_imagery_epoch = None;
  let mut default_texture_formats = None;

  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      1 => raw_nodes.push(read_raw_node(reader.read_bytes()?)?),
      2 => key = read_node_key(reader.read_bytes()?)?,
      3 => reader.read_repeated_f64(wire_type, &mut head_center)?,
      4 => reader.read_repeated_f32(wire_type, &mut meters_per_texel)?,
      5 => default_imagery_epoch = Some(reader.read_u32()?),
      6 => default_texture_formats = Some(reader.read_u32()?),
      _ => reader.skip(field, wire_type)?,
    }
  }

  if let (Some(key_path), _) = &key {
    if key_path != head {
      return Err(DecodeError::malformed(
        "head_node_key",
        format!("requested {head}, packet is for {key_path}"),
      ));
    }
  }
  let epoch = key.1.unwrap_or(0);
  let head_node_center = match head_center.as_slice() {
    [x, y, z] => DVec3::new(*x, *y, *z),
    [] => DVec3::ZERO,
    other => {
      return Err(DecodeError::malformed(
        "head_node_center",
        format!("expected 3 values, got {}", other.len()),
      ))
    }
  };

  let mut nodes = Vec::with_capacity(raw_nodes.len());
  for raw in raw_nodes {
    let path_and_flags = raw
      .path_and_flags
      .ok_or_else(|| DecodeError::malformed("node_metadata", "missing path_and_flags"))?;
    let (relative, flags) = unpack_path_and_flags(path_and_flags);
    let level = relative.len();
    let mpt = match raw.meters_per_texel {
      Some(mpt) => mpt,
      None => meters_per_texel.get(level - 1).copied().unwrap_or(0.0),
    };
    let obb = match raw.obb {
      Some(packed) => Some(unpack_obb(packed, head_node_center, mpt)?),
      None => None,
    };
    nodes.push(NodeMetadata {
      path: head.join(&relative),
      flags,
      epoch: raw.epoch.unwrap_or(epoch),
      bulk_epoch: raw.bulk_epoch,
      obb,
      meters_per_texel: mpt,
      imagery_epoch: raw.imagery_epoch.or(default_imagery_epoch),
      texture_formats: raw.texture_formats.or(default_texture_formats).unwrap_or(0),
    });
  }

  Ok(BulkMetadata {
    head: head.clone(),
    epoch,
    head_node_center,
    meters_per_texel,
    nodes,
  })
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod metadata_test;
