//! NodeData packets: meshes, textures and the globe transform of one node.

use glam::{DVec3, Vec2};

use super::connectivity::{unpack_indices, IndexEncoding};
use super::geometry::{
  unpack_normal_table, unpack_normals, unpack_octants_and_layers, unpack_positions, unpack_tex_coords, Dequantizer,
  UvTransform,
};
use super::texture::{decode_texture, DecodedTexture, TextureDecodeOptions, TextureFormat};
use super::wire::WireReader;
use crate::constants::{DEFAULT_TEXTURE_SIZE, LAYER_BOUNDS_LEN, RENDERABLE_LAYER};
use crate::error::{DecodeError, DecodeResult};
use crate::octree::{NodePath, OrientedBoundingBox};
use crate::types::{MinMaxAABB, Vertex};

/// Knobs for turning NodeData bytes into a payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeDecodeOptions {
  pub index_encoding: IndexEncoding,
  /// Width of the quantization grid when no globe matrix is sent.
  pub quantization_bits: u8,
  pub texture: TextureDecodeOptions,
}

impl Default for NodeDecodeOptions {
  fn default() -> Self {
    Self {
      index_encoding: IndexEncoding::Strip,
      quantization_bits: 8,
      texture: TextureDecodeOptions::default(),
    }
  }
}

/// One decoded mesh of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedMesh {
  pub vertices: Vec<Vertex>,
  /// Triangle list.
  pub indices: Vec<u32>,
  pub texture: Option<DecodedTexture>,
  /// Cumulative strip offsets per layer, before normalization.
  pub layer_bounds: [usize; LAYER_BOUNDS_LEN],
  /// Bounds of `vertices`, relative to the node origin.
  pub bounds: MinMaxAABB,
}

impl DecodedMesh {
  pub fn byte_size(&self) -> usize {
    self.vertices.len() * std::mem::size_of::<Vertex>()
      + self.indices.len() * std::mem::size_of::<u32>()
      + self.texture.as_ref().map_or(0, DecodedTexture::byte_size)
  }

  #[inline]
  pub fn triangle_count(&self) -> usize {
    self.indices.len() / 3
  }
}

/// Decoded node payload. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct NodePayload {
  pub path: NodePath,
  /// Globe-space origin; vertex positions are relative to it.
  pub origin: DVec3,
  pub meshes: Vec<DecodedMesh>,
  pub copyright_ids: Vec<u32>,
}

impl NodePayload {
  pub fn byte_size(&self) -> usize {
    std::mem::size_of::<Self>() + self.meshes.iter().map(DecodedMesh::byte_size).sum::<usize>()
  }
}

#[derive(Default)]
struct RawTexture<'a> {
  data: Option<&'a [u8]>,
  format: Option<u32>,
  width: Option<u32>,
  height: Option<u32>,
}

#[derive(Default)]
struct RawMesh<'a> {
  vertices: &'a [u8],
  texture_coords: Option<&'a [u8]>,
  indices: &'a [u8],
  textures: Vec<RawTexture<'a>>,
  layer_and_octant_counts: Option<&'a [u8]>,
  uv_offset_and_scale: Vec<f32>,
  normals: Option<&'a [u8]>,
}

fn read_texture(bytes: &[u8]) -> DecodeResult<RawTexture<'_>> {
  let mut reader = WireReader::new(bytes);
  let mut texture = RawTexture::default();
  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      // Repeated; the first entry is the full-resolution image.
      1 => {
        let data = reader.read_bytes()?;
        texture.data.get_or_insert(data);
      }
      2 => texture.format = Some(reader.read_u32()?),
      3 => texture.width = Some(reader.read_u32()?),
      4 => texture.height = Some(reader.read_u32()?),
      _ => reader.skip(field, wire_type)?,
    }
  }
  Ok(texture)
}

fn read_mesh(bytes: &[u8]) -> DecodeResult<RawMesh<'_>> {
  let mut reader = WireReader::new(bytes);
  let mut mesh = RawMesh::default();
  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      1 => mesh.vertices = reader.read_bytes()?,
      2 => mesh.texture_coords = Some(reader.read_bytes()?),
      3 => mesh.indices = reader.read_bytes()?,
      6 => mesh.textures.push(read_texture(reader.read_bytes()?)?),
      8 => mesh.layer_and_octant_counts = Some(reader.read_bytes()?),
      10 => reader.read_repeated_f32(wire_type, &mut mesh.uv_offset_and_scale)?,
      11 => mesh.normals = Some(reader.read_bytes()?),
      _ => reader.skip(field, wire_type)?,
    }
  }
  Ok(mesh)
}

fn decode_mesh(
  raw: RawMesh<'_>,
  dequantizer: &Dequantizer,
  normal_table: Option<&[[u8; 3]]>,
  options: &NodeDecodeOptions,
) -> DecodeResult<DecodedMesh> {
  let positions = unpack_positions(raw.vertices)?;
  let count = positions.len();

  let (uvs, mut transform) = match raw.texture_coords {
    Some(packed) => unpack_tex_coords(packed, count)?,
    None => (
      vec![[0, 0]; count],
      UvTransform {
        offset: Vec2::ZERO,
        scale: Vec2::ONE,
      },
    ),
  };
  match raw.uv_offset_and_scale.as_slice() {
    [] => {}
    [ox, oy, sx, sy] => {
      transform = UvTransform {
        offset: Vec2::new(*ox, *oy),
        scale: Vec2::new(*sx, *sy),
      };
    }
    other => {
      return Err(DecodeError::malformed(
        "uv_offset_and_scale",
        format!("expected 4 values, got {}", other.len()),
      ))
    }
  }

  let mut connectivity = unpack_indices(raw.indices, options.index_encoding)?;
  let mut octants = vec![0u8; count];
  let layer_bounds = match raw.layer_and_octant_counts {
    Some(packed) => {
      let bounds = unpack_octants_and_layers(packed, connectivity.indices(), &mut octants)?;
      connectivity.truncate(bounds[RENDERABLE_LAYER]);
      bounds
    }
    None => [connectivity.indices().len(); LAYER_BOUNDS_LEN],
  };
  let indices = connectivity.into_triangle_list(count)?;

  let normals = match (raw.normals, normal_table) {
    (Some(packed), Some(table)) => unpack_normals(packed, table, count)?,
    _ => vec![[0.0; 3]; count],
  };

  let vertices: Vec<Vertex> = (0..count)
    .map(|i| Vertex {
      position: dequantizer.local(positions[i]),
      normal: normals[i],
      uv: transform.apply(uvs[i]),
      octant: octants[i],
    })
    .collect();
  let bounds = MinMaxAABB::from_vertices(&vertices);

  let texture = match raw.textures.first() {
    Some(tex) => {
      let wire = tex.format.unwrap_or(crate::constants::TEXTURE_FORMAT_JPG);
      let format = TextureFormat::from_wire(wire)
        .ok_or_else(|| DecodeError::UnsupportedEncoding(format!("texture format id {wire}")))?;
      let data = tex.data.ok_or_else(|| DecodeError::malformed("texture", "missing data"))?;
      Some(decode_texture(
        data,
        format,
        tex.width.unwrap_or(DEFAULT_TEXTURE_SIZE),
        tex.height.unwrap_or(DEFAULT_TEXTURE_SIZE),
        options.texture,
      )?)
    }
    None => None,
  };

  Ok(DecodedMesh {
    vertices,
    indices,
    texture,
    layer_bounds,
    bounds,
  })
}

/// Decode a NodeData packet for `path`.
///
/// `bounds` supplies the fallback quantization frame when the packet carries
/// no `matrix_globe_from_mesh`.
pub fn decode_node_data(
  bytes: &[u8],
  path: &NodePath,
  bounds: Option<&OrientedBoundingBox>,
  options: &NodeDecodeOptions,
) -> DecodeResult<NodePayload> {
  let mut reader = WireReader::new(bytes);
  let mut matrix = Vec::new();
  let mut raw_meshes = Vec::new();
  let mut copyright_ids = Vec::new();
  let mut for_normals = None;

  while let Some((field, wire_type)) = reader.read_tag()? {
    match field {
      1 => reader.read_repeated_f64(wire_type, &mut matrix)?,
      2 => raw_meshes.push(read_mesh(reader.read_bytes()?)?),
      3 => reader.read_repeated_u32(wire_type, &mut copyright_ids)?,
      8 => for_normals = Some(reader.read_bytes()?),
      _ => reader.skip(field, wire_type)?,
    }
  }

  let dequantizer = if !matrix.is_empty() {
    Dequantizer::from_globe_matrix(&matrix)?
  } else if let Some(obb) = bounds {
    Dequantizer::from_extent(obb, options.quantization_bits)
  } else {
    return Err(DecodeError::malformed(
      "matrix_globe_from_mesh",
      "missing and no bounding box to dequantize against",
    ));
  };

  let normal_table = match for_normals {
    Some(packed) => Some(unpack_normal_table(packed)?),
    None => None,
  };

  let meshes = raw_meshes
    .into_iter()
    .map(|raw| decode_mesh(raw, &dequantizer, normal_table.as_deref(), options))
    .collect::<DecodeResult<Vec<_>>>()?;

  Ok(NodePayload {
    path: path.clone(),
    origin: dequantizer.origin,
    meshes,
    copyright_ids,
  })
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
