//! Test utilities shared across modules.
//!
//! Packet builders that produce real rocktree wire bytes, a scripted
//! transport and a renderer that records every handle it hands out.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::config::EngineConfig;
use crate::constants::{FLAG_LEAF, FLAG_NODATA, OBB_PACKED_LEN};
use crate::decode::connectivity::pack_indices;
use crate::decode::metadata::pack_path_and_flags;
use crate::decode::node::{decode_node_data, DecodedMesh, NodeDecodeOptions, NodePayload};
use crate::decode::texture::DecodedTexture;
use crate::decode::wire::{encode_varints, WireWriter};
use crate::error::TransportError;
use crate::fetch::{Transport, UrlBuilder};
use crate::octree::NodePath;
use crate::render::{GpuHandle, RenderBackend};

pub fn path(digits: &str) -> NodePath {
  NodePath::parse(digits).expect("valid path digits")
}

// =============================================================================
// Metadata packets
// =============================================================================

pub const TEST_RADIUS: f32 = 6_371_000.0;

/// Meters per texel for relative levels 1..=4 in fixture bulks.
pub const TEST_METERS_PER_TEXEL: [f32; 4] = [64.0, 32.0, 16.0, 8.0];

pub fn planetoid_packet(root_epoch: u32) -> Vec<u8> {
  let mut root = WireWriter::new();
  root.uint(1, 0).uint(2, u64::from(root_epoch));
  let mut w = WireWriter::new();
  w.message(1, &root)
    .float(2, TEST_RADIUS)
    .float(3, -400.0)
    .float(4, 9000.0);
  w.finish()
}

pub fn packed_obb(center: [i16; 3], extents: [u8; 3], euler: [u16; 3]) -> [u8; OBB_PACKED_LEN] {
  let mut out = [0u8; OBB_PACKED_LEN];
  for i in 0..3 {
    out[i * 2..i * 2 + 2].copy_from_slice(&center[i].to_le_bytes());
    out[6 + i] = extents[i];
    out[9 + i * 2..11 + i * 2].copy_from_slice(&euler[i].to_le_bytes());
  }
  out
}

/// One node record in a fixture bulk.
#[derive(Clone, Debug)]
pub struct NodeSpec {
  pub relative: Vec<u8>,
  pub flags: u32,
  pub epoch: Option<u32>,
  pub bulk_epoch: Option<u32>,
  pub obb: Option<[u8; OBB_PACKED_LEN]>,
  pub texture_formats: Option<u32>,
  pub imagery_epoch: Option<u32>,
}

impl NodeSpec {
  /// Node with data and a concentric box of 128 texels.
  pub fn new(relative: &str) -> Self {
    Self {
      relative: path(relative).octants().to_vec(),
      flags: 0,
      epoch: None,
      bulk_epoch: None,
      obb: Some(packed_obb([0; 3], [128; 3], [0; 3])),
      texture_formats: None,
      imagery_epoch: None,
    }
  }

  pub fn leaf(relative: &str) -> Self {
    Self::new(relative).flags(FLAG_LEAF)
  }

  pub fn no_data(relative: &str) -> Self {
    Self::new(relative).flags(FLAG_NODATA)
  }

  pub fn flags(mut self, flags: u32) -> Self {
    self.flags |= flags;
    self
  }

  pub fn bulk_epoch(mut self, epoch: u32) -> Self {
    self.bulk_epoch = Some(epoch);
    self
  }

  pub fn obb(mut self, obb: [u8; OBB_PACKED_LEN]) -> Self {
    self.obb = Some(obb);
    self
  }

  fn encode(&self) -> WireWriter {
    let mut w = WireWriter::new();
    w.uint(1, u64::from(pack_path_and_flags(&self.relative, self.flags)));
    if let Some(epoch) = self.epoch {
      w.uint(2, u64::from(epoch));
    }
    if let Some(obb) = &self.obb {
      w.bytes(3, obb);
    }
    if let Some(epoch) = self.bulk_epoch {
      w.uint(5, u64::from(epoch));
    }
    if let Some(epoch) = self.imagery_epoch {
      w.uint(7, u64::from(epoch));
    }
    if let Some(formats) = self.texture_formats {
      w.uint(8, u64::from(formats));
    }
    w
  }
}

/// Bulk packet for `head`. Default texture formats: DXT1 and JPG.
pub fn bulk_packet(head: &NodePath, epoch: u32, nodes: &[NodeSpec]) -> Vec<u8> {
  let mut key = WireWriter::new();
  key.string(1, &head.to_string()).uint(2, u64::from(epoch));
  let mut w = WireWriter::new();
  for node in nodes {
    w.message(1, &node.encode());
  }
  w.message(2, &key)
    .packed_doubles(3, &[0.0, 0.0, 0.0])
    .packed_floats(4, &TEST_METERS_PER_TEXEL)
    .uint(6, 0b11);
  w.finish()
}

// =============================================================================
// Node data packets
// =============================================================================

/// Delta-code positions into x, y, z planes.
pub fn pack_positions(positions: &[[u8; 3]]) -> Vec<u8> {
  let count = positions.len();
  let mut out = vec![0u8; count * 3];
  let mut last = [0u8; 3];
  for (i, p) in positions.iter().enumerate() {
    for axis in 0..3 {
      out[axis * count + i] = p[axis].wrapping_sub(last[axis]);
    }
    last = *p;
  }
  out
}

/// Delta-code texture coordinates with the given moduli.
pub fn pack_tex_coords(uvs: &[[u16; 2]], u_mod: u32, v_mod: u32) -> Vec<u8> {
  let count = uvs.len();
  let mut out = Vec::with_capacity(4 + count * 4);
  out.extend_from_slice(&((u_mod - 1) as u16).to_le_bytes());
  out.extend_from_slice(&((v_mod - 1) as u16).to_le_bytes());
  let mut planes = vec![0u8; count * 4];
  let (mut lu, mut lv) = (0u32, 0u32);
  for (i, uv) in uvs.iter().enumerate() {
    let du = (u32::from(uv[0]) + u_mod - lu) % u_mod;
    let dv = (u32::from(uv[1]) + v_mod - lv) % v_mod;
    planes[i] = (du & 0xff) as u8;
    planes[count + i] = (dv & 0xff) as u8;
    planes[count * 2 + i] = (du >> 8) as u8;
    planes[count * 3 + i] = (dv >> 8) as u8;
    lu = u32::from(uv[0]);
    lv = u32::from(uv[1]);
  }
  out.extend_from_slice(&planes);
  out
}

/// A 4x4 DXT1 block of solid red.
pub fn dxt1_block() -> Vec<u8> {
  let mut block = vec![0u8; 8];
  block[0..2].copy_from_slice(&0xf800u16.to_le_bytes());
  block
}

/// Fixture mesh description.
#[derive(Clone, Debug)]
pub struct MeshFixture {
  pub positions: Vec<[u8; 3]>,
  pub strip: Vec<u16>,
  pub uvs: Option<Vec<[u16; 2]>>,
  pub texture: bool,
  pub layer_counts: Option<Vec<u64>>,
}

impl MeshFixture {
  /// Unit quad as a 4-vertex strip with uvs and a DXT1 texture.
  pub fn quad() -> Self {
    Self {
      positions: vec![[0, 0, 0], [10, 0, 0], [0, 10, 0], [10, 10, 0]],
      strip: vec![0, 1, 2, 3],
      uvs: Some(vec![[0, 0], [3, 0], [0, 3], [3, 3]]),
      texture: true,
      layer_counts: Some(vec![1, 4]),
    }
  }

  fn encode(&self) -> WireWriter {
    let mut w = WireWriter::new();
    w.bytes(1, &pack_positions(&self.positions));
    if let Some(uvs) = &self.uvs {
      w.bytes(2, &pack_tex_coords(uvs, 4, 4));
    }
    w.bytes(3, &pack_indices(&self.strip));
    if self.texture {
      let mut tex = WireWriter::new();
      tex.bytes(1, &dxt1_block()).uint(2, 2).uint(3, 4).uint(4, 4);
      w.message(6, &tex);
    }
    if let Some(counts) = &self.layer_counts {
      w.bytes(8, &encode_varints(counts));
    }
    w
  }
}

/// Column-major translation matrix.
pub fn translation_matrix(x: f64, y: f64, z: f64) -> [f64; 16] {
  [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, x, y, z, 1.0,
  ]
}

pub fn node_packet(matrix: Option<[f64; 16]>, meshes: &[MeshFixture]) -> Vec<u8> {
  let mut w = WireWriter::new();
  if let Some(matrix) = matrix {
    w.packed_doubles(1, &matrix);
  }
  for mesh in meshes {
    w.message(2, &mesh.encode());
  }
  w.finish()
}

/// Node data with one textured quad at a fixed origin.
pub fn quad_node_packet() -> Vec<u8> {
  node_packet(Some(translation_matrix(1000.0, 0.0, 0.0)), &[MeshFixture::quad()])
}

/// Decoded quad payload for `digits`. Every call has the same byte size.
pub fn quad_payload(digits: &str) -> NodePayload {
  decode_node_data(&quad_node_packet(), &path(digits), None, &NodeDecodeOptions::default()).expect("quad decodes")
}

// =============================================================================
// Engine fixtures
// =============================================================================

/// Config with no retry delays and no failure cooldown.
pub fn test_config() -> EngineConfig {
  let mut config = EngineConfig::default();
  config.fetch.workers = 2;
  config.fetch.max_in_flight = 8;
  config.fetch.retry.base_delay_ms = 0;
  config.fetch.retry.max_delay_ms = 0;
  config.cache.failed_retry_cooldown_frames = 0;
  config
}

pub fn test_urls() -> UrlBuilder {
  UrlBuilder::new(&test_config().endpoint)
}

// =============================================================================
// Mock transport
// =============================================================================

#[derive(Default)]
struct MockState {
  responses: HashMap<String, Vec<u8>>,
  scripted_failures: HashMap<String, VecDeque<TransportError>>,
  always_fail: HashMap<String, TransportError>,
  gates: HashMap<String, Receiver<()>>,
  calls: HashMap<String, usize>,
  active: HashMap<String, usize>,
  max_active: HashMap<String, usize>,
}

/// Scripted transport. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockTransport {
  state: Mutex<MockState>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, bytes: Vec<u8>) {
    self.state.lock().unwrap().responses.insert(url.to_string(), bytes);
  }

  /// Fail the next `times` calls to `url` before answering normally.
  pub fn fail_times(&self, url: &str, times: usize, error: TransportError) {
    let mut state = self.state.lock().unwrap();
    let queue = state.scripted_failures.entry(url.to_string()).or_default();
    queue.extend(std::iter::repeat(error).take(times));
  }

  pub fn fail_always(&self, url: &str, error: TransportError) {
    self.state.lock().unwrap().always_fail.insert(url.to_string(), error);
  }

  pub fn clear_failures(&self, url: &str) {
    let mut state = self.state.lock().unwrap();
    state.always_fail.remove(url);
    state.scripted_failures.remove(url);
  }

  /// Block fetches of `url` until the returned sender sends or is dropped.
  pub fn gate(&self, url: &str) -> Sender<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    self.state.lock().unwrap().gates.insert(url.to_string(), rx);
    tx
  }

  pub fn calls(&self, url: &str) -> usize {
    self.state.lock().unwrap().calls.get(url).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.state.lock().unwrap().calls.values().sum()
  }

  pub fn max_concurrent(&self, url: &str) -> usize {
    self.state.lock().unwrap().max_active.get(url).copied().unwrap_or(0)
  }
}

impl Transport for MockTransport {
  fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
    let gate = {
      let mut state = self.state.lock().unwrap();
      *state.calls.entry(url.to_string()).or_default() += 1;
      let active = {
        let active = state.active.entry(url.to_string()).or_default();
        *active += 1;
        *active
      };
      let max = state.max_active.entry(url.to_string()).or_default();
      *max = (*max).max(active);
      state.gates.get(url).cloned()
    };

    if let Some(gate) = gate {
      let _ = gate.recv_timeout(Duration::from_secs(5));
    }

    let mut state = self.state.lock().unwrap();
    if let Some(active) = state.active.get_mut(url) {
      *active -= 1;
    }
    if let Some(error) = state.always_fail.get(url) {
      return Err(error.clone());
    }
    if let Some(error) = state.scripted_failures.get_mut(url).and_then(VecDeque::pop_front) {
      return Err(error);
    }
    state
      .responses
      .get(url)
      .cloned()
      .ok_or(TransportError::HttpStatus(404))
  }
}

// =============================================================================
// Recording renderer
// =============================================================================

/// Renderer that tracks live handles and panics on double release.
#[derive(Default, Debug)]
pub struct RecordingRenderer {
  next: u64,
  pub live: HashSet<GpuHandle>,
  pub released: Vec<GpuHandle>,
  pub meshes_created: usize,
  pub textures_created: usize,
}

impl RenderBackend for RecordingRenderer {
  fn create_gpu_mesh(&mut self, _path: &NodePath, _mesh: &DecodedMesh) -> GpuHandle {
    self.next += 1;
    self.meshes_created += 1;
    let handle = GpuHandle(self.next);
    self.live.insert(handle);
    handle
  }

  fn create_gpu_texture(&mut self, _path: &NodePath, _texture: &DecodedTexture) -> GpuHandle {
    self.next += 1;
    self.textures_created += 1;
    let handle = GpuHandle(self.next);
    self.live.insert(handle);
    handle
  }

  fn release(&mut self, handle: GpuHandle) {
    assert!(self.live.remove(&handle), "release of unknown handle {handle:?}");
    self.released.push(handle);
  }
}
