//! Render contract and the frame-scoped view handed to renderers.
//!
//! The cache owns every GPU handle. A renderer only creates and releases them
//! when asked, on the coordinator thread, and borrows a [`ResidentView`] for
//! the duration of a frame.

use glam::{DAffine3, DVec3};

use crate::cache::ResidentCache;
use crate::decode::{DecodedMesh, DecodedTexture, NodePayload};
use crate::octree::NodePath;

/// Opaque renderer resource id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuHandle(pub u64);

/// Buffer/texture primitives consumed by the engine.
pub trait RenderBackend {
  fn create_gpu_mesh(&mut self, path: &NodePath, mesh: &DecodedMesh) -> GpuHandle;

  fn create_gpu_texture(&mut self, path: &NodePath, texture: &DecodedTexture) -> GpuHandle;

  /// Called exactly once per handle.
  fn release(&mut self, handle: GpuHandle);
}

/// Handles for one uploaded mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GpuMesh {
  pub mesh: GpuHandle,
  pub texture: Option<GpuHandle>,
}

/// Hands out sequential ids and keeps nothing. For headless hosts.
#[derive(Debug, Default)]
pub struct NullRenderer {
  next: u64,
}

impl NullRenderer {
  fn next_handle(&mut self) -> GpuHandle {
    self.next += 1;
    GpuHandle(self.next)
  }
}

impl RenderBackend for NullRenderer {
  fn create_gpu_mesh(&mut self, _path: &NodePath, _mesh: &DecodedMesh) -> GpuHandle {
    self.next_handle()
  }

  fn create_gpu_texture(&mut self, _path: &NodePath, _texture: &DecodedTexture) -> GpuHandle {
    self.next_handle()
  }

  fn release(&mut self, _handle: GpuHandle) {}
}

/// One node the renderer should draw this frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawItem {
  pub path: NodePath,
  /// Bit `o` set when child octant `o` is drawn by a finer node, so the
  /// renderer can mask that part of this node.
  pub covered_octants: u8,
}

/// Frame-scoped, restartable view of the drawn nodes.
///
/// Borrows the engine, so it cannot outlive the next `sync`.
#[derive(Clone, Copy)]
pub struct ResidentView<'a> {
  cache: &'a ResidentCache,
  items: &'a [DrawItem],
}

impl<'a> ResidentView<'a> {
  pub(crate) fn new(cache: &'a ResidentCache, items: &'a [DrawItem]) -> Self {
    Self { cache, items }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.items.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Draw items in path order. Each call starts from the beginning.
  pub fn iter(&self) -> impl Iterator<Item = ViewItem<'a>> + 'a {
    let cache = self.cache;
    let items = self.items;
    items.iter().filter_map(move |item| {
      let node = cache.get(&item.path)?;
      Some(ViewItem {
        path: &item.path,
        covered_octants: item.covered_octants,
        payload: &node.payload,
        meshes: node.gpu.as_deref().unwrap_or(&[]),
      })
    })
  }

  pub fn paths(&self) -> impl Iterator<Item = &'a NodePath> + 'a {
    let items = self.items;
    items.iter().map(|item| &item.path)
  }
}

impl<'a> IntoIterator for &ResidentView<'a> {
  type Item = ViewItem<'a>;
  type IntoIter = Box<dyn Iterator<Item = ViewItem<'a>> + 'a>;

  fn into_iter(self) -> Self::IntoIter {
    Box::new(self.iter())
  }
}

/// Everything a renderer needs to draw one node.
#[derive(Clone, Copy, Debug)]
pub struct ViewItem<'a> {
  pub path: &'a NodePath,
  pub covered_octants: u8,
  pub payload: &'a NodePayload,
  /// Parallel to `payload.meshes`.
  pub meshes: &'a [GpuMesh],
}

impl ViewItem<'_> {
  #[inline]
  pub fn origin(&self) -> DVec3 {
    self.payload.origin
  }

  /// Node-local to globe transform.
  #[inline]
  pub fn transform(&self) -> DAffine3 {
    DAffine3::from_translation(self.payload.origin)
  }
}
