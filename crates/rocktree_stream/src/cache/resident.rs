//! ResidentCache - the decoded nodes currently held in memory.
//!
//! The cache is the only owner of node payloads and their GPU handles. Usage
//! is the sum of payload byte sizes; eviction keeps it at or under budget.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::eviction::{eviction_order, EvictionOutcome};
use crate::decode::NodePayload;
use crate::error::BudgetExceeded;
use crate::octree::NodePath;
use crate::render::{GpuMesh, RenderBackend};

/// One loaded node.
#[derive(Debug)]
pub struct ResidentNode {
  pub payload: NodePayload,
  pub byte_size: usize,
  /// Frame of admission.
  pub admitted: u64,
  /// Last frame the node was desired or drawn.
  pub last_used: u64,
  /// Set by the first upload; parallel to `payload.meshes`.
  pub gpu: Option<Vec<GpuMesh>>,
}

impl ResidentNode {
  #[inline]
  pub fn is_uploaded(&self) -> bool {
    self.gpu.is_some()
  }

  fn handle_count(&self) -> usize {
    self.gpu.as_ref().map_or(0, |meshes| {
      meshes.iter().map(|m| 1 + usize::from(m.texture.is_some())).sum()
    })
  }
}

pub struct ResidentCache {
  nodes: HashMap<NodePath, ResidentNode>,
  usage: usize,
  budget: usize,
  /// Inside an over-budget episode that was already reported.
  over_budget: bool,
}

impl ResidentCache {
  pub fn new(budget: usize) -> Self {
    Self {
      nodes: HashMap::new(),
      usage: 0,
      budget,
      over_budget: false,
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Resident bytes.
  #[inline]
  pub fn usage(&self) -> usize {
    self.usage
  }

  #[inline]
  pub fn budget(&self) -> usize {
    self.budget
  }

  #[inline]
  pub fn contains(&self, path: &NodePath) -> bool {
    self.nodes.contains_key(path)
  }

  pub fn get(&self, path: &NodePath) -> Option<&ResidentNode> {
    self.nodes.get(path)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&NodePath, &ResidentNode)> {
    self.nodes.iter()
  }

  /// Live GPU handles across all nodes.
  pub fn handle_count(&self) -> usize {
    self.nodes.values().map(ResidentNode::handle_count).sum()
  }

  /// Take ownership of a decoded payload. Returns its byte size.
  ///
  /// # Panics
  /// If the path is already resident. The coordinator admits each
  /// `Decoding` node exactly once.
  pub fn admit(&mut self, payload: NodePayload, frame: u64) -> usize {
    let path = payload.path.clone();
    assert!(!self.nodes.contains_key(&path), "double admission of {path}");
    let byte_size = payload.byte_size();
    self.usage += byte_size;
    self.nodes.insert(
      path,
      ResidentNode {
        payload,
        byte_size,
        admitted: frame,
        last_used: frame,
        gpu: None,
      },
    );
    byte_size
  }

  /// Mark `path` used this frame. Returns false if it is not resident.
  pub fn touch(&mut self, path: &NodePath, frame: u64) -> bool {
    match self.nodes.get_mut(path) {
      Some(node) => {
        node.last_used = node.last_used.max(frame);
        true
      }
      None => false,
    }
  }

  /// Create GPU resources for `path` if it has none yet.
  ///
  /// Returns the number of handles created.
  pub fn upload<R: RenderBackend>(&mut self, path: &NodePath, renderer: &mut R) -> usize {
    let Some(node) = self.nodes.get_mut(path) else {
      return 0;
    };
    if node.gpu.is_some() {
      return 0;
    }
    let meshes: Vec<GpuMesh> = node
      .payload
      .meshes
      .iter()
      .map(|mesh| GpuMesh {
        mesh: renderer.create_gpu_mesh(path, mesh),
        texture: mesh.texture.as_ref().map(|texture| renderer.create_gpu_texture(path, texture)),
      })
      .collect();
    node.gpu = Some(meshes);
    node.handle_count()
  }

  /// Release handles, then drop the record.
  pub fn remove<R: RenderBackend>(&mut self, path: &NodePath, renderer: &mut R) -> Option<ResidentNode> {
    let mut node = self.nodes.remove(path)?;
    release_handles(&mut node, renderer);
    self.usage -= node.byte_size;
    Some(node)
  }

  /// Evict unprotected nodes while usage exceeds the budget.
  ///
  /// Reports [`BudgetExceeded`] once per episode when nothing evictable is
  /// left; the episode ends once usage is back within budget.
  pub fn evict<R: RenderBackend>(&mut self, protected: &HashSet<NodePath>, renderer: &mut R) -> EvictionOutcome {
    let mut outcome = EvictionOutcome::default();
    if self.usage > self.budget {
      for path in eviction_order(&self.nodes, protected) {
        if self.usage <= self.budget {
          break;
        }
        if let Some(node) = self.remove(&path, renderer) {
          debug!(%path, bytes = node.byte_size, last_used = node.last_used, "evicted");
          outcome.freed_bytes += node.byte_size;
          outcome.evicted.push(path);
        }
      }
    }

    if self.usage > self.budget {
      if !self.over_budget {
        self.over_budget = true;
        outcome.exceeded = Some(BudgetExceeded {
          usage: self.usage,
          budget: self.budget,
        });
      }
    } else {
      self.over_budget = false;
    }
    outcome
  }

  /// Drop everything, releasing all handles.
  pub fn clear<R: RenderBackend>(&mut self, renderer: &mut R) -> usize {
    let count = self.nodes.len();
    for (_, mut node) in self.nodes.drain() {
      release_handles(&mut node, renderer);
    }
    self.usage = 0;
    self.over_budget = false;
    count
  }
}

fn release_handles<R: RenderBackend>(node: &mut ResidentNode, renderer: &mut R) {
  for mesh in node.gpu.take().into_iter().flatten() {
    renderer.release(mesh.mesh);
    if let Some(texture) = mesh.texture {
      renderer.release(texture);
    }
  }
}

#[cfg(test)]
#[path = "resident_test.rs"]
mod resident_test;
