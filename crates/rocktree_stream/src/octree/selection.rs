//! View-dependent LOD selection.
//!
//! Depth-first walk from the root over the shape index. A node stops the
//! descent when it is a known leaf, when its projected error is within the
//! threshold, or at the level limit. Otherwise its children replace it, but
//! only once every existing child's shape is known; until then the node is
//! kept and the missing child bulks are requested.
//!
//! The walk reads nothing but the shape and the camera, so the result is a
//! pure function of both. Raising the threshold can only stop descents
//! earlier, and moving closer can only raise errors.

use std::collections::{BTreeMap, BTreeSet};

use super::{NodePath, OctreeShape};
use crate::camera::CameraState;
use crate::config::LodConfig;

/// Bulk needed before a node's children can be substituted.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRequest {
  pub head: NodePath,
  /// Bulk epoch from the head's own record.
  pub epoch: u32,
  /// Projected error of the node waiting on this bulk.
  pub error: f64,
}

/// Desired node whose payload should be resident.
#[derive(Clone, Debug, PartialEq)]
pub struct DataCandidate {
  pub path: NodePath,
  pub error: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SelectionStats {
  pub visited: usize,
  pub refined: usize,
  /// Nodes kept because a child's shape was still unknown.
  pub waiting_on_metadata: usize,
}

/// Output of one selection pass.
#[derive(Clone, Debug, Default)]
pub struct Selection {
  /// Nodes to draw at their own level, in path order.
  pub desired: BTreeSet<NodePath>,
  /// Bulks to fetch, keyed and ordered by head.
  pub metadata_requests: Vec<MetadataRequest>,
  /// Desired nodes that carry data, in path order.
  pub data_candidates: Vec<DataCandidate>,
  pub stats: SelectionStats,
}

impl Selection {
  #[inline]
  pub fn is_desired(&self, path: &NodePath) -> bool {
    self.desired.contains(path)
  }
}

struct Walk<'a> {
  shape: &'a OctreeShape,
  camera: &'a CameraState,
  lod: &'a LodConfig,
  desired: BTreeSet<NodePath>,
  metadata: BTreeMap<NodePath, MetadataRequest>,
  data: Vec<DataCandidate>,
  stats: SelectionStats,
}

impl Walk<'_> {
  fn error_of(&self, path: &NodePath) -> f64 {
    self
      .shape
      .get(path)
      .map_or(0.0, |node| self.camera.projected_error(&node.bounds, self.lod.min_distance))
  }

  fn emit(&mut self, path: &NodePath, error: f64) {
    if let Some(node) = self.shape.get(path) {
      if node.meta.has_data() {
        self.data.push(DataCandidate {
          path: path.clone(),
          error,
        });
      }
    }
    self.desired.insert(path.clone());
  }

  fn request_bulk(&mut self, head: &NodePath, error: f64) {
    let Some(epoch) = self.shape.get(head).and_then(|node| node.meta.bulk_epoch) else {
      return;
    };
    let entry = self.metadata.entry(head.clone()).or_insert(MetadataRequest {
      head: head.clone(),
      epoch,
      error,
    });
    entry.error = entry.error.max(error);
  }

  fn visit(&mut self, path: &NodePath) {
    self.stats.visited += 1;
    let error = self.error_of(path);

    if self.shape.is_known_leaf(path) || error <= self.lod.error_threshold || path.level() >= self.lod.max_level {
      self.emit(path, error);
      return;
    }

    if !self.shape.is_shape_known(path) {
      self.stats.waiting_on_metadata += 1;
      self.request_bulk(path, error);
      self.emit(path, error);
      return;
    }

    let children = self.shape.existing_children(path);
    let unknown: Vec<&NodePath> = children
      .iter()
      .filter(|child| !self.shape.is_shape_known(child))
      .collect();
    if !unknown.is_empty() {
      self.stats.waiting_on_metadata += 1;
      for child in unknown {
        self.request_bulk(child, error);
      }
      self.emit(path, error);
      return;
    }

    self.stats.refined += 1;
    for child in &children {
      self.visit(child);
    }
  }
}

/// Compute the desired set for `camera`.
///
/// Returns an empty selection until the root record is known.
pub fn select(shape: &OctreeShape, camera: &CameraState, lod: &LodConfig) -> Selection {
  let _span = tracing::info_span!("select").entered();

  let mut walk = Walk {
    shape,
    camera,
    lod,
    desired: BTreeSet::new(),
    metadata: BTreeMap::new(),
    data: Vec::new(),
    stats: SelectionStats::default(),
  };
  let root = NodePath::root();
  if shape.contains(&root) {
    walk.visit(&root);
  }

  let mut data_candidates = walk.data;
  data_candidates.sort_by(|a, b| a.path.cmp(&b.path));

  Selection {
    desired: walk.desired,
    metadata_requests: walk.metadata.into_values().collect(),
    data_candidates,
    stats: walk.stats,
  }
}

#[cfg(test)]
#[path = "selection_test.rs"]
mod selection_test;
