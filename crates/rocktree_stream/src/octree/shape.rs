//! Shape index: what the client knows about the octree's structure.
//!
//! Records come from bulk packets and are kept for the whole session, so
//! traversal never re-parses a packet. A node's shape is known once both its
//! own record and its child mask are known. Nodes at the bottom level of a
//! bulk only learn their child mask when the bulk they head arrives.

use std::collections::{HashMap, HashSet};

use super::{BoundingSphere, NodePath};
use crate::constants::BULK_LEVELS;
use crate::decode::{BulkMetadata, NodeMetadata};
use crate::error::ProtocolInconsistency;

/// Known record of one node.
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeNode {
  pub meta: NodeMetadata,
  /// Sphere used for projected error.
  pub bounds: BoundingSphere,
  /// Bit `o` set when child `o` exists. `None` until the bulk that lists the
  /// children has been decoded.
  pub child_mask: Option<u8>,
}

/// Outcome of merging one bulk into the index.
#[derive(Debug, Default)]
pub struct BulkInsert {
  /// Nodes whose shape became known with this bulk, including the head.
  pub shape_known: Vec<NodePath>,
  pub inconsistencies: Vec<ProtocolInconsistency>,
}

#[derive(Debug, Default)]
pub struct OctreeShape {
  nodes: HashMap<NodePath, ShapeNode>,
  /// Nodes treated as having no children after an inconsistency.
  leaf_only: HashSet<NodePath>,
  /// Heads whose bulk has been decoded.
  bulks: HashSet<NodePath>,
}

impl OctreeShape {
  pub fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  #[inline]
  pub fn get(&self, path: &NodePath) -> Option<&ShapeNode> {
    self.nodes.get(path)
  }

  #[inline]
  pub fn contains(&self, path: &NodePath) -> bool {
    self.nodes.contains_key(path)
  }

  /// Whether the bulk headed by `head` has been merged.
  #[inline]
  pub fn has_bulk(&self, head: &NodePath) -> bool {
    self.bulks.contains(head)
  }

  #[inline]
  pub fn is_leaf_only(&self, path: &NodePath) -> bool {
    self.leaf_only.contains(path)
  }

  /// Child mask after leaf-only overrides.
  pub fn child_mask(&self, path: &NodePath) -> Option<u8> {
    if self.leaf_only.contains(path) && self.nodes.contains_key(path) {
      return Some(0);
    }
    self.nodes.get(path).and_then(|node| node.child_mask)
  }

  pub fn is_shape_known(&self, path: &NodePath) -> bool {
    self.child_mask(path).is_some()
  }

  /// Shape known and no children.
  pub fn is_known_leaf(&self, path: &NodePath) -> bool {
    self.child_mask(path) == Some(0)
  }

  /// Children that exist according to the effective mask.
  pub fn existing_children(&self, path: &NodePath) -> Vec<NodePath> {
    let mask = self.child_mask(path).unwrap_or(0);
    (0..8u8).filter(|o| mask & (1 << o) != 0).map(|o| path.child(o)).collect()
  }

  /// Install the root record synthesized from the planetoid packet.
  ///
  /// The child mask stays unknown until the root bulk arrives.
  pub fn insert_root(&mut self, meta: NodeMetadata, bounds: BoundingSphere) {
    debug_assert!(meta.path.is_root());
    let child_mask = self.nodes.get(&meta.path).and_then(|node| node.child_mask);
    self.nodes.insert(
      meta.path.clone(),
      ShapeNode {
        meta,
        bounds,
        child_mask,
      },
    );
  }

  /// Treat `path` as childless and describe why.
  pub fn mark_leaf_only(&mut self, path: &NodePath, detail: impl Into<String>) -> ProtocolInconsistency {
    self.leaf_only.insert(path.clone());
    ProtocolInconsistency::new(path.clone(), detail)
  }

  /// Merge a decoded bulk.
  ///
  /// Clears any leaf-only flag on the head. Records whose parent is missing
  /// from the bulk are dropped and reported.
  pub fn insert_bulk(&mut self, bulk: &BulkMetadata) -> BulkInsert {
    let mut out = BulkInsert::default();
    let head = &bulk.head;
    let present: HashSet<&NodePath> = bulk.nodes.iter().map(|node| &node.path).collect();

    self.leaf_only.remove(head);
    self.bulks.insert(head.clone());
    let head_mask = bulk.child_mask_of(head);
    if let Some(node) = self.nodes.get_mut(head) {
      node.child_mask = Some(head_mask);
      out.shape_known.push(head.clone());
    }

    let mut sorted: Vec<&NodeMetadata> = bulk.nodes.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    for meta in sorted {
      let path = &meta.path;
      let parent_listed = path
        .parent()
        .map_or(false, |parent| &parent == head || present.contains(&parent));
      if !parent_listed {
        out.inconsistencies.push(ProtocolInconsistency::new(
          path.clone(),
          format!("listed in bulk {head} without its parent"),
        ));
        continue;
      }

      let bounds = match &meta.obb {
        Some(obb) => obb.bounding_sphere(),
        None => path
          .parent()
          .and_then(|parent| self.nodes.get(&parent))
          .map_or(BoundingSphere::new(bulk.head_node_center, 0.0), |parent| parent.bounds),
      };

      let listed_mask = bulk.child_mask_of(path);
      let bottom_level = path.level() - head.level() == BULK_LEVELS;
      let child_mask = if !bottom_level {
        if meta.is_leaf() && listed_mask != 0 {
          out
            .inconsistencies
            .push(self.mark_leaf_only(path, "flagged leaf but has children in its bulk"));
        }
        Some(listed_mask)
      } else if meta.is_leaf() {
        Some(0)
      } else {
        if meta.bulk_epoch.is_none() {
          out
            .inconsistencies
            .push(self.mark_leaf_only(path, "heads a bulk without a bulk epoch"));
        }
        // Keep a mask learned from the node's own bulk.
        self.nodes.get(path).and_then(|node| node.child_mask)
      };

      self.nodes.insert(
        path.clone(),
        ShapeNode {
          meta: meta.clone(),
          bounds,
          child_mask,
        },
      );
      if self.is_shape_known(path) {
        out.shape_known.push(path.clone());
      }
    }
    out
  }
}

#[cfg(test)]
#[path = "shape_test.rs"]
mod shape_test;
