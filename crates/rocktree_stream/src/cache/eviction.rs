//! Eviction ordering.

use std::collections::{HashMap, HashSet};

use super::resident::ResidentNode;
use crate::error::BudgetExceeded;
use crate::octree::NodePath;

/// Result of one eviction pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
  /// In eviction order.
  pub evicted: Vec<NodePath>,
  pub freed_bytes: usize,
  /// Set on the first pass of an over-budget episode.
  pub exceeded: Option<BudgetExceeded>,
}

/// Unprotected resident paths, least recently used first, then by level and
/// path order.
pub(crate) fn eviction_order(nodes: &HashMap<NodePath, ResidentNode>, protected: &HashSet<NodePath>) -> Vec<NodePath> {
  let mut candidates: Vec<(u64, usize, &NodePath)> = nodes
    .iter()
    .filter(|(path, _)| !protected.contains(*path))
    .map(|(path, node)| (node.last_used, path.level(), path))
    .collect();
  candidates.sort_unstable();
  candidates.into_iter().map(|(_, _, path)| path.clone()).collect()
}
