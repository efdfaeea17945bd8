//! Per-node lifecycle state machine.
//!
//! ```text
//! Unknown ─► MetadataRequested ─► ShapeKnown ─► DataRequested ─► Decoding ─► Resident
//!                   │                                │              │           │
//!                   └─────────────► Failed ◄─────────┴──────────────┘       Evicting ─► Unknown
//! ```
//!
//! `is_legal` holds the full table, including prefetch and retry edges.
//!
//! The table is mutated only by the coordinator. Nodes without a record are
//! `Unknown`.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::octree::NodePath;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeState {
  Unknown,
  MetadataRequested,
  ShapeKnown,
  DataRequested,
  Decoding,
  Resident,
  Evicting,
  Failed,
}

impl NodeState {
  pub const ALL: [NodeState; 8] = [
    NodeState::Unknown,
    NodeState::MetadataRequested,
    NodeState::ShapeKnown,
    NodeState::DataRequested,
    NodeState::Decoding,
    NodeState::Resident,
    NodeState::Evicting,
    NodeState::Failed,
  ];

  #[inline]
  pub fn index(self) -> usize {
    self as usize
  }
}

impl fmt::Display for NodeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

/// Which component caused a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
  Selector,
  FetchCompletion,
  DecoderCompletion,
  CacheEviction,
}

/// Request lane a failure happened on; a retry re-enters the same lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailedLane {
  Metadata,
  Data,
}

/// Whether `trigger` may move a node from `from` to `to`.
pub fn is_legal(from: NodeState, to: NodeState, trigger: Trigger) -> bool {
  use NodeState::*;
  match trigger {
    Trigger::Selector => matches!(
      (from, to),
      (Unknown, MetadataRequested)
        | (Unknown, ShapeKnown)
        | (ShapeKnown, DataRequested)
        | (Unknown, DataRequested)
        | (Failed, MetadataRequested)
        | (Failed, DataRequested)
    ),
    Trigger::FetchCompletion => matches!(
      (from, to),
      (DataRequested, Decoding) | (MetadataRequested, Failed) | (DataRequested, Failed)
    ),
    Trigger::DecoderCompletion => matches!(
      (from, to),
      (MetadataRequested, ShapeKnown)
        | (Unknown, ShapeKnown)
        | (Decoding, Resident)
        | (Decoding, Failed)
        | (MetadataRequested, Failed)
    ),
    Trigger::CacheEviction => matches!((from, to), (Resident, Evicting) | (Evicting, Unknown)),
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} -> {to} for {path} ({trigger:?})")]
pub struct InvalidTransition {
  pub path: NodePath,
  pub from: NodeState,
  pub to: NodeState,
  pub trigger: Trigger,
}

/// Failure details kept while a node sits in `Failed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureInfo {
  pub lane: FailedLane,
  /// Sync frame the failure was recorded on.
  pub frame: u64,
  /// Permanent failures are never retried automatically.
  pub permanent: bool,
  pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeRecord {
  pub state: NodeState,
  /// Number of times the node left `Failed` for a fresh attempt.
  pub retries: u32,
  pub failure: Option<FailureInfo>,
}

impl Default for NodeRecord {
  fn default() -> Self {
    Self {
      state: NodeState::Unknown,
      retries: 0,
      failure: None,
    }
  }
}

#[derive(Debug, Default)]
pub struct StateTable {
  records: HashMap<NodePath, NodeRecord>,
}

impl StateTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self, path: &NodePath) -> NodeState {
    self.records.get(path).map_or(NodeState::Unknown, |record| record.state)
  }

  pub fn record(&self, path: &NodePath) -> Option<&NodeRecord> {
    self.records.get(path)
  }

  pub fn failure(&self, path: &NodePath) -> Option<&FailureInfo> {
    self.records.get(path).and_then(|record| record.failure.as_ref())
  }

  /// Apply a transition, returning the previous state.
  pub fn transition(&mut self, path: &NodePath, to: NodeState, trigger: Trigger) -> Result<NodeState, InvalidTransition> {
    let from = self.state(path);
    if !is_legal(from, to, trigger) {
      return Err(InvalidTransition {
        path: path.clone(),
        from,
        to,
        trigger,
      });
    }

    if to == NodeState::Unknown {
      self.records.remove(path);
      return Ok(from);
    }
    let record = self.records.entry(path.clone()).or_default();
    if from == NodeState::Failed {
      record.retries += 1;
      record.failure = None;
    }
    record.state = to;
    Ok(from)
  }

  /// Move to `Failed`, remembering the lane for a later retry.
  pub fn fail(&mut self, path: &NodePath, trigger: Trigger, failure: FailureInfo) -> Result<NodeState, InvalidTransition> {
    let from = self.transition(path, NodeState::Failed, trigger)?;
    if let Some(record) = self.records.get_mut(path) {
      record.failure = Some(failure);
    }
    Ok(from)
  }

  /// Whether a failed node may be retried on `frame`.
  pub fn retry_due(&self, path: &NodePath, frame: u64, cooldown_frames: u64) -> bool {
    match self.failure(path) {
      Some(failure) => !failure.permanent && frame >= failure.frame.saturating_add(cooldown_frames),
      None => false,
    }
  }

  /// Node counts indexed by `NodeState::index`.
  pub fn counts(&self) -> [usize; 8] {
    let mut counts = [0; 8];
    for record in self.records.values() {
      counts[record.state.index()] += 1;
    }
    counts
  }

  pub fn iter(&self) -> impl Iterator<Item = (&NodePath, &NodeRecord)> {
    self.records.iter()
  }

  /// Paths currently in `state`, in path order.
  pub fn in_state(&self, state: NodeState) -> Vec<NodePath> {
    let mut paths: Vec<NodePath> = self
      .records
      .iter()
      .filter(|(_, record)| record.state == state)
      .map(|(path, _)| path.clone())
      .collect();
    paths.sort();
    paths
  }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;
