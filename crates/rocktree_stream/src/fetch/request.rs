//! Fetch requests, their dispatch priority and the events workers send back.

use std::cmp::Ordering;

use crate::decode::{BulkMetadata, NodeDecodeOptions, NodePayload, PlanetoidMetadata};
use crate::error::FetchError;
use crate::octree::{NodePath, OrientedBoundingBox};

/// Packet kind. Declaration order is dispatch order within a level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchKind {
  Planetoid,
  Bulk,
  NodeData,
}

/// At most one request per key is outstanding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchKey {
  pub path: NodePath,
  pub kind: FetchKind,
}

impl FetchKey {
  pub fn planetoid() -> Self {
    Self {
      path: NodePath::root(),
      kind: FetchKind::Planetoid,
    }
  }

  pub fn bulk(head: NodePath) -> Self {
    Self {
      path: head,
      kind: FetchKind::Bulk,
    }
  }

  pub fn node_data(path: NodePath) -> Self {
    Self {
      path,
      kind: FetchKind::NodeData,
    }
  }
}

/// Dispatch priority. `Ordering::Less` dispatches first: coarser level, then
/// kind, then larger projected error, then path order.
#[derive(Clone, Debug)]
pub struct FetchPriority {
  pub level: usize,
  pub kind: FetchKind,
  pub error: f64,
  pub path: NodePath,
}

impl FetchPriority {
  pub fn new(key: &FetchKey, error: f64) -> Self {
    Self {
      level: key.path.level(),
      kind: key.kind,
      error,
      path: key.path.clone(),
    }
  }
}

impl Ord for FetchPriority {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .level
      .cmp(&other.level)
      .then_with(|| self.kind.cmp(&other.kind))
      .then_with(|| other.error.total_cmp(&self.error))
      .then_with(|| self.path.cmp(&other.path))
  }
}

impl PartialOrd for FetchPriority {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for FetchPriority {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for FetchPriority {}

/// How a worker turns fetched bytes into records.
#[derive(Clone, Debug)]
pub enum DecodeJob {
  Planetoid,
  Bulk { head: NodePath },
  NodeData {
    path: NodePath,
    /// Fallback dequantization frame.
    bounds: Option<OrientedBoundingBox>,
    options: NodeDecodeOptions,
  },
}

#[derive(Clone, Debug)]
pub struct FetchRequest {
  pub key: FetchKey,
  pub url: String,
  pub priority: FetchPriority,
  pub decode: DecodeJob,
}

/// Decoded result of a completed request.
#[derive(Debug)]
pub enum FetchOutput {
  Planetoid(PlanetoidMetadata),
  Bulk(BulkMetadata),
  NodeData(Box<NodePayload>),
}

/// Worker to coordinator message. Every request yields at most one
/// `Fetched` followed by exactly one `Completed`.
#[derive(Debug)]
pub enum FetchEvent {
  /// Bytes are in hand and decoding has started.
  Fetched { key: FetchKey, bytes: usize, from_store: bool },
  Completed {
    key: FetchKey,
    attempts: u32,
    result: Result<FetchOutput, FetchError>,
  },
}

impl FetchEvent {
  pub fn key(&self) -> &FetchKey {
    match self {
      Self::Fetched { key, .. } | Self::Completed { key, .. } => key,
    }
  }
}

/// Handle returned by `FetchPipeline::request`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
  pub key: FetchKey,
  /// True when the key was already outstanding and this request joined it.
  pub joined: bool,
}
