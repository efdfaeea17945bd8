//! Error taxonomy for the streaming engine.
//!
//! Per-node failures (`DecodeError`, `FetchError`) never abort a frame. They
//! move the node to `Failed` and are reported. Engine construction and config
//! loading use `EngineError` / `ConfigError`.

use std::time::Duration;

use thiserror::Error;

use crate::octree::NodePath;

/// Failure while parsing a packet. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
  #[error("packet truncated while reading {0}")]
  Truncated(&'static str),
  #[error("bad magic {found:02x?}")]
  BadMagic { found: [u8; 4] },
  #[error("unsupported version {0}")]
  UnsupportedVersion(u16),
  #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
  ChecksumMismatch { expected: u32, computed: u32 },
  #[error("unsupported encoding: {0}")]
  UnsupportedEncoding(String),
  #[error("malformed {field}: {reason}")]
  Malformed { field: &'static str, reason: String },
}

impl DecodeError {
  pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
    Self::Malformed {
      field,
      reason: reason.into(),
    }
  }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// Failure reported by a `Transport` for a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
  #[error("network error: {0}")]
  Network(String),
  #[error("attempt timed out after {0:?}")]
  Timeout(Duration),
  #[error("HTTP status {0}")]
  HttpStatus(u16),
}

impl TransportError {
  /// Client errors other than 408/429 will not change on retry.
  pub fn is_permanent(&self) -> bool {
    match self {
      Self::HttpStatus(code) => (400..500).contains(code) && *code != 408 && *code != 429,
      Self::Network(_) | Self::Timeout(_) => false,
    }
  }
}

/// Terminal outcome of a fetch once retries are exhausted or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  #[error("network failure after {attempts} attempt(s): {source}")]
  NetworkFailure {
    attempts: u32,
    #[source]
    source: TransportError,
  },
  #[error("HTTP status {code} after {attempts} attempt(s)")]
  HttpStatus { code: u16, attempts: u32 },
  #[error("decode failed: {0}")]
  DecodeFailure(#[from] DecodeError),
}

impl FetchError {
  /// Build the terminal error for the last transport failure.
  pub fn from_transport(error: TransportError, attempts: u32) -> Self {
    match error {
      TransportError::HttpStatus(code) => Self::HttpStatus { code, attempts },
      other => Self::NetworkFailure {
        attempts,
        source: other,
      },
    }
  }

  /// Permanent failures are not re-requested by later selections.
  pub fn is_permanent(&self) -> bool {
    match self {
      Self::HttpStatus { code, .. } => TransportError::HttpStatus(*code).is_permanent(),
      Self::NetworkFailure { .. } => false,
      Self::DecodeFailure(_) => true,
    }
  }

  /// Whether the payload reached the decoder.
  pub fn is_decode_failure(&self) -> bool {
    matches!(self, Self::DecodeFailure(_))
  }
}

/// Resident bytes stay above budget because nothing is evictable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("resident usage {usage} bytes exceeds budget {budget} bytes with nothing evictable")]
pub struct BudgetExceeded {
  pub usage: usize,
  pub budget: usize,
}

/// Server metadata contradicts itself or other observed packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("protocol inconsistency at {path}: {detail}")]
pub struct ProtocolInconsistency {
  pub path: NodePath,
  pub detail: String,
}

impl ProtocolInconsistency {
  pub fn new(path: NodePath, detail: impl Into<String>) -> Self {
    Self {
      path,
      detail: detail.into(),
    }
  }
}

/// Failure loading or validating an `EngineConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("invalid config: {0}")]
  Invalid(String),
}

/// Failure constructing the engine.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error("failed to build worker pool: {0}")]
  WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
