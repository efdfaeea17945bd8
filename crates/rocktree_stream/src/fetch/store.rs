//! Optional byte store consulted before the transport.
//!
//! The disk store frames each payload so damaged files are detected on read:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "RKTC"
//! 4       2     version (LE)
//! 6       2     reserved, zero
//! 8       4     payload length (LE)
//! 12      4     CRC-32 of payload (LE)
//! 16      n     payload
//! ```

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::constants::{STORE_HEADER_LEN, STORE_MAGIC, STORE_VERSION};
use crate::error::{DecodeError, DecodeResult};

/// Keyed byte cache shared by all workers. Keys are request URLs.
pub trait ByteStore: Send + Sync {
  /// `Ok(None)` on a miss; `Err` when a stored entry is corrupt.
  fn get(&self, key: &str) -> DecodeResult<Option<Vec<u8>>>;

  /// Best effort; failures are logged and otherwise ignored.
  fn put(&self, key: &str, bytes: &[u8]);
}

/// Stores nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStore;

impl ByteStore for NoStore {
  fn get(&self, _key: &str) -> DecodeResult<Option<Vec<u8>>> {
    Ok(None)
  }

  fn put(&self, _key: &str, _bytes: &[u8]) {}
}

/// Keeps raw payloads in memory for the life of the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().map_or(0, |entries| entries.len())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ByteStore for MemoryStore {
  fn get(&self, key: &str) -> DecodeResult<Option<Vec<u8>>> {
    Ok(self.entries.lock().ok().and_then(|entries| entries.get(key).cloned()))
  }

  fn put(&self, key: &str, bytes: &[u8]) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.insert(key.to_string(), bytes.to_vec());
    }
  }
}

/// One framed file per key under a root directory.
#[derive(Clone, Debug)]
pub struct DiskStore {
  root: PathBuf,
}

impl DiskStore {
  /// Open (and create if needed) a store rooted at `root`.
  pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
    let root = root.into();
    std::fs::create_dir_all(&root)?;
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// File holding `key`.
  pub fn entry_path(&self, key: &str) -> PathBuf {
    self.root.join(format!("{:016x}.rktc", fnv1a64(key.as_bytes())))
  }
}

impl ByteStore for DiskStore {
  fn get(&self, key: &str) -> DecodeResult<Option<Vec<u8>>> {
    let path = self.entry_path(key);
    let bytes = match std::fs::read(&path) {
      Ok(bytes) => bytes,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
      Err(err) => {
        warn!(path = %path.display(), "byte store read failed: {err}");
        return Ok(None);
      }
    };
    decode_frame(&bytes).map(|payload| Some(payload.to_vec()))
  }

  fn put(&self, key: &str, bytes: &[u8]) {
    let path = self.entry_path(key);
    // Write then rename so readers never see a partial frame.
    let tmp = path.with_extension("tmp");
    let result = std::fs::write(&tmp, encode_frame(bytes)).and_then(|()| std::fs::rename(&tmp, &path));
    if let Err(err) = result {
      warn!(path = %path.display(), "byte store write failed: {err}");
    }
  }
}

// =============================================================================
// Framing
// =============================================================================

pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
  let mut out = Vec::with_capacity(STORE_HEADER_LEN + payload.len());
  out.extend_from_slice(&STORE_MAGIC);
  out.extend_from_slice(&STORE_VERSION.to_le_bytes());
  out.extend_from_slice(&0u16.to_le_bytes());
  out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
  out.extend_from_slice(&crc32(payload).to_le_bytes());
  out.extend_from_slice(payload);
  out
}

pub fn decode_frame(bytes: &[u8]) -> DecodeResult<&[u8]> {
  if bytes.len() < STORE_HEADER_LEN {
    return Err(DecodeError::Truncated("store frame header"));
  }
  let magic: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];
  if magic != STORE_MAGIC {
    return Err(DecodeError::BadMagic { found: magic });
  }
  let version = u16::from_le_bytes([bytes[4], bytes[5]]);
  if version != STORE_VERSION {
    return Err(DecodeError::UnsupportedVersion(version));
  }
  let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
  let expected = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
  let payload = bytes
    .get(STORE_HEADER_LEN..STORE_HEADER_LEN + len)
    .ok_or(DecodeError::Truncated("store frame payload"))?;
  let computed = crc32(payload);
  if computed != expected {
    return Err(DecodeError::ChecksumMismatch { expected, computed });
  }
  Ok(payload)
}

/// CRC-32 (IEEE 802.3, reflected).
pub fn crc32(data: &[u8]) -> u32 {
  let mut crc: u32 = 0xFFFF_FFFF;
  for &byte in data {
    crc ^= u32::from(byte);
    for _ in 0..8 {
      if crc & 1 != 0 {
        crc = (crc >> 1) ^ 0xEDB8_8320;
      } else {
        crc >>= 1;
      }
    }
  }
  crc ^ 0xFFFF_FFFF
}

fn fnv1a64(data: &[u8]) -> u64 {
  let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
  for &byte in data {
    hash ^= u64::from(byte);
    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
  }
  hash
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
