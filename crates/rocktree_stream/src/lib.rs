//! rocktree_stream - Streaming and caching engine for rocktree globe octrees
//!
//! Streams a planet-scale hierarchy of textured meshes from a rocktree server,
//! keeps a byte-budgeted resident set in memory, and hands the host renderer a
//! crack-free draw list each frame.
//!
//! # Features
//!
//! - **Wire decoding**: planetoid, bulk metadata and node data packets, with
//!   delta-coded vertices, high-water index strips, DXT1 expansion and JPEG
//! - **Screen-space LOD**: refine while a node's projected radius exceeds a
//!   pixel threshold, requesting bulk metadata as the walk reaches it
//! - **Fetch pipeline**: prioritized, deduplicated fetches with retry and an
//!   optional on-disk byte store, decoded on a dedicated rayon pool
//! - **Resident cache**: LRU eviction under a byte budget; nodes being drawn
//!   or loaded are never evicted
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rocktree_stream::{CameraState, EngineConfig, NoStore, NullRenderer, StreamingEngine};
//!
//! let config = EngineConfig::load("rocktree.toml".as_ref())?;
//! let mut engine = StreamingEngine::new(config, Arc::new(my_transport), Arc::new(NoStore), NullRenderer::default())?;
//!
//! loop {
//!     let view = engine.sync(&camera);
//!     for item in view.iter() {
//!         draw(item.transform(), item.meshes, item.covered_octants);
//!     }
//! }
//! ```

pub mod cache;
pub mod camera;
pub mod config;
pub mod constants;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod octree;
pub mod render;
pub mod state;
pub mod types;

// Re-export commonly used items
pub use camera::CameraState;
pub use config::EngineConfig;
pub use error::{BudgetExceeded, ConfigError, DecodeError, EngineError, FetchError, ProtocolInconsistency, TransportError};
pub use metrics::EngineMetrics;
pub use octree::NodePath;
pub use render::{GpuHandle, GpuMesh, NullRenderer, RenderBackend, ResidentView, ViewItem};
pub use state::NodeState;

// Fetching and decoding off the coordinator thread
pub mod fetch;
pub use fetch::{ByteStore, DiskStore, MemoryStore, NoStore, Transport};

// Coordinator
pub mod engine;
pub use engine::{EngineReport, NodeDataParams, StreamingEngine};

#[cfg(test)]
pub(crate) mod test_utils;
