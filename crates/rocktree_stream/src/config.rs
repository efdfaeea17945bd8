//! Engine configuration, loadable from TOML.
//!
//! Every section has defaults, so a config file only names what it changes:
//!
//! ```toml
//! [lod]
//! error_threshold = 2.0
//!
//! [cache]
//! budget_bytes = 268435456
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::constants::MAX_LEVEL;
use crate::decode::{IndexEncoding, NodeDecodeOptions, TextureDecodeOptions, TextureFormat};
use crate::error::ConfigError;
use crate::fetch::RetryPolicy;
use crate::octree::RequestBudget;

/// Root configuration for a `StreamingEngine`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
	pub endpoint: EndpointConfig,
	pub lod: LodConfig,
	pub cache: CacheConfig,
	pub fetch: FetchConfig,
	pub decode: DecodeConfig,
}

/// URL templates. `{base}`, `{path}`, `{epoch}`, `{texture_format}` and
/// `{imagery_epoch}` are substituted per request.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
	pub base_url: String,
	pub planetoid: String,
	pub bulk: String,
	pub node_data: String,
	/// Used instead of `node_data` for nodes flagged to send an imagery epoch.
	pub node_data_imagery: String,
}

impl Default for EndpointConfig {
	fn default() -> Self {
		Self {
			base_url: "https://kh.google.com/rt/earth/".to_string(),
			planetoid: "{base}PlanetoidMetadata".to_string(),
			bulk: "{base}BulkMetadata/pb=!1m2!1s{path}!2u{epoch}".to_string(),
			node_data: "{base}NodeData/pb=!1m2!1s{path}!2u{epoch}!2e{texture_format}!4b0".to_string(),
			node_data_imagery: "{base}NodeData/pb=!1m2!1s{path}!2u{epoch}!2e{texture_format}!3u{imagery_epoch}!4b0"
				.to_string(),
		}
	}
}

/// Level-of-detail selection.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LodConfig {
	/// Refine while a node's projected radius exceeds this many pixels.
	pub error_threshold: f64,
	/// Deepest level the selector descends to.
	pub max_level: usize,
	/// Distances below this are clamped when projecting error.
	pub min_distance: f64,
}

impl Default for LodConfig {
	fn default() -> Self {
		Self {
			error_threshold: 128.0,
			max_level: MAX_LEVEL,
			min_distance: 1.0,
		}
	}
}

/// Resident cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Byte budget for decoded payloads.
	pub budget_bytes: usize,
	/// Syncs to wait before retrying a failed node.
	pub failed_retry_cooldown_frames: u64,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			budget_bytes: 512 * 1024 * 1024,
			failed_retry_cooldown_frames: 120,
		}
	}
}

/// Fetch pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
	/// Threads in the dedicated fetch/decode pool.
	pub workers: usize,
	/// Jobs allowed to run at once.
	pub max_in_flight: usize,
	/// Per-attempt transport timeout.
	pub timeout_ms: u64,
	pub retry: RetryPolicy,
	pub requests_per_sync: RequestBudget,
}

impl Default for FetchConfig {
	fn default() -> Self {
		Self {
			workers: 4,
			max_in_flight: 16,
			timeout_ms: 10_000,
			retry: RetryPolicy::default(),
			requests_per_sync: RequestBudget::default(),
		}
	}
}

/// Decoder knobs. Defaults match recorded rocktree traffic.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
	/// Quantization grid width when a packet carries no globe matrix.
	pub quantization_bits: u8,
	pub index_encoding: IndexEncoding,
	/// Expand DXT1 to RGBA8 instead of handing blocks to the renderer.
	pub expand_block_compressed: bool,
	/// Requested texture formats in preference order.
	pub preferred_texture_formats: Vec<TextureFormat>,
}

impl Default for DecodeConfig {
	fn default() -> Self {
		Self {
			quantization_bits: 8,
			index_encoding: IndexEncoding::Strip,
			expand_block_compressed: false,
			preferred_texture_formats: vec![TextureFormat::Dxt1, TextureFormat::Jpg],
		}
	}
}

impl DecodeConfig {
	pub fn node_options(&self) -> NodeDecodeOptions {
		NodeDecodeOptions {
			index_encoding: self.index_encoding,
			quantization_bits: self.quantization_bits,
			texture: TextureDecodeOptions {
				expand_block_compressed: self.expand_block_compressed,
			},
		}
	}

	/// Format to request for a node advertising `available` formats.
	pub fn texture_format_for(&self, available: u32) -> TextureFormat {
		TextureFormat::choose(&self.preferred_texture_formats, available)
	}
}

impl EngineConfig {
	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let config: EngineConfig = toml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_toml_str(&content)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.fetch.workers == 0 {
			return Err(ConfigError::Invalid("fetch.workers must be at least 1".into()));
		}
		if self.fetch.max_in_flight == 0 {
			return Err(ConfigError::Invalid("fetch.max_in_flight must be at least 1".into()));
		}
		if self.fetch.retry.max_attempts == 0 {
			return Err(ConfigError::Invalid("fetch.retry.max_attempts must be at least 1".into()));
		}
		if !(1..=16).contains(&self.decode.quantization_bits) {
			return Err(ConfigError::Invalid(format!(
				"decode.quantization_bits must be in 1..=16, got {}",
				self.decode.quantization_bits
			)));
		}
		if !(self.lod.error_threshold.is_finite() && self.lod.error_threshold > 0.0) {
			return Err(ConfigError::Invalid(format!(
				"lod.error_threshold must be positive, got {}",
				self.lod.error_threshold
			)));
		}
		if !(self.lod.min_distance.is_finite() && self.lod.min_distance > 0.0) {
			return Err(ConfigError::Invalid(format!(
				"lod.min_distance must be positive, got {}",
				self.lod.min_distance
			)));
		}
		Ok(())
	}
}
