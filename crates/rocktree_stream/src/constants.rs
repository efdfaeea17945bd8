//! Protocol constants for the rocktree octree.
//!
//! Flag bits, packet layout sizes and texture format identifiers shared by the
//! decoder, the shape index and the fetch pipeline.

// =============================================================================
// Octree layout
// =============================================================================

/// Number of octree levels described by a single bulk metadata packet.
pub const BULK_LEVELS: usize = 4;

/// Deepest level the server is known to serve.
pub const MAX_LEVEL: usize = 20;

/// Inline capacity of a path before it spills to the heap.
pub const PATH_INLINE_CAPACITY: usize = 24;

/// Slots for per-level statistics (must exceed MAX_LEVEL).
pub const LEVEL_SLOTS: usize = 32;

// =============================================================================
// NodeMetadata flags (upper bits of path_and_flags)
// =============================================================================

pub const FLAG_RICH3D_LEAF: u32 = 1;
pub const FLAG_RICH3D_NODATA: u32 = 2;
/// Node has no children, not even in a child bulk.
pub const FLAG_LEAF: u32 = 4;
/// Node has no node-data packet.
pub const FLAG_NODATA: u32 = 8;
/// Node-data requests must carry the imagery epoch.
pub const FLAG_USE_IMAGERY_EPOCH: u32 = 16;

// =============================================================================
// Packed field sizes
// =============================================================================

/// Size of the packed oriented bounding box in NodeMetadata.
pub const OBB_PACKED_LEN: usize = 15;

/// Number of layer bounds produced from `layer_and_octant_counts`.
pub const LAYER_BOUNDS_LEN: usize = 10;

/// Layer whose end bound limits the renderable index range.
pub const RENDERABLE_LAYER: usize = 3;

/// Bias applied to packed normal components.
pub const NORMAL_BIAS: f32 = 127.0;

// =============================================================================
// Texture format identifiers (wire values)
// =============================================================================

pub const TEXTURE_FORMAT_JPG: u32 = 1;
pub const TEXTURE_FORMAT_DXT1: u32 = 2;
pub const TEXTURE_FORMAT_ETC1: u32 = 3;
pub const TEXTURE_FORMAT_PVRTC2: u32 = 4;
pub const TEXTURE_FORMAT_PVRTC4: u32 = 5;
pub const TEXTURE_FORMAT_CRN_DXT1: u32 = 6;

/// Default texture width/height when a Texture message omits them.
pub const DEFAULT_TEXTURE_SIZE: u32 = 256;

// =============================================================================
// Byte store framing
// =============================================================================

pub const STORE_MAGIC: [u8; 4] = *b"RKTC";
pub const STORE_VERSION: u16 = 1;
/// magic(4) + version(2) + reserved(2) + length(4) + crc(4)
pub const STORE_HEADER_LEN: usize = 16;

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
