//! Binary packet decoding.
//!
//! Every function in this module is pure: bytes plus the requested path in,
//! records or a [`DecodeError`](crate::error::DecodeError) out. Workers call
//! these off the coordinator thread.

pub mod connectivity;
pub mod geometry;
pub mod metadata;
pub mod node;
pub mod texture;
pub mod wire;

pub use connectivity::{Connectivity, IndexEncoding};
pub use metadata::{decode_bulk, decode_planetoid, BulkMetadata, NodeMetadata, PlanetoidMetadata};
pub use node::{decode_node_data, DecodedMesh, NodeDecodeOptions, NodePayload};
pub use texture::{DecodedTexture, PixelFormat, TextureDecodeOptions, TextureFormat};
pub use wire::{WireReader, WireWriter};
