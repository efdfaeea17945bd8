//! Resident node cache with byte budget and LRU eviction.

pub mod eviction;
pub mod resident;

pub use eviction::EvictionOutcome;
pub use resident::{ResidentCache, ResidentNode};
