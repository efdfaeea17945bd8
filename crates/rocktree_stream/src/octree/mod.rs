//! Octree addressing, shape index and LOD selection.
//!
//! The octree is an arena keyed by [`NodePath`]. Nothing holds pointers
//! between nodes; parents and children are computed from paths.

pub mod bounds;
pub mod budget;
pub mod path;
pub mod selection;
pub mod shape;

pub use bounds::{BoundingSphere, OrientedBoundingBox};
pub use budget::{RequestBudget, RequestStats};
pub use path::NodePath;
pub use selection::{select, DataCandidate, MetadataRequest, Selection, SelectionStats};
pub use shape::{BulkInsert, OctreeShape, ShapeNode};
