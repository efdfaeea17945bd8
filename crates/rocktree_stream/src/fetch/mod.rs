//! Fetch and decode off the coordinator thread.

pub mod pipeline;
pub mod request;
pub mod retry;
pub mod store;
pub mod transport;

pub use pipeline::{FetchPipeline, PipelineStats};
pub use request::{DecodeJob, FetchEvent, FetchKey, FetchKind, FetchOutput, FetchPriority, FetchRequest, FetchTicket};
pub use retry::RetryPolicy;
pub use store::{ByteStore, DiskStore, MemoryStore, NoStore};
pub use transport::{Transport, UrlBuilder};
