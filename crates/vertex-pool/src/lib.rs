//! Vertex Pool: ephemeral resource handles.
//!
//! Network clients, embedding engines, and local model bindings are hydrated
//! on first use and collapsed after an idle TTL. Two flavors:
//! - `ResourcePool`: one handle per key (e.g. per provider)
//! - `SingleSlotPool`: one handle total (e.g. the embedding engine)

pub mod handle;
pub mod keyed;
pub mod slot;

pub use handle::ResourceHandle;
pub use keyed::{Hydrator, ResourcePool};
pub use slot::SingleSlotPool;

use serde::Serialize;

/// Counters for one pool instance.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub name: String,
    pub live: usize,
    pub hydrations: u64,
    pub evictions: u64,
    pub releases: u64,
    pub ttl_secs: u64,
}
