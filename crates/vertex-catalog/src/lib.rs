//! Vertex Catalog: semantic index of candidate models.
//!
//! Models are fetched from a registry on demand, parsed into
//! `ModelRecord`s, embedded with a pinned engine, and stored in SQLite.
//! Search is a filtered cosine ranking over the stored embeddings.

pub mod catalog;
pub mod descriptor;
pub mod registry;

pub use catalog::{BulkIndexReport, CachePolicy, Catalog, EmbedderPool};
pub use registry::{HttpRegistry, RegistryFetcher};

use std::time::Duration;

use vertex_core::Error;
use vertex_infer::EmbedderKind;

/// Single-slot pool that reloads the same `kind` of engine after every collapse.
pub fn embedder_pool(kind: EmbedderKind, dim: usize, ttl: Duration) -> EmbedderPool {
    EmbedderPool::new("embedder", ttl, move || {
        let engine = kind.load(dim)?;
        if engine.dimension() != dim {
            return Err(Error::Config(format!(
                "embedder {} has dimension {}, expected {}",
                engine.name(),
                engine.dimension(),
                dim
            )));
        }
        Ok(engine)
    })
}
