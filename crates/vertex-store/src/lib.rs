//! Vertex Store: SQLite model catalog with fixed-dimension embedding blobs.

pub mod embedding;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use embedding::cosine_similarity;
pub use sqlite::CatalogStore;
pub use types::*;
