//! Vertex Core: error taxonomy, configuration, data directory layout.

pub mod config;
pub mod error;

pub use config::{DataPaths, VertexConfig};
pub use error::{Error, Result};
