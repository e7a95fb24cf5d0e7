//! Vertex Infer: embedding engines for the model catalog.
//!
//! Provides the `EmbedderBackend` trait. When the `onnx` feature is enabled
//! and model files are present, `OnnxEmbedder` loads all-MiniLM-L6-v2.
//! Otherwise the pinned `HashEmbedder` is used. The choice is made once by
//! `EmbedderKind::detect`; every later load reproduces that exact engine or
//! fails, so a collapsed engine never comes back as a different one.

pub mod embedder;
pub mod onnx_embedder;

pub use embedder::{EmbedderBackend, HashEmbedder};

#[cfg(feature = "onnx")]
pub use onnx_embedder::{OnnxEmbedder, ONNX_ENGINE_NAME};

#[cfg(feature = "onnx")]
use std::path::PathBuf;
use std::path::Path;
use std::sync::Arc;

use vertex_core::Result;

/// Which engine backs the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderKind {
    Hash,
    #[cfg(feature = "onnx")]
    Onnx(PathBuf),
}

impl EmbedderKind {
    /// Pick the best available engine for `model_dir`.
    pub fn detect(model_dir: &Path, dim: usize) -> Self {
        #[cfg(feature = "onnx")]
        {
            match OnnxEmbedder::load(model_dir, dim) {
                Ok(_) => {
                    tracing::info!("Using ONNX embedder (dim={})", dim);
                    return Self::Onnx(model_dir.to_path_buf());
                }
                Err(e) => {
                    tracing::warn!("ONNX embedder unavailable: {}. Using hash embedder.", e);
                }
            }
        }

        #[cfg(not(feature = "onnx"))]
        {
            let _ = model_dir;
            tracing::info!("ONNX feature disabled. Using hash embedder (dim={}).", dim);
        }

        Self::Hash
    }

    /// Load this exact engine. Never substitutes another backend.
    pub fn load(&self, dim: usize) -> Result<Arc<dyn EmbedderBackend>> {
        match self {
            Self::Hash => Ok(Arc::new(HashEmbedder::new(dim))),
            #[cfg(feature = "onnx")]
            Self::Onnx(model_dir) => Ok(Arc::new(OnnxEmbedder::load(model_dir, dim)?)),
        }
    }
}
