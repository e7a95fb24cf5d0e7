//! ONNX-based embedding engine using all-MiniLM-L6-v2.
//!
//! Heavyweight: owns an ONNX Runtime session. The catalog keeps it in a
//! single-slot pool so it collapses after its idle TTL. Requires the `onnx`
//! feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ndarray::Array1;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tracing::info;

    use crate::embedder::EmbedderBackend;
    use vertex_core::{Error, Result};

    const MAX_SEQ_LEN: usize = 256;

    /// Engine identifier persisted alongside catalog embeddings.
    pub const ONNX_ENGINE_NAME: &str = "onnx:all-MiniLM-L6-v2";

    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimension: usize,
    }

    impl OnnxEmbedder {
        /// Load `model_dir/model.onnx` and `model_dir/tokenizer.json`.
        pub fn load(model_dir: &Path, dimension: usize) -> Result<Self> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");
            for path in [&model_path, &tokenizer_path] {
                if !path.exists() {
                    return Err(Error::Config(format!("missing {}", path.display())));
                }
            }

            ort::init().commit();

            // One intra-op thread keeps reductions in a fixed order.
            let session = Session::builder()
                .map_err(|e| Error::Inference(format!("session builder: {}", e)))?
                .with_intra_threads(1)
                .map_err(|e| Error::Inference(format!("intra threads: {}", e)))?
                .commit_from_file(&model_path)
                .map_err(|e| Error::Inference(format!("ONNX model: {}", e)))?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| Error::Inference(format!("tokenizer: {}", e)))?;

            info!("ONNX embedder loaded from {}", model_path.display());
            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimension,
            })
        }

        fn tensor(data: Vec<i64>, len: usize) -> Result<Tensor<i64>> {
            Tensor::from_array(([1usize, len], data))
                .map_err(|e| Error::Inference(format!("tensor: {}", e)))
        }
    }

    impl EmbedderBackend for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Array1<f32>> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| Error::Inference(format!("tokenize: {}", e)))?;

            let len = encoding.get_ids().len().min(MAX_SEQ_LEN);
            let mask: Vec<i64> = encoding.get_attention_mask()[..len]
                .iter()
                .map(|&m| m as i64)
                .collect();
            let ids: Vec<i64> = encoding.get_ids()[..len].iter().map(|&i| i as i64).collect();

            let inputs = ort::inputs![
                Self::tensor(ids, len)?,
                Self::tensor(mask.clone(), len)?,
                Self::tensor(vec![0; len], len)?
            ];

            let mut session = self.session.lock();
            let outputs = session
                .run(inputs)
                .map_err(|e| Error::Inference(format!("run: {}", e)))?;
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Inference(format!("extract: {}", e)))?;
            let dims: Vec<i64> = shape.iter().copied().collect();

            // [1, seq, dim] needs masked mean pooling; [1, dim] is already pooled.
            let pooled = match dims.as_slice() {
                [_, seq, dim] => {
                    let (seq, dim) = (*seq as usize, *dim as usize);
                    let mut acc = Array1::<f32>::zeros(dim);
                    let mut weight = 0.0f32;
                    for (t, &m) in mask.iter().enumerate().take(seq) {
                        if m == 0 {
                            continue;
                        }
                        weight += 1.0;
                        for d in 0..dim {
                            acc[d] += data[t * dim + d];
                        }
                    }
                    if weight == 0.0 {
                        return Err(Error::Inference("empty attention mask".into()));
                    }
                    acc / weight
                }
                [_, dim] => Array1::from_vec(data[..*dim as usize].to_vec()),
                other => {
                    return Err(Error::Inference(format!("unexpected output shape {:?}", other)))
                }
            };

            if pooled.len() != self.dimension {
                return Err(Error::Inference(format!(
                    "model produced {} dims, catalog expects {}",
                    pooled.len(),
                    self.dimension
                )));
            }
            Ok(pooled)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            ONNX_ENGINE_NAME
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_load_requires_model_files() {
            let dir = tempfile::TempDir::new().unwrap();
            let err = OnnxEmbedder::load(dir.path(), 384).err().unwrap();
            assert!(matches!(err, Error::Config(_)));

            std::fs::write(dir.path().join("model.onnx"), b"").unwrap();
            let err = OnnxEmbedder::load(dir.path(), 384).err().unwrap();
            assert!(err.to_string().contains("tokenizer.json"));
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::{OnnxEmbedder, ONNX_ENGINE_NAME};
