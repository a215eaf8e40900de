#[cfg(feature = "onnx")]
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod spectral;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;

use crate::config::{Backend, ModelConfig};

/// One vector per audio window. Only ever compared by cosine similarity.
pub type Embedding = Vec<f32>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("embedding model failed: {0}")]
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    Model(String),

    #[error("embedding inference exceeded {0:?}")]
    Timeout(Duration),

    #[error("embedding model returned {got} vectors for {expected} windows")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding worker exited without a result")]
    WorkerLost,
}

/// Turns 16 kHz mono windows into embeddings.
///
/// Implementations hold their model read-only after construction and are
/// shared across scoring calls. `embed_batch` returns one embedding per
/// window, in input order. Windows may differ in length.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed_batch(&self, windows: &[&[f32]]) -> Result<Vec<Embedding>, ExtractionError>;
}

/// Run a batch through `embedder`, giving up after `timeout`.
///
/// With a timeout the batch runs on a worker thread; a timed-out worker is
/// left to finish on its own and its result is dropped. The worker keeps
/// whatever the embedder holds while it runs, so with the ONNX backend later
/// batches wait on its session lock and can time out behind it.
pub fn embed_with_timeout(
    embedder: &Arc<dyn Embedder>,
    windows: Vec<Vec<f32>>,
    timeout: Option<Duration>,
) -> Result<Vec<Embedding>, ExtractionError> {
    let expected = windows.len();

    let embeddings = match timeout {
        None => {
            let refs: Vec<&[f32]> = windows.iter().map(Vec::as_slice).collect();
            embedder.embed_batch(&refs)?
        }
        Some(limit) => {
            let (tx, rx) = mpsc::channel();
            let worker = Arc::clone(embedder);
            std::thread::spawn(move || {
                let refs: Vec<&[f32]> = windows.iter().map(Vec::as_slice).collect();
                let _ = tx.send(worker.embed_batch(&refs));
            });
            match rx.recv_timeout(limit) {
                Ok(result) => result?,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(ExtractionError::Timeout(limit));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(ExtractionError::WorkerLost);
                }
            }
        }
    };

    if embeddings.len() != expected {
        return Err(ExtractionError::CountMismatch {
            expected,
            got: embeddings.len(),
        });
    }
    Ok(embeddings)
}

/// Cosine similarity in `[-1, 1]`, accumulated in f64.
///
/// Zero vectors and dimension mismatches have no direction and score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // Rounding can push identical vectors a hair past 1.
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Build the configured embedder. Called once per process.
pub fn build_embedder(config: &ModelConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend {
        Backend::Spectral => Ok(Arc::new(spectral::SpectralEmbedder::new())),
        #[cfg(feature = "onnx")]
        Backend::Onnx => {
            let path = model::resolve_model_path(config)?;
            Ok(Arc::new(onnx::OnnxEmbedder::load(&path)?))
        }
        #[cfg(not(feature = "onnx"))]
        Backend::Onnx => anyhow::bail!(
            "The onnx embedding backend requires the 'onnx' feature. \
             Rebuild with: cargo build --features onnx"
        ),
    }
}
