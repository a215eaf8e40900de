use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;

use super::{Embedder, Embedding, ExtractionError};

/// ONNX Runtime adapter for data2vec / music2vec style audio encoders.
///
/// Expects a single `[batch, samples]` input of raw 16 kHz audio and a first
/// output of either `[batch, frames, dim]` hidden states (mean-pooled over
/// frames) or `[batch, dim]` pooled vectors.
pub struct OnnxEmbedder {
    session: Mutex<Session>,
    input_name: String,
    name: String,
}

impl OnnxEmbedder {
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = Session::builder()?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model: {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("ONNX model declares no inputs")?;

        let name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("onnx")
            .to_string();

        log::info!("Loaded ONNX embedding model '{}' (input '{}')", name, input_name);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            name,
        })
    }

    /// Run one tensor over windows that all share a length.
    fn run_group(&self, windows: &[&[f32]]) -> Result<Vec<Embedding>, ExtractionError> {
        let batch = windows.len();
        let len = windows[0].len();

        let mut data = Vec::with_capacity(batch * len);
        for window in windows {
            data.extend(normalize(window));
        }

        let input = Tensor::from_array(([batch, len], data)).map_err(model_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ExtractionError::Model("session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(model_error)?;

        let (shape, values) = outputs[0].try_extract_tensor::<f32>().map_err(model_error)?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        pooled_embeddings(&dims, values, batch)
    }
}

impl Embedder for OnnxEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed_batch(&self, windows: &[&[f32]]) -> Result<Vec<Embedding>, ExtractionError> {
        let mut embeddings = Vec::with_capacity(windows.len());

        // Equal-length neighbours share a tensor; order is preserved.
        let mut start = 0;
        while start < windows.len() {
            let len = windows[start].len();
            let end = windows[start..]
                .iter()
                .position(|w| w.len() != len)
                .map_or(windows.len(), |offset| start + offset);
            if len == 0 {
                return Err(ExtractionError::Model("empty audio window".into()));
            }
            embeddings.extend(self.run_group(&windows[start..end])?);
            start = end;
        }

        log::debug!("{} embedded {} windows", self.name, windows.len());
        Ok(embeddings)
    }
}

/// Zero-mean, unit-variance scaling applied by the wav2vec2 feature extractor.
fn normalize(window: &[f32]) -> impl Iterator<Item = f32> + '_ {
    let n = window.len() as f32;
    let mean = window.iter().sum::<f32>() / n;
    let var = window.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>() / n;
    let scale = 1.0 / (var + 1e-7).sqrt();
    window.iter().map(move |s| (s - mean) * scale)
}

/// Split a model output of `dims` into one embedding per window, mean-pooling
/// `[batch, frames, dim]` hidden states and passing `[batch, dim]` through.
fn pooled_embeddings(
    dims: &[usize],
    values: &[f32],
    batch: usize,
) -> Result<Vec<Embedding>, ExtractionError> {
    match dims {
        [n, frames, dim] if *n == batch && *frames > 0 && *dim > 0 => Ok(values
            .chunks(frames * dim)
            .map(|item| mean_pool(item, *frames, *dim))
            .collect()),
        [n, dim] if *n == batch && *dim > 0 => {
            Ok(values.chunks(*dim).map(<[f32]>::to_vec).collect())
        }
        other => Err(ExtractionError::Model(format!(
            "unexpected output shape {other:?} for batch of {batch}"
        ))),
    }
}

fn mean_pool(hidden: &[f32], frames: usize, dim: usize) -> Embedding {
    let mut pooled = vec![0.0f32; dim];
    for frame in hidden.chunks(dim) {
        for (acc, v) in pooled.iter_mut().zip(frame) {
            *acc += v;
        }
    }
    for v in &mut pooled {
        *v /= frames as f32;
    }
    pooled
}

fn model_error(err: ort::Error) -> ExtractionError {
    ExtractionError::Model(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_zero_mean_unit_variance() {
        let window = [1.0f32, 2.0, 3.0, 4.0];
        let out: Vec<f32> = normalize(&window).collect();
        let mean = out.iter().sum::<f32>() / 4.0;
        let var = out.iter().map(|v| v * v).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mean_pool_averages_frames() {
        let hidden = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(mean_pool(&hidden, 3, 2), vec![3.0, 4.0]);
    }

    #[test]
    fn hidden_states_are_pooled_per_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 10.0, 20.0, 30.0, 40.0];
        let out = pooled_embeddings(&[2, 2, 2], &values, 2).unwrap();
        assert_eq!(out, vec![vec![2.0, 3.0], vec![20.0, 30.0]]);

        let out = pooled_embeddings(&[2, 4], &values, 2).unwrap();
        assert_eq!(out[1], vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn zero_width_output_is_a_model_error() {
        for dims in [[1usize, 3, 0].as_slice(), [1, 0].as_slice(), [2, 8].as_slice()] {
            let err = pooled_embeddings(dims, &[], 1).unwrap_err();
            assert!(matches!(err, ExtractionError::Model(_)), "dims {dims:?}");
        }
    }
}
