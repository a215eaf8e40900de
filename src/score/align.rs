use std::sync::Arc;
use std::time::Duration;

use super::ScoreError;
use crate::audio::{seconds_to_samples, Waveform, SAMPLE_RATE};
use crate::embed::{cosine_similarity, embed_with_timeout, Embedder, ExtractionError};

pub const DEFAULT_WINDOW_SECS: f64 = 15.0;
pub const DEFAULT_HOP_SECS: f64 = 5.0;

/// Start offsets of the candidate windows, in samples.
///
/// Offsets advance by `hop` from 0 while a full window fits. When the next
/// hop would overrun, one last window anchored at `len - window` is emitted
/// (unless the previous window already ended there). A window at least as
/// long as the waveform yields the single offset 0. At most
/// `ceil(len / hop) + 1` offsets are produced. Clone before iterating to walk
/// the sequence again.
#[derive(Clone, Debug)]
pub struct WindowOffsets {
    len: usize,
    window: usize,
    hop: usize,
    next: usize,
    done: bool,
}

impl WindowOffsets {
    pub fn new(len: usize, window: usize, hop: usize) -> Self {
        Self {
            len,
            window,
            hop: hop.max(1),
            next: 0,
            done: false,
        }
    }

    /// Samples covered by each window; shorter than requested only when the
    /// whole waveform is.
    pub fn window_len(&self) -> usize {
        self.window.min(self.len)
    }

    pub fn max_windows(&self) -> usize {
        self.len.div_ceil(self.hop) + 1
    }
}

impl Iterator for WindowOffsets {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        if self.window >= self.len {
            self.done = true;
            return Some(0);
        }

        let tail = self.len - self.window;
        if self.next >= tail {
            self.done = true;
            return Some(tail);
        }

        let offset = self.next;
        self.next += self.hop;
        Some(offset)
    }
}

/// The reference clip: `window` samples from `start`, slid back to end at the
/// tail when it would run past it, or the whole waveform when it is shorter.
pub fn reference_window(samples: &[f32], start: usize, window: usize) -> &[f32] {
    if window >= samples.len() {
        return samples;
    }
    let start = start.min(samples.len() - window);
    &samples[start..start + window]
}

/// Check a (start, duration) pair before any audio is touched.
pub fn validate_window(start_secs: f64, duration_secs: f64) -> Result<(), ScoreError> {
    if !start_secs.is_finite() || start_secs < 0.0 {
        return Err(ScoreError::InvalidWindow(format!(
            "start must be a non-negative number of seconds, got {start_secs}"
        )));
    }
    if !duration_secs.is_finite() || seconds_to_samples(duration_secs) == 0 {
        return Err(ScoreError::InvalidWindow(format!(
            "duration must be positive, got {duration_secs}"
        )));
    }
    Ok(())
}

/// Best-offset acoustic match between a reference clip and a candidate.
pub struct Aligner {
    embedder: Arc<dyn Embedder>,
    hop_secs: f64,
    timeout: Option<Duration>,
}

impl Aligner {
    /// Fails when `hop_secs` is not finite or rounds to zero samples.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        hop_secs: f64,
        timeout: Option<Duration>,
    ) -> Result<Self, ScoreError> {
        if !hop_secs.is_finite() || seconds_to_samples(hop_secs) == 0 {
            return Err(ScoreError::InvalidWindow(format!(
                "hop must be a positive number of seconds, got {hop_secs}"
            )));
        }
        Ok(Self {
            embedder,
            hop_secs,
            timeout,
        })
    }

    /// Maximum cosine similarity between the reference window and every
    /// candidate window, unclamped in `[-1, 1]`.
    pub fn best_match(
        &self,
        reference: &Waveform,
        candidate: &Waveform,
        start_secs: f64,
        duration_secs: f64,
    ) -> Result<f64, ScoreError> {
        validate_window(start_secs, duration_secs)?;
        if reference.is_empty() || candidate.is_empty() {
            return Err(ScoreError::InvalidWindow("cannot align empty audio".into()));
        }

        let window = seconds_to_samples(duration_secs);
        let hop = seconds_to_samples(self.hop_secs);
        let reference = reference_window(
            reference.samples(),
            seconds_to_samples(start_secs),
            window,
        );

        let offsets = WindowOffsets::new(candidate.len(), window, hop);
        let candidate_len = offsets.window_len();
        let mut windows = Vec::with_capacity(offsets.max_windows() + 1);
        let starts: Vec<usize> = offsets.collect();

        windows.push(reference.to_vec());
        windows.extend(
            starts
                .iter()
                .map(|&s| candidate.samples()[s..s + candidate_len].to_vec()),
        );

        log::info!(
            "Aligning {:.1}s reference against {} candidate windows ({})",
            reference.len() as f64 / SAMPLE_RATE as f64,
            starts.len(),
            self.embedder.name()
        );

        let embeddings = embed_with_timeout(&self.embedder, windows, self.timeout)?;
        let (reference_embedding, candidates) = embeddings
            .split_first()
            .ok_or(ExtractionError::CountMismatch { expected: starts.len() + 1, got: 0 })?;

        let mut best = f64::NEG_INFINITY;
        let mut best_offset = 0;
        for (embedding, &offset) in candidates.iter().zip(&starts) {
            let similarity = cosine_similarity(reference_embedding, embedding);
            log::debug!(
                "  offset {:.1}s: {:.4}",
                offset as f64 / SAMPLE_RATE as f64,
                similarity
            );
            if similarity > best {
                best = similarity;
                best_offset = offset;
            }
        }

        log::info!(
            "Best acoustic match {:.4} at {:.1}s",
            best,
            best_offset as f64 / SAMPLE_RATE as f64
        );
        Ok(best)
    }
}
