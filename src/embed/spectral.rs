use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::{Embedder, Embedding, ExtractionError};
use crate::audio::SAMPLE_RATE;

const FFT_SIZE: usize = 1024;
const HOP_SIZE: usize = 512;
const NUM_BANDS: usize = 32;
const MIN_HZ: f32 = 40.0;
const MAX_HZ: f32 = 7600.0;

/// Model-free embedder built from log band energies.
///
/// Each window is cut into Hann-windowed FFT frames; per-band log power is
/// summarized by its mean and standard deviation over the frames. Both halves
/// are centered on their own average so the vector captures spectral shape
/// rather than overall level, which makes cosine similarity meaningful.
/// Silence yields a zero vector. Windows of any length are accepted; windows
/// shorter than one frame are zero-padded.
pub struct SpectralEmbedder {
    bands: Vec<(usize, usize)>,
    hann: Vec<f32>,
}

impl SpectralEmbedder {
    pub const DIM: usize = NUM_BANDS * 2;

    pub fn new() -> Self {
        Self {
            bands: band_edges(),
            hann: hann_window(FFT_SIZE),
        }
    }

    fn embed_one(&self, samples: &[f32]) -> Embedding {
        // Per-thread FFT planner (rayon-safe)
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        let mut sums = [0.0f64; NUM_BANDS];
        let mut sq_sums = [0.0f64; NUM_BANDS];
        let mut frames = 0usize;

        let mut pos = 0;
        loop {
            let end = (pos + FFT_SIZE).min(samples.len());
            let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); FFT_SIZE];
            for (i, &s) in samples[pos..end].iter().enumerate() {
                buffer[i] = Complex::new(s * self.hann[i], 0.0);
            }
            fft.process(&mut buffer);

            for (band, &(low, high)) in self.bands.iter().enumerate() {
                let power: f32 = buffer[low..high].iter().map(|c| c.norm_sqr()).sum::<f32>()
                    / (high - low) as f32;
                let log_power = (power as f64 + 1e-10).log10();
                sums[band] += log_power;
                sq_sums[band] += log_power * log_power;
            }
            frames += 1;

            pos += HOP_SIZE;
            if pos + FFT_SIZE > samples.len() {
                break;
            }
        }

        let n = frames as f64;
        let means: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let stds: Vec<f64> = sq_sums
            .iter()
            .zip(&means)
            .map(|(sq, m)| {
                let var = sq / n - m * m;
                if var > 1e-12 { var.sqrt() } else { 0.0 }
            })
            .collect();

        let mut embedding = Vec::with_capacity(Self::DIM);
        embedding.extend(centered(&means));
        embedding.extend(centered(&stds));
        embedding
    }
}

impl Default for SpectralEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for SpectralEmbedder {
    fn name(&self) -> &str {
        "spectral"
    }

    fn embed_batch(&self, windows: &[&[f32]]) -> Result<Vec<Embedding>, ExtractionError> {
        Ok(windows.par_iter().map(|w| self.embed_one(w)).collect())
    }
}

fn centered(values: &[f64]) -> impl Iterator<Item = f32> + '_ {
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(move |v| {
        let c = v - avg;
        // Flat spectra collapse to exact zeros instead of rounding noise.
        if c.abs() < 1e-9 { 0.0 } else { c as f32 }
    })
}

/// Log-spaced FFT bin ranges between MIN_HZ and MAX_HZ, each at least one bin wide.
fn band_edges() -> Vec<(usize, usize)> {
    let bin_hz = SAMPLE_RATE as f32 / FFT_SIZE as f32;
    let half = FFT_SIZE / 2;
    let ratio = MAX_HZ / MIN_HZ;
    let edge = |i: usize| -> usize {
        let hz = MIN_HZ * ratio.powf(i as f32 / NUM_BANDS as f32);
        ((hz / bin_hz).round() as usize).min(half)
    };

    let mut bands = Vec::with_capacity(NUM_BANDS);
    let mut low = edge(0);
    for i in 1..=NUM_BANDS {
        let high = edge(i).max(low + 1).min(half);
        bands.push((low, high));
        low = high.min(half - 1);
    }
    bands
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
