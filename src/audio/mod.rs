pub mod decode;
pub mod fetch;
pub mod resample;

use decode::AudioData;
use fetch::FetchError;

/// Sample rate every waveform is normalized to at fetch time.
pub const SAMPLE_RATE: u32 = 16_000;

/// Mono audio at [`SAMPLE_RATE`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
}

impl Waveform {
    /// Wrap samples that are already mono at [`SAMPLE_RATE`].
    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Normalize decoded audio to [`SAMPLE_RATE`].
    pub fn from_audio(audio: AudioData) -> Result<Self, FetchError> {
        if audio.sample_rate == SAMPLE_RATE {
            return Ok(Self::from_samples(audio.samples));
        }
        let samples = resample::resample(&audio.samples, audio.sample_rate, SAMPLE_RATE)
            .map_err(|e| FetchError::Decode(format!("{e:#}")))?;
        Ok(Self::from_samples(samples))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / SAMPLE_RATE as f64
    }
}

/// Number of samples covering `secs` seconds at [`SAMPLE_RATE`].
pub fn seconds_to_samples(secs: f64) -> usize {
    (secs * SAMPLE_RATE as f64).round().max(0.0) as usize
}
