pub mod align;
pub mod combine;
pub mod metadata;

use serde::Serialize;
use thiserror::Error;

use crate::audio::fetch::{FetchError, WaveformFetcher};
use crate::embed::ExtractionError;
use crate::features::{FeatureStore, LookupError};
use align::Aligner;
use combine::Weights;
use metadata::FeatureDistances;

/// Why a score could not be produced. Every kind fails the whole score.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("failed to fetch audio for '{id}'")]
    Fetch {
        id: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("invalid comparison window: {0}")]
    InvalidWindow(String),
}

/// The final score and the inputs it was blended from.
#[derive(Clone, Debug, Serialize)]
pub struct ScoreBreakdown {
    pub acoustic: f64,
    pub distances: FeatureDistances,
    pub score: f64,
}

impl ScoreBreakdown {
    /// Score as a display percentage, clamped to 0–100.
    pub fn percent(&self) -> f64 {
        (self.score * 100.0).clamp(0.0, 100.0)
    }
}

/// Scores a guess against a reference song.
///
/// Collaborators are injected at construction and only read afterwards, so a
/// single `Scorer` can serve concurrent requests.
pub struct Scorer {
    fetcher: Box<dyn WaveformFetcher>,
    store: Box<dyn FeatureStore>,
    aligner: Aligner,
    weights: Weights,
}

impl Scorer {
    pub fn new(
        fetcher: Box<dyn WaveformFetcher>,
        store: Box<dyn FeatureStore>,
        aligner: Aligner,
        weights: Weights,
    ) -> Self {
        if (weights.sum() - 1.0).abs() > 1e-6 {
            log::warn!("Score weights sum to {:.3}, not 1.0", weights.sum());
        }
        Self {
            fetcher,
            store,
            aligner,
            weights,
        }
    }

    pub fn similarity_score(
        &self,
        reference_id: &str,
        guess_id: &str,
        start_secs: f64,
        duration_secs: f64,
    ) -> Result<f64, ScoreError> {
        Ok(self.score(reference_id, guess_id, start_secs, duration_secs)?.score)
    }

    pub fn score(
        &self,
        reference_id: &str,
        guess_id: &str,
        start_secs: f64,
        duration_secs: f64,
    ) -> Result<ScoreBreakdown, ScoreError> {
        align::validate_window(start_secs, duration_secs)?;

        let (reference, guess) = rayon::join(
            || self.fetcher.fetch(reference_id),
            || self.fetcher.fetch(guess_id),
        );
        let reference = reference.map_err(|source| ScoreError::Fetch {
            id: reference_id.to_string(),
            source,
        })?;
        let guess = guess.map_err(|source| ScoreError::Fetch {
            id: guess_id.to_string(),
            source,
        })?;

        // Metadata first: a missing record must not cost a model run.
        let orig_features = self.store.lookup(reference_id)?;
        let guess_features = self.store.lookup(guess_id)?;

        let acoustic = self
            .aligner
            .best_match(&reference, &guess, start_secs, duration_secs)?;
        let distances = metadata::distance(&orig_features, &guess_features);
        let score = self.weights.combine(acoustic, &distances);

        log::info!(
            "Score '{}' vs '{}': {:.4} (acoustic {:.4}, key {:.2}, tempo {:.2}, energy {:.2}, mood {:.2}, loud {:.2})",
            reference_id,
            guess_id,
            score,
            acoustic,
            distances.key,
            distances.tempo,
            distances.energy,
            distances.mood,
            distances.loud
        );

        Ok(ScoreBreakdown {
            acoustic,
            distances,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::audio::{seconds_to_samples, Waveform};
    use crate::embed::spectral::SpectralEmbedder;
    use crate::embed::testing::RecordingEmbedder;
    use crate::embed::Embedder;
    use crate::features::{sample_record, AudioFeatureRecord};

    struct MapFetcher(HashMap<String, Waveform>);

    impl WaveformFetcher for MapFetcher {
        fn fetch(&self, id: &str) -> Result<Waveform, FetchError> {
            self.0.get(id).cloned().ok_or_else(|| FetchError::Unavailable {
                location: format!("memory://{id}"),
                reason: "HTTP 404 Not Found".into(),
            })
        }
    }

    struct MapStore(HashMap<String, AudioFeatureRecord>);

    impl FeatureStore for MapStore {
        fn lookup(&self, id: &str) -> Result<AudioFeatureRecord, LookupError> {
            self.0
                .get(id)
                .cloned()
                .ok_or_else(|| LookupError::NotFound(id.to_string()))
        }
    }

    fn tone(freq: f32, secs: f64) -> Waveform {
        let n = seconds_to_samples(secs);
        Waveform::from_samples(
            (0..n)
                .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 16000.0).sin() * 0.3)
                .collect(),
        )
    }

    fn scorer(
        audio: &[(&str, Waveform)],
        records: &[(&str, AudioFeatureRecord)],
        embedder: Arc<dyn Embedder>,
        timeout: Option<Duration>,
    ) -> Scorer {
        let fetcher = MapFetcher(audio.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
        let store = MapStore(records.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
        Scorer::new(
            Box::new(fetcher),
            Box::new(store),
            Aligner::new(embedder, align::DEFAULT_HOP_SECS, timeout).unwrap(),
            Weights::DEFAULT,
        )
    }

    #[test]
    fn identical_song_scores_one() {
        let song = tone(440.0, 30.0);
        let scorer = scorer(
            &[("orig", song.clone()), ("guess", song)],
            &[("orig", sample_record()), ("guess", sample_record())],
            Arc::new(SpectralEmbedder::new()),
            None,
        );
        let breakdown = scorer.score("orig", "guess", 5.0, 15.0).unwrap();
        assert!((breakdown.acoustic - 1.0).abs() < 1e-9);
        assert!((breakdown.score - 1.0).abs() < 1e-9);
        assert!((breakdown.percent() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn similarity_score_matches_breakdown() {
        let a = tone(440.0, 20.0);
        let b = tone(880.0, 20.0);
        let other = AudioFeatureRecord {
            key: 7,
            tempo: 100.0,
            ..sample_record()
        };
        let scorer = scorer(
            &[("orig", a), ("guess", b)],
            &[("orig", sample_record()), ("guess", other)],
            Arc::new(SpectralEmbedder::new()),
            None,
        );
        let score = scorer.similarity_score("orig", "guess", 0.0, 15.0).unwrap();
        let breakdown = scorer.score("orig", "guess", 0.0, 15.0).unwrap();
        assert_eq!(score, breakdown.score);
        assert!(score < 1.0);
    }

    #[test]
    fn unavailable_reference_aborts_before_inference() {
        let embedder = Arc::new(RecordingEmbedder::default());
        let scorer = scorer(
            &[("guess", tone(440.0, 20.0))],
            &[("orig", sample_record()), ("guess", sample_record())],
            embedder.clone(),
            None,
        );
        match scorer.score("orig", "guess", 0.0, 15.0) {
            Err(ScoreError::Fetch { id, source: FetchError::Unavailable { .. } }) => {
                assert_eq!(id, "orig")
            }
            other => panic!("expected fetch failure, got {other:?}"),
        }
        assert_eq!(embedder.call_count(), 0);
    }

    #[test]
    fn unavailable_guess_aborts_before_inference() {
        let embedder = Arc::new(RecordingEmbedder::default());
        let scorer = scorer(
            &[("orig", tone(440.0, 20.0))],
            &[("orig", sample_record()), ("guess", sample_record())],
            embedder.clone(),
            None,
        );
        match scorer.score("orig", "guess", 0.0, 15.0) {
            Err(ScoreError::Fetch { id, source: FetchError::Unavailable { .. } }) => {
                assert_eq!(id, "guess")
            }
            other => panic!("expected fetch failure, got {other:?}"),
        }
        assert_eq!(embedder.call_count(), 0);
    }

    #[test]
    fn missing_metadata_fails_the_whole_score() {
        let embedder = Arc::new(RecordingEmbedder::default());
        let song = tone(440.0, 20.0);
        let scorer = scorer(
            &[("orig", song.clone()), ("guess", song)],
            &[("orig", sample_record())],
            embedder.clone(),
            None,
        );
        let err = scorer.similarity_score("orig", "guess", 0.0, 15.0).unwrap_err();
        assert!(matches!(err, ScoreError::Lookup(LookupError::NotFound(ref id)) if id == "guess"));
        assert_eq!(embedder.call_count(), 0);
    }

    #[test]
    fn inference_timeout_fails_the_whole_score() {
        let song = tone(440.0, 20.0);
        let scorer = scorer(
            &[("orig", song.clone()), ("guess", song)],
            &[("orig", sample_record()), ("guess", sample_record())],
            Arc::new(RecordingEmbedder::slow(Duration::from_millis(500))),
            Some(Duration::from_millis(20)),
        );
        let err = scorer.similarity_score("orig", "guess", 0.0, 15.0).unwrap_err();
        assert!(matches!(err, ScoreError::Extraction(ExtractionError::Timeout(_))));
    }

    #[test]
    fn invalid_window_is_rejected_before_fetching() {
        let embedder = Arc::new(RecordingEmbedder::default());
        let scorer = scorer(&[], &[], embedder.clone(), None);
        let err = scorer.similarity_score("orig", "guess", -2.0, 15.0).unwrap_err();
        assert!(matches!(err, ScoreError::InvalidWindow(_)));
    }

    #[test]
    fn percent_is_clamped_for_display() {
        let perfect = FeatureDistances {
            key: 1.0,
            tempo: 1.0,
            energy: 1.0,
            mood: 1.0,
            loud: 1.0,
        };
        let low = ScoreBreakdown {
            acoustic: -1.0,
            distances: perfect,
            score: -0.3,
        };
        let high = ScoreBreakdown {
            acoustic: 1.0,
            distances: perfect,
            score: 1.2,
        };
        assert_eq!(low.percent(), 0.0);
        assert_eq!(high.percent(), 100.0);
    }
}
