use serde::Serialize;

use crate::features::AudioFeatureRecord;

/// BPM gap that maps to zero tempo similarity.
const TEMPO_SPAN: f64 = 150.0;

/// Per-feature similarities, 1.0 meaning identical.
///
/// Not clamped: a large tempo or loudness gap goes below zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FeatureDistances {
    pub key: f64,
    pub tempo: f64,
    pub energy: f64,
    pub mood: f64,
    pub loud: f64,
}

pub fn distance(orig: &AudioFeatureRecord, guess: &AudioFeatureRecord) -> FeatureDistances {
    FeatureDistances {
        key: key_similarity(orig, guess),
        tempo: 1.0 - (orig.tempo - guess.tempo).abs() / TEMPO_SPAN,
        energy: 1.0 - (orig.energy - guess.energy).abs(),
        mood: 1.0 - (mood(orig) - mood(guess)).abs(),
        loud: 1.0 - (orig.loudness - guess.loudness).abs(),
    }
}

/// Position on the circle of fifths; minor keys sit with their relative major.
fn fifths_position(record: &AudioFeatureRecord) -> i32 {
    let pitch = if record.is_minor() { record.key + 3 } else { record.key };
    (pitch * 7).rem_euclid(12)
}

fn key_similarity(a: &AudioFeatureRecord, b: &AudioFeatureRecord) -> f64 {
    let diff = (fifths_position(a) - fifths_position(b)).abs();
    1.0 - diff.min(12 - diff) as f64 / 6.0
}

fn mood(record: &AudioFeatureRecord) -> f64 {
    record.valence + record.danceability
}
