use serde::{Deserialize, Serialize};

use super::metadata::FeatureDistances;

/// Blend weights for the final score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub acoustic: f64,
    pub key: f64,
    pub tempo: f64,
    pub energy: f64,
    pub mood: f64,
    pub loud: f64,
}

impl Weights {
    pub const DEFAULT: Weights = Weights {
        acoustic: 0.40,
        key: 0.20,
        tempo: 0.15,
        energy: 0.10,
        mood: 0.10,
        loud: 0.05,
    };

    pub fn sum(&self) -> f64 {
        self.acoustic + self.key + self.tempo + self.energy + self.mood + self.loud
    }

    /// Weighted sum of all six inputs. Not clamped.
    pub fn combine(&self, acoustic: f64, d: &FeatureDistances) -> f64 {
        self.acoustic * acoustic
            + self.key * d.key
            + self.tempo * d.tempo
            + self.energy * d.energy
            + self.mood * d.mood
            + self.loud * d.loud
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::DEFAULT
    }
}
