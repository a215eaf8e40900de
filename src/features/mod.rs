pub mod json;
pub mod reccobeats;

use anyhow::Result;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FeaturesConfig;

/// Per-song audio features, stored once at ingestion and read-only afterwards.
///
/// Field names follow the Spotify / ReccoBeats audio-features payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureRecord {
    /// Pitch class 0–11.
    pub key: i32,
    /// 1 = major, 0 = minor.
    pub mode: u8,
    /// Beats per minute.
    pub tempo: f64,
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    /// Integrated loudness in dB.
    pub loudness: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acousticness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrumentalness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speechiness: Option<f64>,
}

impl AudioFeatureRecord {
    pub fn is_minor(&self) -> bool {
        self.mode == 0
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no audio features stored for '{0}'")]
    NotFound(String),

    #[error("feature store unavailable: {0}")]
    Unavailable(String),
}

/// Read-only mapping from audio identifier to its feature record.
pub trait FeatureStore: Send + Sync {
    fn lookup(&self, id: &str) -> Result<AudioFeatureRecord, LookupError>;
}

/// JSON file store when configured, otherwise the ReccoBeats API.
pub fn open_store(config: &FeaturesConfig, client: Client) -> Result<Box<dyn FeatureStore>> {
    match config.json_path {
        Some(ref path) => {
            let store = json::JsonFeatureStore::open(path)?;
            log::info!("Loaded {} feature records from {}", store.len(), path.display());
            Ok(Box::new(store))
        }
        None => {
            log::info!("Using ReccoBeats feature store at {}", config.reccobeats_url);
            Ok(Box::new(reccobeats::ReccoBeatsStore::new(
                client,
                &config.reccobeats_url,
            )))
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> AudioFeatureRecord {
    AudioFeatureRecord {
        key: 0,
        mode: 1,
        tempo: 120.0,
        energy: 0.5,
        valence: 0.5,
        danceability: 0.5,
        loudness: -10.0,
        acousticness: None,
        instrumentalness: None,
        liveness: None,
        speechiness: None,
    }
}
