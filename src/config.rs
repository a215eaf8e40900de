use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::score::align::{DEFAULT_HOP_SECS, DEFAULT_WINDOW_SECS};
use crate::score::combine::Weights;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// URL or path template; `{id}` is replaced with the audio identifier.
    #[serde(default = "default_url_template")]
    pub url_template: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct FeaturesConfig {
    /// Local JSON store; takes precedence over the ReccoBeats API when set.
    #[serde(default)]
    pub json_path: Option<PathBuf>,
    #[serde(default = "default_reccobeats_url")]
    pub reccobeats_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
    #[serde(default = "default_hop_secs")]
    pub hop_secs: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Spectral,
    Onnx,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    pub path: Option<PathBuf>,
    #[serde(default)]
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    pub hf_repo: Option<String>,
    #[serde(default = "default_hf_file")]
    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    pub hf_file: String,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            json_path: None,
            reccobeats_url: default_reccobeats_url(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            hop_secs: default_hop_secs(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            path: None,
            hf_repo: None,
            hf_file: default_hf_file(),
            timeout_secs: default_inference_timeout(),
        }
    }
}

fn default_url_template() -> String { "downloads/{id}.m4a".into() }
fn default_http_timeout() -> u64 { 30 }
fn default_reccobeats_url() -> String { "https://api.reccobeats.com/v1".into() }
fn default_window_secs() -> f64 { DEFAULT_WINDOW_SECS }
fn default_hop_secs() -> f64 { DEFAULT_HOP_SECS }
fn default_hf_file() -> String { "model.onnx".into() }
fn default_inference_timeout() -> u64 { 60 }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

/// Explicit path, or auto-detect ./tunematch.toml, then the user config dirs.
pub fn discover(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("tunematch.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("tunematch").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("tunematch").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.scoring.window_secs, 15.0);
        assert_eq!(cfg.scoring.hop_secs, 5.0);
        assert_eq!(cfg.audio.timeout_secs, 30);
        assert_eq!(cfg.model.backend, Backend::Spectral);
        assert_eq!(cfg.model.timeout_secs, 60);
        assert_eq!(cfg.weights, Weights::DEFAULT);
        assert!(cfg.features.json_path.is_none());
    }

    #[test]
    fn sections_override_individually() {
        let cfg: Config = toml::from_str(
            r#"
            [audio]
            url_template = "https://bucket.example.com/{id}.mp3"

            [scoring]
            hop_secs = 2.5

            [weights]
            acoustic = 0.5
            loud = 0.0

            [model]
            backend = "onnx"
            hf_repo = "someone/music2vec-onnx"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.audio.url_template, "https://bucket.example.com/{id}.mp3");
        assert_eq!(cfg.audio.timeout_secs, 30);
        assert_eq!(cfg.scoring.window_secs, 15.0);
        assert_eq!(cfg.scoring.hop_secs, 2.5);
        assert_eq!(cfg.weights.acoustic, 0.5);
        assert_eq!(cfg.weights.loud, 0.0);
        assert_eq!(cfg.weights.key, Weights::DEFAULT.key);
        assert_eq!(cfg.model.backend, Backend::Onnx);
        assert_eq!(cfg.model.hf_file, "model.onnx");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(toml::from_str::<Config>("[model]\nbackend = \"tensorflow\"").is_err());
    }
}
