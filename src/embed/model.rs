use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::ModelConfig;

/// Resolve the ONNX model file for the embedder.
///
/// - If `model.path` points at an existing file, use it directly.
/// - Otherwise, if `model.hf_repo` is set, look for `hf_file` in the cache
///   directory and download it from HuggingFace if missing.
pub fn resolve_model_path(config: &ModelConfig) -> Result<PathBuf> {
    if let Some(ref path) = config.path {
        if path.exists() {
            log::info!("Using embedding model from path: {}", path.display());
            return Ok(path.clone());
        }
        if config.hf_repo.is_none() {
            anyhow::bail!("Embedding model not found at {}", path.display());
        }
        log::warn!("Embedding model not found at {}, trying HuggingFace", path.display());
    }

    let repo = config.hf_repo.as_deref().context(
        "No ONNX embedding model configured. Set [model] path or hf_repo in tunematch.toml",
    )?;

    let cache_dir = model_cache_dir()?.join(repo.replace('/', "--"));
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create model cache dir: {}", cache_dir.display()))?;
    let cached_path = cache_dir.join(flat_name(&config.hf_file));

    if cached_path.exists() {
        log::info!("Using cached embedding model '{}': {}", repo, cached_path.display());
        return Ok(cached_path);
    }

    log::info!("Downloading embedding model '{}/{}' from HuggingFace...", repo, config.hf_file);
    download_model(repo, &config.hf_file, &cached_path)?;
    log::info!("Model saved to {}", cached_path.display());

    Ok(cached_path)
}

fn flat_name(file: &str) -> String {
    file.replace('/', "_")
}

fn model_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .context("Cannot determine cache directory")?;
    Ok(base.join("tunematch").join("models"))
}

fn download_model(repo: &str, filename: &str, dest: &Path) -> Result<()> {
    use hf_hub::api::sync::Api;

    let api = Api::new().context("Failed to initialize HuggingFace Hub API")?;
    let downloaded = api
        .model(repo.to_string())
        .get(filename)
        .with_context(|| {
            format!("Failed to download '{}' from HuggingFace repo '{}'", filename, repo)
        })?;

    // hf-hub downloads to its own cache; copy to our cache location
    if downloaded != dest {
        std::fs::copy(&downloaded, dest).with_context(|| {
            format!(
                "Failed to copy model from {} to {}",
                downloaded.display(),
                dest.display()
            )
        })?;
    }

    Ok(())
}
