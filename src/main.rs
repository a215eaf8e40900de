mod audio;
mod cli;
mod config;
mod embed;
mod features;
mod score;

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use audio::fetch::{build_client, HttpFetcher, TemplateResolver};
use cli::{Cli, Command};
use config::Config;
use score::align::Aligner;
use score::Scorer;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = match config::discover(cli.config.clone()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };

    let client = build_client(Duration::from_secs(cfg.audio.timeout_secs))?;

    match cli.command {
        Command::Score {
            reference,
            guess,
            start,
            duration,
            url_template,
            feature_file,
            backend,
            json,
        } => {
            // CLI flags win over config values
            if let Some(template) = url_template {
                cfg.audio.url_template = template;
            }
            if feature_file.is_some() {
                cfg.features.json_path = feature_file;
            }
            if let Some(backend) = backend {
                cfg.model.backend = backend;
            }
            let duration = duration.unwrap_or(cfg.scoring.window_secs);

            let scorer = build_scorer(&cfg, client)?;
            let context = || format!("Failed to score '{}' against '{}'", guess, reference);

            if json {
                let breakdown = scorer
                    .score(&reference, &guess, start, duration)
                    .with_context(context)?;
                let mut out = serde_json::to_value(&breakdown)?;
                out["percent"] = breakdown.percent().into();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                let score = scorer
                    .similarity_score(&reference, &guess, start, duration)
                    .with_context(context)?;
                println!("{:.4}", score);
            }
        }

        Command::Features { id, feature_file } => {
            if feature_file.is_some() {
                cfg.features.json_path = feature_file;
            }
            let store = features::open_store(&cfg.features, client)?;
            let record = store.lookup(&id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::Compare {
            orig,
            guess,
            feature_file,
            json,
        } => {
            if feature_file.is_some() {
                cfg.features.json_path = feature_file;
            }
            let store = features::open_store(&cfg.features, client)?;
            let (orig, guess) = (store.lookup(&orig)?, store.lookup(&guess)?);
            let distances = score::metadata::distance(&orig, &guess);
            // Acoustic term left at zero: this is the metadata share of the blend.
            let metadata_score = cfg.weights.combine(0.0, &distances);

            if json {
                let out = serde_json::json!({
                    "distances": distances,
                    "metadata_score": metadata_score,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("key      {:.4}", distances.key);
                println!("tempo    {:.4}", distances.tempo);
                println!("energy   {:.4}", distances.energy);
                println!("mood     {:.4}", distances.mood);
                println!("loud     {:.4}", distances.loud);
                println!(
                    "metadata {:.4} of {:.2}",
                    metadata_score,
                    cfg.weights.sum() - cfg.weights.acoustic
                );
            }
        }
    }

    Ok(())
}

fn build_scorer(cfg: &Config, client: reqwest::blocking::Client) -> Result<Scorer> {
    log::info!("Loading {:?} embedding backend...", cfg.model.backend);
    let embedder = embed::build_embedder(&cfg.model).context("Failed to initialize embedder")?;

    let inference_timeout =
        (cfg.model.timeout_secs > 0).then(|| Duration::from_secs(cfg.model.timeout_secs));
    let aligner = Aligner::new(embedder, cfg.scoring.hop_secs, inference_timeout)
        .context("Invalid [scoring] hop_secs")?;

    let fetcher = HttpFetcher::new(
        Box::new(TemplateResolver::new(cfg.audio.url_template.clone())),
        client.clone(),
    );
    let store = features::open_store(&cfg.features, client)?;

    Ok(Scorer::new(Box::new(fetcher), store, aligner, cfg.weights))
}
