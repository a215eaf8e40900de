use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Backend;

#[derive(Parser, Debug)]
#[command(name = "tunematch", about = "Score how closely a guessed song clip matches a reference")]
pub struct Cli {
    /// Config file (defaults to ./tunematch.toml or ~/.config/tunematch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Score a guess against a reference song
    Score {
        /// Reference audio identifier
        reference: String,

        /// Guessed audio identifier
        guess: String,

        /// Start of the reference clip in seconds
        #[arg(short, long, default_value_t = 0.0)]
        start: f64,

        /// Clip length in seconds (default from config, 15)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Audio URL or path template, `{id}` is replaced by the identifier
        #[arg(long)]
        url_template: Option<String>,

        /// Local JSON feature store, instead of the ReccoBeats API
        #[arg(long = "features")]
        feature_file: Option<PathBuf>,

        /// Embedding backend
        #[arg(long, value_enum)]
        backend: Option<Backend>,

        /// Print the full breakdown as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the stored audio features for an identifier
    Features {
        id: String,

        /// Local JSON feature store, instead of the ReccoBeats API
        #[arg(long = "features")]
        feature_file: Option<PathBuf>,
    },

    /// Compare two songs on metadata alone, without fetching audio
    Compare {
        orig: String,
        guess: String,

        /// Local JSON feature store, instead of the ReccoBeats API
        #[arg(long = "features")]
        feature_file: Option<PathBuf>,

        /// Print the distances as JSON
        #[arg(long)]
        json: bool,
    },
}
