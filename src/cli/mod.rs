//! Command-line interface for bhedi.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **screen**: Screen FASTQ/FASTA files against the marker catalog into Parquet
//! - **catalog**: List, show, or export markers from a catalog
//! - **stats**: Print the run statistics of a sequence file
//! - **serve**: Start the upload server
//!
//! ## Usage
//!
//! ```text
//! # Screen a run into ./results/sample.fastq.gz.parquet
//! bhedi screen sample.fastq.gz --catalog sanket.csv --output-dir results
//!
//! # Screen every sequence file of a directory with the legacy batch constants
//! bhedi screen runs/ --scoring legacy-batch
//!
//! # Inspect the catalog
//! bhedi catalog list --catalog sanket.csv --format json
//!
//! # Start the upload server
//! bhedi serve --port 3000 --catalog sanket.csv
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::matching::scoring::ScoringPolicy;
use crate::pipeline::config::{ScreenConfig, WriteErrorPolicy, DEFAULT_WORKERS};

pub mod catalog;
pub mod screen;
pub mod stats;

#[derive(Parser)]
#[command(name = "bhedi")]
#[command(version)]
#[command(about = "Screen sequencing reads for Dengue serotype markers")]
#[command(
    long_about = "bhedi screens wastewater sequencing reads against a catalog of Dengue serotype marker fragments (sankets).\n\nEvery read is tagged with the markers it contains, its GC content, its serotype coverage and a B-score, and written as rows of a Parquet table."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Screen sequence files into Parquet tables
    Screen(screen::ScreenArgs),

    /// Inspect the marker catalog
    Catalog(catalog::CatalogArgs),

    /// Print read count and mean read length of a sequence file
    Stats(stats::StatsArgs),

    /// Start the upload server
    Serve(ServeArgs),
}

#[derive(clap::Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1")]
    pub address: String,

    /// Marker catalog (CSV or JSON)
    #[arg(long, default_value = "sanket.csv")]
    pub catalog: PathBuf,

    /// Keep a copy of every result in this directory
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Named scoring constant sets
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ScoringPreset {
    /// Constants of the streaming server (genome-derived coverage ceiling)
    Streaming,
    /// Constants of the earlier batch CLI (fixed coverage ceiling, `N/A` serotype)
    LegacyBatch,
}

/// Settings shared by every command that runs the pipeline
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Number of reads processed concurrently
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Scoring constants to use
    #[arg(long, value_enum, default_value = "streaming")]
    pub scoring: ScoringPreset,

    /// JSON scoring policy file, overriding --scoring
    #[arg(long)]
    pub scoring_config: Option<PathBuf>,

    /// What to do when an output row cannot be written
    #[arg(long, value_enum, default_value = "abort")]
    pub write_errors: WriteErrorPolicy,

    /// Serotype written for reads without matches (default depends on --scoring)
    #[arg(long)]
    pub no_match_serotype: Option<String>,
}

impl RunArgs {
    /// Build the run configuration these arguments describe
    pub fn screen_config(&self) -> anyhow::Result<ScreenConfig> {
        let mut config = match self.scoring {
            ScoringPreset::Streaming => ScreenConfig::default(),
            ScoringPreset::LegacyBatch => ScreenConfig::legacy_batch(),
        };

        if let Some(path) = &self.scoring_config {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read scoring policy {}", path.display()))?;
            let policy: ScoringPolicy = serde_json::from_str(&json)
                .with_context(|| format!("Invalid scoring policy {}", path.display()))?;
            config.scoring = policy;
        }
        config.scoring.validate()?;

        if let Some(serotype) = &self.no_match_serotype {
            config.no_match_serotype.clone_from(serotype);
        }
        if self.workers == 0 {
            anyhow::bail!("--workers must be at least 1");
        }

        Ok(config
            .with_workers(self.workers)
            .with_write_errors(self.write_errors))
    }
}
