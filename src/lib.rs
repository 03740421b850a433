//! # bhedi
//!
//! Screen metagenomic sequencing reads for Dengue virus serotype markers.
//!
//! Wastewater and other environmental samples are sequenced in bulk, and a run may
//! hold millions of reads from many organisms. `bhedi` checks every read against a
//! catalog of short serotype-specific marker fragments ("sankets") and emits one
//! Parquet row per read and matched marker, carrying the read's GC content, its
//! serotype coverage and a B-score weighing the evidence.
//!
//! ## Features
//!
//! - **Streaming**: FASTQ/FASTA, plain or gzip, read one record at a time
//! - **Bounded concurrency**: A fixed number of reads are in flight at once
//! - **Columnar output**: Rows land in a Snappy-compressed Parquet file
//! - **Upload server**: The same pipeline behind an HTTP endpoint
//!
//! ## Example
//!
//! ```rust,no_run
//! use bhedi::{MarkerCatalog, ScreenConfig};
//! use bhedi::parsing::stats::StatsMethod;
//! use bhedi::pipeline::{screen_file, CancelToken};
//! use std::path::Path;
//!
//! let catalog = MarkerCatalog::load_from_file(Path::new("sanket.csv")).unwrap();
//! let report = screen_file(
//!     &catalog,
//!     Path::new("sample.fastq.gz"),
//!     Path::new("sample.parquet"),
//!     &ScreenConfig::default(),
//!     StatsMethod::Native,
//!     &CancelToken::new(),
//! )
//! .unwrap();
//!
//! println!("{} of {} reads matched", report.matched_records, report.records);
//! ```
//!
//! ## Modules
//!
//! - [`catalog`]: Marker catalog loading and lookup
//! - [`core`]: Core data types for markers, reads and run statistics
//! - [`matching`]: Marker search and B-score computation
//! - [`parsing`]: FASTQ/FASTA streaming, catalog CSV and run statistics
//! - [`pipeline`]: Concurrent match-score-emit orchestration
//! - [`output`]: Output rows and the Parquet sink
//! - [`cli`]: Command-line interface implementation
//! - [`web`]: Upload server

pub mod catalog;
pub mod cli;
pub mod core;
pub mod matching;
pub mod output;
pub mod parsing;
pub mod pipeline;
pub mod utils;
pub mod web;

// Re-export commonly used types for convenience
pub use catalog::store::MarkerCatalog;
pub use core::marker::MarkerRecord;
pub use core::read::SequenceRecord;
pub use core::types::*;
pub use matching::engine::{MatchSet, MatchingEngine};
pub use matching::scoring::ScoringPolicy;
pub use output::row::OutputRow;
pub use pipeline::{Pipeline, PipelineError, RunReport, ScreenConfig};
