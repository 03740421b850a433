use serde::{Deserialize, Serialize};

use crate::core::types::{LEGACY_UNASSIGNED_SEROTYPE, UNASSIGNED_SEROTYPE};
use crate::matching::scoring::ScoringPolicy;
use crate::output::parquet_file::{ParquetOptions, DEFAULT_BATCH_ROWS};

/// Default number of records processed concurrently
pub const DEFAULT_WORKERS: usize = 30;

/// Default number of dispatched records between progress log lines
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// What a run does when a row cannot be written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorPolicy {
    /// Log the failure, count the row as dropped and keep going.
    ///
    /// Covers failures of single rows. Errors that leave the output unusable,
    /// such as a buffered batch that could not be flushed, still stop the run.
    SkipAndLog,
    /// Stop the run at the first failed write and discard the output
    #[default]
    Abort,
}

/// Settings of one screening run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    /// Size of the worker budget
    pub workers: usize,
    pub scoring: ScoringPolicy,
    pub write_errors: WriteErrorPolicy,
    /// Serotype written on no-match rows
    pub no_match_serotype: String,
    /// Rows buffered before each columnar flush
    pub batch_rows: usize,
    /// Records between progress log lines, 0 to disable
    pub progress_interval: u64,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            scoring: ScoringPolicy::streaming(),
            write_errors: WriteErrorPolicy::default(),
            no_match_serotype: UNASSIGNED_SEROTYPE.to_string(),
            batch_rows: DEFAULT_BATCH_ROWS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl ScreenConfig {
    /// Settings reproducing the output of the earlier batch CLI
    #[must_use]
    pub fn legacy_batch() -> Self {
        Self {
            scoring: ScoringPolicy::legacy_batch(),
            no_match_serotype: LEGACY_UNASSIGNED_SEROTYPE.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    #[must_use]
    pub fn with_write_errors(mut self, write_errors: WriteErrorPolicy) -> Self {
        self.write_errors = write_errors;
        self
    }

    /// Options for the Parquet writer of a run under these settings
    #[must_use]
    pub fn parquet_options(&self) -> ParquetOptions {
        ParquetOptions {
            batch_rows: self.batch_rows,
            scoring: serde_json::to_string(&self.scoring).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScreenConfig::default();
        assert_eq!(config.workers, 30);
        assert_eq!(config.write_errors, WriteErrorPolicy::Abort);
        assert_eq!(config.no_match_serotype, "Unassigned");
        assert_eq!(config.scoring, ScoringPolicy::streaming());
        assert_eq!(config.batch_rows, 8192);
    }

    #[test]
    fn test_legacy_batch() {
        let config = ScreenConfig::legacy_batch();
        assert_eq!(config.no_match_serotype, "N/A");
        assert_eq!(config.scoring, ScoringPolicy::legacy_batch());
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScreenConfig =
            serde_json::from_str(r#"{"workers": 4, "write_errors": "skip_and_log"}"#).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.write_errors, WriteErrorPolicy::SkipAndLog);
        assert_eq!(config.progress_interval, DEFAULT_PROGRESS_INTERVAL);
    }

    #[test]
    fn test_parquet_options_carry_policy() {
        let config = ScreenConfig::default();
        let options = config.parquet_options();
        let scoring: ScoringPolicy = serde_json::from_str(&options.scoring.unwrap()).unwrap();
        assert_eq!(scoring, config.scoring);
    }
}
