//! Run statistics providers.
//!
//! Scores are normalized against the read count and mean read length of the whole
//! input, so these figures must be known before the first record is processed.
//! They can be computed natively with one pass over the input, or taken from
//! `seqkit stats --tabular`.

use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::core::types::RunStatistics;
use crate::parsing::fastx::{FastxReader, SequenceSource, StreamError};

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Failed to read input for statistics: {0}")]
    Stream(#[from] StreamError),

    #[error("Failed to run seqkit: {0}")]
    Command(#[from] std::io::Error),

    #[error("seqkit exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("Failed to parse seqkit stats output: {0}")]
    InvalidOutput(String),
}

/// How run statistics are obtained
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StatsMethod {
    /// Count records and bases in a single pass over the input
    #[default]
    Native,
    /// Invoke `seqkit stats --tabular` and parse its output
    Seqkit,
}

/// Obtain run statistics for a sequence file with the given method
///
/// # Errors
///
/// Returns a `StatsError` if the input cannot be read or seqkit fails.
pub fn run_statistics(path: &Path, method: StatsMethod) -> Result<RunStatistics, StatsError> {
    let stats = match method {
        StatsMethod::Native => compute_file_statistics(path)?,
        StatsMethod::Seqkit => seqkit_statistics(path)?,
    };
    debug!(
        "Run statistics for {}: {} records, mean length {:.2}",
        path.display(),
        stats.total_record_count,
        stats.average_read_length
    );
    Ok(stats)
}

/// Count records and mean length of a sequence file
///
/// # Errors
///
/// Returns `StatsError::Stream` if the file cannot be opened or parsed.
pub fn compute_file_statistics(path: &Path) -> Result<RunStatistics, StatsError> {
    let mut reader = FastxReader::open(path)?;
    compute_statistics(&mut reader)
}

/// Count records and mean length of any sequence source.
///
/// An empty source yields zero records with a mean length of 0.
///
/// # Errors
///
/// Returns `StatsError::Stream` on the first read error.
pub fn compute_statistics<S: SequenceSource + ?Sized>(
    source: &mut S,
) -> Result<RunStatistics, StatsError> {
    let mut records = 0u64;
    let mut bases = 0u64;

    while let Some(record) = source.next_record()? {
        records += 1;
        bases += record.len() as u64;
    }

    #[allow(clippy::cast_precision_loss)]
    let average = if records == 0 {
        0.0
    } else {
        bases as f64 / records as f64
    };

    Ok(RunStatistics::new(records, average))
}

/// Run `seqkit stats <path> --tabular` and parse its output
///
/// # Errors
///
/// Returns `StatsError::Command` if seqkit cannot be started,
/// `StatsError::CommandFailed` on a non-zero exit, or
/// `StatsError::InvalidOutput` if the table cannot be parsed.
pub fn seqkit_statistics(path: &Path) -> Result<RunStatistics, StatsError> {
    let output = Command::new("seqkit")
        .arg("stats")
        .arg(path)
        .arg("--tabular")
        .output()?;

    if !output.status.success() {
        return Err(StatsError::CommandFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_seqkit_tabular(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `seqkit stats --tabular` output.
///
/// Columns are located by the `num_seqs` and `avg_len` header names. Output without
/// a recognizable header falls back to fields 4 and 6 of the second line.
///
/// # Errors
///
/// Returns `StatsError::InvalidOutput` if the data line is missing or its
/// fields do not parse.
pub fn parse_seqkit_tabular(text: &str) -> Result<RunStatistics, StatsError> {
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap_or_default().split_whitespace().collect();
    let line = lines
        .next()
        .ok_or_else(|| StatsError::InvalidOutput("missing data line".to_string()))?;

    let column = |name: &str, fallback: usize| {
        header.iter().position(|h| *h == name).unwrap_or(fallback)
    };
    let count_idx = column("num_seqs", 3);
    let avg_idx = column("avg_len", 5);

    let fields: Vec<&str> = line.split_whitespace().collect();
    let field = |idx: usize| {
        fields.get(idx).copied().ok_or_else(|| {
            StatsError::InvalidOutput(format!(
                "expected at least {} fields, found {}",
                idx + 1,
                fields.len()
            ))
        })
    };

    let count_field = field(count_idx)?;
    let avg_field = field(avg_idx)?;

    let total: u64 = count_field.replace(',', "").parse().map_err(|_| {
        StatsError::InvalidOutput(format!("invalid record count '{count_field}'"))
    })?;
    let average: f64 = avg_field.replace(',', "").parse().map_err(|_| {
        StatsError::InvalidOutput(format!("invalid average length '{avg_field}'"))
    })?;

    Ok(RunStatistics::new(total, average))
}
