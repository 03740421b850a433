use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

use super::row::OutputRow;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Output writer lock poisoned by a panicking worker")]
    Poisoned,

    #[error("Output writer failed: {0}")]
    Writer(String),

    /// Buffered rows that never reached the output; the writer cannot continue
    #[error("Lost a batch of {rows} buffered rows: {source}")]
    BatchLost {
        rows: u64,
        #[source]
        source: Box<SinkError>,
    },
}

impl SinkError {
    /// Whether the output is unusable after this error, whatever the run's policy
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::BatchLost { .. } | Self::Poisoned)
    }
}

impl<T> From<PoisonError<T>> for SinkError {
    fn from(_: PoisonError<T>) -> Self {
        SinkError::Poisoned
    }
}

/// Totals of a sink at finalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    /// Rows accepted by the writer
    pub rows_written: u64,
    /// Rows lost to write failures
    pub rows_dropped: u64,
}

/// A single-threaded row writer.
///
/// Implementations need not be thread-safe: [`OutputSink`] serializes every call.
pub trait RowWriter: Send {
    /// What the writer hands back once finished
    type Output;

    fn write_row(&mut self, row: &OutputRow) -> Result<(), SinkError>;

    /// Rows the writer accepted earlier but later lost, e.g. a failed batch flush
    fn rows_lost(&self) -> u64 {
        0
    }

    /// Flush buffered rows and complete the output.
    fn finish(self, summary: &SinkSummary) -> Result<Self::Output, SinkError>;
}

struct SinkState<W> {
    writer: W,
    rows_written: u64,
    rows_failed: u64,
}

/// Shared, mutually exclusive access to a [`RowWriter`].
///
/// Workers call [`OutputSink::write_rows`] concurrently; the writer sees one call at a
/// time. [`OutputSink::finalize`] and [`OutputSink::abort`] consume the sink, so the
/// output is completed or discarded at most once.
pub struct OutputSink<W> {
    state: Mutex<SinkState<W>>,
}

impl<W: RowWriter> OutputSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            state: Mutex::new(SinkState {
                writer,
                rows_written: 0,
                rows_failed: 0,
            }),
        }
    }

    /// Write the rows of one record under a single lock acquisition.
    ///
    /// Stops at the first failing row; that row and the rest of the slice count as
    /// dropped. A failing row that the writer already reports in a lost batch is
    /// counted there and not again.
    pub fn write_rows(&self, rows: &[OutputRow]) -> Result<(), SinkError> {
        let mut state = self.state.lock()?;
        for (i, row) in rows.iter().enumerate() {
            let lost_before = state.writer.rows_lost();
            if let Err(e) = state.writer.write_row(row) {
                let in_lost_batch = state.writer.rows_lost() > lost_before;
                if in_lost_batch {
                    // accepted, then lost with its batch
                    state.rows_written += 1;
                }
                let failed = rows.len() - i - usize::from(in_lost_batch);
                state.rows_failed += failed as u64;
                return Err(e);
            }
            state.rows_written += 1;
        }
        Ok(())
    }

    /// Current totals
    pub fn summary(&self) -> Result<SinkSummary, SinkError> {
        let state = self.state.lock()?;
        Ok(Self::summarize(&state))
    }

    fn summarize(state: &SinkState<W>) -> SinkSummary {
        let lost = state.writer.rows_lost();
        SinkSummary {
            rows_written: state.rows_written.saturating_sub(lost),
            rows_dropped: state.rows_failed + lost,
        }
    }

    /// Complete the output. Runs exactly once, after every writer has finished.
    pub fn finalize(self) -> Result<(W::Output, SinkSummary), SinkError> {
        let state = self.state.into_inner()?;
        let summary = Self::summarize(&state);
        debug!(
            "Finalizing output: {} rows written, {} dropped",
            summary.rows_written, summary.rows_dropped
        );
        let output = state.writer.finish(&summary)?;
        Ok((output, summary))
    }

    /// Discard the output without completing it
    pub fn abort(self) {
        let rows = match self.state.into_inner() {
            Ok(state) => state.rows_written,
            Err(poisoned) => poisoned.into_inner().rows_written,
        };
        debug!("Output aborted after {} rows", rows);
    }
}

/// In-memory writer, for library callers that want rows rather than a file
#[derive(Debug, Default)]
pub struct VecRowWriter {
    rows: Vec<OutputRow>,
}

impl VecRowWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RowWriter for VecRowWriter {
    type Output = Vec<OutputRow>;

    fn write_row(&mut self, row: &OutputRow) -> Result<(), SinkError> {
        self.rows.push(row.clone());
        Ok(())
    }

    fn finish(self, _summary: &SinkSummary) -> Result<Self::Output, SinkError> {
        Ok(self.rows)
    }
}
