use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::budget::{BudgetSlot, CancelToken, WorkerBudget};
use super::config::{ScreenConfig, WriteErrorPolicy};
use super::processor::RecordProcessor;
use crate::catalog::store::MarkerCatalog;
use crate::core::read::SequenceRecord;
use crate::core::types::RunStatistics;
use crate::matching::scoring::PolicyError;
use crate::output::parquet_file::ParquetRowWriter;
use crate::output::sink::{OutputSink, RowWriter, SinkError};
use crate::parsing::fastx::{FastxReader, SequenceSource, StreamError};
use crate::parsing::stats::{run_statistics, StatsError, StatsMethod};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid scoring policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Run statistics unavailable: {0}")]
    Stats(#[from] StatsError),

    #[error("Failed to read sequences: {0}")]
    Read(#[from] StreamError),

    #[error("Failed to create output: {0}")]
    Output(SinkError),

    #[error("Failed to write output row: {0}")]
    Write(SinkError),

    #[error("Failed to finalize output: {0}")]
    Finalize(SinkError),

    #[error("Run cancelled")]
    Cancelled,

    #[error("A worker thread panicked")]
    WorkerPanicked,
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Finalized,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Draining => "Draining",
            Self::Finalized => "Finalized",
        };
        f.write_str(name)
    }
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    debug!("Pipeline state: {} -> {}", state, next);
    *state = next;
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Records processed by the workers
    pub records: u64,
    /// Records with at least one marker match
    pub matched_records: u64,
    pub rows_written: u64,
    pub rows_dropped: u64,
    /// Largest number of records in flight at once
    pub peak_in_flight: usize,
    /// Serotype -> number of match rows
    pub serotype_counts: BTreeMap<String, u64>,
    pub elapsed: Duration,
}

/// One record travelling from the reader to a worker, with the slot it holds
struct Job<'b> {
    record: SequenceRecord,
    slot: BudgetSlot<'b>,
}

/// Worker-local tallies, merged once the worker has been joined
#[derive(Debug, Default)]
struct WorkerStats {
    records: u64,
    matched_records: u64,
    serotype_counts: BTreeMap<String, u64>,
    error: Option<SinkError>,
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.records += other.records;
        self.matched_records += other.matched_records;
        for (serotype, count) in other.serotype_counts {
            *self.serotype_counts.entry(serotype).or_default() += count;
        }
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

/// Cancels the run if the owning worker unwinds
struct HaltOnPanic<'t>(&'t CancelToken);

impl Drop for HaltOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.cancel();
        }
    }
}

/// What the reader side saw
struct Dispatch {
    dispatched: u64,
    error: Option<StreamError>,
}

/// Bounded-concurrency driver of a screening run.
///
/// The calling thread reads records and dispatches each one to a pool of
/// `config.workers` threads once a budget slot is free. Workers match and score
/// the record, hand its rows to the shared sink and release the slot. After the
/// stream ends and every worker has been joined, the sink is finalized exactly
/// once; on a read error, an aborting write error or cancellation it is aborted
/// instead and no footer is written.
pub struct Pipeline<'a> {
    catalog: &'a MarkerCatalog,
    config: &'a ScreenConfig,
    cancel: CancelToken,
    budget: Option<Arc<WorkerBudget>>,
}

impl<'a> Pipeline<'a> {
    /// Validate `config` and prepare a run over `catalog`
    pub fn new(catalog: &'a MarkerCatalog, config: &'a ScreenConfig) -> Result<Self, PipelineError> {
        if config.workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if config.batch_rows == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_rows must be at least 1".to_string(),
            ));
        }
        config.scoring.validate()?;

        Ok(Self {
            catalog,
            config,
            cancel: CancelToken::new(),
            budget: None,
        })
    }

    /// Use an externally controlled cancellation token
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Draw slots from a shared budget instead of one sized by `config.workers`.
    ///
    /// The pool gets one worker per slot of `budget`.
    #[must_use]
    pub fn with_budget(mut self, budget: Arc<WorkerBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Run the pipeline over `source`, writing through `sink`.
    ///
    /// Returns the finished writer's output and the run report.
    pub fn run<S, W>(
        &self,
        source: &mut S,
        stats: RunStatistics,
        sink: OutputSink<W>,
    ) -> Result<(W::Output, RunReport), PipelineError>
    where
        S: SequenceSource + ?Sized,
        W: RowWriter,
    {
        let start = Instant::now();
        let mut state = PipelineState::Idle;

        let processor = RecordProcessor::new(self.catalog, self.config.scoring, stats);
        let owned;
        let budget: &WorkerBudget = match &self.budget {
            Some(shared) => shared,
            None => {
                owned = WorkerBudget::new(self.config.workers);
                &owned
            }
        };
        let halt = self.cancel.child();

        debug!(
            "Starting run: {} markers, {} workers, {} records expected",
            self.catalog.len(),
            budget.capacity(),
            stats.total_record_count
        );
        transition(&mut state, PipelineState::Running);

        let (job_sender, job_receiver) = crossbeam_channel::bounded::<Job<'_>>(budget.capacity());

        let (dispatch, joined) = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..budget.capacity())
                .map(|_| {
                    let jobs = job_receiver.clone();
                    let (processor, sink, halt) = (&processor, &sink, &halt);
                    let config = self.config;
                    scope.spawn(move || work(&jobs, processor, sink, config, halt))
                })
                .collect();
            drop(job_receiver);

            let dispatch = self.dispatch(source, budget, &job_sender, &halt);
            drop(job_sender);
            transition(&mut state, PipelineState::Draining);

            let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
            (dispatch, joined)
        });

        let mut totals = WorkerStats::default();
        let mut panicked = false;
        for result in joined {
            match result {
                Ok(worker) => totals.merge(worker),
                Err(_) => panicked = true,
            }
        }
        transition(&mut state, PipelineState::Finalized);

        let failure = if panicked {
            Some(PipelineError::WorkerPanicked)
        } else if let Some(e) = dispatch.error {
            Some(PipelineError::Read(e))
        } else if let Some(e) = totals.error.take() {
            Some(PipelineError::Write(e))
        } else if self.cancel.is_cancelled() {
            Some(PipelineError::Cancelled)
        } else {
            None
        };
        if let Some(e) = failure {
            error!("Run failed after {} records: {}", dispatch.dispatched, e);
            sink.abort();
            return Err(e);
        }

        let (output, summary) = sink.finalize().map_err(PipelineError::Finalize)?;
        if summary.rows_dropped > 0 {
            warn!("{} rows could not be written", summary.rows_dropped);
        }

        let report = RunReport {
            records: totals.records,
            matched_records: totals.matched_records,
            rows_written: summary.rows_written,
            rows_dropped: summary.rows_dropped,
            peak_in_flight: budget.peak(),
            serotype_counts: totals.serotype_counts,
            elapsed: start.elapsed(),
        };
        debug!("Run report: {:?}", report);
        Ok((output, report))
    }

    /// Read records and hand each to a worker once it holds a budget slot
    fn dispatch<'b, S>(
        &self,
        source: &mut S,
        budget: &'b WorkerBudget,
        jobs: &Sender<Job<'b>>,
        halt: &CancelToken,
    ) -> Dispatch
    where
        S: SequenceSource + ?Sized,
    {
        let mut dispatched = 0u64;
        loop {
            if halt.is_cancelled() {
                debug!("Dispatch stopped after {} records", dispatched);
                break;
            }

            let record = match source.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    halt.cancel();
                    return Dispatch {
                        dispatched,
                        error: Some(e),
                    };
                }
            };

            let Some(slot) = budget.acquire(halt) else {
                break;
            };
            if jobs.send(Job { record, slot }).is_err() {
                break;
            }

            dispatched += 1;
            let interval = self.config.progress_interval;
            if interval > 0 && dispatched % interval == 0 {
                info!(
                    "Dispatched {} records ({} in flight)",
                    dispatched,
                    budget.in_flight()
                );
            }
        }

        Dispatch {
            dispatched,
            error: None,
        }
    }
}

fn work<W: RowWriter>(
    jobs: &Receiver<Job<'_>>,
    processor: &RecordProcessor<'_>,
    sink: &OutputSink<W>,
    config: &ScreenConfig,
    halt: &CancelToken,
) -> WorkerStats {
    let _guard = HaltOnPanic(halt);
    let mut stats = WorkerStats::default();

    for Job { record, slot } in jobs.iter() {
        if halt.is_cancelled() {
            drop(slot);
            continue;
        }

        let outcome = processor.process(&record);
        stats.records += 1;
        if outcome.matches_found {
            stats.matched_records += 1;
            for event in &outcome.matches {
                *stats
                    .serotype_counts
                    .entry(event.marker.serotype.clone())
                    .or_default() += 1;
            }
        }

        let rows = outcome.to_rows(&config.no_match_serotype);
        if let Err(e) = sink.write_rows(&rows) {
            match config.write_errors {
                WriteErrorPolicy::SkipAndLog if !e.is_fatal() => {
                    warn!("Dropped rows of read {}: {}", record.id, e);
                }
                _ => {
                    error!("Write failed for read {}, aborting run: {}", record.id, e);
                    halt.cancel();
                    if stats.error.is_none() {
                        stats.error = Some(e);
                    }
                }
            }
        }

        // rows are with the sink, the slot can go
        drop(slot);
    }

    stats
}

/// Screen one sequence file into a Parquet file.
///
/// Computes run statistics with `stats_method`, then streams the file through a
/// [`Pipeline`].
pub fn screen_file(
    catalog: &MarkerCatalog,
    input: &Path,
    output: &Path,
    config: &ScreenConfig,
    stats_method: StatsMethod,
    cancel: &CancelToken,
) -> Result<RunReport, PipelineError> {
    let pipeline = Pipeline::new(catalog, config)?.with_cancel(cancel.clone());

    let stats = run_statistics(input, stats_method)?;
    info!(
        "{}: {} records, mean length {:.1}",
        input.display(),
        stats.total_record_count,
        stats.average_read_length
    );

    let mut reader = FastxReader::open(input)?;
    let writer = ParquetRowWriter::create(output, &config.parquet_options())
        .map_err(PipelineError::Output)?;

    let (_file, report) = pipeline.run(&mut reader, stats, OutputSink::new(writer))?;
    info!(
        "{}: {} records, {} matched, {} rows written to {} in {:.2?}",
        input.display(),
        report.records,
        report.matched_records,
        report.rows_written,
        output.display(),
        report.elapsed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerRecord;
    use crate::output::sink::{SinkSummary, VecRowWriter};

    fn make_test_catalog() -> MarkerCatalog {
        MarkerCatalog::from_markers([
            MarkerRecord::new("m1", "DENV-1", "ACGT"),
            MarkerRecord::new("m2", "DENV-1", "TTTT"),
            MarkerRecord::new("m3", "DENV-2", "GGCC"),
        ])
    }

    fn reads(n: usize) -> Vec<Result<SequenceRecord, StreamError>> {
        (0..n)
            .map(|i| {
                let sequence = match i % 3 {
                    0 => "AAACGTAA",
                    1 => "ACGTTTTTGGCC",
                    _ => "AAAAA",
                };
                Ok(SequenceRecord::new(format!("r{i}"), sequence))
            })
            .collect()
    }

    #[test]
    fn test_run_counts_rows() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default().with_workers(4);
        let pipeline = Pipeline::new(&catalog, &config).unwrap();

        let mut source = reads(30).into_iter();
        let (rows, report) = pipeline
            .run(&mut source, RunStatistics::new(30, 8.0), OutputSink::new(VecRowWriter::new()))
            .unwrap();

        // 10 single matches, 10 triple matches, 10 no-match rows
        assert_eq!(rows.len(), 50);
        assert_eq!(report.records, 30);
        assert_eq!(report.matched_records, 20);
        assert_eq!(report.rows_written, 50);
        assert_eq!(report.rows_dropped, 0);
        assert!(report.peak_in_flight <= 4);
        assert_eq!(report.serotype_counts.get("DENV-1"), Some(&30));
        assert_eq!(report.serotype_counts.get("DENV-2"), Some(&10));
    }

    #[test]
    fn test_read_error_aborts() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default().with_workers(2);
        let pipeline = Pipeline::new(&catalog, &config).unwrap();

        let mut items = reads(5);
        items.push(Err(StreamError::UnsupportedFormat("garbage".to_string())));
        items.extend(reads(5));
        let mut source = items.into_iter();

        let result = pipeline.run(
            &mut source,
            RunStatistics::new(10, 8.0),
            OutputSink::new(VecRowWriter::new()),
        );
        assert!(matches!(result, Err(PipelineError::Read(_))));
    }

    #[test]
    fn test_cancelled_before_start() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let pipeline = Pipeline::new(&catalog, &config).unwrap().with_cancel(cancel);

        let mut source = reads(10).into_iter();
        let result = pipeline.run(
            &mut source,
            RunStatistics::new(10, 8.0),
            OutputSink::new(VecRowWriter::new()),
        );
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_invalid_config() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default().with_workers(0);
        assert!(matches!(
            Pipeline::new(&catalog, &config),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut scoring = crate::matching::scoring::ScoringPolicy::streaming();
        scoring.length_weight = -1.0;
        let config = ScreenConfig::default().with_scoring(scoring);
        assert!(matches!(
            Pipeline::new(&catalog, &config),
            Err(PipelineError::Policy(_))
        ));
    }

    struct FlakyWriter {
        rows: usize,
        fail_every: usize,
    }

    impl RowWriter for FlakyWriter {
        type Output = (usize, SinkSummary);

        fn write_row(&mut self, _row: &crate::output::row::OutputRow) -> Result<(), SinkError> {
            self.rows += 1;
            if self.rows % self.fail_every == 0 {
                return Err(SinkError::Writer("flaky".to_string()));
            }
            Ok(())
        }

        fn finish(self, summary: &SinkSummary) -> Result<Self::Output, SinkError> {
            Ok((self.rows, *summary))
        }
    }

    #[test]
    fn test_skip_and_log_finalizes_with_dropped_rows() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default()
            .with_workers(3)
            .with_write_errors(WriteErrorPolicy::SkipAndLog);
        let pipeline = Pipeline::new(&catalog, &config).unwrap();

        // no-match reads only, one row each
        let mut source = (0..20)
            .map(|i| Ok::<_, StreamError>(SequenceRecord::new(format!("r{i}"), "AAAA")))
            .collect::<Vec<_>>()
            .into_iter();
        let writer = FlakyWriter {
            rows: 0,
            fail_every: 5,
        };
        let ((attempted, summary), report) = pipeline
            .run(&mut source, RunStatistics::new(20, 4.0), OutputSink::new(writer))
            .unwrap();

        assert_eq!(attempted, 20);
        assert_eq!(summary.rows_dropped, 4);
        assert_eq!(report.rows_dropped, 4);
        assert_eq!(report.rows_written, 16);
    }

    #[test]
    fn test_abort_policy_stops_run() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default().with_workers(2);
        let pipeline = Pipeline::new(&catalog, &config).unwrap();

        let mut source = reads(100).into_iter();
        let writer = FlakyWriter {
            rows: 0,
            fail_every: 3,
        };
        let result = pipeline.run(&mut source, RunStatistics::new(100, 8.0), OutputSink::new(writer));
        assert!(matches!(result, Err(PipelineError::Write(_))));
    }

    /// Fails the way a Parquet writer does when a buffered batch cannot be flushed
    struct LostBatchWriter {
        rows: usize,
        finished: Arc<std::sync::atomic::AtomicBool>,
    }

    impl RowWriter for LostBatchWriter {
        type Output = ();

        fn write_row(&mut self, _row: &crate::output::row::OutputRow) -> Result<(), SinkError> {
            self.rows += 1;
            if self.rows == 4 {
                return Err(SinkError::BatchLost {
                    rows: 4,
                    source: Box::new(SinkError::Writer("disk full".to_string())),
                });
            }
            Ok(())
        }

        fn finish(self, _summary: &SinkSummary) -> Result<(), SinkError> {
            self.finished.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_lost_batch_stops_run_even_when_skipping() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default()
            .with_workers(2)
            .with_write_errors(WriteErrorPolicy::SkipAndLog);
        let pipeline = Pipeline::new(&catalog, &config).unwrap();
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let writer = LostBatchWriter {
            rows: 0,
            finished: Arc::clone(&finished),
        };

        let mut source = reads(30).into_iter();
        let result = pipeline.run(&mut source, RunStatistics::new(30, 8.0), OutputSink::new(writer));
        assert!(matches!(
            result,
            Err(PipelineError::Write(SinkError::BatchLost { rows: 4, .. }))
        ));
        assert!(!finished.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_shared_budget_sets_pool_size() {
        let catalog = make_test_catalog();
        let config = ScreenConfig::default();
        let budget = Arc::new(WorkerBudget::new(2));
        let pipeline = Pipeline::new(&catalog, &config)
            .unwrap()
            .with_budget(Arc::clone(&budget));

        let mut source = reads(20).into_iter();
        let (rows, report) = pipeline
            .run(&mut source, RunStatistics::new(20, 8.0), OutputSink::new(VecRowWriter::new()))
            .unwrap();
        assert_eq!(report.records, 20);
        assert_eq!(rows.len(), 34);
        assert!(report.peak_in_flight <= 2);
        assert_eq!(budget.in_flight(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Draining.to_string(), "Draining");
    }
}
