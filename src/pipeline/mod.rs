//! The concurrent match-score-emit pipeline.
//!
//! - [`RecordProcessor`]: matches and scores one read into a [`RecordOutcome`]
//! - [`WorkerBudget`]: the fixed number of reads processed at once
//! - [`Pipeline`]: reads a stream, dispatches reads to workers and finalizes the sink
//!
//! ## Lifecycle
//!
//! ```text
//! Idle -> Running -> Draining -> Finalized
//! ```
//!
//! `Running` lasts until the stream ends, fails or the run is cancelled.
//! `Draining` waits for every dispatched read to be written. The sink is
//! finalized on success and aborted otherwise.
//!
//! Rows reach the sink in completion order, not input order.
//!
//! ## Example
//!
//! ```rust
//! use bhedi::output::{OutputSink, VecRowWriter};
//! use bhedi::parsing::fastx::StreamError;
//! use bhedi::pipeline::{Pipeline, ScreenConfig};
//! use bhedi::{MarkerCatalog, MarkerRecord, RunStatistics, SequenceRecord};
//!
//! let catalog = MarkerCatalog::from_markers([MarkerRecord::new("m1", "DENV-1", "ACGT")]);
//! let config = ScreenConfig::default().with_workers(4);
//! let pipeline = Pipeline::new(&catalog, &config).unwrap();
//!
//! let reads: Vec<Result<SequenceRecord, StreamError>> =
//!     vec![Ok(SequenceRecord::new("r1", "TTACGTTT"))];
//! let mut reads = reads.into_iter();
//! let (rows, report) = pipeline
//!     .run(&mut reads, RunStatistics::new(1, 8.0), OutputSink::new(VecRowWriter::new()))
//!     .unwrap();
//! assert_eq!(rows[0].matched_sanket, "m1");
//! assert_eq!(report.records, 1);
//! ```

pub mod budget;
pub mod config;
pub mod orchestrator;
pub mod processor;

pub use budget::{BudgetSlot, CancelToken, WorkerBudget};
pub use config::{ScreenConfig, WriteErrorPolicy};
pub use orchestrator::{screen_file, Pipeline, PipelineError, PipelineState, RunReport};
pub use processor::{process_record, MatchEvent, RecordOutcome, RecordProcessor};
