//! End-to-end tests of the match-score-emit pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bhedi::output::parquet_file::{read_metadata, read_rows, META_ROWS_DROPPED, META_SCORING};
use bhedi::output::sink::{OutputSink, RowWriter, SinkError, SinkSummary, VecRowWriter};
use bhedi::parsing::fastx::StreamError;
use bhedi::parsing::stats::StatsMethod;
use bhedi::pipeline::{screen_file, CancelToken, PipelineError, WorkerBudget};
use bhedi::{
    MarkerCatalog, MarkerRecord, OutputRow, Pipeline, RunStatistics, ScreenConfig,
    SequenceRecord, NO_MATCH_LABEL,
};
use tempfile::TempDir;

fn single_marker_catalog() -> MarkerCatalog {
    MarkerCatalog::from_markers([MarkerRecord::new("m1", "DENV-1", "ACGT")])
}

fn run_vec(
    catalog: &MarkerCatalog,
    config: &ScreenConfig,
    records: Vec<SequenceRecord>,
) -> Vec<OutputRow> {
    let stats = RunStatistics::new(records.len() as u64, 8.0);
    let mut source = records.into_iter().map(Ok::<_, StreamError>);
    let (rows, _report) = Pipeline::new(catalog, config)
        .unwrap()
        .run(&mut source, stats, OutputSink::new(VecRowWriter::new()))
        .unwrap();
    rows
}

#[test]
fn test_single_match_produces_one_row() {
    let catalog = single_marker_catalog();
    let rows = run_vec(
        &catalog,
        &ScreenConfig::default(),
        vec![SequenceRecord::new("r1", "TTACGTTT")],
    );

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.read_id, "r1");
    assert_eq!(row.matched_sanket, "m1");
    assert_eq!(row.serotype, "DENV-1");
    assert_eq!(row.total_coverage, 1);
    assert_eq!(row.s_len, 4);
    assert!(row.b_score > 0.0);
}

#[test]
fn test_no_match_row() {
    let catalog = single_marker_catalog();
    let rows = run_vec(
        &catalog,
        &ScreenConfig::default(),
        vec![SequenceRecord::new("r2", "GGGGG")],
    );

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert!(row.is_no_match());
    assert_eq!(row.matched_sanket, NO_MATCH_LABEL);
    assert_eq!(row.serotype, "Unassigned");
    assert_eq!(row.total_coverage, 0);
    assert!((row.gc_percentage - 100.0).abs() < f64::EPSILON);
    assert!(row.b_score.abs() < f64::EPSILON);
}

#[test]
fn test_legacy_no_match_serotype() {
    let catalog = single_marker_catalog();
    let rows = run_vec(
        &catalog,
        &ScreenConfig::legacy_batch(),
        vec![SequenceRecord::new("r2", "GGGGG")],
    );
    assert_eq!(rows[0].serotype, "N/A");
}

#[test]
fn test_same_serotype_markers_share_coverage() {
    let catalog = MarkerCatalog::from_markers([
        MarkerRecord::new("m1", "DENV-1", "ACGT"),
        MarkerRecord::new("m2", "DENV-1", "TTTT"),
    ]);
    let mut rows = run_vec(
        &catalog,
        &ScreenConfig::default(),
        vec![SequenceRecord::new("r3", "ACGTTTTT")],
    );
    rows.sort_by(|a, b| a.matched_sanket.cmp(&b.matched_sanket));

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].matched_sanket, "m1");
    assert_eq!(rows[1].matched_sanket, "m2");
    assert!(rows.iter().all(|r| r.total_coverage == 1));
    assert!(rows.iter().all(|r| r.read_id == "r3"));
}

/// Counts rows and how often it was finished
struct CountingWriter {
    rows: usize,
    finishes: Arc<AtomicUsize>,
}

impl RowWriter for CountingWriter {
    type Output = usize;

    fn write_row(&mut self, _row: &OutputRow) -> Result<(), SinkError> {
        self.rows += 1;
        Ok(())
    }

    fn finish(self, _summary: &SinkSummary) -> Result<usize, SinkError> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows)
    }
}

#[test]
fn test_bounded_workers_write_every_row_and_finalize_once() {
    let catalog = MarkerCatalog::from_markers([
        MarkerRecord::new("m1", "DENV-1", "ACGT"),
        MarkerRecord::new("m2", "DENV-3", "GGCC"),
    ]);

    // Every fourth read carries both markers, every fourth one marker, the rest none
    let n = 1000;
    let records: Vec<SequenceRecord> = (0..n)
        .map(|i| {
            let sequence = match i % 4 {
                0 => "AACGTAGGCCA",
                1 => "TTACGTTT",
                _ => "ATATATAT",
            };
            SequenceRecord::new(format!("read{i}"), sequence)
        })
        .collect();
    let expected_rows = n / 4 * 2 + n / 4 + n / 2;

    for k in [1, 3, 7] {
        let finishes = Arc::new(AtomicUsize::new(0));
        let writer = CountingWriter {
            rows: 0,
            finishes: Arc::clone(&finishes),
        };
        let config = ScreenConfig::default().with_workers(k);
        let mut source = records.clone().into_iter().map(Ok::<_, StreamError>);

        let (written, report) = Pipeline::new(&catalog, &config)
            .unwrap()
            .run(&mut source, RunStatistics::new(n as u64, 9.0), OutputSink::new(writer))
            .unwrap();

        assert_eq!(written, expected_rows, "workers = {k}");
        assert_eq!(report.rows_written, expected_rows as u64);
        assert_eq!(report.records, n as u64);
        assert_eq!(report.matched_records, (n / 2) as u64);
        assert!(report.peak_in_flight <= k);
        assert_eq!(finishes.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_failed_run_never_finalizes() {
    let catalog = single_marker_catalog();
    let finishes = Arc::new(AtomicUsize::new(0));
    let writer = CountingWriter {
        rows: 0,
        finishes: Arc::clone(&finishes),
    };
    let config = ScreenConfig::default().with_workers(2);

    let mut items: Vec<Result<SequenceRecord, StreamError>> = (0..10)
        .map(|i| Ok(SequenceRecord::new(format!("r{i}"), "ACGT")))
        .collect();
    items.push(Err(StreamError::UnsupportedFormat("truncated".to_string())));
    let mut source = items.into_iter();

    let result = Pipeline::new(&catalog, &config).unwrap().run(
        &mut source,
        RunStatistics::new(11, 4.0),
        OutputSink::new(writer),
    );
    assert!(result.is_err());
    assert_eq!(finishes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancel_mid_stream_never_finalizes() {
    let catalog = single_marker_catalog();
    let finishes = Arc::new(AtomicUsize::new(0));
    let writer = CountingWriter {
        rows: 0,
        finishes: Arc::clone(&finishes),
    };
    let config = ScreenConfig::default().with_workers(3);
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    let mut source = (0..1000).map(move |i| {
        if i == 50 {
            trigger.cancel();
        }
        Ok::<_, StreamError>(SequenceRecord::new(format!("r{i}"), "TTACGTTT"))
    });

    let result = Pipeline::new(&catalog, &config)
        .unwrap()
        .with_cancel(cancel)
        .run(&mut source, RunStatistics::new(1000, 8.0), OutputSink::new(writer));
    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(finishes.load(Ordering::SeqCst), 0);
}

/// Records how many budget slots are held while writing and when finished
struct SlotWatchingWriter {
    budget: Arc<WorkerBudget>,
    busiest_write: usize,
    in_flight_at_finish: Arc<AtomicUsize>,
}

impl RowWriter for SlotWatchingWriter {
    type Output = usize;

    fn write_row(&mut self, _row: &OutputRow) -> Result<(), SinkError> {
        self.busiest_write = self.busiest_write.max(self.budget.in_flight());
        Ok(())
    }

    fn finish(self, _summary: &SinkSummary) -> Result<usize, SinkError> {
        self.in_flight_at_finish
            .store(self.budget.in_flight(), Ordering::SeqCst);
        Ok(self.busiest_write)
    }
}

#[test]
fn test_finalize_runs_after_every_slot_is_released() {
    let catalog = single_marker_catalog();
    let config = ScreenConfig::default();
    let budget = Arc::new(WorkerBudget::new(4));
    let in_flight_at_finish = Arc::new(AtomicUsize::new(usize::MAX));
    let writer = SlotWatchingWriter {
        budget: Arc::clone(&budget),
        busiest_write: 0,
        in_flight_at_finish: Arc::clone(&in_flight_at_finish),
    };

    let mut source =
        (0..200).map(|i| Ok::<_, StreamError>(SequenceRecord::new(format!("r{i}"), "TTACGTTT")));
    let (busiest_write, report) = Pipeline::new(&catalog, &config)
        .unwrap()
        .with_budget(Arc::clone(&budget))
        .run(&mut source, RunStatistics::new(200, 8.0), OutputSink::new(writer))
        .unwrap();

    // a row is written while its read still holds a slot
    assert!(busiest_write >= 1);
    assert!(busiest_write <= 4);
    assert_eq!(in_flight_at_finish.load(Ordering::SeqCst), 0);
    assert_eq!(report.rows_written, 200);
}

#[test]
fn test_screen_file_writes_readable_parquet() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("reads.fastq");
    let output = dir.path().join("reads.fastq.parquet");
    std::fs::write(
        &input,
        "@r1 sample=1\nTTACGTTT\n+\nIIIIIIII\n@r2\nGGGGG\n+\nIIIII\n",
    )
    .unwrap();

    let catalog = single_marker_catalog();
    let config = ScreenConfig::default().with_workers(2);
    let report = screen_file(
        &catalog,
        &input,
        &output,
        &config,
        StatsMethod::Native,
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(report.records, 2);
    assert_eq!(report.matched_records, 1);

    let mut rows = read_rows(&output).unwrap();
    rows.sort_by(|a, b| a.read_id.cmp(&b.read_id));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].read_id, "r1");
    assert_eq!(rows[0].matched_sanket, "m1");
    assert_eq!(rows[0].serotype, "DENV-1");
    assert_eq!(rows[1].read_id, "r2");
    assert_eq!(rows[1].matched_sanket, NO_MATCH_LABEL);

    let metadata = read_metadata(&output).unwrap();
    assert_eq!(metadata.get(META_ROWS_DROPPED).map(String::as_str), Some("0"));
    assert!(metadata.contains_key(META_SCORING));
}

#[test]
fn test_screen_file_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("reads.fastq");
    let output = dir.path().join("reads.parquet");
    std::fs::write(&input, "not a sequence file\n").unwrap();

    let result = screen_file(
        &single_marker_catalog(),
        &input,
        &output,
        &ScreenConfig::default(),
        StatsMethod::Native,
        &CancelToken::new(),
    );
    assert!(result.is_err());
}
