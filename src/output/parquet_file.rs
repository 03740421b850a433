use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Float64Builder, Int32Array, Int32Builder};
use arrow::array::{StringArray, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::{debug, warn};

use super::row::OutputRow;
use super::sink::{RowWriter, SinkError, SinkSummary};

pub const META_VERSION: &str = "bhedi.version";
pub const META_CREATED_AT: &str = "bhedi.created_at";
pub const META_SCORING: &str = "bhedi.scoring";
pub const META_ROWS_DROPPED: &str = "bhedi.rows_dropped";

pub const DEFAULT_BATCH_ROWS: usize = 8192;

/// Arrow schema of the output table
#[must_use]
pub fn output_schema() -> SchemaRef {
    let utf8 = |name: &str| Field::new(name, DataType::Utf8, false);
    Arc::new(Schema::new(vec![
        utf8("sid"),
        utf8("read_id"),
        utf8("matched_sanket"),
        utf8("serotype"),
        Field::new("gc_percentage", DataType::Float64, false),
        Field::new("total_coverage", DataType::Int32, false),
        Field::new("s_len", DataType::Int32, false),
        utf8("ssr_count"),
        utf8("mlen_avg"),
        utf8("mrc_avg"),
        utf8("p_count"),
        utf8("plen_avg"),
        Field::new("b_score", DataType::Float64, false),
    ]))
}

/// Settings for a Parquet output file
#[derive(Debug, Clone)]
pub struct ParquetOptions {
    /// Rows buffered before a record batch is flushed
    pub batch_rows: usize,
    /// JSON form of the scoring policy, recorded in the file metadata
    pub scoring: Option<String>,
}

impl Default for ParquetOptions {
    fn default() -> Self {
        Self {
            batch_rows: DEFAULT_BATCH_ROWS,
            scoring: None,
        }
    }
}

#[derive(Default)]
struct ColumnBuilders {
    sid: StringBuilder,
    read_id: StringBuilder,
    matched_sanket: StringBuilder,
    serotype: StringBuilder,
    gc_percentage: Float64Builder,
    total_coverage: Int32Builder,
    s_len: Int32Builder,
    ssr_count: StringBuilder,
    mlen_avg: StringBuilder,
    mrc_avg: StringBuilder,
    p_count: StringBuilder,
    plen_avg: StringBuilder,
    b_score: Float64Builder,
}

impl ColumnBuilders {
    fn append(&mut self, row: &OutputRow) {
        self.sid.append_value(&row.sid);
        self.read_id.append_value(&row.read_id);
        self.matched_sanket.append_value(&row.matched_sanket);
        self.serotype.append_value(&row.serotype);
        self.gc_percentage.append_value(row.gc_percentage);
        self.total_coverage.append_value(row.total_coverage);
        self.s_len.append_value(row.s_len);
        self.ssr_count.append_value(&row.ssr_count);
        self.mlen_avg.append_value(&row.mlen_avg);
        self.mrc_avg.append_value(&row.mrc_avg);
        self.p_count.append_value(&row.p_count);
        self.plen_avg.append_value(&row.plen_avg);
        self.b_score.append_value(row.b_score);
    }

    /// Drain the builders into arrays, in schema order
    fn finish(&mut self) -> Vec<ArrayRef> {
        vec![
            Arc::new(self.sid.finish()),
            Arc::new(self.read_id.finish()),
            Arc::new(self.matched_sanket.finish()),
            Arc::new(self.serotype.finish()),
            Arc::new(self.gc_percentage.finish()),
            Arc::new(self.total_coverage.finish()),
            Arc::new(self.s_len.finish()),
            Arc::new(self.ssr_count.finish()),
            Arc::new(self.mlen_avg.finish()),
            Arc::new(self.mrc_avg.finish()),
            Arc::new(self.p_count.finish()),
            Arc::new(self.plen_avg.finish()),
            Arc::new(self.b_score.finish()),
        ]
    }
}

/// Snappy-compressed Parquet writer for [`OutputRow`]s.
///
/// Rows are buffered column-wise and flushed as one record batch every
/// `batch_rows` rows. The footer is only written by [`RowWriter::finish`]; a writer
/// dropped without finishing leaves an incomplete file.
pub struct ParquetRowWriter<W: Write + Send> {
    writer: ArrowWriter<W>,
    schema: SchemaRef,
    builders: ColumnBuilders,
    batch_rows: usize,
    buffered: usize,
    rows_lost: u64,
}

impl ParquetRowWriter<File> {
    /// Create the output file at `path`
    pub fn create(path: &Path, options: &ParquetOptions) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Self::new(file, options)
    }
}

impl<W: Write + Send> ParquetRowWriter<W> {
    pub fn new(inner: W, options: &ParquetOptions) -> Result<Self, SinkError> {
        let mut metadata = vec![
            KeyValue::new(
                META_VERSION.to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
            KeyValue::new(
                META_CREATED_AT.to_string(),
                chrono::Utc::now().to_rfc3339(),
            ),
        ];
        if let Some(scoring) = &options.scoring {
            metadata.push(KeyValue::new(META_SCORING.to_string(), scoring.clone()));
        }

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .set_key_value_metadata(Some(metadata))
            .build();

        let schema = output_schema();
        let writer = ArrowWriter::try_new(inner, schema.clone(), Some(props))?;

        Ok(Self {
            writer,
            schema,
            builders: ColumnBuilders::default(),
            batch_rows: options.batch_rows.max(1),
            buffered: 0,
            rows_lost: 0,
        })
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if self.buffered == 0 {
            return Ok(());
        }
        let rows = self.buffered;
        self.buffered = 0;

        let batch = RecordBatch::try_new(self.schema.clone(), self.builders.finish());
        let result = match batch {
            Ok(batch) => self.writer.write(&batch).map_err(SinkError::from),
            Err(e) => Err(SinkError::from(e)),
        };
        match result {
            Ok(()) => {
                debug!("Flushed batch of {} rows", rows);
                Ok(())
            }
            // ArrowWriter cannot recover from a failed row group
            Err(e) => {
                self.rows_lost += rows as u64;
                warn!("Failed to flush a batch of {} rows", rows);
                Err(SinkError::BatchLost {
                    rows: rows as u64,
                    source: Box::new(e),
                })
            }
        }
    }
}

impl<W: Write + Send> RowWriter for ParquetRowWriter<W> {
    type Output = W;

    fn write_row(&mut self, row: &OutputRow) -> Result<(), SinkError> {
        self.builders.append(row);
        self.buffered += 1;
        if self.buffered >= self.batch_rows {
            self.flush()?;
        }
        Ok(())
    }

    fn rows_lost(&self) -> u64 {
        self.rows_lost
    }

    fn finish(mut self, summary: &SinkSummary) -> Result<W, SinkError> {
        self.flush()?;
        // A failed final flush is already counted by `flush`
        let dropped = summary.rows_dropped.max(self.rows_lost);
        self.writer.append_key_value_metadata(KeyValue::new(
            META_ROWS_DROPPED.to_string(),
            dropped.to_string(),
        ));
        Ok(self.writer.into_inner()?)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, SinkError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| SinkError::Writer(format!("Column '{name}' missing or mistyped")))
}

/// Read every row of an output file
pub fn read_rows(path: &Path) -> Result<Vec<OutputRow>, SinkError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let sid = column::<StringArray>(&batch, "sid")?;
        let read_id = column::<StringArray>(&batch, "read_id")?;
        let matched = column::<StringArray>(&batch, "matched_sanket")?;
        let serotype = column::<StringArray>(&batch, "serotype")?;
        let gc = column::<Float64Array>(&batch, "gc_percentage")?;
        let coverage = column::<Int32Array>(&batch, "total_coverage")?;
        let s_len = column::<Int32Array>(&batch, "s_len")?;
        let ssr_count = column::<StringArray>(&batch, "ssr_count")?;
        let mlen_avg = column::<StringArray>(&batch, "mlen_avg")?;
        let mrc_avg = column::<StringArray>(&batch, "mrc_avg")?;
        let p_count = column::<StringArray>(&batch, "p_count")?;
        let plen_avg = column::<StringArray>(&batch, "plen_avg")?;
        let b_score = column::<Float64Array>(&batch, "b_score")?;

        for i in 0..batch.num_rows() {
            rows.push(OutputRow {
                sid: sid.value(i).to_string(),
                read_id: read_id.value(i).to_string(),
                matched_sanket: matched.value(i).to_string(),
                serotype: serotype.value(i).to_string(),
                gc_percentage: gc.value(i),
                total_coverage: coverage.value(i),
                s_len: s_len.value(i),
                ssr_count: ssr_count.value(i).to_string(),
                mlen_avg: mlen_avg.value(i).to_string(),
                mrc_avg: mrc_avg.value(i).to_string(),
                p_count: p_count.value(i).to_string(),
                plen_avg: plen_avg.value(i).to_string(),
                b_score: b_score.value(i),
            });
        }
    }

    Ok(rows)
}

/// Read the key/value metadata of an output file
pub fn read_metadata(path: &Path) -> Result<HashMap<String, String>, SinkError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let metadata = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .map(|kvs| {
            kvs.iter()
                .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                .collect()
        })
        .unwrap_or_default();
    Ok(metadata)
}
