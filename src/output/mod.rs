//! Output rows and the serialized sink they are written through.
//!
//! Every record of a run produces at least one [`OutputRow`]. Rows from all workers
//! go through a single [`OutputSink`], which serializes access to the underlying
//! [`RowWriter`] and completes the output exactly once.
//!
//! The default writer is [`ParquetRowWriter`]: Snappy-compressed Parquet with the
//! columns listed below and `bhedi.*` key/value metadata.
//!
//! | Column           | Type    |
//! |------------------|---------|
//! | `sid`            | UTF8    |
//! | `read_id`        | UTF8    |
//! | `matched_sanket` | UTF8    |
//! | `serotype`       | UTF8    |
//! | `gc_percentage`  | DOUBLE  |
//! | `total_coverage` | INT32   |
//! | `s_len`          | INT32   |
//! | `ssr_count`      | UTF8    |
//! | `mlen_avg`       | UTF8    |
//! | `mrc_avg`        | UTF8    |
//! | `p_count`        | UTF8    |
//! | `plen_avg`       | UTF8    |
//! | `b_score`        | DOUBLE  |

pub mod parquet_file;
pub mod row;
pub mod sink;

pub use parquet_file::{output_schema, ParquetOptions, ParquetRowWriter};
pub use row::OutputRow;
pub use sink::{OutputSink, RowWriter, SinkError, SinkSummary, VecRowWriter};
