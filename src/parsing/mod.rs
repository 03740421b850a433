//! Parsers for the inputs of a screening run.
//!
//! This module provides:
//!
//! - **Marker catalog CSV** ([`catalog_csv`]): the `sanket.csv` marker table
//! - **FASTA/FASTQ streams** ([`fastx`]): plain or gzip-compressed reads
//! - **Run statistics** ([`stats`]): record count and mean read length, computed
//!   natively or taken from `seqkit stats`
//!
//! ## Example
//!
//! ```rust,no_run
//! use bhedi::parsing::fastx::{FastxReader, SequenceSource};
//! use std::path::Path;
//!
//! let mut reader = FastxReader::open(Path::new("sample.fastq.gz")).unwrap();
//! while let Some(record) = reader.next_record().unwrap() {
//!     println!("{}\t{}", record.id, record.len());
//! }
//! ```

pub mod catalog_csv;
pub mod fastx;
pub mod stats;
