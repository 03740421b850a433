//! FASTA/FASTQ stream sources using noodles.
//!
//! Supports both uncompressed and gzip/bgzip compressed input. Compression and
//! record format are detected from the leading bytes of the stream, so uploads
//! without a meaningful filename are handled the same as files on disk.
//!
//! Recognized extensions when scanning directories:
//! - `.fastq`, `.fq`, `.fasta`, `.fa`, `.fna`
//! - any of the above followed by `.gz` or `.bgz`

use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles::{fasta, fastq};
use thiserror::Error;

use crate::core::read::SequenceRecord;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unrecognized sequence format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed {format} record after {records} records: {message}")]
    Malformed {
        format: SequenceFormat,
        records: u64,
        message: String,
    },
}

/// Pull interface over a stream of reads.
///
/// `Ok(None)` signals end-of-stream; any `Err` is fatal to the run.
pub trait SequenceSource {
    fn next_record(&mut self) -> Result<Option<SequenceRecord>, StreamError>;
}

impl<I> SequenceSource for I
where
    I: Iterator<Item = Result<SequenceRecord, StreamError>>,
{
    fn next_record(&mut self) -> Result<Option<SequenceRecord>, StreamError> {
        self.next().transpose()
    }
}

/// Record format of a sequence stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    Fastq,
    Fasta,
}

impl std::fmt::Display for SequenceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fastq => write!(f, "FASTQ"),
            Self::Fasta => write!(f, "FASTA"),
        }
    }
}

/// Check if the path has a FASTA/FASTQ extension, optionally gzipped
pub fn is_sequence_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(OsStr::to_str)
        .map(str::to_lowercase)
        .unwrap_or_default();

    let stem = name
        .strip_suffix(".gz")
        .or_else(|| name.strip_suffix(".bgz"))
        .unwrap_or(&name);

    matches!(
        Path::new(stem).extension().and_then(OsStr::to_str),
        Some("fastq" | "fq" | "fasta" | "fa" | "fna")
    )
}

type BoxedRead = Box<dyn BufRead + Send>;

enum Inner {
    Fastq(fastq::io::Reader<BoxedRead>),
    Fasta(fasta::io::Reader<BoxedRead>),
}

/// A FASTA or FASTQ reader yielding [`SequenceRecord`]s
pub struct FastxReader {
    inner: Inner,
    records: u64,
    fastq_buf: fastq::Record,
    definition_buf: String,
    sequence_buf: Vec<u8>,
}

impl FastxReader {
    /// Open a sequence file, detecting compression and format from its content
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Io` if the file cannot be opened or read, or
    /// `StreamError::UnsupportedFormat` if it is neither FASTA nor FASTQ.
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Wrap an arbitrary byte stream, detecting compression and format
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Io` on read failure or
    /// `StreamError::UnsupportedFormat` if the content is neither FASTA nor FASTQ.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Result<Self, StreamError> {
        let mut buffered = BufReader::new(reader);
        let reader: BoxedRead = if buffered.fill_buf()?.starts_with(&GZIP_MAGIC) {
            Box::new(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            Box::new(buffered)
        };
        Self::detect(reader)
    }

    fn detect(mut reader: BoxedRead) -> Result<Self, StreamError> {
        let format = loop {
            match reader.fill_buf()?.first().copied() {
                // Empty input is a valid stream with no records
                None | Some(b'@') => break SequenceFormat::Fastq,
                Some(b'>') => break SequenceFormat::Fasta,
                Some(c) if c.is_ascii_whitespace() => reader.consume(1),
                Some(c) => {
                    return Err(StreamError::UnsupportedFormat(format!(
                        "unexpected leading byte 0x{c:02x}"
                    )))
                }
            }
        };
        Ok(Self::with_format(reader, format))
    }

    fn with_format(reader: BoxedRead, format: SequenceFormat) -> Self {
        let inner = match format {
            SequenceFormat::Fastq => Inner::Fastq(fastq::io::Reader::new(reader)),
            SequenceFormat::Fasta => Inner::Fasta(fasta::io::Reader::new(reader)),
        };
        Self {
            inner,
            records: 0,
            fastq_buf: fastq::Record::default(),
            definition_buf: String::new(),
            sequence_buf: Vec::new(),
        }
    }

    /// Format of the underlying stream
    pub fn format(&self) -> SequenceFormat {
        match self.inner {
            Inner::Fastq(_) => SequenceFormat::Fastq,
            Inner::Fasta(_) => SequenceFormat::Fasta,
        }
    }

    /// Number of records read so far
    pub fn records_read(&self) -> u64 {
        self.records
    }

    fn malformed(&self, e: &std::io::Error) -> StreamError {
        StreamError::Malformed {
            format: self.format(),
            records: self.records,
            message: e.to_string(),
        }
    }

    fn read_fastq(&mut self) -> Result<Option<SequenceRecord>, StreamError> {
        let Inner::Fastq(reader) = &mut self.inner else {
            return Ok(None);
        };
        match reader.read_record(&mut self.fastq_buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(SequenceRecord::from_bytes(
                self.fastq_buf.name(),
                self.fastq_buf.sequence(),
            ))),
            Err(e) => Err(self.malformed(&e)),
        }
    }

    fn read_fasta(&mut self) -> Result<Option<SequenceRecord>, StreamError> {
        let Inner::Fasta(reader) = &mut self.inner else {
            return Ok(None);
        };

        self.definition_buf.clear();
        self.sequence_buf.clear();
        let mut read = reader.read_definition(&mut self.definition_buf);
        if let Ok(n) = read {
            if n > 0 {
                read = reader.read_sequence(&mut self.sequence_buf).map(|_| n);
            }
        }

        match read {
            Ok(0) => Ok(None),
            Ok(_) => {
                let name = self
                    .definition_buf
                    .trim_start_matches('>')
                    .split_whitespace()
                    .next()
                    .unwrap_or_default();
                Ok(Some(SequenceRecord::from_bytes(
                    name.as_bytes(),
                    &self.sequence_buf,
                )))
            }
            Err(e) => Err(self.malformed(&e)),
        }
    }
}

impl Iterator for FastxReader {
    type Item = Result<SequenceRecord, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.inner {
            Inner::Fastq(_) => self.read_fastq(),
            Inner::Fasta(_) => self.read_fasta(),
        };
        if let Ok(Some(_)) = result {
            self.records += 1;
        }
        result.transpose()
    }
}
