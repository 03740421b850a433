//! Validation of uploaded sequence files.

/// Security-related constants for input validation
pub const MAX_FILENAME_LENGTH: usize = 255;

/// gzip member magic
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Security validation error types
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Filename too long: exceeds {MAX_FILENAME_LENGTH} characters")]
    FilenameTooLong,
    #[error("Invalid filename: contains path traversal or invalid characters")]
    InvalidFilename,
    #[error("Empty filename provided")]
    EmptyFilename,
    #[error("File is empty")]
    EmptyFile,
    #[error("File is neither FASTQ, FASTA nor gzip-compressed")]
    FormatValidationFailed,
}

/// Secure filename validation to prevent directory traversal and other attacks
///
/// Validates and sanitizes filenames by:
/// - Checking length limits
/// - Preventing directory traversal (../, ..\\)
/// - Removing potentially dangerous characters
/// - Ensuring filename is not empty after sanitization
///
/// # Errors
///
/// Returns `ValidationError::EmptyFilename` if the filename is empty,
/// `ValidationError::FilenameTooLong` if it exceeds the limit, or
/// `ValidationError::InvalidFilename` if it contains invalid characters.
pub fn validate_filename(filename: &str) -> Result<String, ValidationError> {
    if filename.trim().is_empty() {
        return Err(ValidationError::EmptyFilename);
    }

    if filename.len() > MAX_FILENAME_LENGTH {
        return Err(ValidationError::FilenameTooLong);
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(ValidationError::InvalidFilename);
    }

    if filename.contains('\0') || filename.chars().any(|c| ('\x01'..='\x1F').contains(&c)) {
        return Err(ValidationError::InvalidFilename);
    }

    let sanitized = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-' || *c == '_' || *c == ' ')
        .collect::<String>();

    if sanitized.trim().is_empty() {
        return Err(ValidationError::InvalidFilename);
    }

    // Hidden files only with a sequence extension
    if sanitized.starts_with('.') && !has_known_extension(&sanitized) {
        return Err(ValidationError::InvalidFilename);
    }

    Ok(sanitized)
}

/// Check if filename has a sequence file extension
#[must_use]
pub fn has_known_extension(filename: &str) -> bool {
    let safe_extensions = [
        ".fastq", ".fq", ".fasta", ".fa", ".fna", ".fastq.gz", ".fq.gz", ".fasta.gz", ".fa.gz",
        ".fna.gz", ".gz",
    ];

    let lower = filename.to_lowercase();
    safe_extensions.iter().any(|ext| lower.ends_with(ext))
}

/// Incremental check of an upload's leading bytes, fed chunk by chunk.
///
/// Accepts a gzip stream or text whose first non-whitespace byte starts a
/// FASTQ (`@`) or FASTA (`>`) record, however the upload is split into chunks.
#[derive(Debug, Default)]
pub struct PrefixSniffer {
    /// Up to the first two bytes of the stream
    head: Vec<u8>,
    accepted: bool,
}

impl PrefixSniffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look at the next chunk. Returns `Ok(true)` once the stream is accepted and
    /// `Ok(false)` while only whitespace or part of the gzip magic has been seen.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::FormatValidationFailed` as soon as the stream
    /// starts with anything else.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<bool, ValidationError> {
        if self.accepted {
            return Ok(true);
        }

        let missing = GZIP_MAGIC.len().saturating_sub(self.head.len());
        self.head
            .extend_from_slice(&chunk[..missing.min(chunk.len())]);
        if self.head.starts_with(&GZIP_MAGIC) {
            self.accepted = true;
            return Ok(true);
        }
        if GZIP_MAGIC.starts_with(&self.head) {
            return Ok(false);
        }

        // everything before this chunk past `head` was whitespace
        match self.head.iter().chain(chunk).find(|b| !b.is_ascii_whitespace()) {
            None => Ok(false),
            Some(b'@' | b'>') => {
                self.accepted = true;
                Ok(true)
            }
            Some(_) => Err(ValidationError::FormatValidationFailed),
        }
    }

    /// Verdict once the stream has ended.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyFile` if nothing but whitespace was seen and
    /// `ValidationError::FormatValidationFailed` for a lone gzip magic byte.
    pub fn finish(&self) -> Result<(), ValidationError> {
        if self.accepted {
            Ok(())
        } else if self.head == GZIP_MAGIC[..1] {
            Err(ValidationError::FormatValidationFailed)
        } else {
            Err(ValidationError::EmptyFile)
        }
    }
}

/// Check the leading bytes of an upload for a FASTQ/FASTA record or a gzip stream
///
/// # Errors
///
/// Returns `ValidationError::EmptyFile` for an empty prefix and
/// `ValidationError::FormatValidationFailed` for anything else unrecognized.
pub fn validate_sequence_prefix(prefix: &[u8]) -> Result<(), ValidationError> {
    let mut sniffer = PrefixSniffer::new();
    sniffer.feed(prefix)?;
    sniffer.finish()
}
