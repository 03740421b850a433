//! Security tests for upload handling.
//!
//! Covers filename sanitization, content sniffing of uploads and the temp files
//! uploads are spooled to.

use bhedi::utils::validation::{
    validate_filename, validate_sequence_prefix, ValidationError, MAX_FILENAME_LENGTH,
};

/// Test secure temporary file creation
#[tokio::test]
async fn test_temp_file_security() {
    use tempfile::NamedTempFile;

    let mut temp_files = Vec::new();
    for _ in 0..10 {
        let temp_file =
            NamedTempFile::with_prefix("bhedi-upload-").expect("Failed to create temp file");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(temp_file.path())
                .expect("Failed to get metadata")
                .permissions()
                .mode();
            assert_eq!(
                mode & 0o777,
                0o600,
                "Temp file should have owner-only permissions"
            );
        }

        temp_files.push(temp_file);
    }

    let unique_paths: std::collections::HashSet<_> =
        temp_files.iter().map(|f| f.path().to_path_buf()).collect();
    assert_eq!(
        temp_files.len(),
        unique_paths.len(),
        "All temp file names should be unique"
    );
}

/// Test filename validation and sanitization
#[test]
fn test_filename_validation_security() {
    let traversal = [
        "../../../etc/passwd",
        "..\\..\\windows\\system32",
        "reads/../../secret.fq",
        "/absolute/path.fastq",
    ];
    for name in traversal {
        assert_eq!(
            validate_filename(name),
            Err(ValidationError::InvalidFilename),
            "{name} should be rejected"
        );
    }

    assert_eq!(
        validate_filename("reads\x07.fastq"),
        Err(ValidationError::InvalidFilename)
    );
    assert_eq!(validate_filename(""), Err(ValidationError::EmptyFilename));
    assert_eq!(
        validate_filename(&"r".repeat(MAX_FILENAME_LENGTH + 1)),
        Err(ValidationError::FilenameTooLong)
    );

    // Shell metacharacters are stripped
    assert_eq!(
        validate_filename("reads;rm -rf.fastq").unwrap(),
        "readsrm -rf.fastq"
    );
    assert_eq!(validate_filename("<script>.fq").unwrap(), "script.fq");
}

/// Uploads are sniffed before any parsing
#[test]
fn test_upload_content_sniffing() {
    assert!(validate_sequence_prefix(b"@read1\nACGT\n+\nIIII\n").is_ok());
    assert!(validate_sequence_prefix(b">contig\nACGT\n").is_ok());
    assert!(validate_sequence_prefix(&[0x1f, 0x8b, 0x08]).is_ok());

    for payload in [
        &b"\x7fELF\x02\x01"[..],
        b"PK\x03\x04",
        b"<html><body>",
        b"BAM\x01",
    ] {
        assert_eq!(
            validate_sequence_prefix(payload),
            Err(ValidationError::FormatValidationFailed)
        );
    }
}
