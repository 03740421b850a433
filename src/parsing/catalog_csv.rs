use std::io::Read;
use std::path::Path;

use tracing::warn;

use crate::catalog::store::{CatalogError, MarkerCatalog};
use crate::core::marker::MarkerRecord;

/// Number of columns in a marker CSV row
pub const CATALOG_COLUMNS: usize = 9;

/// Parse a marker catalog CSV file.
///
/// # Errors
///
/// Returns `CatalogError::ReadError` if the file cannot be opened, or any error
/// from [`parse_catalog_reader`].
pub fn parse_catalog_file(path: &Path) -> Result<MarkerCatalog, CatalogError> {
    let file = std::fs::File::open(path)?;
    parse_catalog_reader(file)
}

/// Parse marker CSV text with columns
/// `sid, sanket, s_len, serotype, ssr_count, mlen_avg, mrc_avg, p_count, plen_avg`.
///
/// The first row is a header and is skipped regardless of its content.
///
/// # Errors
///
/// Returns `CatalogError::CsvError` for malformed CSV, or
/// `CatalogError::InvalidFormat` if a row is short, a marker sequence is empty,
/// or no markers are found.
pub fn parse_catalog_reader<R: Read>(reader: R) -> Result<MarkerCatalog, CatalogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut catalog = MarkerCatalog::new();

    for (i, result) in csv_reader.records().enumerate() {
        let record = result?;
        // 1-based, counting the header line
        let line_num = i + 2;

        if record.len() < CATALOG_COLUMNS {
            return Err(CatalogError::InvalidFormat(format!(
                "Line {line_num} has {} fields, expected {CATALOG_COLUMNS}",
                record.len()
            )));
        }

        let sid = &record[0];
        let sequence = &record[1];
        if sequence.is_empty() {
            return Err(CatalogError::InvalidFormat(format!(
                "Marker '{sid}' on line {line_num} has an empty sequence"
            )));
        }

        match record[2].trim().parse::<usize>() {
            Ok(declared) if declared == sequence.len() => {}
            Ok(declared) => warn!(
                "Marker '{sid}' declares length {declared} but its sequence has {} bases",
                sequence.len()
            ),
            Err(_) => warn!(
                "Marker '{sid}' has an invalid length '{}', using sequence length",
                &record[2]
            ),
        }

        let marker = MarkerRecord::new(sid, &record[3], sequence)
            .with_repeats(&record[4], &record[5], &record[6])
            .with_palindromes(&record[7], &record[8]);

        catalog.add_marker(marker);
    }

    if catalog.is_empty() {
        return Err(CatalogError::InvalidFormat(
            "No markers found in catalog".to_string(),
        ));
    }

    Ok(catalog)
}
