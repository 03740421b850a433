use serde::{Deserialize, Serialize};

use crate::core::types::NO_MATCH_LABEL;
use crate::pipeline::processor::MatchEvent;

/// Convert a count to the INT32 column type, saturating on overflow
#[inline]
fn to_i32(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// One row of the output table.
///
/// A read with matches yields one row per matched marker; a read without matches
/// yields exactly one row carrying the no-match sentinels and a score of 0. Field
/// names are the column names of the written dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    /// Marker ID, empty for no-match rows
    pub sid: String,
    pub read_id: String,
    /// Matched marker ID, or `No Match Found`
    pub matched_sanket: String,
    pub serotype: String,
    pub gc_percentage: f64,
    pub total_coverage: i32,
    pub s_len: i32,
    pub ssr_count: String,
    pub mlen_avg: String,
    pub mrc_avg: String,
    pub p_count: String,
    pub plen_avg: String,
    pub b_score: f64,
}

impl OutputRow {
    /// Row for one matched marker of a read
    #[must_use]
    pub fn matched(
        read_id: &str,
        gc_percentage: f64,
        total_coverage: usize,
        event: &MatchEvent<'_>,
    ) -> Self {
        let marker = event.marker;
        Self {
            sid: marker.id.0.clone(),
            read_id: read_id.to_string(),
            matched_sanket: marker.id.0.clone(),
            serotype: marker.serotype.clone(),
            gc_percentage,
            total_coverage: to_i32(total_coverage),
            s_len: to_i32(marker.length),
            ssr_count: marker.repeat_count.clone(),
            mlen_avg: marker.repeat_mean_length.clone(),
            mrc_avg: marker.repeat_mean_copies.clone(),
            p_count: marker.palindrome_count.clone(),
            plen_avg: marker.palindrome_mean_length.clone(),
            b_score: event.score,
        }
    }

    /// The single row written for a read without matches
    #[must_use]
    pub fn no_match(read_id: &str, gc_percentage: f64, serotype_label: &str) -> Self {
        Self {
            sid: String::new(),
            read_id: read_id.to_string(),
            matched_sanket: NO_MATCH_LABEL.to_string(),
            serotype: serotype_label.to_string(),
            gc_percentage,
            total_coverage: 0,
            s_len: 0,
            ssr_count: String::new(),
            mlen_avg: String::new(),
            mrc_avg: String::new(),
            p_count: String::new(),
            plen_avg: String::new(),
            b_score: 0.0,
        }
    }

    /// Whether this row records a read without matches
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        self.matched_sanket == NO_MATCH_LABEL
    }
}
