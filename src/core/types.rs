use serde::{Deserialize, Serialize};

/// Label written to the matched-marker column of a read with no marker hits
pub const NO_MATCH_LABEL: &str = "No Match Found";

/// Serotype written for a read with no marker hits (streaming/server runs)
pub const UNASSIGNED_SEROTYPE: &str = "Unassigned";

/// Serotype the batch CLI of earlier releases wrote for reads with no marker hits
pub const LEGACY_UNASSIGNED_SEROTYPE: &str = "N/A";

/// Unique identifier for a marker in the catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub String);

impl MarkerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate figures for one input stream, computed once before a run starts.
///
/// Every scoring call within the run sees the same values, which is what makes
/// scores reproducible for a given input file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Number of records in the stream
    pub total_record_count: u64,

    /// Mean read length in bases
    pub average_read_length: f64,
}

impl RunStatistics {
    #[must_use]
    pub fn new(total_record_count: u64, average_read_length: f64) -> Self {
        Self {
            total_record_count,
            average_read_length,
        }
    }

    /// Total bases sequenced in the run (`count * mean length`)
    #[must_use]
    pub fn total_bases(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let count = self.total_record_count as f64;
        self.average_read_length * count
    }
}
