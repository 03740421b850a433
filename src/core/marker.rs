use serde::{Deserialize, Serialize};

use crate::core::types::MarkerId;

/// A reference marker fragment ("sanket") associated with one serotype.
///
/// The repeat and palindrome descriptors are kept as the text found in the catalog;
/// only the two count fields are ever interpreted numerically, and only by the scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// Unique identifier (`sid` column)
    pub id: MarkerId,

    /// Serotype this marker is evidence for
    pub serotype: String,

    /// Nucleotide fragment matched literally against reads
    pub sequence: String,

    /// Fragment length in bases, equal to `sequence.len()` at load time
    pub length: usize,

    /// Simple sequence repeat count (`ssr_count`)
    #[serde(default)]
    pub repeat_count: String,

    /// Mean repeat motif length (`mlen_avg`)
    #[serde(default)]
    pub repeat_mean_length: String,

    /// Mean repeat copy number (`mrc_avg`)
    #[serde(default)]
    pub repeat_mean_copies: String,

    /// Palindrome count (`p_count`)
    #[serde(default)]
    pub palindrome_count: String,

    /// Mean palindrome length (`plen_avg`)
    #[serde(default)]
    pub palindrome_mean_length: String,
}

impl MarkerRecord {
    /// Create a marker with empty repeat/palindrome descriptors
    pub fn new(
        id: impl Into<String>,
        serotype: impl Into<String>,
        sequence: impl Into<String>,
    ) -> Self {
        let sequence = sequence.into();
        Self {
            id: MarkerId::new(id),
            serotype: serotype.into(),
            length: sequence.len(),
            sequence,
            repeat_count: String::new(),
            repeat_mean_length: String::new(),
            repeat_mean_copies: String::new(),
            palindrome_count: String::new(),
            palindrome_mean_length: String::new(),
        }
    }

    /// Set the repeat descriptors
    #[must_use]
    pub fn with_repeats(
        mut self,
        count: impl Into<String>,
        mean_length: impl Into<String>,
        mean_copies: impl Into<String>,
    ) -> Self {
        self.repeat_count = count.into();
        self.repeat_mean_length = mean_length.into();
        self.repeat_mean_copies = mean_copies.into();
        self
    }

    /// Set the palindrome descriptors
    #[must_use]
    pub fn with_palindromes(
        mut self,
        count: impl Into<String>,
        mean_length: impl Into<String>,
    ) -> Self {
        self.palindrome_count = count.into();
        self.palindrome_mean_length = mean_length.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_length_follows_sequence() {
        let marker = MarkerRecord::new("m1", "DENV-1", "ACGTAC");
        assert_eq!(marker.length, 6);
        assert_eq!(marker.id.as_str(), "m1");
        assert!(marker.repeat_count.is_empty());
    }

    #[test]
    fn test_marker_builders() {
        let marker = MarkerRecord::new("m1", "DENV-2", "ACGT")
            .with_repeats("2", "3.5", "4")
            .with_palindromes("1", "6");
        assert_eq!(marker.repeat_count, "2");
        assert_eq!(marker.repeat_mean_copies, "4");
        assert_eq!(marker.palindrome_mean_length, "6");
    }
}
