use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::marker::MarkerRecord;
use crate::core::types::RunStatistics;

/// Dengue virus genome length in bases
pub const DENGUE_GENOME_SIZE: f64 = 11_000.0;

/// Safely convert usize to f64 for normalization
#[inline]
fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum PolicyError {
    #[error("{0} must be a finite, non-negative number (got {1})")]
    InvalidWeight(&'static str, f64),

    #[error("{0} must be a finite, positive number (got {1})")]
    InvalidScale(&'static str, f64),
}

/// Base score awarded for the presence of repeats and palindromes in a marker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresenceWeights {
    /// Both repeat and palindrome counts are positive
    pub both: f64,
    /// Exactly one of the two counts is positive
    pub one: f64,
}

/// How the coverage normalization ceiling is derived
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CeilingPolicy {
    /// Expected coverage `(mean read length * read count) / genome_size`
    GenomeDerived { genome_size: f64 },
    /// A constant ceiling, independent of the run
    Fixed { ceiling: f64 },
}

impl CeilingPolicy {
    /// Coverage ceiling for a run
    #[must_use]
    pub fn ceiling(&self, stats: &RunStatistics) -> f64 {
        match *self {
            Self::GenomeDerived { genome_size } => stats.total_bases() / genome_size,
            Self::Fixed { ceiling } => ceiling,
        }
    }
}

/// Constants of the B-score.
///
/// Two presets exist because the streaming server and the batch CLI historically
/// scored with different constants; callers pick one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub presence: PresenceWeights,
    pub coverage_weight: f64,
    pub length_weight: f64,
    /// Marker length at which the length term saturates
    pub max_marker_length: f64,
    pub ceiling: CeilingPolicy,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::streaming()
    }
}

impl ScoringPolicy {
    /// Constants used by streaming/server runs
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            presence: PresenceWeights {
                both: 0.35,
                one: 0.2,
            },
            coverage_weight: 0.37,
            length_weight: 0.4,
            max_marker_length: 25.0,
            ceiling: CeilingPolicy::GenomeDerived {
                genome_size: DENGUE_GENOME_SIZE,
            },
        }
    }

    /// Constants used by the batch CLI of earlier releases
    #[must_use]
    pub fn legacy_batch() -> Self {
        Self {
            presence: PresenceWeights {
                both: 0.3,
                one: 0.15,
            },
            coverage_weight: 0.3,
            length_weight: 0.4,
            max_marker_length: 100.0,
            ceiling: CeilingPolicy::Fixed { ceiling: 1000.0 },
        }
    }

    /// Check that every constant is usable
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` naming the first offending constant.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let weights = [
            ("presence.both", self.presence.both),
            ("presence.one", self.presence.one),
            ("coverage_weight", self.coverage_weight),
            ("length_weight", self.length_weight),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return Err(PolicyError::InvalidWeight(name, value));
            }
        }

        let scale = match self.ceiling {
            CeilingPolicy::GenomeDerived { genome_size } => ("ceiling.genome_size", genome_size),
            CeilingPolicy::Fixed { ceiling } => ("ceiling.ceiling", ceiling),
        };
        for (name, value) in [("max_marker_length", self.max_marker_length), scale] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PolicyError::InvalidScale(name, value));
            }
        }

        Ok(())
    }

    /// Score one matched marker of a read.
    ///
    /// `total_coverage` is the read's serotype coverage, shared by all matches of
    /// that read. See [`b_score`].
    #[must_use]
    pub fn score(&self, total_coverage: usize, marker: &MarkerRecord, stats: &RunStatistics) -> f64 {
        b_score(
            self,
            total_coverage,
            marker.length,
            &marker.repeat_count,
            &marker.palindrome_count,
            stats,
        )
    }
}

/// Parse a catalog count field, treating anything unparseable as 0
#[must_use]
pub fn parse_count(field: &str) -> i64 {
    field.parse().unwrap_or(0)
}

/// Compute the B-score of a matched marker, in `[0, 1]`.
///
/// `base + norm_coverage * coverage_weight + norm_length * length_weight`, where the
/// base comes from repeat/palindrome presence, coverage is normalized against the
/// policy's ceiling and length against the maximum marker length. Terms are summed
/// in that fixed order so identical inputs give bit-identical scores.
///
/// A degenerate ceiling (zero, negative or not finite, e.g. an empty run) saturates
/// the coverage term for any positive coverage and zeroes it otherwise.
#[must_use]
pub fn b_score(
    policy: &ScoringPolicy,
    total_coverage: usize,
    length: usize,
    repeat_count: &str,
    palindrome_count: &str,
    stats: &RunStatistics,
) -> f64 {
    let has_repeats = parse_count(repeat_count) > 0;
    let has_palindromes = parse_count(palindrome_count) > 0;

    let base = match (has_repeats, has_palindromes) {
        (true, true) => policy.presence.both,
        (true, false) | (false, true) => policy.presence.one,
        (false, false) => 0.0,
    };

    let ceiling = policy.ceiling.ceiling(stats);
    let coverage = count_to_f64(total_coverage);
    let norm_coverage = if ceiling.is_finite() && ceiling > 0.0 {
        (coverage / ceiling).min(1.0)
    } else if total_coverage > 0 {
        1.0
    } else {
        0.0
    };

    let norm_length = if policy.max_marker_length > 0.0 {
        (count_to_f64(length) / policy.max_marker_length).min(1.0)
    } else {
        0.0
    };

    let score = base + norm_coverage * policy.coverage_weight + norm_length * policy.length_weight;

    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> RunStatistics {
        // ceiling = 150 * 1100 / 11000 = 15
        RunStatistics::new(1_100, 150.0)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_base_score_presence() {
        let policy = ScoringPolicy::streaming();
        let s = stats();
        let none = b_score(&policy, 0, 0, "0", "0", &s);
        let one = b_score(&policy, 0, 0, "3", "0", &s);
        let other = b_score(&policy, 0, 0, "0", "1", &s);
        let both = b_score(&policy, 0, 0, "3", "1", &s);

        assert!(approx(none, 0.0));
        assert!(approx(one, 0.2));
        assert!(approx(other, 0.2));
        assert!(approx(both, 0.35));
    }

    #[test]
    fn test_malformed_counts_are_zero() {
        let policy = ScoringPolicy::streaming();
        assert_eq!(parse_count("abc"), 0);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count(" 3"), 0);
        assert_eq!(parse_count("-2"), -2);
        assert!(approx(b_score(&policy, 0, 0, "x", "2.5", &stats()), 0.0));
    }

    #[test]
    fn test_streaming_weighted_sum() {
        let policy = ScoringPolicy::streaming();
        // coverage 3 / 15 = 0.2 -> 0.074; length 10 / 25 = 0.4 -> 0.16
        let score = b_score(&policy, 3, 10, "1", "0", &stats());
        assert!(approx(score, 0.2 + 0.2 * 0.37 + 0.4 * 0.4));
    }

    #[test]
    fn test_terms_saturate_and_clamp() {
        let policy = ScoringPolicy::streaming();
        // 0.35 + 0.37 + 0.4 > 1
        let score = b_score(&policy, 1_000, 1_000, "5", "5", &stats());
        assert!(approx(score, 1.0));
    }

    #[test]
    fn test_legacy_batch_constants() {
        let policy = ScoringPolicy::legacy_batch();
        // coverage 100 / 1000 = 0.1 -> 0.03; length 50 / 100 = 0.5 -> 0.2
        let score = b_score(&policy, 100, 50, "1", "1", &stats());
        assert!(approx(score, 0.3 + 0.1 * 0.3 + 0.5 * 0.4));
        let one = b_score(&policy, 0, 0, "1", "", &stats());
        assert!(approx(one, 0.15));
    }

    #[test]
    fn test_degenerate_ceiling() {
        let policy = ScoringPolicy::streaming();
        let empty = RunStatistics::new(0, 0.0);
        assert!(approx(b_score(&policy, 1, 0, "", "", &empty), 0.37));
        assert!(approx(b_score(&policy, 0, 0, "", "", &empty), 0.0));

        let nan = RunStatistics::new(10, f64::NAN);
        let score = b_score(&policy, 1, 5, "", "", &nan);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_score_always_bounded() {
        let policies = [ScoringPolicy::streaming(), ScoringPolicy::legacy_batch()];
        let run_stats = [
            stats(),
            RunStatistics::new(0, 0.0),
            RunStatistics::new(1, 1.0),
            RunStatistics::new(u64::MAX, f64::MAX),
        ];
        let counts = ["", "0", "-5", "7", "NaN", "99999999999999999999"];

        for policy in &policies {
            for s in &run_stats {
                for coverage in [0usize, 1, 4, usize::MAX] {
                    for length in [0usize, 1, 25, 10_000] {
                        for rc in counts {
                            for pc in counts {
                                let score = b_score(policy, coverage, length, rc, pc, s);
                                assert!((0.0..=1.0).contains(&score), "score {score} out of range");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let policy = ScoringPolicy::streaming();
        let s = RunStatistics::new(123_457, 148.37);
        let a = b_score(&policy, 3, 21, "2", "1", &s);
        let b = b_score(&policy, 3, 21, "2", "1", &s);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_policy_score_uses_marker_fields() {
        let policy = ScoringPolicy::streaming();
        let marker = MarkerRecord::new("m1", "DENV-1", "ACGTACGTAC")
            .with_repeats("2", "3", "4")
            .with_palindromes("0", "");
        let direct = b_score(&policy, 2, 10, "2", "0", &stats());
        assert_eq!(policy.score(2, &marker, &stats()).to_bits(), direct.to_bits());
    }

    #[test]
    fn test_validate() {
        assert!(ScoringPolicy::streaming().validate().is_ok());
        assert!(ScoringPolicy::legacy_batch().validate().is_ok());

        let mut policy = ScoringPolicy::streaming();
        policy.coverage_weight = -0.1;
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::InvalidWeight("coverage_weight", _))
        ));

        let mut policy = ScoringPolicy::streaming();
        policy.ceiling = CeilingPolicy::GenomeDerived { genome_size: 0.0 };
        assert!(matches!(policy.validate(), Err(PolicyError::InvalidScale(_, _))));
    }

    #[test]
    fn test_policy_json() {
        let json = serde_json::to_string(&ScoringPolicy::legacy_batch()).unwrap();
        assert!(json.contains("\"kind\":\"fixed\""));
        let parsed: ScoringPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ScoringPolicy::legacy_batch());
    }
}
