use crate::catalog::store::MarkerCatalog;
use crate::core::marker::MarkerRecord;
use crate::core::read::{gc_percentage, SequenceRecord};
use crate::core::types::RunStatistics;
use crate::matching::engine::MatchingEngine;
use crate::matching::scoring::ScoringPolicy;
use crate::output::row::OutputRow;

/// One matched marker of a read and its score
#[derive(Debug, Clone, Copy)]
pub struct MatchEvent<'a> {
    pub marker: &'a MarkerRecord,

    /// B-score in `[0, 1]`
    pub score: f64,
}

/// Everything computed for one read
#[derive(Debug, Clone)]
pub struct RecordOutcome<'a> {
    pub read_id: String,

    /// Percentage of `G`/`C` bases, 0 for an empty read
    pub gc_percentage: f64,

    /// Distinct serotypes among the matches, shared by every match of the read
    pub total_coverage: usize,

    /// Matches in catalog order
    pub matches: Vec<MatchEvent<'a>>,

    /// `true` iff `matches` is non-empty
    pub matches_found: bool,
}

impl RecordOutcome<'_> {
    /// Output rows of this read: one per match, or a single no-match row
    #[must_use]
    pub fn to_rows(&self, no_match_serotype: &str) -> Vec<OutputRow> {
        if !self.matches_found {
            return vec![OutputRow::no_match(
                &self.read_id,
                self.gc_percentage,
                no_match_serotype,
            )];
        }

        self.matches
            .iter()
            .map(|event| {
                OutputRow::matched(&self.read_id, self.gc_percentage, self.total_coverage, event)
            })
            .collect()
    }
}

/// Matches and scores reads against one catalog under one policy.
///
/// Holds no mutable state; a single processor is shared by every worker of a run.
pub struct RecordProcessor<'a> {
    engine: MatchingEngine<'a>,
    policy: ScoringPolicy,
    stats: RunStatistics,
}

impl<'a> RecordProcessor<'a> {
    pub fn new(catalog: &'a MarkerCatalog, policy: ScoringPolicy, stats: RunStatistics) -> Self {
        Self {
            engine: MatchingEngine::new(catalog),
            policy,
            stats,
        }
    }

    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Process one read. Never fails: malformed marker fields score as zero.
    pub fn process(&self, record: &SequenceRecord) -> RecordOutcome<'a> {
        let found = self.engine.find_matches(&record.sequence);
        let total_coverage = found.total_coverage();

        let matches: Vec<MatchEvent<'a>> = found
            .markers
            .iter()
            .map(|&marker| MatchEvent {
                marker,
                score: self.policy.score(total_coverage, marker, &self.stats),
            })
            .collect();

        RecordOutcome {
            read_id: record.id.clone(),
            gc_percentage: gc_percentage(&record.sequence),
            total_coverage,
            matches_found: !matches.is_empty(),
            matches,
        }
    }
}

/// Process one read without a prebuilt processor
pub fn process_record<'a>(
    record: &SequenceRecord,
    catalog: &'a MarkerCatalog,
    policy: &ScoringPolicy,
    stats: &RunStatistics,
) -> RecordOutcome<'a> {
    RecordProcessor::new(catalog, *policy, *stats).process(record)
}
