use std::collections::BTreeMap;

use memchr::memmem::Finder;

use crate::catalog::store::MarkerCatalog;
use crate::core::marker::MarkerRecord;

/// Markers found in one read, with the per-serotype tally
#[derive(Debug, Clone, Default)]
pub struct MatchSet<'a> {
    /// Matched markers in catalog order
    pub markers: Vec<&'a MarkerRecord>,

    /// Serotype -> number of matched markers of that serotype
    pub coverage: BTreeMap<&'a str, usize>,
}

impl MatchSet<'_> {
    /// Number of distinct serotypes evidenced by the matches.
    ///
    /// Several markers of one serotype in the same read count once.
    #[must_use]
    pub fn total_coverage(&self) -> usize {
        self.coverage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }
}

/// Exact substring matcher over a marker catalog.
///
/// Substring searchers are compiled once per marker when the engine is built; the
/// engine is then shared read-only by every worker of a run.
pub struct MatchingEngine<'a> {
    catalog: &'a MarkerCatalog,
    finders: Vec<Finder<'a>>,
}

impl<'a> MatchingEngine<'a> {
    /// Create a matching engine over a catalog
    pub fn new(catalog: &'a MarkerCatalog) -> Self {
        let finders = catalog
            .iter()
            .map(|marker| Finder::new(marker.sequence.as_bytes()))
            .collect();
        Self { catalog, finders }
    }

    pub fn catalog(&self) -> &'a MarkerCatalog {
        self.catalog
    }

    /// Find every marker whose fragment occurs literally in `sequence`.
    ///
    /// Matching is case-sensitive and forward-strand only. A marker with an empty
    /// fragment never matches.
    pub fn find_matches(&self, sequence: &str) -> MatchSet<'a> {
        let haystack = sequence.as_bytes();
        let mut matches = MatchSet::default();

        for (marker, finder) in self.catalog.iter().zip(&self.finders) {
            if marker.sequence.is_empty() || finder.find(haystack).is_none() {
                continue;
            }
            matches.markers.push(marker);
            *matches.coverage.entry(marker.serotype.as_str()).or_default() += 1;
        }

        matches
    }
}

/// Find matches without a prebuilt engine
pub fn find_matches<'a>(sequence: &str, catalog: &'a MarkerCatalog) -> MatchSet<'a> {
    MatchingEngine::new(catalog).find_matches(sequence)
}
