//! Marker matching and the B-score.
//!
//! - [`MatchingEngine`]: exact substring search of every catalog marker in a read
//! - [`MatchSet`]: the markers found in one read and its per-serotype tally
//! - [`ScoringPolicy`]: the constants of the B-score, selected explicitly per run
//!
//! ## Matching
//!
//! A marker matches a read when its fragment is a literal, case-sensitive substring
//! of the read. No mismatches are tolerated and the reverse complement is not
//! searched. One read may match several markers, including several of the same
//! serotype.
//!
//! ## Coverage
//!
//! The coverage of a read is the number of distinct serotypes among its matches.
//! Two markers of the same serotype contribute one.
//!
//! ## Scoring
//!
//! | Term     | Value                                                     |
//! |----------|-----------------------------------------------------------|
//! | base     | `presence.both`, `presence.one` or 0 by repeat/palindrome |
//! | coverage | `min(coverage / ceiling, 1) * coverage_weight`            |
//! | length   | `min(length / max_marker_length, 1) * length_weight`      |
//!
//! The sum is clamped to `[0, 1]`.
//!
//! ## Example
//!
//! ```rust
//! use bhedi::{MarkerCatalog, MarkerRecord, MatchingEngine, RunStatistics, ScoringPolicy};
//!
//! let catalog = MarkerCatalog::from_markers([MarkerRecord::new("m1", "DENV-1", "ACGT")]);
//! let engine = MatchingEngine::new(&catalog);
//! let matches = engine.find_matches("TTACGTTT");
//!
//! let policy = ScoringPolicy::streaming();
//! let stats = RunStatistics::new(1_000, 150.0);
//! for marker in &matches.markers {
//!     let score = policy.score(matches.total_coverage(), marker, &stats);
//!     assert!((0.0..=1.0).contains(&score));
//! }
//! ```

pub mod engine;
pub mod scoring;

pub use engine::{find_matches, MatchSet, MatchingEngine};
pub use scoring::{b_score, CeilingPolicy, PolicyError, PresenceWeights, ScoringPolicy};
