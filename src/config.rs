//! Matcher configuration
//!
//! Hand-written `Default`: the per-field defaults are not uniform, so a
//! derived `Default` would either need every field to share one value or
//! extra `#[derive]` helper attributes that just move this same logic
//! elsewhere.

use serde::{Deserialize, Serialize};

use crate::level::Level;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Minimum score to commit a proposal at each level, indexed by
    /// [`Level::index`]. Thresholds relax as levels progress so entities
    /// with thinner evidence still get a chance once their neighbors are
    /// pinned down.
    pub accept_threshold: [f64; 4],

    /// Minimum gap over the runner-up's score, indexed by [`Level::index`],
    /// required both for a candidate's own top-two scores and between rival
    /// proposers of the same target. A contest failing this margin is
    /// simply deferred at INITIAL/SECONDARY/EXTRA; at FINAL it is instead
    /// recorded ambiguous, since there is no later level left to resolve it.
    pub relative_threshold: [f64; 4],

    /// Whether a committed class pair should eagerly propagate a match onto
    /// its parents (unconditionally — a class has at most one) and onto a
    /// single-implementation interface pair's sole implementers.
    pub propagate_hierarchy: bool,

    /// Upper bound on inner (no-change) iterations within one level, guarding
    /// against a cycle in proposal resolution that never settles.
    pub max_inner_iterations: usize,

    /// Subset of levels to run, in order. Defaults to all four; a caller
    /// driving a quick pass (or resuming after INITIAL) can pass a shorter
    /// slice.
    pub levels: Vec<Level>,

    /// Ranking parallelism within one `match_classes`/`match_methods`/
    /// `match_fields` pass. `1` ranks candidates on the calling thread; a
    /// larger value builds a scoped rayon thread pool of that size. Commits
    /// are always serial regardless of this setting.
    pub parallelism: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            accept_threshold: [0.80, 0.70, 0.60, 0.50],
            relative_threshold: [0.08, 0.05, 0.03, 0.01],
            propagate_hierarchy: true,
            max_inner_iterations: 64,
            levels: Level::ALL.to_vec(),
            parallelism: 1,
        }
    }
}

impl MatcherConfig {
    pub fn threshold_for(&self, level: Level) -> f64 {
        self.accept_threshold[level.index()]
    }

    pub fn margin_for(&self, level: Level) -> f64 {
        self.relative_threshold[level.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_relax_monotonically_across_levels() {
        let cfg = MatcherConfig::default();
        for w in cfg.accept_threshold.windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn threshold_for_indexes_by_level() {
        let cfg = MatcherConfig::default();
        assert_eq!(cfg.threshold_for(Level::Initial), cfg.accept_threshold[0]);
        assert_eq!(cfg.threshold_for(Level::Final), cfg.accept_threshold[3]);
    }

    #[test]
    fn relative_thresholds_relax_monotonically_across_levels() {
        let cfg = MatcherConfig::default();
        for w in cfg.relative_threshold.windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn margin_for_indexes_by_level() {
        let cfg = MatcherConfig::default();
        assert_eq!(cfg.margin_for(Level::Initial), cfg.relative_threshold[0]);
        assert_eq!(cfg.margin_for(Level::Final), cfg.relative_threshold[3]);
    }

    #[test]
    fn default_runs_all_levels_single_threaded() {
        let cfg = MatcherConfig::default();
        assert_eq!(cfg.levels, Level::ALL.to_vec());
        assert_eq!(cfg.parallelism, 1);
    }
}
