//! Matching levels
//!
//! Levels form the outer loop of the matcher driver: each level relaxes the
//! commit thresholds and widens the set of active classifier features.

use serde::{Deserialize, Serialize};

/// A phase of matching with progressively relaxed thresholds and richer
/// features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Initial,
    Secondary,
    Extra,
    Final,
}

impl Level {
    /// All levels in escalation order.
    pub const ALL: [Level; 4] = [Level::Initial, Level::Secondary, Level::Extra, Level::Final];

    /// Index into the per-level threshold arrays in [`crate::config::MatcherConfig`].
    pub fn index(self) -> usize {
        match self {
            Level::Initial => 0,
            Level::Secondary => 1,
            Level::Extra => 2,
            Level::Final => 3,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Level::Initial => "INITIAL",
            Level::Secondary => "SECONDARY",
            Level::Extra => "EXTRA",
            Level::Final => "FINAL",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_escalate_in_order() {
        assert!(Level::Initial < Level::Secondary);
        assert!(Level::Secondary < Level::Extra);
        assert!(Level::Extra < Level::Final);
    }

    #[test]
    fn index_is_stable() {
        for (i, level) in Level::ALL.iter().enumerate() {
            assert_eq!(level.index(), i);
        }
    }
}
