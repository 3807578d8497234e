//! Error types for the matching engine
//!
//! A `thiserror`-derived enum for library-internal failure modes, surfaced
//! through `Result<_, MatchEngineError>` from every public driver entry
//! point. Callers embedding this crate (a demo binary, a future remapper)
//! are expected to add `anyhow::Context` at their own boundary.

use crate::level::Level;
use thiserror::Error;

/// Errors produced by the matching engine.
///
/// An ambiguous-match condition is deliberately absent here: it is not an
/// error, it is data recorded in the match store (see
/// [`crate::store::MatchStore::is_class_ambiguous`] and friends).
#[derive(Debug, Error)]
pub enum MatchEngineError {
    /// An assembler-delivered image violated one of its structural
    /// invariants (bidirectional edges, acyclic hierarchy, member-key
    /// uniqueness).
    #[error("image inconsistent: {reason} (entity: {entity})")]
    ImageInconsistent { reason: String, entity: String },

    /// A feature function returned a value outside [0,1]. Always a
    /// programmer error in a registered feature, never recoverable.
    #[error("feature '{feature}' scored {value} for ({a}, {b}) at level {level}, outside [0,1]")]
    FeatureOutOfRange {
        feature: &'static str,
        value: f64,
        a: String,
        b: String,
        level: Level,
    },

    /// Cooperative cancellation was observed between passes or levels.
    #[error("matching cancelled during level {level}")]
    Cancelled { level: Level },

    /// A commit would have violated the match store's bijectivity invariant.
    /// Indicates a driver bug (double proposal on the same entity), not bad
    /// input.
    #[error("bijectivity violated committing {kind} match ({a} <-> {b}): one side already matched")]
    AlreadyMatched {
        kind: &'static str,
        a: String,
        b: String,
    },
}
