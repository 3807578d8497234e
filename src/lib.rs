//! Similarity-based entity matcher for obfuscated program images.
//!
//! Given two fully resolved [`Image`]s — a named reference image and an
//! unnamed (obfuscated) target — [`MatcherDriver`] recovers a best-effort
//! bijection between their classes, methods, and fields by iterating four
//! levels of increasingly permissive, increasingly context-rich similarity
//! scoring.

pub mod builder;
pub mod classify;
pub mod compare;
pub mod config;
pub mod context;
pub mod error;
pub mod level;
pub mod matcher;
pub mod model;
pub mod refs;
pub mod store;

pub use builder::ImageBuilder;
pub use config::MatcherConfig;
pub use context::Graphs;
pub use error::MatchEngineError;
pub use level::Level;
pub use matcher::{CancellationToken, MatcherDriver, NeverCancel, NoopProgressReporter, ProgressReporter};
pub use model::{AccessFlags, Class, ClassId, Field, FieldId, Image, Method, MethodId, OpcodeCategory};
pub use store::{MatchRecord, MatchStore};

/// Convenience entry point: builds a driver with default configuration and
/// runs it to completion. Most callers wanting control over progress
/// reporting, cancellation, or thresholds should use [`MatcherDriver`]
/// directly instead.
pub fn match_images(a: &Image, b: &Image) -> Result<MatchStore, MatchEngineError> {
    MatcherDriver::new(a, b, MatcherConfig::default()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AccessFlags;

    #[test]
    fn match_images_matches_a_class_to_itself() {
        let mut b = ImageBuilder::new();
        let c = b.add_class("Solo", AccessFlags::PUBLIC, true);
        let image = b.build().unwrap();
        let store = match_images(&image, &image).unwrap();
        assert_eq!(store.class_match(c), Some(c));
    }
}
