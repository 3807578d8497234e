//! The match store
//!
//! Holds the bijections discovered so far for each entity kind, plus the
//! ambiguity markers the FINAL level is allowed to record. One generic
//! [`BiMap`] implements the bookkeeping once; [`MatchStore`] instantiates it
//! three times and exposes kind-specific names so callers never have to
//! think in terms of the generic.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::MatchEngineError;
use crate::level::Level;
use crate::model::{ClassId, FieldId, MethodId};

/// One committed match between an entity in image A and one in image B.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchRecord<K> {
    pub a: K,
    pub b: K,
    pub score: f64,
    pub level: Level,
}

#[derive(Debug, Default)]
pub(crate) struct BiMap<K: Copy + Eq + Hash + Ord + std::fmt::Debug> {
    forward: HashMap<K, K>,
    backward: HashMap<K, K>,
    records: HashMap<K, MatchRecord<K>>,
    ambiguous_a: HashSet<K>,
    ambiguous_b: HashSet<K>,
}

impl<K: Copy + Eq + Hash + Ord + std::fmt::Debug> BiMap<K> {
    fn new() -> Self {
        BiMap {
            forward: HashMap::new(),
            backward: HashMap::new(),
            records: HashMap::new(),
            ambiguous_a: HashSet::new(),
            ambiguous_b: HashSet::new(),
        }
    }

    fn is_a_matched(&self, a: K) -> bool {
        self.forward.contains_key(&a)
    }

    fn is_b_matched(&self, b: K) -> bool {
        self.backward.contains_key(&b)
    }

    fn get_by_a(&self, a: K) -> Option<K> {
        self.forward.get(&a).copied()
    }

    fn get_by_b(&self, b: K) -> Option<K> {
        self.backward.get(&b).copied()
    }

    fn record_by_a(&self, a: K) -> Option<&MatchRecord<K>> {
        self.records.get(&a)
    }

    /// Commits `a <-> b`. Re-committing the same pair (e.g. to raise its
    /// score at a later level) is idempotent; committing either side against
    /// a *different* partner violates bijectivity and is fatal.
    fn commit(&mut self, a: K, b: K, score: f64, level: Level, kind: &'static str) -> Result<(), MatchEngineError> {
        if let Some(existing_b) = self.forward.get(&a) {
            if *existing_b != b {
                return Err(MatchEngineError::AlreadyMatched {
                    kind,
                    a: format!("{:?}", a),
                    b: format!("{:?}", b),
                });
            }
        }
        if let Some(existing_a) = self.backward.get(&b) {
            if *existing_a != a {
                return Err(MatchEngineError::AlreadyMatched {
                    kind,
                    a: format!("{:?}", a),
                    b: format!("{:?}", b),
                });
            }
        }
        self.forward.insert(a, b);
        self.backward.insert(b, a);
        self.records.insert(a, MatchRecord { a, b, score, level });
        Ok(())
    }

    fn mark_ambiguous_a(&mut self, a: K) {
        self.ambiguous_a.insert(a);
    }

    fn mark_ambiguous_b(&mut self, b: K) {
        self.ambiguous_b.insert(b);
    }

    fn is_ambiguous_a(&self, a: K) -> bool {
        self.ambiguous_a.contains(&a)
    }

    fn is_ambiguous_b(&self, b: K) -> bool {
        self.ambiguous_b.contains(&b)
    }

    fn iter(&self) -> impl Iterator<Item = &MatchRecord<K>> {
        self.records.values()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Accumulates matches across all three entity kinds for one matching run.
#[derive(Debug, Default)]
pub struct MatchStore {
    pub(crate) classes: BiMap<ClassId>,
    pub(crate) methods: BiMap<MethodId>,
    pub(crate) fields: BiMap<FieldId>,
}

impl MatchStore {
    pub fn new() -> Self {
        MatchStore {
            classes: BiMap::new(),
            methods: BiMap::new(),
            fields: BiMap::new(),
        }
    }

    // -- classes --

    pub fn is_class_matched(&self, a: ClassId) -> bool {
        self.classes.is_a_matched(a)
    }

    pub fn is_class_b_matched(&self, b: ClassId) -> bool {
        self.classes.is_b_matched(b)
    }

    pub fn class_match(&self, a: ClassId) -> Option<ClassId> {
        self.classes.get_by_a(a)
    }

    pub fn class_match_by_b(&self, b: ClassId) -> Option<ClassId> {
        self.classes.get_by_b(b)
    }

    /// Looks up a class's partner together with the similarity score and
    /// level it was confirmed at, per the match-store contract (spec §6).
    pub fn class_match_record(&self, a: ClassId) -> Option<&MatchRecord<ClassId>> {
        self.classes.record_by_a(a)
    }

    pub fn commit_class_match(&mut self, a: ClassId, b: ClassId, score: f64, level: Level) -> Result<(), MatchEngineError> {
        self.classes.commit(a, b, score, level, "class")
    }

    pub fn mark_class_ambiguous(&mut self, a: ClassId, b: ClassId) {
        self.classes.mark_ambiguous_a(a);
        self.classes.mark_ambiguous_b(b);
    }

    pub fn is_class_ambiguous(&self, a: ClassId) -> bool {
        self.classes.is_ambiguous_a(a)
    }

    pub fn is_class_b_ambiguous(&self, b: ClassId) -> bool {
        self.classes.is_ambiguous_b(b)
    }

    pub fn class_matches(&self) -> impl Iterator<Item = &MatchRecord<ClassId>> {
        self.classes.iter()
    }

    pub fn class_match_count(&self) -> usize {
        self.classes.len()
    }

    // -- methods --

    pub fn is_method_matched(&self, a: MethodId) -> bool {
        self.methods.is_a_matched(a)
    }

    pub fn is_method_b_matched(&self, b: MethodId) -> bool {
        self.methods.is_b_matched(b)
    }

    pub fn method_match(&self, a: MethodId) -> Option<MethodId> {
        self.methods.get_by_a(a)
    }

    pub fn method_match_by_b(&self, b: MethodId) -> Option<MethodId> {
        self.methods.get_by_b(b)
    }

    /// Looks up a method's partner together with the similarity score and
    /// level it was confirmed at, per the match-store contract (spec §6).
    pub fn method_match_record(&self, a: MethodId) -> Option<&MatchRecord<MethodId>> {
        self.methods.record_by_a(a)
    }

    pub fn commit_method_match(&mut self, a: MethodId, b: MethodId, score: f64, level: Level) -> Result<(), MatchEngineError> {
        self.methods.commit(a, b, score, level, "method")
    }

    pub fn mark_method_ambiguous(&mut self, a: MethodId, b: MethodId) {
        self.methods.mark_ambiguous_a(a);
        self.methods.mark_ambiguous_b(b);
    }

    pub fn is_method_ambiguous(&self, a: MethodId) -> bool {
        self.methods.is_ambiguous_a(a)
    }

    pub fn is_method_b_ambiguous(&self, b: MethodId) -> bool {
        self.methods.is_ambiguous_b(b)
    }

    pub fn method_matches(&self) -> impl Iterator<Item = &MatchRecord<MethodId>> {
        self.methods.iter()
    }

    pub fn method_match_count(&self) -> usize {
        self.methods.len()
    }

    // -- fields --

    pub fn is_field_matched(&self, a: FieldId) -> bool {
        self.fields.is_a_matched(a)
    }

    pub fn is_field_b_matched(&self, b: FieldId) -> bool {
        self.fields.is_b_matched(b)
    }

    pub fn field_match(&self, a: FieldId) -> Option<FieldId> {
        self.fields.get_by_a(a)
    }

    pub fn field_match_by_b(&self, b: FieldId) -> Option<FieldId> {
        self.fields.get_by_b(b)
    }

    /// Looks up a field's partner together with the similarity score and
    /// level it was confirmed at, per the match-store contract (spec §6).
    pub fn field_match_record(&self, a: FieldId) -> Option<&MatchRecord<FieldId>> {
        self.fields.record_by_a(a)
    }

    pub fn commit_field_match(&mut self, a: FieldId, b: FieldId, score: f64, level: Level) -> Result<(), MatchEngineError> {
        self.fields.commit(a, b, score, level, "field")
    }

    pub fn mark_field_ambiguous(&mut self, a: FieldId, b: FieldId) {
        self.fields.mark_ambiguous_a(a);
        self.fields.mark_ambiguous_b(b);
    }

    pub fn is_field_ambiguous(&self, a: FieldId) -> bool {
        self.fields.is_ambiguous_a(a)
    }

    pub fn is_field_b_ambiguous(&self, b: FieldId) -> bool {
        self.fields.is_ambiguous_b(b)
    }

    pub fn field_matches(&self) -> impl Iterator<Item = &MatchRecord<FieldId>> {
        self.fields.iter()
    }

    pub fn field_match_count(&self) -> usize {
        self.fields.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_record_exposes_partner_score_and_level() {
        let mut store = MatchStore::new();
        store.commit_class_match(ClassId(0), ClassId(1), 0.92, Level::Secondary).unwrap();
        let record = store.class_match_record(ClassId(0)).unwrap();
        assert_eq!(record.b, ClassId(1));
        assert_eq!(record.score, 0.92);
        assert_eq!(record.level, Level::Secondary);
        assert!(store.class_match_record(ClassId(2)).is_none());
    }

    #[test]
    fn commit_then_recommit_same_pair_is_idempotent() {
        let mut store = MatchStore::new();
        store.commit_class_match(ClassId(0), ClassId(1), 0.8, Level::Initial).unwrap();
        store.commit_class_match(ClassId(0), ClassId(1), 0.95, Level::Secondary).unwrap();
        assert_eq!(store.class_match(ClassId(0)), Some(ClassId(1)));
        assert_eq!(store.class_match_count(), 1);
    }

    #[test]
    fn commit_conflicting_partner_is_rejected() {
        let mut store = MatchStore::new();
        store.commit_class_match(ClassId(0), ClassId(1), 0.8, Level::Initial).unwrap();
        let err = store.commit_class_match(ClassId(0), ClassId(2), 0.8, Level::Initial);
        assert!(err.is_err());
    }

    #[test]
    fn bijectivity_rejects_two_a_matching_same_b() {
        let mut store = MatchStore::new();
        store.commit_method_match(MethodId(0), MethodId(5), 0.8, Level::Initial).unwrap();
        let err = store.commit_method_match(MethodId(1), MethodId(5), 0.8, Level::Initial);
        assert!(err.is_err());
    }

    #[test]
    fn ambiguity_is_per_entity_and_independent_of_commits() {
        let mut store = MatchStore::new();
        store.mark_field_ambiguous(FieldId(0), FieldId(1));
        assert!(store.is_field_ambiguous(FieldId(0)));
        assert!(!store.is_field_ambiguous(FieldId(1))); // a-side only; b-side tracked separately
    }
}
