//! Shared comparison primitives
//!
//! The `*_potentially_equal` gates decide whether two entities are even
//! worth scoring; `compare_*_sets` turn two cross-image reference sets into
//! a single similarity number classifier features can consume directly.

use std::collections::BTreeSet;

use crate::context::Graphs;
use crate::model::{ClassId, FieldId, MethodId, CLASS_SHAPE_MASK};

/// Ratio-based similarity of two counts, symmetric and in `[0, 1]`.
/// Two zero counts are treated as identical (ratio 1.0), not undefined.
pub fn compare_counts(a: usize, b: usize) -> f64 {
    if a == 0 && b == 0 {
        return 1.0;
    }
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    lo as f64 / hi as f64
}

/// The class shape/identity gate: same "real" status, the same
/// `ENUM | INTERFACE | ANNOTATION` bits, and (degenerate case) outright
/// identity when the driver is run with `a` and `b` as the same image.
pub fn classes_potentially_equal(ctx: &Graphs, a: ClassId, b: ClassId) -> bool {
    if ctx.same_image() && a == b {
        return true;
    }
    let ca = ctx.a.class(a);
    let cb = ctx.b.class(b);
    ca.real == cb.real && (ca.access_flags & CLASS_SHAPE_MASK) == (cb.access_flags & CLASS_SHAPE_MASK)
}

/// Methods are only potentially equal once their owning classes are matched
/// to each other — an "owner must already be paired" hard gate, enforced
/// here rather than as a scored feature.
pub fn methods_potentially_equal(ctx: &Graphs, a: MethodId, b: MethodId) -> bool {
    let ma = ctx.a.method(a);
    let mb = ctx.b.method(b);
    if ma.real != mb.real || ma.params.len() != mb.params.len() {
        return false;
    }
    ctx.store.class_match(ma.owner) == Some(mb.owner)
}

/// Same owner-matched gate as methods, for fields.
pub fn fields_potentially_equal(ctx: &Graphs, a: FieldId, b: FieldId) -> bool {
    let fa = ctx.a.field(a);
    let fb = ctx.b.field(b);
    if fa.real != fb.real {
        return false;
    }
    ctx.store.class_match(fa.owner) == Some(fb.owner)
}

/// Canonical cross-image set-similarity score: greedily pairs
/// each member of `items_a` with an unused member of `items_b`, preferring
/// an already-committed match (weight 1.0) and falling back to any
/// potentially-equal candidate (weight 0.5). The sum is normalized by the
/// larger set's cardinality so adding unmatched members to either side can
/// only ever lower the score.
pub fn compare_sets<K, L, P>(items_a: &BTreeSet<K>, items_b: &BTreeSet<K>, lookup: L, potentially_equal: P) -> f64
where
    K: Copy + Ord,
    L: Fn(K) -> Option<K>,
    P: Fn(K, K) -> bool,
{
    if items_a.is_empty() && items_b.is_empty() {
        return 1.0;
    }
    let mut used_b: BTreeSet<K> = BTreeSet::new();
    let mut total = 0.0;

    for &a in items_a {
        if let Some(partner) = lookup(a) {
            if items_b.contains(&partner) && !used_b.contains(&partner) {
                used_b.insert(partner);
                total += 1.0;
                continue;
            }
        }
        if let Some(&candidate) = items_b.iter().find(|&&b| !used_b.contains(&b) && potentially_equal(a, b)) {
            used_b.insert(candidate);
            total += 0.5;
        }
    }

    let max_card = items_a.len().max(items_b.len());
    total / max_card as f64
}

pub fn compare_class_sets(ctx: &Graphs, a: &BTreeSet<ClassId>, b: &BTreeSet<ClassId>) -> f64 {
    compare_sets(
        a,
        b,
        |x| ctx.store.class_match(x),
        |x, y| classes_potentially_equal(ctx, x, y),
    )
}

pub fn compare_method_sets(ctx: &Graphs, a: &BTreeSet<MethodId>, b: &BTreeSet<MethodId>) -> f64 {
    compare_sets(
        a,
        b,
        |x| ctx.store.method_match(x),
        |x, y| methods_potentially_equal(ctx, x, y),
    )
}

pub fn compare_field_sets(ctx: &Graphs, a: &BTreeSet<FieldId>, b: &BTreeSet<FieldId>) -> f64 {
    compare_sets(
        a,
        b,
        |x| ctx.store.field_match(x),
        |x, y| fields_potentially_equal(ctx, x, y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_counts_both_zero_is_identical() {
        assert_eq!(compare_counts(0, 0), 1.0);
    }

    #[test]
    fn compare_counts_is_symmetric_ratio() {
        assert_eq!(compare_counts(2, 4), 0.5);
        assert_eq!(compare_counts(4, 2), 0.5);
    }

    #[test]
    fn compare_sets_empty_both_sides_is_identical() {
        let a: BTreeSet<ClassId> = BTreeSet::new();
        let b: BTreeSet<ClassId> = BTreeSet::new();
        let score = compare_sets(&a, &b, |_| None, |_, _| false);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn compare_sets_rewards_committed_matches_over_nothing() {
        let mut a = BTreeSet::new();
        a.insert(ClassId(0));
        a.insert(ClassId(1));
        let mut b = BTreeSet::new();
        b.insert(ClassId(10));
        let score = compare_sets(&a, &b, |x| if x == ClassId(0) { Some(ClassId(10)) } else { None }, |_, _| false);
        assert_eq!(score, 0.5); // 1.0 for the committed pair / max(2,1)
    }
}
