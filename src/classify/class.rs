//! Class classifier features

use crate::classify::{Feature, Registry};
use crate::compare::{classes_potentially_equal, compare_class_sets, compare_counts};
use crate::context::Graphs;
use crate::level::Level;
use crate::model::{AccessFlags, ClassId, CLASS_TYPE_MASK};

fn hamming_similarity(mask: AccessFlags, a: AccessFlags, b: AccessFlags) -> f64 {
    let bits = mask.bits().count_ones();
    if bits == 0 {
        return 1.0;
    }
    let diff = ((a & mask).bits() ^ (b & mask).bits()).count_ones();
    1.0 - (diff as f64 / bits as f64)
}

/// Hamming similarity over the ENUM/INTERFACE/ANNOTATION/ABSTRACT bits —
/// the "class type check" feature.
struct ClassTypeCheck;
impl Feature<ClassId> for ClassTypeCheck {
    fn name(&self) -> &'static str {
        "class_type_check"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        20.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        hamming_similarity(CLASS_TYPE_MASK, ctx.a.class(a).access_flags, ctx.b.class(b).access_flags)
    }
}

struct MethodCountSimilarity;
impl Feature<ClassId> for MethodCountSimilarity {
    fn name(&self) -> &'static str {
        "method_count"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        3.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_counts(ctx.a.class(a).methods.len(), ctx.b.class(b).methods.len())
    }
}

struct FieldCountSimilarity;
impl Feature<ClassId> for FieldCountSimilarity {
    fn name(&self) -> &'static str {
        "field_count"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        3.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_counts(ctx.a.class(a).fields.len(), ctx.b.class(b).fields.len())
    }
}

struct ParentChainLengthSimilarity;
impl Feature<ClassId> for ParentChainLengthSimilarity {
    fn name(&self) -> &'static str {
        "parent_chain_length"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_counts(ctx.a.parent_chain_len(a), ctx.b.parent_chain_len(b))
    }
}

/// Count-ratio similarity of the parent's child-set sizes — a cheap proxy
/// for "does this class sit among a similarly-sized group of siblings",
/// available even before any class is matched since it only reads raw
/// structure.
struct HierarchySiblingsSimilarity;
impl Feature<ClassId> for HierarchySiblingsSimilarity {
    fn name(&self) -> &'static str {
        "hierarchy_siblings"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        2.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        let siblings_a = ctx.a.class(a).parent.map_or(0, |p| ctx.a.class(p).children.len());
        let siblings_b = ctx.b.class(b).parent.map_or(0, |p| ctx.b.class(p).children.len());
        compare_counts(siblings_a, siblings_b)
    }
}

/// 1 if neither class has a parent, 0 if exactly one does, else 1 iff the
/// two parents are potentially equal — not whether they are *already*
/// committed, since this feature is meant to help drive that commit.
struct SuperclassMatch;
impl Feature<ClassId> for SuperclassMatch {
    fn name(&self) -> &'static str {
        "superclass_match"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        4.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        let pa = ctx.a.class(a).parent;
        let pb = ctx.b.class(b).parent;
        match (pa, pb) {
            (None, None) => 1.0,
            (Some(pa), Some(pb)) => {
                if classes_potentially_equal(ctx, pa, pb) {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

struct InterfaceSetSimilarity;
impl Feature<ClassId> for InterfaceSetSimilarity {
    fn name(&self) -> &'static str {
        "interface_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        3.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_class_sets(ctx, &ctx.a.class(a).interfaces, &ctx.b.class(b).interfaces)
    }
}

struct ChildrenSetSimilarity;
impl Feature<ClassId> for ChildrenSetSimilarity {
    fn name(&self) -> &'static str {
        "children_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        3.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_class_sets(ctx, &ctx.a.class(a).children, &ctx.b.class(b).children)
    }
}

struct ImplementersSetSimilarity;
impl Feature<ClassId> for ImplementersSetSimilarity {
    fn name(&self) -> &'static str {
        "implementers_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        2.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_class_sets(ctx, &ctx.a.class(a).implementers, &ctx.b.class(b).implementers)
    }
}

/// Aggregated class-level reference: every class a method of this class
/// mentions (calls into, reads/writes a field of, or declares as a param or
/// return type), as precomputed in [`crate::refs::RefCache`]. Reads raw
/// structure only, so it is available from INITIAL onward.
struct MethodOutRefsSimilarity;
impl Feature<ClassId> for MethodOutRefsSimilarity {
    fn name(&self) -> &'static str {
        "method_out_refs_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        6.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_class_sets(ctx, ctx.refs_a.out_class_refs(a), ctx.refs_b.out_class_refs(b))
    }
}

/// The reverse aggregation: classes whose members reference this class as a
/// field or method-signature type.
struct IncomingTypeRefsSimilarity;
impl Feature<ClassId> for IncomingTypeRefsSimilarity {
    fn name(&self) -> &'static str {
        "incoming_type_refs_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        6.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        compare_class_sets(ctx, ctx.refs_a.in_class_refs(a), ctx.refs_b.in_class_refs(b))
    }
}

/// Aggregated member-level reference features: unlike the class-level
/// out/in-reference features above, these compare the *members'* call and
/// field-access graphs, so they only pay off once member matching has had a
/// chance to run at least once — hence SECONDARY and later only.
struct MethodOutRefsMemberSimilarity;
impl Feature<ClassId> for MethodOutRefsMemberSimilarity {
    fn name(&self) -> &'static str {
        "method_out_refs_member_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        6.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        crate::compare::compare_method_sets(ctx, ctx.refs_a.method_out_refs(a), ctx.refs_b.method_out_refs(b))
    }
}

struct MethodInRefsMemberSimilarity;
impl Feature<ClassId> for MethodInRefsMemberSimilarity {
    fn name(&self) -> &'static str {
        "method_in_refs_member_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        6.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        crate::compare::compare_method_sets(ctx, ctx.refs_a.method_in_refs(a), ctx.refs_b.method_in_refs(b))
    }
}

struct FieldReadRefsMemberSimilarity;
impl Feature<ClassId> for FieldReadRefsMemberSimilarity {
    fn name(&self) -> &'static str {
        "field_read_refs_member_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        5.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        crate::compare::compare_field_sets(ctx, ctx.refs_a.field_read_refs(a), ctx.refs_b.field_read_refs(b))
    }
}

struct FieldWriteRefsMemberSimilarity;
impl Feature<ClassId> for FieldWriteRefsMemberSimilarity {
    fn name(&self) -> &'static str {
        "field_write_refs_member_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        5.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        crate::compare::compare_field_sets(ctx, ctx.refs_a.field_write_refs(a), ctx.refs_b.field_write_refs(b))
    }
}

/// Greedy best-match over methods: for each of `a`'s methods, find the
/// unused method of `b` with matching arity and potentially-equal
/// return/parameter types that scores highest (an instruction-count ratio
/// for two real methods, 1.0 for two non-real shadows, 0.0 for a
/// real/non-real mismatch), claim it, and sum the best scores — not a
/// bijection, a one-sided greedy assignment normalized by the larger side.
struct SimilarMethodsScore;
impl Feature<ClassId> for SimilarMethodsScore {
    fn name(&self) -> &'static str {
        "similar_methods"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        10.0
    }
    fn score(&self, ctx: &Graphs, a: ClassId, b: ClassId) -> f64 {
        let methods_a = &ctx.a.class(a).methods;
        let methods_b = &ctx.b.class(b).methods;
        if methods_a.is_empty() && methods_b.is_empty() {
            return 1.0;
        }
        let mut used = vec![false; methods_b.len()];
        let mut total = 0.0f64;

        for &ma_id in methods_a {
            let ma = ctx.a.method(ma_id);
            let mut best: Option<usize> = None;
            let mut best_score = 0.0f64;

            for (i, &mb_id) in methods_b.iter().enumerate() {
                if used[i] {
                    continue;
                }
                let mb = ctx.b.method(mb_id);
                if !classes_potentially_equal(ctx, ma.return_type, mb.return_type) {
                    continue;
                }
                if ma.params.len() != mb.params.len() {
                    continue;
                }
                if ma
                    .params
                    .iter()
                    .zip(mb.params.iter())
                    .any(|(&pa, &pb)| !classes_potentially_equal(ctx, pa, pb))
                {
                    continue;
                }
                let score = if !ma.real || !mb.real {
                    if !ma.real && !mb.real {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    compare_counts(ma.instruction_count, mb.instruction_count)
                };
                if score > best_score {
                    best_score = score;
                    best = Some(i);
                }
            }

            if let Some(i) = best {
                used[i] = true;
                total += best_score;
            }
        }

        total / methods_a.len().max(methods_b.len()) as f64
    }
}

pub fn default_class_registry() -> Registry<ClassId> {
    let mut reg = Registry::new("class");
    reg.register(Box::new(ClassTypeCheck))
        .register(Box::new(MethodCountSimilarity))
        .register(Box::new(FieldCountSimilarity))
        .register(Box::new(ParentChainLengthSimilarity))
        .register(Box::new(HierarchySiblingsSimilarity))
        .register(Box::new(SuperclassMatch))
        .register(Box::new(InterfaceSetSimilarity))
        .register(Box::new(ChildrenSetSimilarity))
        .register(Box::new(ImplementersSetSimilarity))
        .register(Box::new(MethodOutRefsSimilarity))
        .register(Box::new(IncomingTypeRefsSimilarity))
        .register(Box::new(MethodOutRefsMemberSimilarity))
        .register(Box::new(MethodInRefsMemberSimilarity))
        .register(Box::new(FieldReadRefsMemberSimilarity))
        .register(Box::new(FieldWriteRefsMemberSimilarity))
        .register(Box::new(SimilarMethodsScore));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::model::AccessFlags;

    #[test]
    fn class_type_check_scores_identical_flags_as_one() {
        let mut ba = ImageBuilder::new();
        let a = ba.add_class("A", AccessFlags::INTERFACE, true);
        let image_a = ba.build().unwrap();
        let mut bb = ImageBuilder::new();
        let b = bb.add_class("B", AccessFlags::INTERFACE | AccessFlags::PUBLIC, true);
        let image_b = bb.build().unwrap();
        let ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(ClassTypeCheck.score(&ctx, a, b), 1.0);
    }

    #[test]
    fn default_registry_has_sixteen_features() {
        let reg = default_class_registry();
        assert_eq!(reg.len(), 16);
    }

    #[test]
    fn similar_methods_matches_same_arity_methods() {
        let mut ba = ImageBuilder::new();
        let void_a = ba.add_class("V", AccessFlags::empty(), false);
        let a = ba.add_class("A", AccessFlags::empty(), true);
        ba.add_method(a, "m1", vec![void_a], void_a, AccessFlags::empty(), 1, true);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let void_b = bb.add_class("V", AccessFlags::empty(), false);
        let b = bb.add_class("B", AccessFlags::empty(), true);
        bb.add_method(b, "x1", vec![void_b], void_b, AccessFlags::empty(), 1, true);
        let image_b = bb.build().unwrap();

        let ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(SimilarMethodsScore.score(&ctx, a, b), 1.0);
    }

    #[test]
    fn similar_methods_uses_instruction_count_ratio_not_a_binary_hit() {
        let mut ba = ImageBuilder::new();
        let void_a = ba.add_class("V", AccessFlags::empty(), false);
        let a = ba.add_class("A", AccessFlags::empty(), true);
        ba.add_method(a, "m1", vec![], void_a, AccessFlags::empty(), 3, true);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let void_b = bb.add_class("V", AccessFlags::empty(), false);
        let b = bb.add_class("B", AccessFlags::empty(), true);
        bb.add_method(b, "x1", vec![], void_b, AccessFlags::empty(), 4, true);
        let image_b = bb.build().unwrap();

        let ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(SimilarMethodsScore.score(&ctx, a, b), 0.75); // compareCounts(3, 4)
    }

    #[test]
    fn similar_methods_scores_non_real_shadow_pair_as_one() {
        let mut ba = ImageBuilder::new();
        let void_a = ba.add_class("V", AccessFlags::empty(), false);
        let a = ba.add_class("A", AccessFlags::empty(), true);
        ba.add_method(a, "m1", vec![], void_a, AccessFlags::empty(), 0, false);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let void_b = bb.add_class("V", AccessFlags::empty(), false);
        let b = bb.add_class("B", AccessFlags::empty(), true);
        bb.add_method(b, "x1", vec![], void_b, AccessFlags::empty(), 0, false);
        let image_b = bb.build().unwrap();

        let ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(SimilarMethodsScore.score(&ctx, a, b), 1.0);
    }
}
