//! Method classifier features
//!
//! Every feature here assumes the owner-class hard gate already passed
//! (see [`crate::compare::methods_potentially_equal`]) — candidates are only
//! ever generated from the member lists of two classes already matched to
//! each other.

use similar::algorithms::{capture_diff_slices, Algorithm, DiffTag};

use crate::classify::{Feature, Registry};
use crate::compare::{compare_counts, compare_method_sets};
use crate::context::Graphs;
use crate::level::Level;
use crate::model::{AccessFlags, MethodId};

fn hamming_similarity(a: AccessFlags, b: AccessFlags) -> f64 {
    let bits = AccessFlags::all().bits().count_ones();
    let diff = (a.bits() ^ b.bits()).count_ones();
    1.0 - (diff as f64 / bits as f64)
}

struct ReturnTypeMatch;
impl Feature<MethodId> for ReturnTypeMatch {
    fn name(&self) -> &'static str {
        "return_type_match"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        1.5
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        let ra = ctx.a.method(a).return_type;
        let rb = ctx.b.method(b).return_type;
        if ctx.store.class_match(ra) == Some(rb) {
            1.0
        } else if ra == ctx.a.method(a).owner && rb == ctx.b.method(b).owner {
            1.0 // both return their own (still-unmatched) owner type, e.g. builder-style methods
        } else {
            0.0
        }
    }
}

struct ParamTypesMatch;
impl Feature<MethodId> for ParamTypesMatch {
    fn name(&self) -> &'static str {
        "param_types_match"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        1.5
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        let pa = &ctx.a.method(a).params;
        let pb = &ctx.b.method(b).params;
        if pa.len() != pb.len() {
            return 0.0;
        }
        if pa.is_empty() {
            return 1.0;
        }
        let matched = pa
            .iter()
            .zip(pb.iter())
            .filter(|(&x, &y)| ctx.store.class_match(x) == Some(y))
            .count();
        matched as f64 / pa.len() as f64
    }
}

struct AccessFlagsSimilarity;
impl Feature<MethodId> for AccessFlagsSimilarity {
    fn name(&self) -> &'static str {
        "access_flags_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        0.75
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        hamming_similarity(ctx.a.method(a).access_flags, ctx.b.method(b).access_flags)
    }
}

struct InstructionCountRatio;
impl Feature<MethodId> for InstructionCountRatio {
    fn name(&self) -> &'static str {
        "instruction_count_ratio"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        compare_counts(ctx.a.method(a).instruction_count, ctx.b.method(b).instruction_count)
    }
}

/// LCS-length proxy over opcode-category sequences: a Myers diff over
/// category slices, counting `Equal` runs rather than rendering a diff.
struct BytecodeSequenceSimilarity;
impl Feature<MethodId> for BytecodeSequenceSimilarity {
    fn name(&self) -> &'static str {
        "bytecode_sequence_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        1.25
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        let ca = &ctx.a.method(a).opcode_categories;
        let cb = &ctx.b.method(b).opcode_categories;
        if ca.is_empty() && cb.is_empty() {
            return 1.0;
        }
        let ops = capture_diff_slices(Algorithm::Myers, ca, cb);
        let equal: usize = ops.iter().map(|op| if op.tag() == DiffTag::Equal { op.new_range().len() } else { 0 }).sum();
        equal as f64 / ca.len().max(cb.len()) as f64
    }
}

struct CalleeSetSimilarity;
impl Feature<MethodId> for CalleeSetSimilarity {
    fn name(&self) -> &'static str {
        "callee_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        compare_method_sets(ctx, &ctx.a.method(a).refs_out, &ctx.b.method(b).refs_out)
    }
}

struct CallerSetSimilarity;
impl Feature<MethodId> for CallerSetSimilarity {
    fn name(&self) -> &'static str {
        "caller_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        compare_method_sets(ctx, &ctx.a.method(a).refs_in, &ctx.b.method(b).refs_in)
    }
}

struct FieldReadSetSimilarity;
impl Feature<MethodId> for FieldReadSetSimilarity {
    fn name(&self) -> &'static str {
        "field_read_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Extra
    }
    fn weight(&self) -> f64 {
        0.75
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        crate::compare::compare_field_sets(ctx, &ctx.a.method(a).field_reads, &ctx.b.method(b).field_reads)
    }
}

struct FieldWriteSetSimilarity;
impl Feature<MethodId> for FieldWriteSetSimilarity {
    fn name(&self) -> &'static str {
        "field_write_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Extra
    }
    fn weight(&self) -> f64 {
        0.75
    }
    fn score(&self, ctx: &Graphs, a: MethodId, b: MethodId) -> f64 {
        crate::compare::compare_field_sets(ctx, &ctx.a.method(a).field_writes, &ctx.b.method(b).field_writes)
    }
}

pub fn default_method_registry() -> Registry<MethodId> {
    let mut reg = Registry::new("method");
    reg.register(Box::new(ReturnTypeMatch))
        .register(Box::new(ParamTypesMatch))
        .register(Box::new(AccessFlagsSimilarity))
        .register(Box::new(InstructionCountRatio))
        .register(Box::new(BytecodeSequenceSimilarity))
        .register(Box::new(CalleeSetSimilarity))
        .register(Box::new(CallerSetSimilarity))
        .register(Box::new(FieldReadSetSimilarity))
        .register(Box::new(FieldWriteSetSimilarity));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;

    #[test]
    fn instruction_count_ratio_of_equal_counts_is_one() {
        let mut ba = ImageBuilder::new();
        let void_a = ba.add_class("V", AccessFlags::empty(), false);
        let owner_a = ba.add_class("A", AccessFlags::empty(), true);
        let ma = ba.add_method(owner_a, "m", vec![], void_a, AccessFlags::empty(), 10, true);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let void_b = bb.add_class("V", AccessFlags::empty(), false);
        let owner_b = bb.add_class("B", AccessFlags::empty(), true);
        let mb = bb.add_method(owner_b, "x", vec![], void_b, AccessFlags::empty(), 10, true);
        let image_b = bb.build().unwrap();

        let ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(InstructionCountRatio.score(&ctx, ma, mb), 1.0);
    }

    #[test]
    fn bytecode_sequence_similarity_identical_is_one() {
        use crate::model::OpcodeCategory;
        let mut ba = ImageBuilder::new();
        let void_a = ba.add_class("V", AccessFlags::empty(), false);
        let owner_a = ba.add_class("A", AccessFlags::empty(), true);
        let ma = ba.add_method(owner_a, "m", vec![], void_a, AccessFlags::empty(), 3, true);
        ba.set_opcode_categories(ma, vec![OpcodeCategory(1), OpcodeCategory(2), OpcodeCategory(1)]);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let void_b = bb.add_class("V", AccessFlags::empty(), false);
        let owner_b = bb.add_class("B", AccessFlags::empty(), true);
        let mb = bb.add_method(owner_b, "x", vec![], void_b, AccessFlags::empty(), 3, true);
        bb.set_opcode_categories(mb, vec![OpcodeCategory(1), OpcodeCategory(2), OpcodeCategory(1)]);
        let image_b = bb.build().unwrap();

        let ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(BytecodeSequenceSimilarity.score(&ctx, ma, mb), 1.0);
    }
}
