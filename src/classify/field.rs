//! Field classifier features

use crate::classify::{Feature, Registry};
use crate::compare::compare_method_sets;
use crate::context::Graphs;
use crate::level::Level;
use crate::model::{AccessFlags, FieldId};

fn hamming_similarity(a: AccessFlags, b: AccessFlags) -> f64 {
    let bits = AccessFlags::all().bits().count_ones();
    let diff = (a.bits() ^ b.bits()).count_ones();
    1.0 - (diff as f64 / bits as f64)
}

struct TypeEquality;
impl Feature<FieldId> for TypeEquality {
    fn name(&self) -> &'static str {
        "type_equality"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        2.0
    }
    fn score(&self, ctx: &Graphs, a: FieldId, b: FieldId) -> f64 {
        let ta = ctx.a.field(a).ty;
        let tb = ctx.b.field(b).ty;
        if ctx.store.class_match(ta) == Some(tb) {
            1.0
        } else {
            0.0
        }
    }
}

struct AccessFlagsSimilarity;
impl Feature<FieldId> for AccessFlagsSimilarity {
    fn name(&self) -> &'static str {
        "access_flags_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Initial
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: FieldId, b: FieldId) -> f64 {
        hamming_similarity(ctx.a.field(a).access_flags, ctx.b.field(b).access_flags)
    }
}

struct ReaderSetSimilarity;
impl Feature<FieldId> for ReaderSetSimilarity {
    fn name(&self) -> &'static str {
        "reader_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: FieldId, b: FieldId) -> f64 {
        compare_method_sets(ctx, &ctx.a.field(a).readers, &ctx.b.field(b).readers)
    }
}

struct WriterSetSimilarity;
impl Feature<FieldId> for WriterSetSimilarity {
    fn name(&self) -> &'static str {
        "writer_set_similarity"
    }
    fn min_level(&self) -> Level {
        Level::Secondary
    }
    fn weight(&self) -> f64 {
        1.0
    }
    fn score(&self, ctx: &Graphs, a: FieldId, b: FieldId) -> f64 {
        compare_method_sets(ctx, &ctx.a.field(a).writers, &ctx.b.field(b).writers)
    }
}

pub fn default_field_registry() -> Registry<FieldId> {
    let mut reg = Registry::new("field");
    reg.register(Box::new(TypeEquality))
        .register(Box::new(AccessFlagsSimilarity))
        .register(Box::new(ReaderSetSimilarity))
        .register(Box::new(WriterSetSimilarity));
    reg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;

    #[test]
    fn type_equality_requires_committed_class_match() {
        let mut ba = ImageBuilder::new();
        let ty_a = ba.add_class("T", AccessFlags::empty(), true);
        let owner_a = ba.add_class("A", AccessFlags::empty(), true);
        let fa = ba.add_field(owner_a, "f", ty_a, AccessFlags::empty(), true);
        let image_a = ba.build().unwrap();

        let mut bb = ImageBuilder::new();
        let ty_b = bb.add_class("T", AccessFlags::empty(), true);
        let owner_b = bb.add_class("B", AccessFlags::empty(), true);
        let fb = bb.add_field(owner_b, "g", ty_b, AccessFlags::empty(), true);
        let image_b = bb.build().unwrap();

        let mut ctx = Graphs::new(&image_a, &image_b);
        assert_eq!(TypeEquality.score(&ctx, fa, fb), 0.0);
        ctx.store.commit_class_match(ty_a, ty_b, 1.0, Level::Initial).unwrap();
        assert_eq!(TypeEquality.score(&ctx, fa, fb), 1.0);
    }
}
