//! Aggregated cross-reference sets per class
//!
//! Pure functions of an immutable image, memoized by computing them once per
//! image when the driver is constructed rather than lazily on first access —
//! equivalent under an immutable image, and avoids interior mutability.

use std::collections::BTreeSet;

use crate::model::{ClassId, FieldId, Image, MethodId};

#[derive(Debug, Default)]
pub struct RefCache {
    out_class_refs: Vec<BTreeSet<ClassId>>,
    in_class_refs: Vec<BTreeSet<ClassId>>,
    method_out_refs: Vec<BTreeSet<MethodId>>,
    method_in_refs: Vec<BTreeSet<MethodId>>,
    field_read_refs: Vec<BTreeSet<FieldId>>,
    field_write_refs: Vec<BTreeSet<FieldId>>,
}

impl RefCache {
    pub fn build(image: &Image) -> Self {
        let n = image.classes.len();
        let mut cache = RefCache {
            out_class_refs: vec![BTreeSet::new(); n],
            in_class_refs: vec![BTreeSet::new(); n],
            method_out_refs: vec![BTreeSet::new(); n],
            method_in_refs: vec![BTreeSet::new(); n],
            field_read_refs: vec![BTreeSet::new(); n],
            field_write_refs: vec![BTreeSet::new(); n],
        };

        for c in &image.classes {
            let idx = c.id.index();
            for &m_id in &c.methods {
                let m = image.method(m_id);
                cache.out_class_refs[idx].extend(m.class_refs.iter().copied());
                cache.method_out_refs[idx].extend(m.refs_out.iter().copied());
                cache.method_in_refs[idx].extend(m.refs_in.iter().copied());
                cache.field_read_refs[idx].extend(m.field_reads.iter().copied());
                cache.field_write_refs[idx].extend(m.field_writes.iter().copied());
            }
            for &f_id in &c.fields {
                cache.out_class_refs[idx].insert(image.field(f_id).ty);
            }
            for &m_id in &c.method_type_refs {
                cache.in_class_refs[idx].insert(image.method(m_id).owner);
            }
            for &f_id in &c.field_type_refs {
                cache.in_class_refs[idx].insert(image.field(f_id).owner);
            }
        }

        cache
    }

    pub fn out_class_refs(&self, id: ClassId) -> &BTreeSet<ClassId> {
        &self.out_class_refs[id.index()]
    }

    pub fn in_class_refs(&self, id: ClassId) -> &BTreeSet<ClassId> {
        &self.in_class_refs[id.index()]
    }

    pub fn method_out_refs(&self, id: ClassId) -> &BTreeSet<MethodId> {
        &self.method_out_refs[id.index()]
    }

    pub fn method_in_refs(&self, id: ClassId) -> &BTreeSet<MethodId> {
        &self.method_in_refs[id.index()]
    }

    pub fn field_read_refs(&self, id: ClassId) -> &BTreeSet<FieldId> {
        &self.field_read_refs[id.index()]
    }

    pub fn field_write_refs(&self, id: ClassId) -> &BTreeSet<FieldId> {
        &self.field_write_refs[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::model::AccessFlags;

    #[test]
    fn aggregates_method_class_refs_onto_owner() {
        let mut b = ImageBuilder::new();
        let void_ty = b.add_class("V", AccessFlags::empty(), false);
        let owner = b.add_class("Owner", AccessFlags::empty(), true);
        let other = b.add_class("Other", AccessFlags::empty(), true);
        let m1 = b.add_method(owner, "m1", vec![], void_ty, AccessFlags::empty(), 1, true);
        let m2 = b.add_method(other, "m2", vec![], void_ty, AccessFlags::empty(), 1, true);
        b.add_call(m1, m2);
        let image = b.build().unwrap();
        let cache = RefCache::build(&image);
        assert!(cache.out_class_refs(owner).contains(&other));
        // in_class_refs tracks declared-type refs, not call refs, so a plain call leaves it empty.
        assert!(cache.in_class_refs(other).is_empty());
    }

    #[test]
    fn aggregates_field_type_into_out_refs_and_type_refs_into_in_refs() {
        let mut b = ImageBuilder::new();
        let void_ty = b.add_class("V", AccessFlags::empty(), false);
        let holder = b.add_class("Holder", AccessFlags::empty(), true);
        let held = b.add_class("Held", AccessFlags::empty(), true);
        let _m = b.add_method(holder, "m", vec![], void_ty, AccessFlags::empty(), 1, true);
        b.add_field(holder, "f", held, AccessFlags::empty(), true);
        let image = b.build().unwrap();
        let cache = RefCache::build(&image);
        assert!(cache.out_class_refs(holder).contains(&held));
        assert!(cache.in_class_refs(held).contains(&holder));
    }
}
