//! Program-image data model
//!
//! Two fully resolved images (A = named, B = unnamed) are the input to the
//! matcher. Per the design notes, entities live in per-image arenas and are
//! referenced by index rather than by pointer or name, so identity
//! comparisons are just integer equality and traversal in either direction
//! of every edge is O(1).

use std::collections::BTreeSet;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::MatchEngineError;

bitflags! {
    /// Access-flag bitset shared by classes, methods, and fields.
    ///
    /// Only the bits the classifiers actually read are modeled; an assembler
    /// delivering a richer bitset simply sets the bits this crate ignores
    /// and they are carried along harmlessly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccessFlags: u32 {
        const PUBLIC    = 1 << 0;
        const PRIVATE   = 1 << 1;
        const PROTECTED = 1 << 2;
        const STATIC    = 1 << 3;
        const FINAL     = 1 << 4;
        const ABSTRACT  = 1 << 5;
        const ENUM      = 1 << 6;
        const INTERFACE = 1 << 7;
        const ANNOTATION = 1 << 8;
        const SYNTHETIC = 1 << 9;
    }
}

/// Bits the "class type check" classifier feature hashes over.
pub const CLASS_TYPE_MASK: AccessFlags = AccessFlags::ENUM
    .union(AccessFlags::INTERFACE)
    .union(AccessFlags::ANNOTATION)
    .union(AccessFlags::ABSTRACT);

/// Bits the "potentially equal" class shape gate checks — notably narrower
/// than [`CLASS_TYPE_MASK`]: it omits ABSTRACT.
pub const CLASS_SHAPE_MASK: AccessFlags =
    AccessFlags::ENUM.union(AccessFlags::INTERFACE).union(AccessFlags::ANNOTATION);

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

entity_id!(ClassId);
entity_id!(MethodId);
entity_id!(FieldId);

/// Opaque category code for one instruction, as assigned by the assembler.
/// The core never interprets the value; it only compares categories for
/// equality when computing the bytecode-sequence similarity feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpcodeCategory(pub u8);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub access_flags: AccessFlags,
    pub parent: Option<ClassId>,
    pub children: BTreeSet<ClassId>,
    pub interfaces: BTreeSet<ClassId>,
    pub implementers: BTreeSet<ClassId>,
    /// Declaration order preserved (the "similar methods" algorithm iterates
    /// in insertion order).
    pub methods: Vec<MethodId>,
    pub fields: Vec<FieldId>,
    pub method_type_refs: BTreeSet<MethodId>,
    pub field_type_refs: BTreeSet<FieldId>,
    pub real: bool,
}

impl Default for AccessFlags {
    fn default() -> Self {
        AccessFlags::empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Method {
    pub id: MethodId,
    pub owner: ClassId,
    pub name: String,
    pub params: Vec<ClassId>,
    pub return_type: ClassId,
    pub access_flags: AccessFlags,
    pub instruction_count: usize,
    /// Opcode-category trace backing the bytecode-sequence similarity
    /// feature; otherwise instructions are opaque to the core.
    pub opcode_categories: Vec<OpcodeCategory>,
    pub refs_out: BTreeSet<MethodId>,
    pub refs_in: BTreeSet<MethodId>,
    pub field_reads: BTreeSet<FieldId>,
    pub field_writes: BTreeSet<FieldId>,
    pub class_refs: BTreeSet<ClassId>,
    pub real: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: FieldId,
    pub owner: ClassId,
    pub name: String,
    pub ty: ClassId,
    pub access_flags: AccessFlags,
    pub readers: BTreeSet<MethodId>,
    pub writers: BTreeSet<MethodId>,
    pub real: bool,
}

/// A fully assembled program image: classes, methods, fields, and all
/// cross-references, indexed by arena position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub classes: Vec<Class>,
    pub methods: Vec<Method>,
    pub fields: Vec<Field>,
}

impl Image {
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    pub fn class_type_mask(&self, id: ClassId) -> AccessFlags {
        self.class(id).access_flags & CLASS_TYPE_MASK
    }

    /// Length of the parent chain above `id` (0 for a class with no parent).
    pub fn parent_chain_len(&self, id: ClassId) -> usize {
        let mut depth = 0;
        let mut cur = self.class(id).parent;
        let mut seen = BTreeSet::new();
        while let Some(p) = cur {
            if !seen.insert(p) {
                break; // defensive: validate_image should already have rejected cycles
            }
            depth += 1;
            cur = self.class(p).parent;
        }
        depth
    }
}

/// Validates the structural invariants an assembler is required to uphold.
/// Called by the driver before a run starts; any violation is fatal
/// ([`MatchEngineError::ImageInconsistent`]).
pub fn validate_image(image: &Image) -> Result<(), MatchEngineError> {
    fn inconsistent(reason: impl Into<String>, entity: impl Into<String>) -> MatchEngineError {
        MatchEngineError::ImageInconsistent {
            reason: reason.into(),
            entity: entity.into(),
        }
    }

    // Method call graph is bidirectional.
    for m in &image.methods {
        for &n in &m.refs_out {
            if !image.method(n).refs_in.contains(&m.id) {
                return Err(inconsistent(
                    format!("method {:?} refs_out -> {:?} missing reciprocal refs_in", m.id, n),
                    m.name.clone(),
                ));
            }
        }
        for &n in &m.refs_in {
            if !image.method(n).refs_out.contains(&m.id) {
                return Err(inconsistent(
                    format!("method {:?} refs_in <- {:?} missing reciprocal refs_out", m.id, n),
                    m.name.clone(),
                ));
            }
        }
        for &f in &m.field_reads {
            if !image.field(f).readers.contains(&m.id) {
                return Err(inconsistent(
                    format!("method {:?} reads field {:?} not listed as a reader", m.id, f),
                    m.name.clone(),
                ));
            }
        }
        for &f in &m.field_writes {
            if !image.field(f).writers.contains(&m.id) {
                return Err(inconsistent(
                    format!("method {:?} writes field {:?} not listed as a writer", m.id, f),
                    m.name.clone(),
                ));
            }
        }
        if !m.real && m.instruction_count != 0 {
            return Err(inconsistent("non-real method carries a body", m.name.clone()));
        }
    }

    for f in &image.fields {
        for &m in &f.readers {
            if !image.method(m).field_reads.contains(&f.id) {
                return Err(inconsistent(
                    format!("field {:?} reader {:?} missing reciprocal field_reads", f.id, m),
                    f.name.clone(),
                ));
            }
        }
        for &m in &f.writers {
            if !image.method(m).field_writes.contains(&f.id) {
                return Err(inconsistent(
                    format!("field {:?} writer {:?} missing reciprocal field_writes", f.id, m),
                    f.name.clone(),
                ));
            }
        }
    }

    // Class type refs: method_type_refs / field_type_refs must agree with
    // the referencing entity's declared types.
    for c in &image.classes {
        for &m in &c.method_type_refs {
            let mm = image.method(m);
            if mm.return_type != c.id && !mm.params.contains(&c.id) {
                return Err(inconsistent(
                    format!("class {:?} method_type_refs contains {:?} which doesn't reference it", c.id, m),
                    c.name.clone(),
                ));
            }
        }
        for &f in &c.field_type_refs {
            if image.field(f).ty != c.id {
                return Err(inconsistent(
                    format!("class {:?} field_type_refs contains {:?} with a different type", c.id, f),
                    c.name.clone(),
                ));
            }
        }
    }
    for m in &image.methods {
        let mut referenced: BTreeSet<ClassId> = m.params.iter().copied().collect();
        referenced.insert(m.return_type);
        for c in referenced {
            if image.classes.len() > c.index() && !image.class(c).method_type_refs.contains(&m.id) {
                return Err(inconsistent(
                    format!("method {:?} references class {:?} not listed in its method_type_refs", m.id, c),
                    m.name.clone(),
                ));
            }
        }
    }
    for f in &image.fields {
        if !image.class(f.ty).field_type_refs.contains(&f.id) {
            return Err(inconsistent(
                format!("field {:?} of type {:?} not listed in that class's field_type_refs", f.id, f.ty),
                f.name.clone(),
            ));
        }
    }

    // Parent/children and interfaces/implementers are consistent and acyclic.
    for c in &image.classes {
        if let Some(p) = c.parent {
            if !image.class(p).children.contains(&c.id) {
                return Err(inconsistent(
                    format!("class {:?} parent {:?} doesn't list it as a child", c.id, p),
                    c.name.clone(),
                ));
            }
        }
        for &ch in &c.children {
            if image.class(ch).parent != Some(c.id) {
                return Err(inconsistent(
                    format!("class {:?} child {:?} doesn't point back to it", c.id, ch),
                    c.name.clone(),
                ));
            }
        }
        for &i in &c.interfaces {
            if !image.class(i).implementers.contains(&c.id) {
                return Err(inconsistent(
                    format!("class {:?} interface {:?} doesn't list it as an implementer", c.id, i),
                    c.name.clone(),
                ));
            }
        }
        for &impl_ in &c.implementers {
            if !image.class(impl_).interfaces.contains(&c.id) {
                return Err(inconsistent(
                    format!("class {:?} implementer {:?} doesn't declare it as an interface", c.id, impl_),
                    c.name.clone(),
                ));
            }
        }
    }
    for c in &image.classes {
        if image.parent_chain_len(c.id) > image.classes.len() {
            return Err(inconsistent("parent chain cycle detected", c.name.clone()));
        }
    }

    // Member-key uniqueness within each class.
    for c in &image.classes {
        let mut seen = BTreeSet::new();
        for &m in &c.methods {
            let mm = image.method(m);
            let key = (mm.name.clone(), mm.params.clone(), mm.return_type);
            if !seen.insert(key) {
                return Err(inconsistent(
                    format!("duplicate (name, descriptor) for method {:?}", m),
                    c.name.clone(),
                ));
            }
        }
        let mut seen_fields = BTreeSet::new();
        for &f in &c.fields {
            let ff = image.field(f);
            if !seen_fields.insert((ff.name.clone(), ff.ty)) {
                return Err(inconsistent(
                    format!("duplicate (name, type) for field {:?}", f),
                    c.name.clone(),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;

    #[test]
    fn class_type_mask_extracts_only_masked_bits() {
        let mut b = ImageBuilder::new();
        let c = b.add_class("A", AccessFlags::INTERFACE | AccessFlags::PUBLIC, true);
        let image = b.build().unwrap();
        assert_eq!(image.class_type_mask(c), AccessFlags::INTERFACE);
    }

    #[test]
    fn parent_chain_len_counts_ancestors() {
        let mut b = ImageBuilder::new();
        let root = b.add_class("Root", AccessFlags::empty(), true);
        let mid = b.add_class("Mid", AccessFlags::empty(), true);
        let leaf = b.add_class("Leaf", AccessFlags::empty(), true);
        b.set_parent(mid, root);
        b.set_parent(leaf, mid);
        let image = b.build().unwrap();
        assert_eq!(image.parent_chain_len(root), 0);
        assert_eq!(image.parent_chain_len(mid), 1);
        assert_eq!(image.parent_chain_len(leaf), 2);
    }

    #[test]
    fn validate_rejects_missing_reciprocal_ref() {
        let mut b = ImageBuilder::new();
        let c1 = b.add_class("A", AccessFlags::empty(), true);
        let c2 = b.add_class("B", AccessFlags::empty(), true);
        let void_ty = b.add_class("V", AccessFlags::empty(), false);
        let m1 = b.add_method(c1, "m1", vec![], void_ty, AccessFlags::empty(), 1, true);
        let m2 = b.add_method(c2, "m2", vec![], void_ty, AccessFlags::empty(), 1, true);
        // Manually break the invariant: refs_out without reciprocal refs_in.
        b.method_mut(m1).refs_out.insert(m2);
        let image = b.build();
        assert!(image.is_err());
    }
}
