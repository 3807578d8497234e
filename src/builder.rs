//! In-memory image builder
//!
//! Stands in for the external assembler component (out of scope for this
//! crate): a small, ergonomic way to construct a fully-resolved [`Image`]
//! with all bidirectional edges wired up correctly, used by tests and the
//! demo binary.

use crate::model::{
    AccessFlags, Class, ClassId, Field, FieldId, Image, Method, MethodId, OpcodeCategory,
    validate_image,
};
use crate::error::MatchEngineError;

#[derive(Debug, Default)]
pub struct ImageBuilder {
    classes: Vec<Class>,
    methods: Vec<Method>,
    fields: Vec<Field>,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_class(&mut self, name: &str, access_flags: AccessFlags, real: bool) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            id,
            name: name.to_string(),
            access_flags,
            parent: None,
            children: Default::default(),
            interfaces: Default::default(),
            implementers: Default::default(),
            methods: Vec::new(),
            fields: Vec::new(),
            method_type_refs: Default::default(),
            field_type_refs: Default::default(),
            real,
        });
        id
    }

    pub fn set_parent(&mut self, child: ClassId, parent: ClassId) {
        self.classes[child.index()].parent = Some(parent);
        self.classes[parent.index()].children.insert(child);
    }

    pub fn add_interface(&mut self, class: ClassId, interface: ClassId) {
        self.classes[class.index()].interfaces.insert(interface);
        self.classes[interface.index()].implementers.insert(class);
    }

    pub fn add_method(
        &mut self,
        owner: ClassId,
        name: &str,
        params: Vec<ClassId>,
        return_type: ClassId,
        access_flags: AccessFlags,
        instruction_count: usize,
        real: bool,
    ) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        for &p in params.iter().chain(std::iter::once(&return_type)) {
            self.classes[p.index()].method_type_refs.insert(id);
        }
        self.methods.push(Method {
            id,
            owner,
            name: name.to_string(),
            params,
            return_type,
            access_flags,
            instruction_count,
            opcode_categories: Vec::new(),
            refs_out: Default::default(),
            refs_in: Default::default(),
            field_reads: Default::default(),
            field_writes: Default::default(),
            class_refs: Default::default(),
            real,
        });
        self.classes[owner.index()].methods.push(id);
        id
    }

    pub fn set_opcode_categories(&mut self, method: MethodId, categories: Vec<OpcodeCategory>) {
        self.methods[method.index()].opcode_categories = categories;
    }

    pub fn add_field(
        &mut self,
        owner: ClassId,
        name: &str,
        ty: ClassId,
        access_flags: AccessFlags,
        real: bool,
    ) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.classes[ty.index()].field_type_refs.insert(id);
        self.fields.push(Field {
            id,
            owner,
            name: name.to_string(),
            ty,
            access_flags,
            readers: Default::default(),
            writers: Default::default(),
            real,
        });
        self.classes[owner.index()].fields.push(id);
        id
    }

    /// Records that `caller` invokes `callee`, and that `caller`'s body
    /// mentions `callee`'s owning class.
    pub fn add_call(&mut self, caller: MethodId, callee: MethodId) {
        self.methods[caller.index()].refs_out.insert(callee);
        self.methods[callee.index()].refs_in.insert(caller);
        let owner = self.methods[callee.index()].owner;
        self.methods[caller.index()].class_refs.insert(owner);
    }

    pub fn add_class_ref(&mut self, method: MethodId, class: ClassId) {
        self.methods[method.index()].class_refs.insert(class);
    }

    pub fn add_field_read(&mut self, method: MethodId, field: FieldId) {
        self.methods[method.index()].field_reads.insert(field);
        self.fields[field.index()].readers.insert(method);
    }

    pub fn add_field_write(&mut self, method: MethodId, field: FieldId) {
        self.methods[method.index()].field_writes.insert(field);
        self.fields[field.index()].writers.insert(method);
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut Method {
        &mut self.methods[id.index()]
    }

    /// Finishes construction and validates the image's structural invariants.
    pub fn build(self) -> Result<Image, MatchEngineError> {
        let image = Image {
            classes: self.classes,
            methods: self.methods,
            fields: self.fields,
        };
        validate_image(&image)?;
        Ok(image)
    }
}
