use crate::{AccessFlags, ConstValue, ElemType, ReferenceId, RetentionPolicy, UnitKind, Usage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const CONSTRUCTOR_NAME: &str = "<init>";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub flags: AccessFlags,
    /// Erased type, e.g. `int` or `zoo.Animal`.
    pub descriptor: String,
    /// Generic signature, empty when the type is not generic.
    pub signature: String,
    pub value: Option<ConstValue>,
    pub annotations: BTreeSet<ReferenceId>,
}

impl Field {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: AccessFlags::empty(),
            descriptor: descriptor.into(),
            signature: String::new(),
            value: None,
            annotations: BTreeSet::new(),
        }
    }

    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_value(mut self, value: ConstValue) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<ReferenceId>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    /// A static final field with a compile-time constant value; users may
    /// capture the value instead of reading the field.
    pub fn is_inlinable(&self) -> bool {
        self.flags.is_final() && self.flags.is_static() && self.value.is_some()
    }

    pub fn create_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::Field {
            owner: owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    pub fn create_assign_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::FieldAssign {
            owner: owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor.clone(),
        }
    }

    pub fn create_inlined_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::InlinedConstant {
            owner: owner.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub flags: AccessFlags,
    /// Erased parameter types.
    pub params: Vec<String>,
    pub return_type: String,
    pub signature: String,
    pub exceptions: BTreeSet<ReferenceId>,
    /// Default value of an annotation member.
    pub default_value: Option<ConstValue>,
    pub annotations: BTreeSet<ReferenceId>,
}

impl Method {
    pub fn new(name: impl Into<String>, params: &[&str], return_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: AccessFlags::empty(),
            params: params.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.into(),
            signature: String::new(),
            exceptions: BTreeSet::new(),
            default_value: None,
            annotations: BTreeSet::new(),
        }
    }

    pub fn constructor(params: &[&str]) -> Self {
        Self::new(CONSTRUCTOR_NAME, params, "void")
    }

    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_exception(mut self, exception: impl Into<ReferenceId>) -> Self {
        self.exceptions.insert(exception.into());
        self
    }

    pub fn with_default_value(mut self, value: ConstValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<ReferenceId>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    pub fn descriptor(&self) -> String {
        format!("({}){}", self.params.join(","), self.return_type)
    }

    /// Same name and parameter types; the return type is a changeable fact.
    pub fn is_same(&self, other: &Method) -> bool {
        self.name == other.name && self.params == other.params
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }

    pub fn is_static(&self) -> bool {
        self.flags.is_static()
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    pub fn is_package_local(&self) -> bool {
        self.flags.is_package_local()
    }

    pub fn is_more_accessible_than(&self, other: &Method) -> bool {
        other.flags.is_weaker_access(self.flags)
    }

    pub fn create_usage(&self, owner: &ReferenceId) -> Usage {
        Usage::Method {
            owner: owner.clone(),
            name: self.name.clone(),
            descriptor: self.descriptor(),
        }
    }
}

/// Structural description of one compiled program unit.
///
/// Immutable once built; a changed unit is a new value compared against the
/// previous value for the same `(NodeSource, ReferenceId)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    id: ReferenceId,
    kind: UnitKind,
    flags: AccessFlags,
    signature: String,
    superclass: Option<ReferenceId>,
    interfaces: BTreeSet<ReferenceId>,
    outer: Option<ReferenceId>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    annotations: BTreeSet<ReferenceId>,
    retention: Option<RetentionPolicy>,
    targets: BTreeSet<ElemType>,
    usages: BTreeSet<Usage>,
}

impl Unit {
    pub fn builder(id: impl Into<ReferenceId>, kind: UnitKind) -> UnitBuilder {
        UnitBuilder::new(id.into(), kind)
    }

    pub fn class(id: impl Into<ReferenceId>) -> UnitBuilder {
        Self::builder(id, UnitKind::Class)
    }

    pub fn interface(id: impl Into<ReferenceId>) -> UnitBuilder {
        Self::builder(id, UnitKind::Interface).flags(AccessFlags::ABSTRACT)
    }

    pub fn annotation(id: impl Into<ReferenceId>) -> UnitBuilder {
        Self::builder(id, UnitKind::Annotation).flags(AccessFlags::ABSTRACT)
    }

    pub fn enumeration(id: impl Into<ReferenceId>) -> UnitBuilder {
        Self::builder(id, UnitKind::Enum).flags(AccessFlags::FINAL)
    }

    pub fn id(&self) -> &ReferenceId {
        &self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn superclass(&self) -> Option<&ReferenceId> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &BTreeSet<ReferenceId> {
        &self.interfaces
    }

    /// Superclass followed by the implemented interfaces.
    pub fn supertypes(&self) -> impl Iterator<Item = &ReferenceId> + '_ {
        self.superclass.iter().chain(self.interfaces.iter())
    }

    pub fn outer(&self) -> Option<&ReferenceId> {
        self.outer.as_ref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_method(&self, method: &Method) -> Option<&Method> {
        self.methods.iter().find(|m| m.is_same(method))
    }

    pub fn annotations(&self) -> &BTreeSet<ReferenceId> {
        &self.annotations
    }

    pub fn retention(&self) -> Option<RetentionPolicy> {
        self.retention
    }

    pub fn targets(&self) -> &BTreeSet<ElemType> {
        &self.targets
    }

    pub fn usages(&self) -> &BTreeSet<Usage> {
        &self.usages
    }

    pub fn package_name(&self) -> &str {
        self.id.package_name()
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, UnitKind::Interface | UnitKind::Annotation)
    }

    pub fn is_annotation(&self) -> bool {
        self.kind == UnitKind::Annotation
    }

    pub fn is_enum(&self) -> bool {
        self.kind == UnitKind::Enum
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.is_abstract()
    }

    pub fn is_private(&self) -> bool {
        self.flags.is_private()
    }

    pub fn is_local(&self) -> bool {
        self.flags.contains(AccessFlags::LOCAL)
    }

    pub fn is_anonymous(&self) -> bool {
        self.flags.contains(AccessFlags::ANONYMOUS)
    }

    pub fn is_generated(&self) -> bool {
        self.flags.contains(AccessFlags::GENERATED)
    }

    pub fn is_synthetic(&self) -> bool {
        self.flags.contains(AccessFlags::SYNTHETIC)
    }

    pub fn is_inner(&self) -> bool {
        self.outer.is_some()
    }

    pub fn is_top_level(&self) -> bool {
        self.outer.is_none() && !self.is_local() && !self.is_anonymous()
    }

    /// An interface with exactly one abstract method can be instantiated by
    /// a lambda.
    pub fn is_lambda_target(&self) -> bool {
        self.kind == UnitKind::Interface
            && self.methods.iter().filter(|m| m.is_abstract()).count() == 1
    }
}

/// Builds a [`Unit`], normalizing member order so that equal structure
/// compares equal regardless of declaration order.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    unit: Unit,
}

impl UnitBuilder {
    fn new(id: ReferenceId, kind: UnitKind) -> Self {
        Self {
            unit: Unit {
                id,
                kind,
                flags: AccessFlags::empty(),
                signature: String::new(),
                superclass: None,
                interfaces: BTreeSet::new(),
                outer: None,
                fields: Vec::new(),
                methods: Vec::new(),
                annotations: BTreeSet::new(),
                retention: None,
                targets: BTreeSet::new(),
                usages: BTreeSet::new(),
            },
        }
    }

    pub fn flags(mut self, flags: AccessFlags) -> Self {
        self.unit.flags |= flags;
        self
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.unit.signature = signature.into();
        self
    }

    pub fn extends(mut self, superclass: impl Into<ReferenceId>) -> Self {
        self.unit.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<ReferenceId>) -> Self {
        self.unit.interfaces.insert(interface.into());
        self
    }

    pub fn outer(mut self, outer: impl Into<ReferenceId>) -> Self {
        self.unit.outer = Some(outer.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.unit.fields.retain(|f| f.name != field.name);
        self.unit.fields.push(field);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.unit.methods.retain(|m| !m.is_same(&method));
        self.unit.methods.push(method);
        self
    }

    pub fn annotated(mut self, annotation: impl Into<ReferenceId>) -> Self {
        self.unit.annotations.insert(annotation.into());
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.unit.retention = Some(retention);
        self
    }

    pub fn target(mut self, target: ElemType) -> Self {
        self.unit.targets.insert(target);
        self
    }

    pub fn usage(mut self, usage: Usage) -> Self {
        self.unit.usages.insert(usage);
        self
    }

    pub fn usages(mut self, usages: impl IntoIterator<Item = Usage>) -> Self {
        self.unit.usages.extend(usages);
        self
    }

    pub fn build(mut self) -> Unit {
        self.unit.fields.sort_by(|a, b| a.name.cmp(&b.name));
        self.unit
            .methods
            .sort_by(|a, b| (&a.name, &a.params).cmp(&(&b.name, &b.params)));
        if let Some(superclass) = self.unit.superclass.clone() {
            self.unit.usages.insert(Usage::ClassExtends(superclass));
        }
        for interface in self.unit.interfaces.clone() {
            self.unit.usages.insert(Usage::ClassExtends(interface));
        }
        self.unit
    }
}
