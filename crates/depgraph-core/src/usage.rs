use crate::{ElemType, ReferenceId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An outgoing reference from one unit to an element owned by another unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Usage {
    /// Any reference to the unit by name.
    Class(ReferenceId),
    /// Instantiation, including lambda/functional-interface instantiation.
    ClassNew(ReferenceId),
    /// The user extends or implements the unit.
    ClassExtends(ReferenceId),
    /// The unit appears as a bound of a generic type parameter.
    ClassAsGenericBound(ReferenceId),
    /// Dynamic read of a field.
    Field {
        owner: ReferenceId,
        name: String,
        descriptor: String,
    },
    FieldAssign {
        owner: ReferenceId,
        name: String,
        descriptor: String,
    },
    /// The user captured the value of a compile-time constant at its own
    /// compile time.
    InlinedConstant { owner: ReferenceId, name: String },
    Method {
        owner: ReferenceId,
        name: String,
        descriptor: String,
    },
    ImportStaticMember { owner: ReferenceId, name: String },
    ImportStaticOnDemand(ReferenceId),
    /// Application of an annotation, with the argument names it supplies and
    /// the program elements it was applied to.
    Annotation {
        annotation: ReferenceId,
        used_args: Vec<String>,
        targets: Vec<ElemType>,
    },
}

impl Usage {
    /// The unit owning the referenced element.
    pub fn owner(&self) -> &ReferenceId {
        match self {
            Usage::Class(id)
            | Usage::ClassNew(id)
            | Usage::ClassExtends(id)
            | Usage::ClassAsGenericBound(id)
            | Usage::ImportStaticOnDemand(id) => id,
            Usage::Field { owner, .. }
            | Usage::FieldAssign { owner, .. }
            | Usage::InlinedConstant { owner, .. }
            | Usage::Method { owner, .. }
            | Usage::ImportStaticMember { owner, .. } => owner,
            Usage::Annotation { annotation, .. } => annotation,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Usage::Class(_) => "class",
            Usage::ClassNew(_) => "class new",
            Usage::ClassExtends(_) => "class extends",
            Usage::ClassAsGenericBound(_) => "generic bound",
            Usage::Field { .. } => "field",
            Usage::FieldAssign { .. } => "field assign",
            Usage::InlinedConstant { .. } => "inlined constant",
            Usage::Method { .. } => "method",
            Usage::ImportStaticMember { .. } => "static member import",
            Usage::ImportStaticOnDemand(_) => "static on-demand import",
            Usage::Annotation { .. } => "annotation",
        }
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Usage::Field { owner, name, .. }
            | Usage::FieldAssign { owner, name, .. }
            | Usage::InlinedConstant { owner, name }
            | Usage::Method { owner, name, .. }
            | Usage::ImportStaticMember { owner, name } => {
                write!(f, "{} usage {}.{}", self.kind(), owner, name)
            }
            other => write!(f, "{} usage {}", other.kind(), other.owner()),
        }
    }
}
