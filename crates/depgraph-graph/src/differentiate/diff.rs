//! Structural comparison of two versions of a unit.

use depgraph_core::{AccessFlags, ElemType, Field, Method, ReferenceId, Unit};
use std::collections::BTreeSet;

/// Members split into added, removed and changed.
#[derive(Debug)]
pub struct Specifier<'a, T, D> {
    pub added: Vec<&'a T>,
    pub removed: Vec<&'a T>,
    pub changed: Vec<D>,
}

impl<'a, T: PartialEq, D> Specifier<'a, T, D> {
    fn compute(
        past: &'a [T],
        now: &'a [T],
        same: impl Fn(&T, &T) -> bool,
        diff: impl Fn(&'a T, &'a T) -> D,
    ) -> Self {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        for n in now {
            match past.iter().find(|p| same(p, n)) {
                Some(p) if p != n => changed.push(diff(p, n)),
                Some(_) => {}
                None => added.push(n),
            }
        }
        let removed = past
            .iter()
            .filter(|p| !now.iter().any(|n| same(p, n)))
            .collect();
        Self {
            added,
            removed,
            changed,
        }
    }

    pub fn unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MethodDiff<'a> {
    pub past: &'a Method,
    pub now: &'a Method,
}

impl MethodDiff<'_> {
    pub fn added_flags(&self) -> AccessFlags {
        self.past.flags.added_in(self.now.flags)
    }

    pub fn removed_flags(&self) -> AccessFlags {
        self.past.flags.removed_in(self.now.flags)
    }

    pub fn flags_changed(&self) -> bool {
        self.past.flags != self.now.flags
    }

    pub fn type_changed(&self) -> bool {
        self.past.return_type != self.now.return_type
    }

    pub fn signature_changed(&self) -> bool {
        self.past.signature != self.now.signature
    }

    pub fn exceptions_changed(&self) -> bool {
        self.past.exceptions != self.now.exceptions
    }

    pub fn value_removed(&self) -> bool {
        self.past.default_value.is_some() && self.now.default_value.is_none()
    }

    pub fn became_package_local(&self) -> bool {
        !self.past.is_package_local() && self.now.is_package_local()
    }

    pub fn access_expanded(&self) -> bool {
        self.past.flags.is_weaker_access(self.now.flags)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDiff<'a> {
    pub past: &'a Field,
    pub now: &'a Field,
}

impl FieldDiff<'_> {
    pub fn added_flags(&self) -> AccessFlags {
        self.past.flags.added_in(self.now.flags)
    }

    pub fn removed_flags(&self) -> AccessFlags {
        self.past.flags.removed_in(self.now.flags)
    }

    pub fn flags_changed(&self) -> bool {
        self.past.flags != self.now.flags
    }

    pub fn type_changed(&self) -> bool {
        self.past.descriptor != self.now.descriptor
    }

    pub fn signature_changed(&self) -> bool {
        self.past.signature != self.now.signature
    }

    pub fn value_changed(&self) -> bool {
        self.past.value != self.now.value
    }

    pub fn access_restricted(&self) -> bool {
        self.now.flags.is_weaker_access(self.past.flags)
    }
}

pub struct UnitDiff<'a> {
    pub past: &'a Unit,
    pub now: &'a Unit,
    pub methods: Specifier<'a, Method, MethodDiff<'a>>,
    pub fields: Specifier<'a, Field, FieldDiff<'a>>,
}

impl<'a> UnitDiff<'a> {
    pub fn new(past: &'a Unit, now: &'a Unit) -> Self {
        let methods = Specifier::compute(
            past.methods(),
            now.methods(),
            |a, b| a.is_same(b),
            |past, now| MethodDiff { past, now },
        );
        let fields = Specifier::compute(
            past.fields(),
            now.fields(),
            |a, b| a.name == b.name,
            |past, now| FieldDiff { past, now },
        );
        Self {
            past,
            now,
            methods,
            fields,
        }
    }

    pub fn unchanged(&self) -> bool {
        self.past == self.now
    }

    pub fn added_flags(&self) -> AccessFlags {
        self.past.flags().added_in(self.now.flags())
    }

    pub fn removed_flags(&self) -> AccessFlags {
        self.past.flags().removed_in(self.now.flags())
    }

    /// Modifier or kind change.
    pub fn flags_changed(&self) -> bool {
        self.past.flags() != self.now.flags() || self.past.kind() != self.now.kind()
    }

    pub fn kind_converted(&self) -> bool {
        self.past.is_interface() != self.now.is_interface()
    }

    pub fn superclass_changed(&self) -> bool {
        self.past.superclass() != self.now.superclass()
    }

    /// The unit gained a superclass where it previously had none.
    pub fn extends_added(&self) -> bool {
        self.past.superclass().is_none() && self.now.superclass().is_some()
    }

    pub fn signature_changed(&self) -> bool {
        self.past.signature() != self.now.signature()
    }

    pub fn interfaces_added(&self) -> BTreeSet<&'a ReferenceId> {
        self.now
            .interfaces()
            .difference(self.past.interfaces())
            .collect()
    }

    pub fn interfaces_removed(&self) -> BTreeSet<&'a ReferenceId> {
        self.past
            .interfaces()
            .difference(self.now.interfaces())
            .collect()
    }

    pub fn retention_changed(&self) -> bool {
        self.past.retention() != self.now.retention()
    }

    pub fn targets_removed(&self) -> BTreeSet<ElemType> {
        self.past
            .targets()
            .difference(self.now.targets())
            .copied()
            .collect()
    }

    pub fn targets_added(&self) -> BTreeSet<ElemType> {
        self.now
            .targets()
            .difference(self.past.targets())
            .copied()
            .collect()
    }

    /// Adding or removing TYPE_USE or RECORD_COMPONENT moves the annotation to
    /// a different attribute in the compiled output.
    pub fn target_category_might_change(&self) -> bool {
        self.targets_added()
            .union(&self.targets_removed())
            .any(|t| matches!(t, ElemType::TypeUse | ElemType::RecordComponent))
    }
}
