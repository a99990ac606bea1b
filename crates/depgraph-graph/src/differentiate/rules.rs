//! Change kinds and the fixed table deciding which dependents they affect.

use std::fmt;

/// A classified structural change of one unit or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    // units
    UnitRemoved,
    UnitAdded,
    /// A top-level unit added while a live source outside the increment
    /// already contributes the same id.
    DuplicateUnitAdded,
    /// Supertypes added without replacing the superclass or dropping an
    /// interface.
    HierarchyExtended,
    /// Superclass replaced, interface removed or generic signature changed.
    HierarchyChanged,
    SuperclassReplaced,
    KindConverted,
    SourceAnnotationChanged,
    BecameProtected,
    BecamePackagePrivate,
    BecameFinalOrPrivate,
    BecameAbstractOrStatic,
    InnerUnitFlagsChanged,
    RetentionChanged,
    TargetCategoryChanged,
    LocalVariableTargetRemoved,
    TargetsRemoved,
    AnnotationMemberAdded,

    // methods
    AbstractMethodAdded,
    InterfaceAbstractMethodAdded,
    MethodOverloadAdded,
    StaticMethodAdded,
    MethodAdded,
    MethodRemoved,
    RemovedMethodUsed,
    StaticMethodRemoved,
    InterfaceMethodBecameConcrete,
    InterfaceMethodBecameAbstract,
    AnnotationDefaultRemoved,
    MethodBecamePackagePrivate,
    MethodTypeChanged,
    MethodBecameStatic,
    MethodStaticRemoved,
    MethodBecamePrivateOrSynthetic,
    MethodGainedFinalPublicAbstract,
    MethodBecameProtected,
    MethodAccessExpanded,

    // fields
    EnumConstantAdded,
    FieldAdded,
    FieldRemoved,
    StaticFieldRemoved,
    RemovedConstantNonIncremental,
    ConstantChanged,
    ConstantChangedNonIncremental,
    FieldTypeChanged,
    FieldBecameStatic,
    FieldStaticRemoved,
    FieldBecamePrivateOrVolatile,
    FieldBecameProtected,
    FieldBecamePackagePrivate,
    FieldBecameFinal,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What to do about the dependents of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affection {
    /// Any reference to the unit by name.
    ClassUsages,
    /// Every usage owned by the unit, whatever its kind.
    OwnedUsages,
    ClassUsagesOutsideHierarchy,
    ClassUsagesOutsidePackage,
    /// Class references from synthetic units only.
    SyntheticClassUsages,
    InstantiationUsages,
    /// Dependents of every top-level unit sharing the short name.
    SameShortNameDependents,
    /// Every source contributing a duplicated id, compiled or not.
    DuplicateSources,
    /// Sources of all subclasses.
    Subclasses,
    /// Class and on-demand import usages of the unit and its subclasses.
    SubclassUsages,
    RemovedSupertypeBounds,
    ThrowingMethodUsages,
    AnnotationTargetUsages,
    AnnotationArgumentUsages,
    LambdaInstantiations,
    /// Reads, calls and writes of the member through the unit or a subclass
    /// inheriting it.
    MemberUsages,
    MemberUsagesOutsidePackage,
    MemberUsagesOutsideHierarchy,
    StaticImportUsages,
    StaticOnDemandImportUsages,
    SameNameMethodUsages,
    LessSpecificOverloads,
    OverridingMembers,
    LocalOverriders,
    OverridingSources,
    AbstractImplementors,
    OverloadUsages,
    HidingSubclasses,
    SubclassImportScope,
    FieldUsagesViaSubclasses,
    InlinedConstantUsages,
    FieldAssignUsages,
    /// Give up unless the member is narrow enough to bound its users.
    NonIncremental,
}

/// Affections applied for `kind`, in order.
pub fn rule(kind: ChangeKind) -> &'static [Affection] {
    use Affection::*;
    use ChangeKind::*;

    match kind {
        UnitRemoved => &[ClassUsages, OwnedUsages],
        UnitAdded => &[SameShortNameDependents],
        DuplicateUnitAdded => &[DuplicateSources],
        HierarchyExtended => &[Subclasses, RemovedSupertypeBounds],
        HierarchyChanged => &[Subclasses, SubclassUsages, RemovedSupertypeBounds],
        SuperclassReplaced => &[ThrowingMethodUsages],
        KindConverted | BecameFinalOrPrivate | InnerUnitFlagsChanged | RetentionChanged
        | TargetCategoryChanged | AnnotationMemberAdded => &[ClassUsages],
        SourceAnnotationChanged | LocalVariableTargetRemoved => &[NonIncremental],
        TargetsRemoved => &[AnnotationTargetUsages],
        BecameProtected => &[ClassUsagesOutsideHierarchy],
        BecamePackagePrivate => &[ClassUsagesOutsidePackage],
        BecameAbstractOrStatic => &[InstantiationUsages],

        AbstractMethodAdded => &[Subclasses],
        InterfaceAbstractMethodAdded => &[LambdaInstantiations],
        MethodOverloadAdded => &[SameNameMethodUsages],
        StaticMethodAdded => &[StaticOnDemandImportUsages],
        MethodAdded => &[LessSpecificOverloads, OverridingMembers, LocalOverriders],
        MethodRemoved => &[OverridingSources, AbstractImplementors],
        RemovedMethodUsed => &[MemberUsages],
        StaticMethodRemoved => &[StaticImportUsages],
        InterfaceMethodBecameConcrete | InterfaceMethodBecameAbstract => &[LambdaInstantiations],
        AnnotationDefaultRemoved => &[AnnotationArgumentUsages],
        MethodBecamePackagePrivate => &[MemberUsagesOutsidePackage],
        MethodTypeChanged => &[MemberUsages, OverridingSources],
        MethodBecameStatic => &[MemberUsages, Subclasses, StaticOnDemandImportUsages],
        MethodStaticRemoved => &[MemberUsages, StaticImportUsages],
        MethodBecamePrivateOrSynthetic => &[MemberUsages],
        MethodGainedFinalPublicAbstract => &[Subclasses],
        MethodBecameProtected => &[MemberUsagesOutsideHierarchy],
        MethodAccessExpanded => &[OverloadUsages],

        EnumConstantAdded => &[SyntheticClassUsages],
        FieldAdded => &[HidingSubclasses, SubclassImportScope, FieldUsagesViaSubclasses],
        FieldRemoved => &[MemberUsages],
        StaticFieldRemoved => &[StaticImportUsages],
        RemovedConstantNonIncremental | ConstantChangedNonIncremental => &[NonIncremental],
        ConstantChanged => &[InlinedConstantUsages, StaticImportUsages],
        FieldTypeChanged | FieldBecamePrivateOrVolatile => &[MemberUsages],
        FieldBecameStatic => &[MemberUsages, StaticOnDemandImportUsages],
        FieldStaticRemoved => &[MemberUsages, StaticImportUsages],
        FieldBecameProtected => &[MemberUsagesOutsideHierarchy],
        FieldBecamePackagePrivate => &[MemberUsagesOutsidePackage],
        FieldBecameFinal => &[FieldAssignUsages],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_change_only_reaches_inlining_sites() {
        let affections = rule(ChangeKind::ConstantChanged);
        assert!(affections.contains(&Affection::InlinedConstantUsages));
        assert!(!affections.contains(&Affection::MemberUsages));
    }

    #[test]
    fn test_narrowing_is_scoped() {
        assert_eq!(
            rule(ChangeKind::MethodBecamePackagePrivate),
            &[Affection::MemberUsagesOutsidePackage]
        );
        assert_eq!(
            rule(ChangeKind::FieldBecameProtected),
            &[Affection::MemberUsagesOutsideHierarchy]
        );
        assert_eq!(
            rule(ChangeKind::BecamePackagePrivate),
            &[Affection::ClassUsagesOutsidePackage]
        );
    }

    #[test]
    fn test_widening_only_touches_overloads() {
        assert_eq!(
            rule(ChangeKind::MethodAccessExpanded),
            &[Affection::OverloadUsages]
        );
    }

    #[test]
    fn test_hierarchy_rules() {
        assert!(!rule(ChangeKind::HierarchyExtended).contains(&Affection::SubclassUsages));
        assert!(rule(ChangeKind::HierarchyChanged).contains(&Affection::SubclassUsages));
        assert_eq!(
            rule(ChangeKind::UnitRemoved),
            &[Affection::ClassUsages, Affection::OwnedUsages]
        );
    }

    #[test]
    fn test_non_incremental_kinds() {
        for kind in [
            ChangeKind::SourceAnnotationChanged,
            ChangeKind::LocalVariableTargetRemoved,
            ChangeKind::RemovedConstantNonIncremental,
            ChangeKind::ConstantChangedNonIncremental,
        ] {
            assert_eq!(rule(kind), &[Affection::NonIncremental], "{}", kind);
        }
    }
}
