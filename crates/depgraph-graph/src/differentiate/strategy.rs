//! Classification of unit and member changes, and the affection actions the
//! rule table refers to.

use super::context::{Constraint, DifferentiateContext, UsageQuery};
use super::diff::UnitDiff;
use super::rules::{rule, Affection, ChangeKind};
use super::view::GraphView;
use super::DifferentiateParameters;
use crate::graph::GraphState;
use crate::index::IndexKind;
use crate::Delta;
use depgraph_core::{
    AccessFlags, ElemType, Field, Method, ReferenceId, RetentionPolicy, Unit, Usage,
};
use std::collections::BTreeSet;
use tracing::debug;

const HIDING_METHOD_FLAGS: AccessFlags = AccessFlags::PRIVATE
    .union(AccessFlags::SYNTHETIC)
    .union(AccessFlags::BRIDGE);
const EXPOSING_METHOD_FLAGS: AccessFlags = AccessFlags::FINAL
    .union(AccessFlags::PUBLIC)
    .union(AccessFlags::ABSTRACT);

/// The member a change is about. Methods and fields carry the declaration
/// existing usages were compiled against, then the current declaration if
/// there is one.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Member<'a> {
    Unit,
    Method(&'a Method, Option<&'a Method>),
    Field(&'a Field, Option<&'a Field>),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Change<'a> {
    pub kind: ChangeKind,
    pub past: &'a Unit,
    pub now: &'a Unit,
    pub member: Member<'a>,
}

impl<'a> Change<'a> {
    fn id(&self) -> &'a ReferenceId {
        self.now.id()
    }

    /// Flags of whichever version of the element was more accessible.
    fn widest_access(&self) -> AccessFlags {
        let (past, now) = match self.member {
            Member::Unit => (self.past.flags(), self.now.flags()),
            Member::Method(past, now) => (past.flags, now.map_or(past.flags, |m| m.flags)),
            Member::Field(past, now) => (past.flags, now.map_or(past.flags, |f| f.flags)),
        };
        if now.is_weaker_access(past) {
            past
        } else {
            now
        }
    }
}

pub(crate) fn classify_removed(unit: &Unit) -> Vec<Change<'_>> {
    vec![Change {
        kind: ChangeKind::UnitRemoved,
        past: unit,
        now: unit,
        member: Member::Unit,
    }]
}

/// An added top-level unit another live source of the same chunk already
/// defines is a duplicate.
pub(crate) fn classify_added<'a>(
    unit: &'a Unit,
    state: &GraphState,
    delta: &Delta,
    params: &DifferentiateParameters,
) -> Vec<Change<'a>> {
    let change = |kind| Change {
        kind,
        past: unit,
        now: unit,
        member: Member::Unit,
    };
    if unit.is_top_level() {
        let defined_elsewhere = state
            .sources_of(unit.id())
            .filter(|source| !delta.is_deleted(source) && params.belongs_to_current_chunk(source))
            .any(|source| !delta.is_compiled(source));
        if defined_elsewhere {
            return vec![change(ChangeKind::DuplicateUnitAdded)];
        }
    }
    vec![change(ChangeKind::UnitAdded)]
}

pub(crate) fn classify_changed<'a>(
    diff: &UnitDiff<'a>,
    present: &GraphView<'a>,
    future: &GraphView<'a>,
    params: &DifferentiateParameters,
) -> Vec<Change<'a>> {
    use ChangeKind::*;

    let (past, now) = (diff.past, diff.now);
    let id = now.id();
    let mut changes = Vec::new();
    let mut push = |kind, member| {
        changes.push(Change {
            kind,
            past,
            now,
            member,
        })
    };

    let interfaces_added = !diff.interfaces_added().is_empty();
    let interfaces_removed = !diff.interfaces_removed().is_empty();
    let hierarchy_changed = diff.superclass_changed() || diff.signature_changed();
    if hierarchy_changed || interfaces_added || interfaces_removed {
        let extends_changed = diff.superclass_changed() && !diff.extends_added();
        if diff.signature_changed() || extends_changed || interfaces_removed {
            push(HierarchyChanged, Member::Unit);
        } else {
            push(HierarchyExtended, Member::Unit);
        }
        if extends_changed {
            push(SuperclassReplaced, Member::Unit);
        }
    }

    if diff.kind_converted() {
        push(KindConverted, Member::Unit);
    }
    if now.is_annotation() && now.retention() == Some(RetentionPolicy::Source) {
        push(SourceAnnotationChanged, Member::Unit);
    }

    let added = diff.added_flags();
    if added.is_protected() {
        push(BecameProtected, Member::Unit);
    }
    if !past.flags().is_package_local() && now.flags().is_package_local() {
        push(BecamePackagePrivate, Member::Unit);
    }
    if added.intersects(AccessFlags::FINAL | AccessFlags::PRIVATE) {
        push(BecameFinalOrPrivate, Member::Unit);
    }
    if added.intersects(AccessFlags::ABSTRACT | AccessFlags::STATIC) {
        push(BecameAbstractOrStatic, Member::Unit);
    }
    if diff.flags_changed() && now.is_inner() && !now.is_private() && !now.is_anonymous() {
        push(InnerUnitFlagsChanged, Member::Unit);
    }

    if past.is_annotation() && now.is_annotation() {
        if diff.retention_changed() {
            push(RetentionChanged, Member::Unit);
        } else if diff.target_category_might_change() {
            push(TargetCategoryChanged, Member::Unit);
        } else {
            let removed_targets = diff.targets_removed();
            if removed_targets.contains(&ElemType::LocalVariable) {
                push(LocalVariableTargetRemoved, Member::Unit);
            } else if !removed_targets.is_empty() {
                push(TargetsRemoved, Member::Unit);
            }
        }
        for &method in &diff.methods.added {
            if method.default_value.is_none() {
                push(AnnotationMemberAdded, Member::Method(method, Some(method)));
            }
        }
    } else {
        for &method in &diff.methods.added {
            if method.is_private() {
                continue;
            }
            let member = Member::Method(method, Some(method));
            if method.is_abstract() || now.is_interface() || now.is_abstract() {
                push(AbstractMethodAdded, member);
            }
            if now.is_interface() && method.is_abstract() {
                push(InterfaceAbstractMethodAdded, member);
            }
            let overloads = !method.params.is_empty()
                && !present.has_overridden_methods(id, |m| m.is_same(method));
            if overloads {
                push(MethodOverloadAdded, member);
            }
            if method.is_static() {
                push(StaticMethodAdded, member);
            }
            push(MethodAdded, member);
        }
    }

    for &method in &diff.methods.removed {
        let member = Member::Method(method, None);
        if method.is_static() && !method.is_private() {
            push(StaticMethodRemoved, member);
        }
        let clearly_overridden = !future
            .overridden_methods(id, |m| {
                m.is_same(method)
                    && m.return_type == method.return_type
                    && m.is_static() == method.is_static()
                    && !m.is_private()
                    && !m.flags.is_weaker_access(method.flags)
            })
            .is_empty();
        if method.is_package_local() || !clearly_overridden {
            push(RemovedMethodUsed, member);
        }
        push(MethodRemoved, member);
    }

    for md in &diff.methods.changed {
        let member = Member::Method(md.past, Some(md.now));
        let added = md.added_flags();
        let removed = md.removed_flags();
        if now.is_interface() {
            if removed.is_abstract() {
                push(InterfaceMethodBecameConcrete, member);
            } else if added.is_abstract() {
                push(InterfaceMethodBecameAbstract, member);
            }
        }
        if now.is_annotation() && md.value_removed() {
            push(AnnotationDefaultRemoved, member);
        }
        if md.became_package_local() {
            push(MethodBecamePackagePrivate, member);
        }
        if md.type_changed() || md.signature_changed() || md.exceptions_changed() {
            push(MethodTypeChanged, member);
        }
        if md.flags_changed() {
            if added.is_static() {
                push(MethodBecameStatic, member);
            } else if removed.is_static() {
                push(MethodStaticRemoved, member);
            } else if added.intersects(HIDING_METHOD_FLAGS) {
                push(MethodBecamePrivateOrSynthetic, member);
            } else {
                if added.intersects(EXPOSING_METHOD_FLAGS) {
                    push(MethodGainedFinalPublicAbstract, member);
                }
                if added.is_protected() && !removed.is_private() {
                    push(MethodBecameProtected, member);
                }
            }
            if md.access_expanded() {
                push(MethodAccessExpanded, member);
            }
        }
    }

    for &field in &diff.fields.added {
        let member = Member::Field(field, Some(field));
        if now.is_enum() && field.is_static() && field.descriptor == id.as_str() {
            push(EnumConstantAdded, member);
        }
        if !field.is_private() {
            push(FieldAdded, member);
        }
    }

    for &field in &diff.fields.removed {
        let member = Member::Field(field, None);
        if !field.is_private() && field.is_inlinable() && !params.process_constants_incrementally {
            push(RemovedConstantNonIncremental, member);
        }
        push(FieldRemoved, member);
        if field.is_static() && !field.is_private() {
            push(StaticFieldRemoved, member);
        }
    }

    for fd in &diff.fields.changed {
        let member = Member::Field(fd.past, Some(fd.now));
        let added = fd.added_flags();
        let removed = fd.removed_flags();
        if !fd.past.is_private() && fd.past.is_inlinable() {
            let harmful = added.union(removed).intersects(AccessFlags::STATIC | AccessFlags::FINAL);
            if harmful || fd.value_changed() || fd.access_restricted() {
                if params.process_constants_incrementally {
                    push(ConstantChanged, member);
                } else {
                    push(ConstantChangedNonIncremental, member);
                }
            }
        }
        if fd.type_changed() || fd.signature_changed() {
            push(FieldTypeChanged, member);
        } else if fd.flags_changed() {
            if added.is_static() {
                push(FieldBecameStatic, member);
            } else if removed.is_static() {
                push(FieldStaticRemoved, member);
            } else if added.intersects(AccessFlags::PRIVATE | AccessFlags::VOLATILE) {
                push(FieldBecamePrivateOrVolatile, member);
            } else {
                if removed.is_public() {
                    if fd.now.flags.is_protected() {
                        push(FieldBecameProtected, member);
                    } else if fd.now.flags.is_package_local() {
                        push(FieldBecamePackagePrivate, member);
                    }
                } else if removed.is_protected() && fd.access_restricted() {
                    push(FieldBecamePackagePrivate, member);
                }
                if added.is_final() {
                    push(FieldBecameFinal, member);
                }
            }
        }
    }

    changes
}

/// Run every affection the rule table lists for `change`.
pub(crate) fn apply<'a>(
    change: &Change<'a>,
    ctx: &mut DifferentiateContext<'a>,
    present: &GraphView<'a>,
    future: &GraphView<'a>,
) {
    debug!("{} in {}", change.kind, change.id());
    for &affection in rule(change.kind) {
        affect(affection, change, ctx, present, future);
    }
}

fn affect<'a>(
    affection: Affection,
    change: &Change<'a>,
    ctx: &mut DifferentiateContext<'a>,
    present: &GraphView<'a>,
    future: &GraphView<'a>,
) {
    let id = change.id();
    let state = ctx.state();
    match affection {
        Affection::ClassUsages => ctx.affect_usage(Usage::Class(id.clone())),
        Affection::OwnedUsages => ctx.affect_query(UsageQuery::OwnedBy(id.clone())),
        Affection::ClassUsagesOutsideHierarchy => {
            ctx.affect_usage_with(Usage::Class(id.clone()), Constraint::Inheritance(id.clone()))
        }
        Affection::ClassUsagesOutsidePackage => ctx.affect_usage_with(
            Usage::Class(id.clone()),
            Constraint::Package(id.package_name().to_string()),
        ),
        Affection::SyntheticClassUsages => {
            ctx.affect_usage_with(Usage::Class(id.clone()), Constraint::SyntheticOnly)
        }
        Affection::InstantiationUsages => ctx.affect_usage(Usage::ClassNew(id.clone())),
        Affection::SameShortNameDependents => {
            if change.now.is_anonymous() || change.now.is_local() {
                return;
            }
            let short_name = ReferenceId::new(id.short_name());
            let mut namesakes: BTreeSet<&ReferenceId> = state
                .index(IndexKind::ClassShortNames)
                .dependencies(&short_name)
                .collect();
            namesakes.insert(id);
            let dependents: BTreeSet<&ReferenceId> = namesakes
                .into_iter()
                .flat_map(|namesake| state.depending_nodes(namesake))
                .collect();
            for dependent in dependents {
                for source in state.sources_of(dependent) {
                    let reason = "Dependent of a unit with the same short name";
                    ctx.affect_source_forced(source, reason);
                }
            }
        }
        Affection::DuplicateSources => {
            let delta = ctx.delta();
            let sources: Vec<_> = state.sources_of(id).chain(delta.sources_of(id)).collect();
            for source in sources {
                ctx.affect_source_forced(source, "Duplicate definition");
            }
        }
        Affection::Subclasses => {
            for sub in present.all_subclasses(id) {
                ctx.affect_node_sources(&sub, "Subclass");
            }
        }
        Affection::SubclassUsages => {
            for sub in present.with_all_subclasses(id) {
                ctx.affect_usage(Usage::Class(sub.clone()));
                ctx.affect_usage(Usage::ImportStaticOnDemand(sub));
            }
        }
        Affection::RemovedSupertypeBounds => {
            if change.now.is_anonymous() {
                return;
            }
            let remaining = future.all_supertypes(id);
            for sup in present.all_supertypes(id) {
                if !remaining.contains(&sup) {
                    ctx.affect_usage(Usage::ClassAsGenericBound(sup));
                }
            }
        }
        Affection::ThrowingMethodUsages => {
            let dependents: Vec<ReferenceId> = state.depending_nodes(id).cloned().collect();
            for dependent in dependents {
                for unit in present.nodes(&dependent) {
                    for method in unit.methods() {
                        if method.exceptions.contains(id) {
                            ctx.affect_usage(method.create_usage(&dependent));
                        }
                    }
                }
            }
        }
        Affection::AnnotationTargetUsages => {
            let targets: BTreeSet<ElemType> = change
                .past
                .targets()
                .difference(change.now.targets())
                .copied()
                .collect();
            ctx.affect_query(UsageQuery::AnnotationTargets {
                annotation: id.clone(),
                targets,
            });
        }
        Affection::AnnotationArgumentUsages => {
            if let Member::Method(method, _) = change.member {
                ctx.affect_query(UsageQuery::AnnotationWithoutArgument {
                    annotation: id.clone(),
                    argument: method.name.clone(),
                });
            }
        }
        Affection::LambdaInstantiations => {
            for sub in present.with_all_subclasses(id) {
                if present.is_lambda_target(&sub) || future.is_lambda_target(&sub) {
                    ctx.affect_usage(Usage::ClassNew(sub));
                }
            }
        }
        Affection::MemberUsages => affect_member_usages(ctx, present, change, None),
        Affection::MemberUsagesOutsidePackage => {
            let constraint = Constraint::Package(id.package_name().to_string());
            affect_member_usages(ctx, present, change, Some(constraint));
        }
        Affection::MemberUsagesOutsideHierarchy => {
            let constraint = Constraint::Inheritance(id.clone());
            affect_member_usages(ctx, present, change, Some(constraint));
        }
        Affection::StaticImportUsages => {
            let name = match change.member {
                Member::Method(method, _) if !method.is_private() => &method.name,
                Member::Field(field, _) if !field.is_private() => &field.name,
                _ => return,
            };
            for owner in member_owners(present, change) {
                ctx.affect_usage(Usage::ImportStaticMember {
                    owner,
                    name: name.clone(),
                });
            }
        }
        Affection::StaticOnDemandImportUsages => {
            for owner in member_owners(present, change) {
                ctx.affect_usage(Usage::ImportStaticOnDemand(owner));
            }
        }
        Affection::SameNameMethodUsages => {
            let Member::Method(method, _) = change.member else {
                return;
            };
            ctx.affect_query(UsageQuery::SameNameMethod {
                owner: id.clone(),
                name: method.name.clone(),
            });
            if !method.is_constructor() {
                for sub in present.collect_subclasses_without_method(id, method) {
                    ctx.affect_scope(sub.clone());
                    ctx.affect_query(UsageQuery::SameNameMethod {
                        owner: sub,
                        name: method.name.clone(),
                    });
                }
            }
        }
        Affection::LessSpecificOverloads => {
            let Member::Method(added, _) = change.member else {
                return;
            };
            let mut declaring = vec![id.clone()];
            declaring.extend(future.all_supertypes(id));
            let inheriting = present.collect_subclasses_without_method(id, added);
            for unit in declaring.iter().flat_map(|owner| future.nodes(owner)) {
                for overload in unit.methods() {
                    if overload.name != added.name
                        || overload.is_same(added)
                        || overload.params.len() != added.params.len()
                    {
                        continue;
                    }
                    if is_more_specific(added, overload, future) {
                        ctx.affect_usage(overload.create_usage(id));
                        for sub in &inheriting {
                            ctx.affect_usage(overload.create_usage(sub));
                        }
                    }
                }
            }
        }
        Affection::OverridingMembers => {
            let Member::Method(added, _) = change.member else {
                return;
            };
            for (unit, _) in present.overriding_methods(id, |m| m.is_same(added)) {
                ctx.affect_node_sources(unit.id(), "Subclass overriding an added method");
            }
            let inheriting = present.collect_subclasses_without_method(id, added);
            let overridden = future.overridden_methods(id, |m| m.is_same(added) && !m.is_private());
            for (_, overridden) in overridden {
                ctx.affect_usage(overridden.create_usage(id));
                for sub in &inheriting {
                    ctx.affect_usage(overridden.create_usage(sub));
                }
            }
        }
        Affection::LocalOverriders => {
            let Member::Method(added, _) = change.member else {
                return;
            };
            for sub in present.all_subclasses(id) {
                let hides_outer = present.nodes(&sub).iter().any(|unit| {
                    (unit.is_local() || unit.is_anonymous())
                        && unit.outer().is_some_and(|outer| {
                            present
                                .nodes(outer)
                                .iter()
                                .any(|o| o.methods().iter().any(|m| m.name == added.name))
                        })
                });
                if hides_outer {
                    ctx.affect_node_sources(&sub, "Local subclass calling an outer method");
                }
            }
        }
        Affection::OverridingSources => {
            let Member::Method(method, _) = change.member else {
                return;
            };
            for (unit, _) in present.overriding_methods(id, |m| m.is_same(method)) {
                ctx.affect_node_sources(unit.id(), "Subclass overriding a changed method");
            }
        }
        Affection::AbstractImplementors => {
            let Member::Method(method, _) = change.member else {
                return;
            };
            if method.is_abstract() {
                return;
            }
            let implements_abstract = !future
                .overridden_methods(id, |m| m.is_same(method) && m.is_abstract())
                .is_empty();
            if implements_abstract {
                for sub in present.collect_subclasses_without_method(id, method) {
                    if present.nodes(&sub).iter().any(|unit| !unit.is_abstract()) {
                        let reason = "Subclass inheriting a removed implementation";
                        ctx.affect_node_sources(&sub, reason);
                    }
                }
            }
        }
        Affection::OverloadUsages => {
            let Member::Method(past, _) = change.member else {
                return;
            };
            let constraint = if past.is_package_local() {
                Some(Constraint::Package(id.package_name().to_string()))
            } else if past.flags.is_protected() {
                Some(Constraint::Inheritance(id.clone()))
            } else {
                None
            };
            for overload in change.now.methods() {
                if overload.name != past.name || overload.is_same(past) {
                    continue;
                }
                let mut owners = vec![id.clone()];
                owners.extend(present.collect_subclasses_without_method(id, overload));
                for owner in owners {
                    let usage = overload.create_usage(&owner);
                    match &constraint {
                        Some(c) => ctx.affect_usage_with(usage, c.clone()),
                        None => ctx.affect_usage(usage),
                    }
                }
            }
        }
        Affection::HidingSubclasses => {
            for sub in present.all_subclasses(id) {
                let nested = present
                    .nodes(&sub)
                    .iter()
                    .any(|unit| unit.is_inner() || unit.is_local() || unit.is_anonymous());
                if nested {
                    let reason = "Nested subclass where an added field may hide an outer one";
                    ctx.affect_node_sources(&sub, reason);
                }
            }
        }
        Affection::SubclassImportScope => {
            let Member::Field(field, _) = change.member else {
                return;
            };
            let inheriting = present.collect_subclasses_without_field(id, field);
            if field.is_static() {
                ctx.affect_usage(Usage::ImportStaticOnDemand(id.clone()));
                for sub in &inheriting {
                    ctx.affect_usage(Usage::ImportStaticOnDemand(sub.clone()));
                }
            }
            for sub in inheriting {
                ctx.affect_scope(sub);
            }
        }
        Affection::FieldUsagesViaSubclasses => {
            let Member::Field(field, _) = change.member else {
                return;
            };
            ctx.affect_query(UsageQuery::FieldViaSubclasses {
                name: field.name.clone(),
                owners: present.with_all_subclasses(id),
            });
        }
        Affection::InlinedConstantUsages => {
            let Member::Field(field, _) = change.member else {
                return;
            };
            for owner in member_owners(present, change) {
                ctx.affect_usage(field.create_inlined_usage(&owner));
            }
        }
        Affection::FieldAssignUsages => {
            let Member::Field(field, _) = change.member else {
                return;
            };
            for owner in member_owners(present, change) {
                ctx.affect_usage(field.create_assign_usage(&owner));
            }
        }
        Affection::NonIncremental => affect_on_non_incremental_change(ctx, present, change),
    }
}

/// The unit itself plus the subclasses that inherit the member.
fn member_owners(present: &GraphView<'_>, change: &Change<'_>) -> Vec<ReferenceId> {
    let id = change.id();
    let mut owners = vec![id.clone()];
    match change.member {
        Member::Unit => {}
        Member::Method(method, _) => {
            owners.extend(present.collect_subclasses_without_method(id, method))
        }
        Member::Field(field, _) => {
            owners.extend(present.collect_subclasses_without_field(id, field))
        }
    }
    owners
}

fn affect_member_usages<'a>(
    ctx: &mut DifferentiateContext<'a>,
    present: &GraphView<'a>,
    change: &Change<'a>,
    constraint: Option<Constraint>,
) {
    let mut usages = Vec::new();
    for owner in member_owners(present, change) {
        match change.member {
            Member::Unit => usages.push(Usage::Class(owner)),
            Member::Method(method, _) => usages.push(method.create_usage(&owner)),
            Member::Field(field, _) => {
                usages.push(field.create_usage(&owner));
                usages.push(field.create_assign_usage(&owner));
                usages.push(field.create_inlined_usage(&owner));
            }
        }
    }
    for usage in usages {
        match &constraint {
            Some(c) => ctx.affect_usage_with(usage, c.clone()),
            None => ctx.affect_usage(usage),
        }
    }
}

/// A public element gives up on incremental compilation; narrower elements
/// bound their possible users to subclasses and the same package.
fn affect_on_non_incremental_change<'a>(
    ctx: &mut DifferentiateContext<'a>,
    present: &GraphView<'a>,
    change: &Change<'a>,
) {
    let id = change.id();
    let access = change.widest_access();
    if access.is_public() {
        ctx.non_incremental(&format!("{} in public {}", change.kind, id));
        return;
    }
    if access.is_protected() {
        for sub in present.all_subclasses(id) {
            ctx.affect_node_sources(&sub, "Subclass of a non-incrementally changed unit");
        }
    }
    let package = id.package_name();
    let state = ctx.state();
    let neighbours: Vec<ReferenceId> = state
        .node_sources
        .keys()
        .filter(|other| other.package_name() == package)
        .cloned()
        .collect();
    for neighbour in neighbours {
        ctx.affect_node_sources(&neighbour, "Same package as a non-incrementally changed unit");
    }
}

/// Every parameter of `candidate` is the same as or a subtype of the
/// corresponding parameter of `overload`.
fn is_more_specific(candidate: &Method, overload: &Method, future: &GraphView<'_>) -> bool {
    candidate
        .params
        .iter()
        .zip(&overload.params)
        .all(|(c, o)| {
            let (c, o) = (ReferenceId::new(c.as_str()), ReferenceId::new(o.as_str()));
            c == o || future.is_inheritor(&c, &o)
        })
}
