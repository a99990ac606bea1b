use depgraph_core::{
    AccessFlags, AffectionDepth, ConstValue, ElemType, Field, Method, NodeSource, ReferenceId,
    RetentionPolicy, Unit, Usage,
};
use depgraph_graph::{DependencyGraph, DifferentiateParameters, DifferentiateResult, SourceFilter};
use std::collections::BTreeSet;

fn graph_with(sources: &[(&str, Vec<Unit>)]) -> DependencyGraph {
    let mut graph = DependencyGraph::in_memory().unwrap();
    let mut delta = graph
        .create_delta(sources.iter().map(|(source, _)| NodeSource::from(*source)), [], false)
        .unwrap();
    for (source, units) in sources {
        delta.associate(NodeSource::from(*source), units.clone()).unwrap();
    }
    graph.integrate_delta(delta).unwrap();
    graph
}

fn differentiate_with(
    graph: &DependencyGraph,
    compiled: &[(&str, Vec<Unit>)],
    deleted: &[&str],
    params: &DifferentiateParameters,
) -> DifferentiateResult {
    let mut delta = graph
        .create_delta(
            compiled.iter().map(|(source, _)| NodeSource::from(*source)),
            deleted.iter().map(|source| NodeSource::from(*source)),
            false,
        )
        .unwrap();
    for (source, units) in compiled {
        delta.associate(NodeSource::from(*source), units.clone()).unwrap();
    }
    graph.differentiate(delta, params).unwrap()
}

fn differentiate(
    graph: &DependencyGraph,
    compiled: &[(&str, Vec<Unit>)],
    deleted: &[&str],
) -> DifferentiateResult {
    differentiate_with(graph, compiled, deleted, &DifferentiateParameters::default())
}

fn affected(result: &DifferentiateResult) -> BTreeSet<String> {
    result
        .affected_sources()
        .iter()
        .map(|source| source.to_string())
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn cage_id() -> ReferenceId {
    ReferenceId::new("zoo.Cage")
}

fn feed(flags: AccessFlags) -> Method {
    Method::new("feed", &[], "void").with_flags(flags)
}

fn max(value: i64) -> Field {
    Field::new("MAX", "int")
        .with_flags(AccessFlags::PUBLIC | AccessFlags::STATIC | AccessFlags::FINAL)
        .with_value(ConstValue::Int(value))
}

fn cage(feed_flags: AccessFlags, max_value: i64) -> Unit {
    Unit::class("zoo.Cage")
        .flags(AccessFlags::PUBLIC)
        .method(feed(feed_flags))
        .method(Method::new("getMax", &[], "int").with_flags(AccessFlags::PUBLIC))
        .field(max(max_value))
        .build()
}

fn user(id: &str, usages: Vec<Usage>) -> Unit {
    Unit::class(id).flags(AccessFlags::PUBLIC).usages(usages).build()
}

/// Cage with two callers of `feed`, one per package, and two readers of MAX.
fn zoo(feed_flags: AccessFlags) -> DependencyGraph {
    let owner = cage_id();
    graph_with(&[
        ("Cage.java", vec![cage(feed_flags, 10)]),
        (
            "Keeper.java",
            vec![user("zoo.Keeper", vec![feed(feed_flags).create_usage(&owner)])],
        ),
        (
            "Visitor.java",
            vec![user(
                "park.Visitor",
                vec![Usage::Class(owner.clone()), feed(feed_flags).create_usage(&owner)],
            )],
        ),
        (
            "Inliner.java",
            vec![user("park.Inliner", vec![max(10).create_inlined_usage(&owner)])],
        ),
        (
            "Reader.java",
            vec![user(
                "park.Reader",
                vec![Method::new("getMax", &[], "int").create_usage(&owner)],
            )],
        ),
    ])
}

/// Animal <- Dog <- Puppy, with Walker using Dog and Tour using Walker.
fn kennel(walker_flags: AccessFlags) -> DependencyGraph {
    graph_with(&[
        ("Animal.java", vec![Unit::class("zoo.Animal").build()]),
        (
            "Dog.java",
            vec![Unit::class("zoo.Dog").extends("zoo.Animal").build()],
        ),
        (
            "Puppy.java",
            vec![Unit::class("zoo.Puppy").extends("zoo.Dog").build()],
        ),
        (
            "Walker.java",
            vec![Unit::class("park.Walker")
                .flags(walker_flags)
                .usage(Usage::Class("zoo.Dog".into()))
                .build()],
        ),
        (
            "Tour.java",
            vec![user("park.Tour", vec![Usage::Class("park.Walker".into())])],
        ),
    ])
}

#[test]
fn test_narrowed_method_affects_users_outside_package() {
    let graph = zoo(AccessFlags::PUBLIC);
    let result = differentiate(
        &graph,
        &[("Cage.java", vec![cage(AccessFlags::empty(), 10)])],
        &[],
    );

    assert_eq!(affected(&result), set(&["Visitor.java"]));
    assert!(result.is_incremental());
}

#[test]
fn test_widened_method_affects_nobody() {
    let graph = zoo(AccessFlags::empty());
    let result = differentiate(
        &graph,
        &[("Cage.java", vec![cage(AccessFlags::PUBLIC, 10)])],
        &[],
    );

    assert!(result.affected_sources().is_empty());
    assert!(result.is_incremental());
}

#[test]
fn test_changed_constant_affects_inlining_users_only() {
    let graph = zoo(AccessFlags::PUBLIC);
    let result = differentiate(
        &graph,
        &[("Cage.java", vec![cage(AccessFlags::PUBLIC, 11)])],
        &[],
    );

    assert_eq!(affected(&result), set(&["Inliner.java"]));
    assert!(result.is_incremental());
}

#[test]
fn test_changed_public_constant_can_force_full_rebuild() {
    let graph = zoo(AccessFlags::PUBLIC);
    let params = DifferentiateParameters::default().with_process_constants_incrementally(false);
    let result = differentiate_with(
        &graph,
        &[("Cage.java", vec![cage(AccessFlags::PUBLIC, 11)])],
        &[],
        &params,
    );

    assert!(!result.is_incremental());
}

#[test]
fn test_field_narrowed_to_protected_spares_subclasses() {
    let owner = cage_id();
    let size = |flags| Field::new("size", "int").with_flags(flags);
    let with_size = |flags| {
        Unit::class("zoo.Cage")
            .flags(AccessFlags::PUBLIC)
            .field(size(flags))
            .build()
    };
    let graph = graph_with(&[
        ("Cage.java", vec![with_size(AccessFlags::PUBLIC)]),
        (
            "BigCage.java",
            vec![Unit::class("park.BigCage")
                .extends("zoo.Cage")
                .usage(size(AccessFlags::PUBLIC).create_usage(&owner))
                .build()],
        ),
        (
            "Visitor.java",
            vec![user("park.Visitor", vec![size(AccessFlags::PUBLIC).create_usage(&owner)])],
        ),
        (
            "Keeper.java",
            vec![user("zoo.Keeper", vec![size(AccessFlags::PUBLIC).create_usage(&owner)])],
        ),
    ]);

    let result = differentiate(
        &graph,
        &[("Cage.java", vec![with_size(AccessFlags::PROTECTED)])],
        &[],
    );
    assert_eq!(affected(&result), set(&["Visitor.java"]));
}

#[test]
fn test_replaced_superclass_affects_subclasses_and_users() {
    let graph = kennel(AccessFlags::PUBLIC);
    let result = differentiate(
        &graph,
        &[(
            "Dog.java",
            vec![Unit::class("zoo.Dog").extends("zoo.Pet").build()],
        )],
        &[],
    );

    assert_eq!(affected(&result), set(&["Puppy.java", "Walker.java"]));
    assert!(result.is_incremental());
}

#[test]
fn test_transitive_depth_follows_dependents() {
    let graph = kennel(AccessFlags::PUBLIC);
    let params =
        DifferentiateParameters::default().with_affection_depth(AffectionDepth::Transitive);
    let result = differentiate_with(
        &graph,
        &[(
            "Dog.java",
            vec![Unit::class("zoo.Dog").extends("zoo.Pet").build()],
        )],
        &[],
        &params,
    );

    assert_eq!(
        affected(&result),
        set(&["Puppy.java", "Tour.java", "Walker.java"])
    );
}

#[test]
fn test_affected_generated_source_disables_incremental_build() {
    let graph = kennel(AccessFlags::PUBLIC | AccessFlags::GENERATED);
    let result = differentiate(
        &graph,
        &[(
            "Dog.java",
            vec![Unit::class("zoo.Dog").extends("zoo.Pet").build()],
        )],
        &[],
    );

    assert!(result.affected_sources().contains(&NodeSource::from("Walker.java")));
    assert!(!result.is_incremental());
}

#[test]
fn test_removed_unit_affects_its_users() {
    let graph = kennel(AccessFlags::PUBLIC);
    let result = differentiate(&graph, &[], &["Dog.java"]);

    assert_eq!(affected(&result), set(&["Puppy.java", "Walker.java"]));
    assert_eq!(
        result.deleted_nodes().iter().cloned().collect::<Vec<_>>(),
        vec![ReferenceId::new("zoo.Dog")]
    );
}

#[test]
fn test_removed_unit_with_identical_shadow_affects_nobody() {
    let dog = || Unit::class("zoo.Dog").extends("zoo.Animal").build();
    let graph = graph_with(&[
        ("Dog.java", vec![dog()]),
        ("DogCopy.java", vec![dog()]),
        (
            "Walker.java",
            vec![user("park.Walker", vec![Usage::Class("zoo.Dog".into())])],
        ),
    ]);
    let result = differentiate(&graph, &[], &["Dog.java"]);

    assert!(result.affected_sources().is_empty());
    assert!(result.deleted_nodes().is_empty());
}

#[test]
fn test_duplicate_definition_reports_both_sources() {
    let graph = graph_with(&[("Dog.java", vec![Unit::class("zoo.Dog").build()])]);
    let result = differentiate(
        &graph,
        &[("Stray.java", vec![Unit::class("zoo.Dog").build()])],
        &[],
    );

    assert_eq!(affected(&result), set(&["Dog.java", "Stray.java"]));
}

#[test]
fn test_added_unit_affects_dependents_of_namesakes() {
    let graph = graph_with(&[
        ("Dog.java", vec![Unit::class("zoo.Dog").build()]),
        (
            "Walker.java",
            vec![user("park.Walker", vec![Usage::Class("zoo.Dog".into())])],
        ),
        ("Tour.java", vec![user("park.Tour", vec![])]),
    ]);
    let result = differentiate(
        &graph,
        &[("Wild.java", vec![Unit::class("wild.Dog").build()])],
        &[],
    );

    assert_eq!(affected(&result), set(&["Walker.java"]));
}

#[test]
fn test_added_unit_forces_namesake_dependents_compiled_alongside() {
    let walker = || user("park.Walker", vec![Usage::Class("zoo.Dog".into())]);
    let graph = graph_with(&[
        ("Dog.java", vec![Unit::class("zoo.Dog").build()]),
        ("Walker.java", vec![walker()]),
    ]);
    let result = differentiate(
        &graph,
        &[
            ("Wild.java", vec![Unit::class("wild.Dog").build()]),
            ("Walker.java", vec![walker()]),
        ],
        &[],
    );

    assert_eq!(affected(&result), set(&["Walker.java"]));
}

#[test]
fn test_added_local_unit_leaves_namesakes_alone() {
    let graph = graph_with(&[
        ("Dog.java", vec![Unit::class("zoo.Dog").build()]),
        (
            "Walker.java",
            vec![user("park.Walker", vec![Usage::Class("zoo.Dog".into())])],
        ),
    ]);
    let result = differentiate(
        &graph,
        &[(
            "Yard.java",
            vec![
                Unit::class("wild.Yard").build(),
                Unit::class("wild.Yard$Dog")
                    .flags(AccessFlags::LOCAL)
                    .outer("wild.Yard")
                    .build(),
            ],
        )],
        &[],
    );

    assert!(result.affected_sources().is_empty());
}

#[test]
fn test_duplicates_are_looked_up_in_the_current_chunk_only() {
    let graph = graph_with(&[("core/Dog.java", vec![Unit::class("zoo.Dog").build()])]);
    let compiled = [("plugin/Dog.java", vec![Unit::class("zoo.Dog").build()])];

    let result = differentiate(&graph, &compiled, &[]);
    assert_eq!(affected(&result), set(&["core/Dog.java", "plugin/Dog.java"]));

    let params = DifferentiateParameters::default()
        .with_current_chunk(SourceFilter::Under("plugin/".to_string()));
    let result = differentiate_with(&graph, &compiled, &[], &params);
    assert!(result.affected_sources().is_empty());
    assert!(result.is_incremental());
}

#[test]
fn test_affection_filter_limits_reported_sources() {
    let graph = graph_with(&[("core/Dog.java", vec![Unit::class("zoo.Dog").build()])]);
    let params = DifferentiateParameters::default()
        .with_affection_filter(SourceFilter::Sources(BTreeSet::from([NodeSource::from(
            "plugin/Dog.java",
        )])));
    let result = differentiate_with(
        &graph,
        &[("plugin/Dog.java", vec![Unit::class("zoo.Dog").build()])],
        &[],
        &params,
    );

    assert_eq!(affected(&result), set(&["plugin/Dog.java"]));
}

#[test]
fn test_removed_protected_method_affects_nested_class_of_subclass() {
    let m = || Method::new("m", &[], "void").with_flags(AccessFlags::PROTECTED);
    let base = |methods: Vec<Method>| {
        methods
            .into_iter()
            .fold(Unit::class("a.A").flags(AccessFlags::PUBLIC), |unit, method| {
                unit.method(method)
            })
            .build()
    };
    let graph = graph_with(&[
        ("A.java", vec![base(vec![m()])]),
        (
            "Sub.java",
            vec![
                Unit::class("b.Sub")
                    .flags(AccessFlags::PUBLIC)
                    .extends("a.A")
                    .build(),
                Unit::class("b.Sub$Inner")
                    .outer("b.Sub")
                    .usage(m().create_usage(&"b.Sub".into()))
                    .build(),
            ],
        ),
    ]);

    let result = differentiate(&graph, &[("A.java", vec![base(vec![])])], &[]);
    assert_eq!(affected(&result), set(&["Sub.java"]));
    assert!(result.is_incremental());
}

#[test]
fn test_removed_package_private_field_affects_same_package_users() {
    let count = Field::new("count", "int");
    let pen = |fields: Vec<Field>| {
        fields
            .into_iter()
            .fold(Unit::class("zoo.Pen"), |unit, field| unit.field(field))
            .build()
    };
    let graph = graph_with(&[
        ("Pen.java", vec![pen(vec![count.clone()])]),
        (
            "Keeper.java",
            vec![user("zoo.Keeper", vec![count.create_usage(&"zoo.Pen".into())])],
        ),
    ]);

    let result = differentiate(&graph, &[("Pen.java", vec![pen(vec![])])], &[]);
    assert_eq!(affected(&result), set(&["Keeper.java"]));
}

#[test]
fn test_field_made_protected_and_final_affects_every_assigner() {
    let owner = cage_id();
    let count = |flags| Field::new("count", "int").with_flags(flags);
    let with_count = |flags| {
        Unit::class("zoo.Cage")
            .flags(AccessFlags::PUBLIC)
            .field(count(flags))
            .build()
    };
    let assigner = |id: &str| {
        user(id, vec![count(AccessFlags::PUBLIC).create_assign_usage(&owner)])
    };
    let graph = graph_with(&[
        ("Cage.java", vec![with_count(AccessFlags::PUBLIC)]),
        ("Keeper.java", vec![assigner("zoo.Keeper")]),
        ("Visitor.java", vec![assigner("park.Visitor")]),
        (
            "Reader.java",
            vec![user("zoo.Reader", vec![count(AccessFlags::PUBLIC).create_usage(&owner)])],
        ),
    ]);

    let result = differentiate(
        &graph,
        &[(
            "Cage.java",
            vec![with_count(AccessFlags::PROTECTED | AccessFlags::FINAL)],
        )],
        &[],
    );
    assert_eq!(affected(&result), set(&["Keeper.java", "Visitor.java"]));
}

#[test]
fn test_removed_annotation_default_affects_users_omitting_it() {
    let tag = |default: Option<i64>| {
        let mut level = Method::new("level", &[], "int")
            .with_flags(AccessFlags::PUBLIC | AccessFlags::ABSTRACT);
        if let Some(value) = default {
            level = level.with_default_value(ConstValue::Int(value));
        }
        Unit::annotation("zoo.Tag")
            .flags(AccessFlags::PUBLIC)
            .retention(RetentionPolicy::Runtime)
            .target(ElemType::Type)
            .method(level)
            .build()
    };
    let annotated = |id: &str, arg: &str| {
        user(
            id,
            vec![Usage::Annotation {
                annotation: "zoo.Tag".into(),
                used_args: vec![arg.to_string()],
                targets: vec![ElemType::Type],
            }],
        )
    };
    let graph = graph_with(&[
        ("Tag.java", vec![tag(Some(1))]),
        ("A.java", vec![annotated("park.A", "name")]),
        ("B.java", vec![annotated("park.B", "level")]),
    ]);

    let result = differentiate(&graph, &[("Tag.java", vec![tag(None)])], &[]);
    assert_eq!(affected(&result), set(&["A.java"]));
}

#[test]
fn test_affection_can_be_skipped() {
    let graph = kennel(AccessFlags::PUBLIC);
    let params = DifferentiateParameters::default().with_calculate_affected(false);
    let result = differentiate_with(&graph, &[], &["Dog.java"], &params);

    assert!(result.affected_sources().is_empty());
    assert!(result.is_incremental());
    assert_eq!(result.deleted_nodes().len(), 1);
}

#[test]
fn test_differentiate_then_integrate_matches_delta() {
    let mut graph = kennel(AccessFlags::PUBLIC);
    let result = differentiate(
        &graph,
        &[(
            "Dog.java",
            vec![Unit::class("zoo.Dog").extends("zoo.Pet").build()],
        )],
        &[],
    );
    graph.integrate(&result).unwrap();

    assert!(graph
        .direct_subclasses(&"zoo.Animal".into())
        .unwrap()
        .is_empty());
    assert_eq!(
        graph
            .direct_subclasses(&"zoo.Pet".into())
            .unwrap()
            .into_iter()
            .collect::<Vec<_>>(),
        vec![ReferenceId::new("zoo.Dog")]
    );
}
