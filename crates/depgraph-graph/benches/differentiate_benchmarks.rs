use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use depgraph_core::{AccessFlags, Method, NodeSource, ReferenceId, Unit, Usage};
use depgraph_graph::{DependencyGraph, DifferentiateParameters};
use std::hint::black_box;
use std::time::Duration;

/// Base class with `depth` levels of subclasses, `fanout` per level, plus one
/// user calling the base method per class.
fn hierarchy_sources(depth: usize, fanout: usize) -> Vec<(NodeSource, Unit)> {
    let base = ReferenceId::new("bench.Base");
    let run = Method::new("run", &[], "void").with_flags(AccessFlags::PUBLIC);
    let mut sources = vec![(
        NodeSource::from("bench/Base.java"),
        Unit::class(base.clone())
            .flags(AccessFlags::PUBLIC)
            .method(run.clone())
            .build(),
    )];

    let mut parents = vec![base.clone()];
    for level in 0..depth {
        let mut next = Vec::new();
        for (p, parent) in parents.iter().enumerate() {
            for i in 0..fanout {
                let id = ReferenceId::new(format!("bench.L{}C{}_{}", level, p, i));
                sources.push((
                    NodeSource::new(format!("bench/{}.java", id.short_name())),
                    Unit::class(id.clone()).extends(parent.clone()).build(),
                ));
                let user = ReferenceId::new(format!("users.U{}", id.short_name()));
                sources.push((
                    NodeSource::new(format!("users/{}.java", user.short_name())),
                    Unit::class(user)
                        .usage(Usage::Class(id.clone()))
                        .usage(run.create_usage(&id))
                        .build(),
                ));
                next.push(id);
            }
        }
        parents = next;
    }
    sources
}

fn create_graph(depth: usize, fanout: usize) -> DependencyGraph {
    let mut graph = DependencyGraph::in_memory().unwrap();
    let sources = hierarchy_sources(depth, fanout);
    let mut delta = graph
        .create_delta(sources.iter().map(|(source, _)| source.clone()), [], false)
        .unwrap();
    for (source, unit) in sources {
        delta.associate(source, vec![unit]).unwrap();
    }
    graph.integrate_delta(delta).unwrap();
    graph
}

fn narrowed_base() -> Unit {
    Unit::class("bench.Base")
        .flags(AccessFlags::PUBLIC)
        .method(Method::new("run", &[], "void").with_flags(AccessFlags::PROTECTED))
        .build()
}

fn bench_differentiate(c: &mut Criterion) {
    let mut group = c.benchmark_group("differentiate");
    group.measurement_time(Duration::from_secs(5));
    let params = DifferentiateParameters::default();

    for (depth, fanout) in [(2, 4), (3, 6), (4, 6)] {
        let graph = create_graph(depth, fanout);
        let label = format!("{}x{}", depth, fanout);
        group.bench_with_input(
            BenchmarkId::new("narrowed_base_method", &label),
            &graph,
            |b, graph| {
                b.iter(|| {
                    let mut delta = graph
                        .create_delta([NodeSource::from("bench/Base.java")], [], false)
                        .unwrap();
                    delta
                        .associate("bench/Base.java".into(), vec![narrowed_base()])
                        .unwrap();
                    let result = graph.differentiate(delta, &params).unwrap();
                    black_box(result.affected_sources().len())
                })
            },
        );
    }
    group.finish();
}

fn bench_integrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate");
    group.sample_size(20);

    for (depth, fanout) in [(2, 4), (3, 6)] {
        let sources = hierarchy_sources(depth, fanout);
        group.bench_with_input(
            BenchmarkId::new("full_build", format!("{}x{}", depth, fanout)),
            &sources,
            |b, sources| {
                b.iter(|| {
                    let mut graph = DependencyGraph::in_memory().unwrap();
                    let mut delta = graph
                        .create_delta(sources.iter().map(|(source, _)| source.clone()), [], false)
                        .unwrap();
                    for (source, unit) in sources {
                        delta.associate(source.clone(), vec![unit.clone()]).unwrap();
                    }
                    graph.integrate_delta(delta).unwrap();
                    black_box(graph.version())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_differentiate, bench_integrate);
criterion_main!(benches);
