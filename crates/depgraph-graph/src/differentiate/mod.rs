//! Impact analysis of a [`Delta`] against the committed graph.
//!
//! Units of every processed source are grouped by id with the units the delta
//! brings, each pair is compared structurally, and the resulting changes are
//! mapped through the rule table to affected usages. Those are matched against
//! the units depending on the changed ids to find the sources to recompile.

mod context;
mod diff;
mod rules;
mod strategy;
mod view;

pub use context::{Constraint, UsageQuery};
pub use rules::{rule, Affection, ChangeKind};

use crate::graph::GraphState;
use crate::Delta;
use context::DifferentiateContext;
use depgraph_core::{
    AffectionDepth, DepGraphError, DifferentiateConfig, NodeSource, ReferenceId, Result, Unit,
};
use diff::UnitDiff;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use strategy::Change;
use tracing::{debug, info};
use view::GraphView;

/// Selects sources by identity or by path prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SourceFilter {
    #[default]
    All,
    Sources(BTreeSet<NodeSource>),
    /// Sources whose path starts with the prefix, e.g. a module root.
    Under(String),
}

impl SourceFilter {
    pub fn accepts(&self, source: &NodeSource) -> bool {
        match self {
            SourceFilter::All => true,
            SourceFilter::Sources(sources) => sources.contains(source),
            SourceFilter::Under(prefix) => source.path().starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferentiateParameters {
    /// When false only the integrate instructions are produced.
    pub calculate_affected: bool,
    pub process_constants_incrementally: bool,
    pub affection_depth: AffectionDepth,
    /// Sources compiled together with the delta. Only these count when
    /// looking for duplicate definitions of an added unit.
    pub current_chunk: SourceFilter,
    /// Sources that may be reported as affected by name.
    pub affection_filter: SourceFilter,
}

impl Default for DifferentiateParameters {
    fn default() -> Self {
        Self {
            calculate_affected: true,
            process_constants_incrementally: true,
            affection_depth: AffectionDepth::Direct,
            current_chunk: SourceFilter::All,
            affection_filter: SourceFilter::All,
        }
    }
}

impl DifferentiateParameters {
    pub fn from_config(config: &DifferentiateConfig) -> Self {
        Self {
            calculate_affected: config.calculate_affected,
            process_constants_incrementally: config.process_constants_incrementally,
            affection_depth: config.affection_depth,
            ..Self::default()
        }
    }

    pub fn belongs_to_current_chunk(&self, source: &NodeSource) -> bool {
        self.current_chunk.accepts(source)
    }

    pub fn with_current_chunk(mut self, chunk: SourceFilter) -> Self {
        self.current_chunk = chunk;
        self
    }

    pub fn with_affection_filter(mut self, filter: SourceFilter) -> Self {
        self.affection_filter = filter;
        self
    }

    pub fn with_calculate_affected(mut self, calculate: bool) -> Self {
        self.calculate_affected = calculate;
        self
    }

    pub fn with_process_constants_incrementally(mut self, incrementally: bool) -> Self {
        self.process_constants_incrementally = incrementally;
        self
    }

    pub fn with_affection_depth(mut self, depth: AffectionDepth) -> Self {
        self.affection_depth = depth;
        self
    }
}

/// Outcome of [`DependencyGraph::differentiate`](crate::DependencyGraph::differentiate).
///
/// Owns the delta it was computed from; integrating the result applies that
/// delta.
#[derive(Debug, Clone)]
pub struct DifferentiateResult {
    delta: Delta,
    graph_version: u64,
    affected_sources: BTreeSet<NodeSource>,
    incremental: bool,
    deleted_nodes: BTreeSet<ReferenceId>,
}

impl DifferentiateResult {
    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    /// Graph version the result was computed against.
    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    /// Sources outside the increment that must be recompiled.
    pub fn affected_sources(&self) -> &BTreeSet<NodeSource> {
        &self.affected_sources
    }

    /// False means the caller has to fall back to a full rebuild.
    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    /// Ids no source will contribute once the result is integrated.
    pub fn deleted_nodes(&self) -> &BTreeSet<ReferenceId> {
        &self.deleted_nodes
    }

    pub fn into_delta(self) -> Delta {
        self.delta
    }
}

type Grouped<'a> = BTreeMap<&'a ReferenceId, Vec<(&'a NodeSource, &'a Unit)>>;

fn group_before<'a>(state: &'a GraphState, delta: &'a Delta) -> Grouped<'a> {
    let mut before: Grouped<'a> = BTreeMap::new();
    for source in delta.processed_sources() {
        for id in state.node_ids(source) {
            if let Some(unit) = state.node(source, id) {
                before.entry(id).or_default().push((source, unit));
            }
        }
    }
    before
}

fn group_after(delta: &Delta) -> Grouped<'_> {
    let mut after: Grouped<'_> = BTreeMap::new();
    for (source, unit) in delta.all_nodes() {
        after.entry(unit.id()).or_default().push((source, unit));
    }
    after
}

/// A live unit carrying `id` from a source the delta leaves alone.
fn surviving_shadow<'a>(
    state: &'a GraphState,
    delta: &Delta,
    id: &ReferenceId,
) -> Option<&'a Unit> {
    state
        .shadows(id)
        .into_iter()
        .find(|(source, _)| !delta.is_processed(source))
        .map(|(_, unit)| unit)
}

fn collect_changes<'a>(
    state: &'a GraphState,
    delta: &'a Delta,
    before: &Grouped<'a>,
    after: &Grouped<'a>,
    present: &GraphView<'a>,
    future: &GraphView<'a>,
    params: &DifferentiateParameters,
) -> Vec<Change<'a>> {
    let ids: BTreeSet<&'a ReferenceId> = before.keys().chain(after.keys()).copied().collect();
    let mut changes = Vec::new();

    for id in ids {
        let past = before.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let now = after.get(id).map(Vec::as_slice).unwrap_or(&[]);

        match (past.first(), now.is_empty()) {
            (Some(&(_, removed)), true) => match surviving_shadow(state, delta, id) {
                Some(shadow) => {
                    debug!("{} survives through a shadow, diffing against it", id);
                    for &(_, unit) in past {
                        let diff = UnitDiff::new(unit, shadow);
                        if !diff.unchanged() {
                            let classified =
                                strategy::classify_changed(&diff, present, future, params);
                            changes.extend(classified);
                        }
                    }
                }
                None => changes.extend(strategy::classify_removed(removed)),
            },
            (None, _) => {
                for &(_, unit) in now {
                    changes.extend(strategy::classify_added(unit, state, delta, params));
                }
            }
            (Some(&(_, fallback)), false) => {
                for &(source, unit) in now {
                    let previous = past
                        .iter()
                        .find(|(s, _)| *s == source)
                        .map(|&(_, u)| u)
                        .unwrap_or(fallback);
                    let diff = UnitDiff::new(previous, unit);
                    if !diff.unchanged() {
                        changes.extend(strategy::classify_changed(&diff, present, future, params));
                    }
                }
            }
        }
    }
    changes
}

/// Ids of the processed sources no remaining source contributes.
fn deleted_ids(
    state: &GraphState,
    delta: &Delta,
    before: &Grouped<'_>,
    after: &Grouped<'_>,
) -> BTreeSet<ReferenceId> {
    before
        .keys()
        .filter(|id| !after.contains_key(*id) && surviving_shadow(state, delta, id).is_none())
        .map(|id| (*id).clone())
        .collect()
}

/// Fold in every source depending on an already affected one.
fn expand_transitively(state: &GraphState, delta: &Delta, affected: &mut BTreeSet<NodeSource>) {
    let mut queue: VecDeque<NodeSource> = affected.iter().cloned().collect();
    while let Some(source) = queue.pop_front() {
        let ids: Vec<&ReferenceId> = state.node_ids(&source).collect();
        for id in ids {
            for dependent in state.depending_nodes(id) {
                for next in state.sources_of(dependent) {
                    if delta.is_compiled(next) || delta.is_deleted(next) {
                        continue;
                    }
                    if affected.insert(next.clone()) {
                        debug!("{} depends on affected {}", next, source);
                        queue.push_back(next.clone());
                    }
                }
            }
        }
    }
}

fn has_generated_units(state: &GraphState, source: &NodeSource) -> bool {
    state
        .node_ids(source)
        .filter_map(|id| state.node(source, id))
        .any(Unit::is_generated)
}

pub(crate) fn run(
    state: &GraphState,
    version: u64,
    delta: Delta,
    params: &DifferentiateParameters,
) -> Result<DifferentiateResult> {
    delta.validate()?;
    if delta.base_version() != version {
        return Err(DepGraphError::StaleResult {
            computed: delta.base_version(),
            current: version,
        });
    }

    let (deleted_nodes, affected_sources, incremental) = {
        let before = group_before(state, &delta);
        let after = group_after(&delta);
        let deleted_nodes = deleted_ids(state, &delta, &before, &after);

        if params.calculate_affected {
            let present = GraphView::present(state);
            let future = GraphView::future(state, &delta);
            let changes =
                collect_changes(state, &delta, &before, &after, &present, &future, params);

            let mut ctx = DifferentiateContext::new(state, &delta, &params.affection_filter);
            for change in &changes {
                strategy::apply(change, &mut ctx, &present, &future);
            }
            let mut affected = ctx.affected_sources(&future);
            if params.affection_depth == AffectionDepth::Transitive {
                expand_transitively(state, &delta, &mut affected);
            }

            let mut incremental = ctx.is_incremental();
            if let Some(generated) = affected.iter().find(|s| has_generated_units(state, s)) {
                debug!("Affected source {} holds generated units", generated);
                incremental = false;
            }
            info!(
                changes = changes.len(),
                affected = affected.len(),
                incremental,
                "Differentiated delta"
            );
            (deleted_nodes, affected, incremental)
        } else {
            (deleted_nodes, BTreeSet::new(), true)
        }
    };

    Ok(DifferentiateResult {
        delta,
        graph_version: version,
        affected_sources,
        incremental,
        deleted_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_filters() {
        let core = NodeSource::from("core/Dog.java");
        let plugin = NodeSource::from("plugin/Dog.java");

        assert!(SourceFilter::All.accepts(&core));

        let under = SourceFilter::Under("plugin/".to_string());
        assert!(under.accepts(&plugin));
        assert!(!under.accepts(&core));

        let listed = SourceFilter::Sources(BTreeSet::from([core.clone()]));
        assert!(listed.accepts(&core));
        assert!(!listed.accepts(&plugin));

        let params = DifferentiateParameters::default().with_current_chunk(under);
        assert!(params.belongs_to_current_chunk(&plugin));
        assert!(!params.belongs_to_current_chunk(&core));
        assert_eq!(params.affection_filter, SourceFilter::All);
    }
}
