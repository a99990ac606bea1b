//! Hierarchy and member lookups over the stored graph, either as committed
//! or as it will look once a delta is integrated.

use crate::graph::GraphState;
use crate::index::IndexKind;
use crate::Delta;
use depgraph_core::{Field, Method, ReferenceId, Unit};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub(crate) struct GraphView<'a> {
    state: &'a GraphState,
    delta: Option<&'a Delta>,
    delta_nodes: BTreeMap<&'a ReferenceId, Vec<&'a Unit>>,
}

impl<'a> GraphView<'a> {
    /// The committed snapshot.
    pub fn present(state: &'a GraphState) -> Self {
        Self {
            state,
            delta: None,
            delta_nodes: BTreeMap::new(),
        }
    }

    /// The snapshot with `delta` applied.
    pub fn future(state: &'a GraphState, delta: &'a Delta) -> Self {
        let mut delta_nodes: BTreeMap<&'a ReferenceId, Vec<&'a Unit>> = BTreeMap::new();
        for (_, unit) in delta.all_nodes() {
            delta_nodes.entry(unit.id()).or_default().push(unit);
        }
        Self {
            state,
            delta: Some(delta),
            delta_nodes,
        }
    }

    /// Live units carrying `id`.
    pub fn nodes(&self, id: &ReferenceId) -> Vec<&'a Unit> {
        let state = self.state;
        let mut nodes: Vec<&'a Unit> = state
            .shadows(id)
            .into_iter()
            .filter(|(source, _)| self.delta.map_or(true, |delta| !delta.is_processed(source)))
            .map(|(_, unit)| unit)
            .collect();
        if let Some(units) = self.delta_nodes.get(id) {
            nodes.extend(units.iter().copied());
        }
        nodes
    }

    pub fn is_known(&self, id: &ReferenceId) -> bool {
        !self.nodes(id).is_empty()
    }

    pub fn direct_subclasses(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut candidates: BTreeSet<ReferenceId> = self
            .state
            .index(IndexKind::DirectSubclasses)
            .dependencies(id)
            .cloned()
            .collect();
        if self.delta.is_some() {
            candidates.extend(
                self.delta_nodes
                    .values()
                    .flatten()
                    .filter(|unit| unit.supertypes().any(|s| s == id))
                    .map(|unit| unit.id().clone()),
            );
            candidates.retain(|candidate| {
                self.nodes(candidate)
                    .iter()
                    .any(|unit| unit.supertypes().any(|s| s == id))
            });
        }
        candidates
    }

    /// Transitive subtypes of `id`, excluding `id`.
    pub fn all_subclasses(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for sub in self.direct_subclasses(&current) {
                if sub != *id && result.insert(sub.clone()) {
                    queue.push_back(sub);
                }
            }
        }
        result
    }

    pub fn with_all_subclasses(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut result = self.all_subclasses(id);
        result.insert(id.clone());
        result
    }

    /// Transitive supertypes of `id` known or referenced by the graph.
    pub fn all_supertypes(&self, id: &ReferenceId) -> BTreeSet<ReferenceId> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for unit in self.nodes(&current) {
                for sup in unit.supertypes() {
                    if sup != id && result.insert(sup.clone()) {
                        queue.push_back(sup.clone());
                    }
                }
            }
        }
        result
    }

    pub fn is_inheritor(&self, id: &ReferenceId, base: &ReferenceId) -> bool {
        id == base || self.all_supertypes(id).contains(base)
    }

    /// Some supertype lies outside the graph, so its members are unknown.
    pub fn inherits_from_library(&self, id: &ReferenceId) -> bool {
        self.all_supertypes(id).iter().any(|sup| !self.is_known(sup))
    }

    pub fn overridden_methods(
        &self,
        id: &ReferenceId,
        pred: impl Fn(&Method) -> bool,
    ) -> Vec<(&'a Unit, &'a Method)> {
        self.all_supertypes(id)
            .iter()
            .flat_map(|sup| self.nodes(sup))
            .flat_map(|unit| unit.methods().iter().map(move |m| (unit, m)))
            .filter(|&(_, m)| pred(m))
            .collect()
    }

    pub fn overriding_methods(
        &self,
        id: &ReferenceId,
        pred: impl Fn(&Method) -> bool,
    ) -> Vec<(&'a Unit, &'a Method)> {
        self.all_subclasses(id)
            .iter()
            .flat_map(|sub| self.nodes(sub))
            .flat_map(|unit| unit.methods().iter().map(move |m| (unit, m)))
            .filter(|&(_, m)| pred(m))
            .collect()
    }

    /// Whether a supertype may declare a matching method. Library supertypes
    /// are assumed to.
    pub fn has_overridden_methods(&self, id: &ReferenceId, pred: impl Fn(&Method) -> bool) -> bool {
        !self.overridden_methods(id, pred).is_empty() || self.inherits_from_library(id)
    }

    /// Subclasses inheriting `method` from `id`; the walk stops at subclasses
    /// redeclaring it.
    pub fn collect_subclasses_without_method(
        &self,
        id: &ReferenceId,
        method: &Method,
    ) -> BTreeSet<ReferenceId> {
        self.collect_subclasses_without(id, |unit| unit.find_method(method).is_some())
    }

    pub fn collect_subclasses_without_field(
        &self,
        id: &ReferenceId,
        field: &Field,
    ) -> BTreeSet<ReferenceId> {
        self.collect_subclasses_without(id, |unit| unit.field(&field.name).is_some())
    }

    fn collect_subclasses_without(
        &self,
        id: &ReferenceId,
        redeclares: impl Fn(&Unit) -> bool,
    ) -> BTreeSet<ReferenceId> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for sub in self.direct_subclasses(&current) {
                if sub == *id || result.contains(&sub) {
                    continue;
                }
                if self.nodes(&sub).iter().any(|&unit| redeclares(unit)) {
                    continue;
                }
                result.insert(sub.clone());
                queue.push_back(sub);
            }
        }
        result
    }

    pub fn is_lambda_target(&self, id: &ReferenceId) -> bool {
        self.nodes(id).iter().any(|unit| unit.is_lambda_target())
    }
}
