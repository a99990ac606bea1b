use super::view::GraphView;
use super::SourceFilter;
use crate::graph::GraphState;
use crate::Delta;
use depgraph_core::{ElemType, NodeSource, ReferenceId, Unit, Usage};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Restricts an affected usage to some of its users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Users outside the package.
    Package(String),
    /// Users that neither share the package of `class` nor inherit from it.
    Inheritance(ReferenceId),
    /// Synthetic users only.
    SyntheticOnly,
}

impl Constraint {
    pub(crate) fn admits(&self, user: &Unit, future: &GraphView<'_>) -> bool {
        match self {
            Constraint::Package(package) => user.package_name() != package,
            Constraint::Inheritance(class) => {
                user.package_name() != class.package_name()
                    && !future.is_inheritor(user.id(), class)
            }
            Constraint::SyntheticOnly => user.is_synthetic(),
        }
    }
}

/// Usage predicates that cannot be expressed as a concrete [`Usage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageQuery {
    /// Calls of any method named `name` on `owner`.
    SameNameMethod { owner: ReferenceId, name: String },
    /// Applications of `annotation` at any of `targets`.
    AnnotationTargets {
        annotation: ReferenceId,
        targets: BTreeSet<ElemType>,
    },
    /// Applications of `annotation` not supplying `argument`.
    AnnotationWithoutArgument {
        annotation: ReferenceId,
        argument: String,
    },
    /// Field accesses named `name` through any of `owners`.
    FieldViaSubclasses {
        name: String,
        owners: BTreeSet<ReferenceId>,
    },
    /// Any usage owned by the unit.
    OwnedBy(ReferenceId),
}

impl UsageQuery {
    pub fn matches(&self, usage: &Usage) -> bool {
        match (self, usage) {
            (
                UsageQuery::SameNameMethod { owner, name },
                Usage::Method {
                    owner: o, name: n, ..
                },
            ) => owner == o && name == n,
            (
                UsageQuery::AnnotationTargets {
                    annotation,
                    targets,
                },
                Usage::Annotation {
                    annotation: a,
                    targets: used,
                    ..
                },
            ) => annotation == a && used.iter().any(|t| targets.contains(t)),
            (
                UsageQuery::AnnotationWithoutArgument {
                    annotation,
                    argument,
                },
                Usage::Annotation {
                    annotation: a,
                    used_args,
                    ..
                },
            ) => annotation == a && !used_args.contains(argument),
            (
                UsageQuery::FieldViaSubclasses { name, owners },
                Usage::Field { owner, name: n, .. }
                | Usage::FieldAssign { owner, name: n, .. }
                | Usage::InlinedConstant { owner, name: n },
            ) => name == n && owners.contains(owner),
            (UsageQuery::OwnedBy(id), usage) => usage.owner() == id,
            _ => false,
        }
    }

    /// Units whose dependents the query must be evaluated against.
    pub fn owners(&self) -> Vec<&ReferenceId> {
        match self {
            UsageQuery::SameNameMethod { owner, .. } => vec![owner],
            UsageQuery::AnnotationTargets { annotation, .. }
            | UsageQuery::AnnotationWithoutArgument { annotation, .. } => vec![annotation],
            UsageQuery::FieldViaSubclasses { owners, .. } => owners.iter().collect(),
            UsageQuery::OwnedBy(id) => vec![id],
        }
    }
}

/// Accumulates the outcome of rule evaluation for one differentiate call.
pub(crate) struct DifferentiateContext<'a> {
    state: &'a GraphState,
    delta: &'a Delta,
    filter: &'a SourceFilter,
    /// `None` marks an unconstrained usage.
    usages: BTreeMap<Usage, Option<Vec<Constraint>>>,
    queries: Vec<UsageQuery>,
    scope: BTreeSet<ReferenceId>,
    affected: BTreeSet<NodeSource>,
    forced: BTreeSet<NodeSource>,
    incremental: bool,
}

impl<'a> DifferentiateContext<'a> {
    pub fn new(state: &'a GraphState, delta: &'a Delta, filter: &'a SourceFilter) -> Self {
        Self {
            state,
            delta,
            filter,
            usages: BTreeMap::new(),
            queries: Vec::new(),
            scope: BTreeSet::new(),
            affected: BTreeSet::new(),
            forced: BTreeSet::new(),
            incremental: true,
        }
    }

    pub fn state(&self) -> &'a GraphState {
        self.state
    }

    pub fn delta(&self) -> &'a Delta {
        self.delta
    }

    pub fn affect_usage(&mut self, usage: Usage) {
        debug!("Affecting {}", usage);
        self.usages.insert(usage, None);
    }

    pub fn affect_usage_with(&mut self, usage: Usage, constraint: Constraint) {
        debug!("Affecting {} constrained to {:?}", usage, constraint);
        match self.usages.get_mut(&usage) {
            Some(None) => {}
            Some(Some(constraints)) => {
                if !constraints.contains(&constraint) {
                    constraints.push(constraint);
                }
            }
            None => {
                self.usages.insert(usage, Some(vec![constraint]));
            }
        }
    }

    pub fn affect_query(&mut self, query: UsageQuery) {
        debug!("Affecting usages matching {:?}", query);
        if !self.queries.contains(&query) {
            self.queries.push(query);
        }
    }

    /// Make dependents of `id` candidates for usage matching.
    pub fn affect_scope(&mut self, id: ReferenceId) {
        self.scope.insert(id);
    }

    /// Report the sources of `id` that are not part of the increment.
    pub fn affect_node_sources(&mut self, id: &ReferenceId, reason: &str) {
        for source in self.state.sources_of(id) {
            if self.delta.is_compiled(source)
                || self.delta.is_deleted(source)
                || !self.filter.accepts(source)
            {
                continue;
            }
            if self.affected.insert(source.clone()) {
                debug!("{}: {} affects {}", reason, id, source);
            }
        }
    }

    /// Report `source` even when it is compiled in this increment. Deleted
    /// sources are never reported.
    pub fn affect_source_forced(&mut self, source: &NodeSource, reason: &str) {
        if self.delta.is_deleted(source) || !self.filter.accepts(source) {
            return;
        }
        if self.forced.insert(source.clone()) {
            debug!("{}: forcing {}", reason, source);
        }
    }

    pub fn non_incremental(&mut self, reason: &str) {
        debug!("Non-incremental change: {}", reason);
        self.incremental = false;
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    pub fn is_node_affected(&self, user: &Unit, future: &GraphView<'_>) -> bool {
        user.usages().iter().any(|usage| {
            let by_usage = match self.usages.get(usage) {
                Some(None) => true,
                Some(Some(constraints)) => constraints.iter().any(|c| c.admits(user, future)),
                None => false,
            };
            by_usage || self.queries.iter().any(|query| query.matches(usage))
        })
    }

    /// Ids whose dependents are matched against the affected usages.
    fn candidate_scope(&self) -> BTreeSet<ReferenceId> {
        let mut scope = self.scope.clone();
        scope.extend(self.usages.keys().map(|usage| usage.owner().clone()));
        for query in &self.queries {
            scope.extend(query.owners().into_iter().cloned());
        }
        scope
    }

    /// Resolve affected usages to the sources of their users, then add the
    /// directly reported and forced sources.
    pub fn affected_sources(&self, future: &GraphView<'_>) -> BTreeSet<NodeSource> {
        let mut candidates = BTreeSet::new();
        for id in self.candidate_scope() {
            candidates.extend(self.state.depending_nodes(&id).cloned());
        }

        let mut affected = self.affected.clone();
        for candidate in &candidates {
            for (source, user) in self.state.shadows(candidate) {
                if self.delta.is_compiled(source) || self.delta.is_deleted(source) {
                    continue;
                }
                if !affected.contains(source) && self.is_node_affected(user, future) {
                    debug!("{} of {} uses an affected element", candidate, source);
                    affected.insert(source.clone());
                }
            }
        }
        affected.extend(self.forced.iter().cloned());
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_matching() {
        let query = UsageQuery::AnnotationWithoutArgument {
            annotation: "zoo.Tag".into(),
            argument: "level".into(),
        };
        let without = Usage::Annotation {
            annotation: "zoo.Tag".into(),
            used_args: vec!["name".into()],
            targets: vec![ElemType::Type],
        };
        let with = Usage::Annotation {
            annotation: "zoo.Tag".into(),
            used_args: vec!["level".into()],
            targets: vec![ElemType::Type],
        };
        assert!(query.matches(&without));
        assert!(!query.matches(&with));

        let via = UsageQuery::FieldViaSubclasses {
            name: "size".into(),
            owners: BTreeSet::from(["zoo.Dog".into()]),
        };
        assert!(via.matches(&Usage::InlinedConstant {
            owner: "zoo.Dog".into(),
            name: "size".into()
        }));
        assert!(!via.matches(&Usage::Class("zoo.Dog".into())));
        assert_eq!(via.owners(), vec![&ReferenceId::new("zoo.Dog")]);
    }
}
