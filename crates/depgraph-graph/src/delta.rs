use depgraph_core::{DepGraphError, NodeSource, ReferenceId, Result, Unit};
use std::collections::{BTreeMap, BTreeSet};

/// Changeset of one build increment, created by
/// [`DependencyGraph::create_delta`](crate::DependencyGraph::create_delta).
///
/// Compiled and deleted sources are disjoint, and units can only be associated
/// with compiled sources.
#[derive(Debug, Clone)]
pub struct Delta {
    base_version: u64,
    compiled: BTreeSet<NodeSource>,
    deleted: BTreeSet<NodeSource>,
    source_only: bool,
    associations: BTreeMap<NodeSource, Vec<Unit>>,
}

impl Delta {
    pub(crate) fn new(
        base_version: u64,
        compiled: BTreeSet<NodeSource>,
        deleted: BTreeSet<NodeSource>,
        source_only: bool,
    ) -> Result<Self> {
        if let Some(overlap) = compiled.intersection(&deleted).next() {
            return Err(DepGraphError::MalformedDelta(format!(
                "source {} is both compiled and deleted",
                overlap
            )));
        }
        Ok(Self {
            base_version,
            compiled,
            deleted,
            source_only,
            associations: BTreeMap::new(),
        })
    }

    /// Record units produced for `source`. May be called repeatedly for the
    /// same source; ids must stay unique per source.
    pub fn associate(&mut self, source: NodeSource, units: Vec<Unit>) -> Result<()> {
        if self.source_only {
            return Err(DepGraphError::MalformedDelta(format!(
                "cannot associate units with {} in a source-only delta",
                source
            )));
        }
        if !self.compiled.contains(&source) {
            return Err(DepGraphError::MalformedDelta(format!(
                "source {} is not among the compiled sources of this delta",
                source
            )));
        }

        let existing = self.associations.entry(source.clone()).or_default();
        let mut ids: BTreeSet<ReferenceId> = existing.iter().map(|u| u.id().clone()).collect();
        for unit in &units {
            if !ids.insert(unit.id().clone()) {
                return Err(DepGraphError::MalformedDelta(format!(
                    "unit {} is associated with {} more than once",
                    unit.id(),
                    source
                )));
            }
        }
        existing.extend(units);
        Ok(())
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn compiled_sources(&self) -> &BTreeSet<NodeSource> {
        &self.compiled
    }

    pub fn deleted_sources(&self) -> &BTreeSet<NodeSource> {
        &self.deleted
    }

    pub fn is_source_only(&self) -> bool {
        self.source_only
    }

    pub fn is_compiled(&self, source: &NodeSource) -> bool {
        self.compiled.contains(source)
    }

    pub fn is_deleted(&self, source: &NodeSource) -> bool {
        self.deleted.contains(source)
    }

    /// Sources whose stored units are replaced or dropped by this delta. The
    /// compiled sources of a source-only delta keep their units.
    pub fn processed_sources(&self) -> impl Iterator<Item = &NodeSource> + '_ {
        let compiled = (!self.source_only).then_some(&self.compiled);
        self.deleted.iter().chain(compiled.into_iter().flatten())
    }

    pub fn is_processed(&self, source: &NodeSource) -> bool {
        self.deleted.contains(source) || (!self.source_only && self.compiled.contains(source))
    }

    /// Units associated with `source`; empty for unknown sources.
    pub fn nodes(&self, source: &NodeSource) -> &[Unit] {
        self.associations
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every associated unit with its source.
    pub fn all_nodes(&self) -> impl Iterator<Item = (&NodeSource, &Unit)> + '_ {
        self.associations
            .iter()
            .flat_map(|(source, units)| units.iter().map(move |unit| (source, unit)))
    }

    /// Sources of this delta producing `id`.
    pub fn sources_of<'a>(
        &'a self,
        id: &'a ReferenceId,
    ) -> impl Iterator<Item = &'a NodeSource> + 'a {
        self.all_nodes()
            .filter(move |(_, unit)| unit.id() == id)
            .map(|(source, _)| source)
    }

    /// Re-checks the construction invariants.
    pub fn validate(&self) -> Result<()> {
        if let Some(overlap) = self.compiled.intersection(&self.deleted).next() {
            return Err(DepGraphError::MalformedDelta(format!(
                "source {} is both compiled and deleted",
                overlap
            )));
        }
        if let Some(stray) = self.associations.keys().find(|s| !self.compiled.contains(*s)) {
            return Err(DepGraphError::MalformedDelta(format!(
                "units associated with {} which is not compiled",
                stray
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(names: &[&str]) -> BTreeSet<NodeSource> {
        names.iter().map(|n| NodeSource::from(*n)).collect()
    }

    #[test]
    fn test_overlapping_sources_are_rejected() {
        let result = Delta::new(0, sources(&["A.java"]), sources(&["A.java"]), false);
        assert!(matches!(result, Err(DepGraphError::MalformedDelta(_))));
    }

    #[test]
    fn test_association_scope() {
        let mut delta = Delta::new(0, sources(&["A.java"]), sources(&["B.java"]), false).unwrap();
        let unit = Unit::class("zoo.A").build();

        assert!(delta.associate("B.java".into(), vec![unit.clone()]).is_err());
        delta.associate("A.java".into(), vec![unit.clone()]).unwrap();
        assert!(matches!(
            delta.associate("A.java".into(), vec![unit]),
            Err(DepGraphError::MalformedDelta(_))
        ));
        assert_eq!(delta.nodes(&"A.java".into()).len(), 1);
        assert!(delta.nodes(&"C.java".into()).is_empty());
        assert!(delta.validate().is_ok());
    }

    #[test]
    fn test_source_only_delta() {
        let mut delta = Delta::new(0, sources(&["A.java"]), sources(&["B.java"]), true).unwrap();
        assert!(delta
            .associate("A.java".into(), vec![Unit::class("zoo.A").build()])
            .is_err());
        let processed: Vec<_> = delta.processed_sources().map(|s| s.path()).collect();
        assert_eq!(processed, vec!["B.java"]);
        assert!(!delta.is_processed(&"A.java".into()));
    }
}
