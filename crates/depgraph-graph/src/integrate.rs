use crate::graph::GraphState;
use crate::Delta;
use depgraph_core::{DepGraphError, NodeSource, ReferenceId, Result, Unit};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Everything an integrate writes, computed before any container is touched.
struct Plan {
    /// Processed sources with the ids they contributed so far.
    retired: Vec<(NodeSource, Vec<ReferenceId>)>,
    /// Compiled sources with their new units.
    installed: Vec<(NodeSource, Vec<Unit>)>,
    /// Per touched id: live units before and after.
    facts: BTreeMap<ReferenceId, (Vec<Unit>, Vec<Unit>)>,
}

fn inconsistency(message: String) -> DepGraphError {
    warn!("Dependency graph inconsistency: {}", message);
    DepGraphError::Inconsistency(message)
}

fn plan(state: &GraphState, delta: &Delta) -> Result<Plan> {
    let mut retired = Vec::new();
    let mut touched: BTreeSet<ReferenceId> = BTreeSet::new();

    for source in delta.processed_sources() {
        let ids: Vec<ReferenceId> = state.node_ids(source).cloned().collect();
        for id in &ids {
            if state.node(source, id).is_none() {
                return Err(inconsistency(format!(
                    "{} lists unit {} which is not stored",
                    source, id
                )));
            }
            if !state.sources_of(id).any(|s| s == source) {
                return Err(inconsistency(format!(
                    "unit {} of {} has no recorded owner",
                    id, source
                )));
            }
        }
        touched.extend(ids.iter().cloned());
        retired.push((source.clone(), ids));
    }

    let mut installed = Vec::new();
    if !delta.is_source_only() {
        for source in delta.compiled_sources() {
            let units = delta.nodes(source).to_vec();
            touched.extend(units.iter().map(|u| u.id().clone()));
            installed.push((source.clone(), units));
        }
    }

    let mut facts = BTreeMap::new();
    for id in touched {
        let before: Vec<Unit> = state
            .shadows(&id)
            .into_iter()
            .map(|(_, unit)| unit.clone())
            .collect();
        let mut after: Vec<Unit> = state
            .shadows(&id)
            .into_iter()
            .filter(|(source, _)| !delta.is_processed(source))
            .map(|(_, unit)| unit.clone())
            .collect();
        after.extend(
            installed
                .iter()
                .flat_map(|(_, units)| units.iter())
                .filter(|unit| unit.id() == &id)
                .cloned(),
        );
        facts.insert(id, (before, after));
    }

    Ok(Plan {
        retired,
        installed,
        facts,
    })
}

/// Apply `delta` to the containers. Validation happens up front so that a
/// failure leaves the store untouched.
pub(crate) fn apply(state: &mut GraphState, delta: &Delta) -> Result<()> {
    delta.validate()?;
    let plan = plan(state, delta)?;

    for (source, ids) in &plan.retired {
        for id in ids {
            state.nodes.remove(&(source.clone(), id.clone()));
            state.node_sources.remove_value(id, source);
        }
        state.source_nodes.remove(source);
    }

    for (source, units) in &plan.installed {
        let ids = units.iter().map(|unit| unit.id().clone()).collect();
        state.source_nodes.replace(source.clone(), ids);
        for unit in units {
            state.node_sources.put(unit.id().clone(), source.clone());
            state.nodes.put((source.clone(), unit.id().clone()), unit.clone());
        }
    }

    let mut dropped = 0usize;
    for (before, after) in plan.facts.values() {
        let before: Vec<&Unit> = before.iter().collect();
        let after: Vec<&Unit> = after.iter().collect();
        if after.is_empty() {
            dropped += 1;
        }
        for index in &mut state.indices {
            index.update(&before, &after);
        }
    }

    info!(
        compiled = delta.compiled_sources().len(),
        deleted = delta.deleted_sources().len(),
        touched_nodes = plan.facts.len(),
        dropped_nodes = dropped,
        "Integrated delta"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexKind;
    use crate::storage::InMemoryContainerFactory;

    fn delta(compiled: &[&str], deleted: &[&str]) -> Delta {
        Delta::new(
            0,
            compiled.iter().map(|s| NodeSource::from(*s)).collect(),
            deleted.iter().map(|s| NodeSource::from(*s)).collect(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_shadow_keeps_id_alive() {
        let mut state = GraphState::create(InMemoryContainerFactory::new()).unwrap();
        let dog = Unit::class("zoo.Dog").extends("zoo.Animal").build();
        let mut first = delta(&["A.java", "B.java"], &[]);
        first.associate("A.java".into(), vec![dog.clone()]).unwrap();
        first.associate("B.java".into(), vec![dog]).unwrap();
        apply(&mut state, &first).unwrap();

        apply(&mut state, &delta(&[], &["A.java"])).unwrap();
        let id = ReferenceId::new("zoo.Dog");
        assert!(state.is_registered(&id));
        assert_eq!(
            state.sources_of(&id).cloned().collect::<Vec<_>>(),
            vec![NodeSource::from("B.java")]
        );
        let subclasses = state.index(IndexKind::DirectSubclasses);
        assert_eq!(subclasses.dependencies(&"zoo.Animal".into()).count(), 1);
    }

    #[test]
    fn test_inconsistent_store_is_left_untouched() {
        let mut state = GraphState::create(InMemoryContainerFactory::new()).unwrap();
        let mut first = delta(&["A.java"], &[]);
        first
            .associate("A.java".into(), vec![Unit::class("zoo.Cat").build()])
            .unwrap();
        apply(&mut state, &first).unwrap();

        // a listed unit without a stored value
        state
            .source_nodes
            .put("A.java".into(), ReferenceId::new("zoo.Ghost"));
        let result = apply(&mut state, &delta(&[], &["A.java"]));

        assert!(matches!(result, Err(DepGraphError::Inconsistency(_))));
        assert_eq!(state.node_ids(&"A.java".into()).count(), 2);
        assert!(state.is_registered(&"zoo.Cat".into()));
    }
}
