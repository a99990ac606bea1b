use crate::storage::{ContainerFactory, MultiMaplike};
use depgraph_core::{DepGraphError, ReferenceId, Result, Unit};
use std::collections::BTreeSet;
use std::fmt;

/// The registered reverse indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKind {
    /// supertype -> ids of units directly extending or implementing it
    DirectSubclasses,
    /// usage owner -> ids of units using it
    NodeBackwardDependencies,
    /// short name -> ids of top-level units carrying that short name
    ClassShortNames,
}

impl IndexKind {
    pub const ALL: [IndexKind; 3] = [
        IndexKind::DirectSubclasses,
        IndexKind::NodeBackwardDependencies,
        IndexKind::ClassShortNames,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IndexKind::DirectSubclasses => "direct-subclasses",
            IndexKind::NodeBackwardDependencies => "node-backward-dependencies",
            IndexKind::ClassShortNames => "class-short-names",
        }
    }

    /// Shorter names the index is also looked up by.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            IndexKind::DirectSubclasses => &["subclasses"],
            IndexKind::NodeBackwardDependencies => &["usages"],
            IndexKind::ClassShortNames => &[],
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name || kind.aliases().iter().any(|alias| *alias == name))
            .ok_or_else(|| DepGraphError::UnknownIndex(name.to_string()))
    }

    /// Keys under which `unit` is recorded as a dependent.
    pub fn keys_for(self, unit: &Unit) -> BTreeSet<ReferenceId> {
        match self {
            IndexKind::DirectSubclasses => unit.supertypes().cloned().collect(),
            IndexKind::NodeBackwardDependencies => unit
                .usages()
                .iter()
                .map(|usage| usage.owner())
                .filter(|owner| *owner != unit.id())
                .cloned()
                .collect(),
            IndexKind::ClassShortNames => {
                if unit.is_top_level() {
                    BTreeSet::from([ReferenceId::new(unit.id().short_name())])
                } else {
                    BTreeSet::new()
                }
            }
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reverse lookup `target -> {dependent}` maintained by integrate.
///
/// Entries are keyed by the dependent's id only, so every unit sharing an id
/// (shadows from different sources) contributes to the same entries.
pub struct BackDependencyIndex {
    kind: IndexKind,
    map: Box<dyn MultiMaplike<ReferenceId, ReferenceId>>,
}

impl BackDependencyIndex {
    pub(crate) fn create<F: ContainerFactory>(kind: IndexKind, factory: &F) -> Result<Self> {
        Ok(Self {
            kind,
            map: factory.create_multimap(kind.name())?,
        })
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn dependencies(&self, id: &ReferenceId) -> impl Iterator<Item = &ReferenceId> + '_ {
        self.map.get(id)
    }

    /// Record every key of `unit`. Already present pairs are left alone.
    pub(crate) fn index_unit(&mut self, unit: &Unit) {
        for key in self.kind.keys_for(unit) {
            self.map.put(key, unit.id().clone());
        }
    }

    /// Drop the keys of `unit` that none of `survivors` (units still live
    /// under the same id) provides.
    pub(crate) fn deindex_unit(&mut self, unit: &Unit, survivors: &[&Unit]) {
        let kept: BTreeSet<ReferenceId> = survivors
            .iter()
            .flat_map(|survivor| self.kind.keys_for(survivor))
            .collect();
        for key in self.kind.keys_for(unit) {
            if !kept.contains(&key) {
                self.map.remove_value(&key, unit.id());
            }
        }
    }

    /// Move the entries of one id from the facts of `before` to those of
    /// `after`.
    pub(crate) fn update(&mut self, before: &[&Unit], after: &[&Unit]) {
        for unit in before {
            self.deindex_unit(unit, after);
        }
        for unit in after {
            self.index_unit(unit);
        }
    }

    pub(crate) fn stage(&mut self) -> Result<()> {
        self.map.stage()
    }
}

impl fmt::Debug for BackDependencyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackDependencyIndex")
            .field("kind", &self.kind)
            .field("keys", &self.map.len())
            .finish()
    }
}
