use crate::differentiate::{self, DifferentiateParameters, DifferentiateResult};
use crate::index::{BackDependencyIndex, IndexKind};
use crate::integrate;
use crate::storage::{
    ContainerFactory, InMemoryContainerFactory, Maplike, MultiMaplike, RocksDbContainerFactory,
};
use crate::Delta;
use depgraph_core::{
    DepGraphError, NodeSource, ReferenceId, Result, StorageBackend, StorageConfig, Unit,
};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

const SOURCE_NODES: &str = "source-nodes";
const NODES: &str = "nodes";
const NODE_SOURCES: &str = "node-sources";

/// Containers of an open graph.
pub(crate) struct GraphState {
    pub(crate) factory: Box<dyn ContainerFactory>,
    pub(crate) source_nodes: Box<dyn MultiMaplike<NodeSource, ReferenceId>>,
    pub(crate) nodes: Box<dyn Maplike<(NodeSource, ReferenceId), Unit>>,
    pub(crate) node_sources: Box<dyn MultiMaplike<ReferenceId, NodeSource>>,
    pub(crate) indices: Vec<BackDependencyIndex>,
}

impl GraphState {
    pub(crate) fn create<F: ContainerFactory + 'static>(factory: F) -> Result<Self> {
        let source_nodes = factory.create_multimap(SOURCE_NODES)?;
        let nodes = factory.create_map(NODES)?;
        let node_sources = factory.create_multimap(NODE_SOURCES)?;
        let indices = IndexKind::ALL
            .into_iter()
            .map(|kind| BackDependencyIndex::create(kind, &factory))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            factory: Box::new(factory),
            source_nodes,
            nodes,
            node_sources,
            indices,
        })
    }

    pub(crate) fn node(&self, source: &NodeSource, id: &ReferenceId) -> Option<&Unit> {
        self.nodes.get(&(source.clone(), id.clone()))
    }

    pub(crate) fn node_ids(&self, source: &NodeSource) -> impl Iterator<Item = &ReferenceId> + '_ {
        self.source_nodes.get(source)
    }

    pub(crate) fn sources_of(&self, id: &ReferenceId) -> impl Iterator<Item = &NodeSource> + '_ {
        self.node_sources.get(id)
    }

    /// Live units carrying `id`, one per contributing source.
    pub(crate) fn shadows(&self, id: &ReferenceId) -> Vec<(&NodeSource, &Unit)> {
        self.sources_of(id)
            .filter_map(|source| self.node(source, id).map(|unit| (source, unit)))
            .collect()
    }

    pub(crate) fn index(&self, kind: IndexKind) -> &BackDependencyIndex {
        // indices are created in IndexKind::ALL order
        &self.indices[kind as usize]
    }

    pub(crate) fn depending_nodes(
        &self,
        id: &ReferenceId,
    ) -> impl Iterator<Item = &ReferenceId> + '_ {
        self.index(IndexKind::NodeBackwardDependencies).dependencies(id)
    }

    pub(crate) fn is_registered(&self, id: &ReferenceId) -> bool {
        self.node_sources.contains_key(id)
    }

    fn stage(&mut self) -> Result<()> {
        self.source_nodes.stage()?;
        self.nodes.stage()?;
        self.node_sources.stage()?;
        for index in &mut self.indices {
            index.stage()?;
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.stage()?;
        self.factory.flush()
    }
}

/// Persistent model of which units every source produced and what depends
/// on what.
///
/// Mutated only by [`DependencyGraph::integrate`]; every read is served from
/// the last integrated snapshot, identified by [`DependencyGraph::version`].
pub struct DependencyGraph {
    state: Option<GraphState>,
    version: u64,
    flush_on_integrate: bool,
}

impl DependencyGraph {
    pub fn open<F: ContainerFactory + 'static>(factory: F) -> Result<Self> {
        let version = factory.load_version()?;
        let state = GraphState::create(factory)?;
        info!(
            "Opened dependency graph at version {} with {} sources",
            version,
            state.source_nodes.len()
        );
        Ok(Self {
            state: Some(state),
            version,
            flush_on_integrate: false,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(InMemoryContainerFactory::new())
    }

    /// Open the backend selected by `config`.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let graph = match config.backend {
            StorageBackend::InMemory => Self::in_memory()?,
            StorageBackend::RocksDb => {
                let path = config.path.as_ref().ok_or_else(|| {
                    DepGraphError::Config("storage.path is required for rocks_db".to_string())
                })?;
                Self::open(RocksDbContainerFactory::open(path)?)?
            }
        };
        Ok(graph.with_flush_on_integrate(config.flush_on_integrate))
    }

    pub fn with_flush_on_integrate(mut self, flush: bool) -> Self {
        self.flush_on_integrate = flush;
        self
    }

    pub(crate) fn state(&self) -> Result<&GraphState> {
        self.state.as_ref().ok_or(DepGraphError::Closed)
    }

    pub(crate) fn state_mut(&mut self) -> Result<&mut GraphState> {
        self.state.as_mut().ok_or(DepGraphError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_none()
    }

    /// Snapshot version, advanced by every integrate.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Start a changeset against the current snapshot.
    pub fn create_delta(
        &self,
        compiled: impl IntoIterator<Item = NodeSource>,
        deleted: impl IntoIterator<Item = NodeSource>,
        source_only: bool,
    ) -> Result<Delta> {
        self.state()?;
        Delta::new(
            self.version,
            compiled.into_iter().collect(),
            deleted.into_iter().collect(),
            source_only,
        )
    }

    /// Every source known to the store.
    pub fn sources(&self) -> Result<impl Iterator<Item = &NodeSource> + '_> {
        Ok(self.state()?.source_nodes.keys())
    }

    /// Units of `source`; empty when the source is unknown.
    pub fn nodes<'a>(&'a self, source: &NodeSource) -> Result<impl Iterator<Item = &'a Unit> + 'a> {
        let state = self.state()?;
        let source = source.clone();
        let ids: Vec<&ReferenceId> = state.node_ids(&source).collect();
        Ok(ids.into_iter().filter_map(move |id| state.node(&source, id)))
    }

    pub fn node(&self, source: &NodeSource, id: &ReferenceId) -> Result<Option<&Unit>> {
        Ok(self.state()?.node(source, id))
    }

    /// Sources currently contributing `id`.
    pub fn sources_of(&self, id: &ReferenceId) -> Result<impl Iterator<Item = &NodeSource> + '_> {
        let state = self.state()?;
        Ok(state.sources_of(id))
    }

    /// Every live unit carrying `id`, shadows included.
    pub fn nodes_of(&self, id: &ReferenceId) -> Result<impl Iterator<Item = &Unit> + '_> {
        let state = self.state()?;
        Ok(state.shadows(id).into_iter().map(|(_, unit)| unit))
    }

    /// Ids of units using `id`.
    pub fn depending_nodes(
        &self,
        id: &ReferenceId,
    ) -> Result<impl Iterator<Item = &ReferenceId> + '_> {
        let state = self.state()?;
        Ok(state.depending_nodes(id))
    }

    /// Whether any source still contributes `id`.
    pub fn is_registered(&self, id: &ReferenceId) -> Result<bool> {
        Ok(self.state()?.is_registered(id))
    }

    /// Every live id.
    pub fn registered_nodes(&self) -> Result<impl Iterator<Item = &ReferenceId> + '_> {
        Ok(self.state()?.node_sources.keys())
    }

    pub fn index(&self, name: &str) -> Result<&BackDependencyIndex> {
        let kind = IndexKind::from_name(name)?;
        self.index_of(kind)
    }

    pub fn index_of(&self, kind: IndexKind) -> Result<&BackDependencyIndex> {
        Ok(self.state()?.index(kind))
    }

    /// Names of the registered indices.
    pub fn indices(&self) -> Result<impl Iterator<Item = &'static str>> {
        self.state()?;
        Ok(IndexKind::ALL.into_iter().map(IndexKind::name))
    }

    /// Direct subtypes of `id` across all live shadows.
    pub fn direct_subclasses(&self, id: &ReferenceId) -> Result<BTreeSet<ReferenceId>> {
        Ok(self
            .index_of(IndexKind::DirectSubclasses)?
            .dependencies(id)
            .cloned()
            .collect())
    }

    /// Compare `delta` against the current snapshot. Does not modify the
    /// store.
    pub fn differentiate(
        &self,
        delta: Delta,
        params: &DifferentiateParameters,
    ) -> Result<DifferentiateResult> {
        let state = self.state()?;
        differentiate::run(state, self.version, delta, params)
    }

    /// Commit a result computed against the current snapshot.
    pub fn integrate(&mut self, result: &DifferentiateResult) -> Result<()> {
        if result.graph_version() != self.version {
            return Err(DepGraphError::StaleResult {
                computed: result.graph_version(),
                current: self.version,
            });
        }
        let next_version = self.version + 1;
        let flush = self.flush_on_integrate;
        let state = self.state_mut()?;
        integrate::apply(state, result.delta())?;
        state.factory.store_version(next_version)?;
        if flush {
            state.flush()?;
        }
        self.version = next_version;
        debug!("Dependency graph advanced to version {}", next_version);
        Ok(())
    }

    /// Commit a delta without computing affection.
    pub fn integrate_delta(&mut self, delta: Delta) -> Result<DifferentiateResult> {
        let params = DifferentiateParameters::default().with_calculate_affected(false);
        let result = self.differentiate(delta, &params)?;
        self.integrate(&result)?;
        Ok(result)
    }

    /// Write buffered container state to the backing store.
    pub fn flush(&mut self) -> Result<()> {
        self.state_mut()?.flush()
    }

    /// Flush and release the store. Later calls fail with
    /// [`DepGraphError::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let mut state = self.state.take().ok_or(DepGraphError::Closed)?;
        state.flush()?;
        state.factory.close()?;
        info!("Closed dependency graph at version {}", self.version);
        Ok(())
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DependencyGraph");
        s.field("version", &self.version);
        match &self.state {
            Some(state) => s
                .field("sources", &state.source_nodes.len())
                .field("nodes", &state.nodes.len())
                .field("indices", &state.indices),
            None => s.field("closed", &true),
        };
        s.finish()
    }
}
