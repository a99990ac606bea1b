use crate::differentiate::{DifferentiateParameters, DifferentiateResult};
use crate::{Delta, DependencyGraph};
use depgraph_core::Result;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Shared handle enforcing single-writer access to a [`DependencyGraph`].
///
/// Queries run concurrently under the read lock. A build increment holds the
/// write lock from differentiate through integrate, so no reader observes a
/// half-applied delta and no result goes stale in between.
#[derive(Clone)]
pub struct GraphSession {
    graph: Arc<RwLock<DependencyGraph>>,
}

impl GraphSession {
    pub fn new(graph: DependencyGraph) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
        }
    }

    pub fn read<T>(&self, f: impl FnOnce(&DependencyGraph) -> T) -> T {
        f(&self.graph.read())
    }

    pub fn version(&self) -> u64 {
        self.graph.read().version()
    }

    /// Start a delta against the current snapshot.
    pub fn create_delta(
        &self,
        compiled: impl IntoIterator<Item = depgraph_core::NodeSource>,
        deleted: impl IntoIterator<Item = depgraph_core::NodeSource>,
        source_only: bool,
    ) -> Result<Delta> {
        self.graph.read().create_delta(compiled, deleted, source_only)
    }

    /// Differentiate `delta` and, if `accept` approves the result, integrate
    /// it before releasing the lock. Returns the result and whether it was
    /// integrated.
    pub fn process(
        &self,
        delta: Delta,
        params: &DifferentiateParameters,
        accept: impl FnOnce(&DifferentiateResult) -> bool,
    ) -> Result<(DifferentiateResult, bool)> {
        let mut graph = self.graph.write();
        let result = graph.differentiate(delta, params)?;
        if !accept(&result) {
            debug!("Differentiate result rejected, graph left at version {}", graph.version());
            return Ok((result, false));
        }
        graph.integrate(&result)?;
        Ok((result, true))
    }

    pub fn close(&self) -> Result<()> {
        self.graph.write().close()
    }
}

impl std::fmt::Debug for GraphSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSession").field("graph", &*self.graph.read()).finish()
    }
}
