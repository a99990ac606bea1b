//! Persistent dependency graph for incremental compilation.
//!
//! [`DependencyGraph`] stores the units each source produced together with
//! the reverse indices over them. A build increment is described by a
//! [`Delta`], analysed by [`DependencyGraph::differentiate`] and committed by
//! [`DependencyGraph::integrate`].

pub mod delta;
pub mod differentiate;
pub mod graph;
pub mod index;
mod integrate;
pub mod session;
pub mod storage;

pub use delta::Delta;
pub use differentiate::{
    Affection, ChangeKind, Constraint, DifferentiateParameters, DifferentiateResult, SourceFilter,
    UsageQuery,
};
pub use graph::DependencyGraph;
pub use index::{BackDependencyIndex, IndexKind};
pub use session::GraphSession;
pub use storage::{
    ContainerFactory, ContainerKey, ContainerValue, HashMapContainer, HashMultiMapContainer,
    InMemoryContainerFactory, Maplike, MultiMaplike, RocksDbContainerFactory,
};
