use thiserror::Error;

#[derive(Error, Debug)]
pub enum DepGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Malformed delta: {0}")]
    MalformedDelta(String),

    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    #[error("Graph inconsistency: {0}")]
    Inconsistency(String),

    #[error("Stale result: computed against version {computed}, graph is at version {current}")]
    StaleResult { computed: u64, current: u64 },

    #[error("Dependency graph is closed")]
    Closed,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for DepGraphError {
    fn from(e: serde_json::Error) -> Self {
        DepGraphError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DepGraphError>;
