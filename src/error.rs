//! Engine Error Types

use crate::ids::{ElementId, PathId, ValueId};
use thiserror::Error;

/// Errors surfaced by the query and ordering engine.
///
/// Programmer errors (calling `execute_and_cache` on a non-cacheable
/// executor, order tracing on an index order result, suspended-only getters
/// on an unsupported variant) are reported as typed variants from the
/// fallible entry points. Invariant violations discovered inside the refresh
/// machinery abort the current refresh and surface as `Corrupt`.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `execute_and_cache` called on an executor whose `can_cache` is false
    #[error("executor does not support result caching")]
    CacheUnsupported,

    /// Order tracing requested on an index order result
    #[error("order tracing is not supported on an index order result")]
    OrderTracingUnsupported,

    /// Suspended-matches view requested on a node that is not suspensible
    #[error("node is not suspensible")]
    NotSuspensible,

    /// Query value id not registered on this node
    #[error("unknown query value id: {0}")]
    UnknownValueId(ValueId),

    /// Element not present in the indexer
    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    /// Path not present in the indexer
    #[error("unknown path: {0}")]
    UnknownPath(PathId),

    /// Query-calc node id not present in the engine
    #[error("unknown query-calc node: {0}")]
    UnknownCalc(u64),

    /// A match count went negative; the refresh was aborted
    #[error("match count for element {0} went negative")]
    NegativeMatchCount(ElementId),

    /// A match table was required during projection but absent
    #[error("match table required during projection but absent")]
    MissingMatchTable,

    /// The order service could not obtain a comparator
    #[error("no comparator available from the dominated data object")]
    ComparatorUnavailable,

    /// Internal invariant violation; the refresh was aborted
    #[error("engine state corrupt: {0}")]
    Corrupt(String),

    /// Configuration loading or validation failed
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl From<figment::Error> for EngineError {
    fn from(e: figment::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}
