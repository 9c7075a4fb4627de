//! # avql: Incremental AV Query & Ordering Engine
//!
//! An in-memory, incrementally maintained query and ordering engine over
//! hierarchical attribute–value data. Client code registers queries and
//! ordering functions over a shared indexer; the engine keeps the derived
//! result sets in sync with data and query mutations with minimal
//! recomputation.
//!
//! ## Architecture
//!
//! ```text
//! Indexer (AV data, paths, match-count deltas)
//!     ↓
//! [SimpleQueryCalc]     terminal nodes: disjoint query values → deltas
//! [NegationQueryCalc]   compound nodes: membership + sub-match algebra
//!     ↓
//! QueryEngine           node arena + three-phase refresh cycle
//!     ↓
//! OrderService          shared partial-order tree + requirements
//!     ↓
//! RangeOrderResult / IndexOrderResult → consumers
//! ```
//!
//! Updates propagate bottom-up as incremental add/remove batches;
//! structural query changes propagate top-down during a refresh cycle
//! before matches are recomputed. The engine is single-threaded and
//! cooperative: all concurrency is expressed through scheduled refresh
//! cycles.
//!
//! ## Usage
//!
//! ```
//! use avql::engine::QueryEngine;
//! use avql::ids::{ElementId, ValueId};
//! use avql::indexer::MemoryIndexer;
//! use avql::key::{Key, KeyType};
//!
//! let mut indexer = MemoryIndexer::new();
//! let x = indexer.add_path(indexer.root_path(), "x");
//! let xa = indexer.add_path(x, "a");
//! indexer.add_element(ElementId(1), x, None, None);
//! indexer.add_element(ElementId(11), xa, Some(ElementId(1)), Some(Key::number(2.0)));
//!
//! let mut engine = QueryEngine::new(indexer);
//! let calc = engine.add_simple_calc(xa, x);
//! engine.add_value(calc, ValueId(1), KeyType::Number, Key::number(2.0)).unwrap();
//! engine.refresh().unwrap();
//!
//! assert_eq!(engine.get_fully_raised_matches(calc).unwrap(), vec![ElementId(1)]);
//! ```

// Core data model
pub mod data;
pub mod ids;
pub mod key;

// Leaf components
pub mod disjoint;
pub mod valuetype;

// Simple-query layer: terms, executors, compiler
pub mod query;

// Indexer contract + in-memory reference implementation
pub mod indexer;

// Incremental query-calc layer
pub mod calc;
pub mod engine;
pub mod refresh;

// Ordering service
pub mod order;

// Ambient stack
pub mod config;
pub mod error;

// Re-export the types most consumers touch
pub use config::Config;
pub use engine::QueryEngine;
pub use error::{EngineError, EngineResult};
pub use ids::{CalcId, ElementId, PathId, ResultId, UniqueValueId, ValueId};
pub use key::{Interval, Key, KeyType, RangeKey};
pub use query::{QueryCompiler, QueryTerm, ResultCache, SimpleQuery};
