//! Identifier newtypes shared across the engine.
//!
//! All identifiers are opaque integers. `ElementId` and `PathId` are
//! allocated by the indexer; `UniqueValueId` is allocated from the engine's
//! monotonic counter; `ValueId` is chosen by the caller when registering a
//! query value; `CalcId` and `ResultId` are engine-internal handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a single data element within an indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u64);

/// Identifies a position in the hierarchical attribute tree.
///
/// Path p1 is a prefix of p2 iff p1's attribute chain is a prefix of p2's.
/// The indexer allocates children after parents, so numeric order refines
/// prefix order; prefix tests still go through the indexer's path table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathId(pub u32);

/// External query value id, chosen by the caller of `add_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u64);

/// Process-wide unique value id under which a disjoint interval is
/// registered with the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UniqueValueId(pub u64);

/// Identifies a query-calc node in the engine's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalcId(pub u64);

/// Identifies a result consumer for projection match streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultId(pub u64);

macro_rules! impl_display {
    ($($t:ident => $prefix:literal),* $(,)?) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        })*
    };
}

impl_display! {
    ElementId => "e",
    PathId => "p",
    ValueId => "v",
    UniqueValueId => "u",
    CalcId => "c",
    ResultId => "r",
}
