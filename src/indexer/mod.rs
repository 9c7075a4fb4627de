//! Indexer Contract
//!
//! The indexer is the upstream collaborator holding the hierarchical
//! attribute–value data. Query-calc nodes register at a path and receive
//! match points, match streams, and match-count deltas; simple-selection
//! nodes additionally register disjoint query values per type.
//!
//! Notifications are queued inside the indexer and popped one batch at a
//! time, longest path first, so child nodes see updates before their
//! parents; `path_has_removals_pending` looks at the still-queued tail,
//! which is what lets a negation node defer sub-query removals until its
//! own path's removals went out.

pub mod memory;

use crate::ids::{CalcId, ElementId, PathId, UniqueValueId};
use crate::key::{Interval, KeyType};
use std::collections::{HashMap, HashSet};

pub use memory::MemoryIndexer;

/// How a node consumes a path's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationKind {
    /// Match counts driven by registered disjoint query values.
    SimpleValues,
    /// Path membership only: add/remove match streams for the elements at
    /// the path (the negation universe).
    Presence,
}

/// One queued notification for a registered node.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexerNotification {
    AddToMatchPoints {
        node: CalcId,
        pid: PathId,
    },
    RemoveFromMatchPoints {
        node: CalcId,
        pid: PathId,
    },
    AddMatches {
        node: CalcId,
        pid: PathId,
        eids: Vec<ElementId>,
    },
    RemoveMatches {
        node: CalcId,
        pid: PathId,
        eids: Vec<ElementId>,
    },
    UpdateMatchCount {
        node: CalcId,
        pid: PathId,
        deltas: Vec<(ElementId, i32)>,
    },
    RemoveAllIndexerMatches {
        node: CalcId,
        pid: PathId,
    },
}

impl IndexerNotification {
    pub fn node(&self) -> CalcId {
        match self {
            IndexerNotification::AddToMatchPoints { node, .. }
            | IndexerNotification::RemoveFromMatchPoints { node, .. }
            | IndexerNotification::AddMatches { node, .. }
            | IndexerNotification::RemoveMatches { node, .. }
            | IndexerNotification::UpdateMatchCount { node, .. }
            | IndexerNotification::RemoveAllIndexerMatches { node, .. } => *node,
        }
    }

    pub fn pid(&self) -> PathId {
        match self {
            IndexerNotification::AddToMatchPoints { pid, .. }
            | IndexerNotification::RemoveFromMatchPoints { pid, .. }
            | IndexerNotification::AddMatches { pid, .. }
            | IndexerNotification::RemoveMatches { pid, .. }
            | IndexerNotification::UpdateMatchCount { pid, .. }
            | IndexerNotification::RemoveAllIndexerMatches { pid, .. } => *pid,
        }
    }
}

/// Added/removed split produced by a query-value update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueUpdateDiff {
    pub added: Vec<ElementId>,
    pub removed: Vec<ElementId>,
}

/// Diff of a path's current content against a given element set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathDiff {
    pub added: Vec<ElementId>,
    pub removed: Vec<ElementId>,
}

/// Element table entry: location plus parent link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementEntry {
    pub path_id: PathId,
    pub parent: Option<ElementId>,
}

/// The indexer interface the query-calc layer is written against.
pub trait Indexer {
    // === node registration ===

    /// Register a node at its path; returns the initial match points (the
    /// paths at or below `pid` where data currently exists).
    fn add_query_calc_to_path_node(
        &mut self,
        node: CalcId,
        pid: PathId,
        kind: RegistrationKind,
    ) -> Vec<PathId>;

    fn remove_query_calc_from_path_node(&mut self, node: CalcId, pid: PathId);

    /// Bump the refcount of an allocated path id.
    fn allocate_path_id_by_path_id(&mut self, pid: PathId) -> PathId;

    fn release_path_id(&mut self, pid: PathId);

    // === query value registration ===

    /// Register a disjoint query value; returns the elements it currently
    /// matches (buffered by the caller, not queued).
    fn register_query_value(
        &mut self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        key: &Interval,
    ) -> Vec<ElementId>;

    /// Replace a registered value's interval; returns the match diff.
    fn update_simple_query(
        &mut self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        new_key: &Interval,
        prev_key: &Interval,
    ) -> ValueUpdateDiff;

    /// Drop a registered value; returns the elements it was matching.
    fn unregister_query_value(
        &mut self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        key: &Interval,
    ) -> Vec<ElementId>;

    fn get_simple_query_value_matches(
        &self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        key: &Interval,
    ) -> Vec<ElementId>;

    /// Match-count deltas queued for `node` but not yet popped.
    fn get_simple_query_queued_updates(&self, node: CalcId) -> HashMap<ElementId, i32>;

    // === path and data inspection ===

    fn has_range_values(&self, pid: PathId, ty: KeyType) -> bool;

    /// Whether element removals at `pid` are still queued for `node`.
    fn path_has_removals_pending(&self, pid: PathId, node: CalcId) -> bool;

    fn get_all_matches(&self, pid: PathId) -> Vec<ElementId>;

    fn get_all_matches_as_obj(&self, pid: PathId) -> HashSet<ElementId>;

    fn filter_data_nodes_at_path(&self, pid: PathId, eids: &[ElementId]) -> Vec<ElementId>;

    fn filter_data_nodes_at_path_with_diff(&self, pid: PathId, eids: &[ElementId]) -> PathDiff;

    // === data element utilities ===

    /// Walk parents until the element at `pid`; includes `eid` itself.
    fn raise_to_path(&self, eid: ElementId, pid: PathId) -> Option<ElementId>;

    /// Descendants (inclusive) of `eids` whose path is one of `pids`.
    fn lower_data_elements_to(&self, eids: &[ElementId], pids: &[PathId]) -> Vec<ElementId>;

    fn get_path_id(&self, eid: ElementId) -> Option<PathId>;

    fn get_entry(&self, eid: ElementId) -> Option<ElementEntry>;

    fn path_depth(&self, pid: PathId) -> usize;

    fn is_prefix_of(&self, p1: PathId, p2: PathId) -> bool;

    // === notification channel ===

    /// Pop the next queued notification, longest path first (stable for
    /// equal depths).
    fn pop_notification(&mut self) -> Option<IndexerNotification>;

    fn has_pending_notifications(&self) -> bool;
}
