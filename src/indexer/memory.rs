//! In-Memory Reference Indexer
//!
//! A complete in-memory implementation of the indexer contract: interned
//! path table (children allocated after parents, so numeric path order
//! refines prefix order), element table with parent links and optional
//! terminal keys, per-path element sets, per-node query-value
//! registrations, and a notification queue popped longest-path-first.
//!
//! Backs the integration tests and serves as the dominated secondary
//! indexer of an index order result.

use crate::ids::{CalcId, ElementId, PathId, UniqueValueId};
use crate::indexer::{
    ElementEntry, Indexer, IndexerNotification, PathDiff, RegistrationKind, ValueUpdateDiff,
};
use crate::key::{Interval, Key, KeyType};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::trace;

#[derive(Debug)]
struct PathEntry {
    parent: Option<PathId>,
    attr: String,
    depth: usize,
}

#[derive(Debug)]
struct Element {
    path: PathId,
    parent: Option<ElementId>,
    value: Option<Key>,
}

#[derive(Debug)]
struct Registration {
    node: CalcId,
    kind: RegistrationKind,
}

#[derive(Debug)]
struct ValueReg {
    ty: KeyType,
    iv: Interval,
    pid: PathId,
}

/// In-memory attribute–value tree with query-calc registrations.
#[derive(Default)]
pub struct MemoryIndexer {
    paths: Vec<PathEntry>,
    path_children: HashMap<(PathId, String), PathId>,
    elements: HashMap<ElementId, Element>,
    children: HashMap<ElementId, Vec<ElementId>>,
    at_path: HashMap<PathId, BTreeSet<ElementId>>,
    regs: HashMap<PathId, Vec<Registration>>,
    node_paths: HashMap<CalcId, PathId>,
    values: HashMap<CalcId, HashMap<UniqueValueId, ValueReg>>,
    queue: Vec<IndexerNotification>,
    queued_counts: HashMap<CalcId, HashMap<ElementId, i32>>,
    path_refs: HashMap<PathId, usize>,
    next_auto_eid: u64,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        let mut indexer = MemoryIndexer {
            next_auto_eid: 1 << 32,
            ..MemoryIndexer::default()
        };
        indexer.paths.push(PathEntry {
            parent: None,
            attr: String::new(),
            depth: 0,
        });
        indexer
    }

    pub fn root_path(&self) -> PathId {
        PathId(0)
    }

    /// Intern the child path `parent/attr`, allocating after the parent so
    /// numeric order refines prefix order.
    pub fn add_path(&mut self, parent: PathId, attr: &str) -> PathId {
        if let Some(pid) = self.path_children.get(&(parent, attr.to_string())) {
            return *pid;
        }
        let depth = self.paths[parent.0 as usize].depth + 1;
        let pid = PathId(self.paths.len() as u32);
        self.paths.push(PathEntry {
            parent: Some(parent),
            attr: attr.to_string(),
            depth,
        });
        self.path_children.insert((parent, attr.to_string()), pid);
        pid
    }

    /// Add a data element at a path, optionally holding a terminal key.
    pub fn add_element(
        &mut self,
        eid: ElementId,
        pid: PathId,
        parent: Option<ElementId>,
        value: Option<Key>,
    ) {
        debug_assert!(!self.elements.contains_key(&eid), "duplicate element");
        let first_at_path = self
            .at_path
            .get(&pid)
            .map_or(true, |set| set.is_empty());
        self.elements.insert(
            eid,
            Element {
                path: pid,
                parent,
                value: value.clone(),
            },
        );
        self.at_path.entry(pid).or_default().insert(eid);
        if let Some(p) = parent {
            self.children.entry(p).or_default().push(eid);
        }
        if first_at_path {
            self.queue_match_point_change(pid, true);
        }
        self.notify_element_added(eid, pid, value.as_ref());
    }

    /// Add an element with an indexer-allocated id.
    pub fn add_element_auto(
        &mut self,
        pid: PathId,
        parent: Option<ElementId>,
        value: Option<Key>,
    ) -> ElementId {
        let eid = ElementId(self.next_auto_eid);
        self.next_auto_eid += 1;
        self.add_element(eid, pid, parent, value);
        eid
    }

    /// Remove an element and its whole subtree, deepest elements first.
    pub fn remove_element(&mut self, eid: ElementId) {
        let mut subtree = Vec::new();
        self.collect_subtree(eid, &mut subtree);
        subtree.sort_by_key(|e| {
            std::cmp::Reverse(self.elements.get(e).map_or(0, |el| {
                self.paths[el.path.0 as usize].depth
            }))
        });
        for e in subtree {
            self.remove_single(e);
        }
    }

    /// Replace an element's terminal key.
    pub fn set_element_value(&mut self, eid: ElementId, value: Option<Key>) {
        let Some((pid, old)) = self
            .elements
            .get(&eid)
            .map(|el| (el.path, el.value.clone()))
        else {
            return;
        };
        if old == value {
            return;
        }
        if let Some(el) = self.elements.get_mut(&eid) {
            el.value = value.clone();
        }
        // per-node count delta: matches under the new key minus the old
        let regs: Vec<CalcId> = self.value_nodes_at(pid);
        for node in regs {
            let old_count = self.match_count_for(node, pid, old.as_ref());
            let new_count = self.match_count_for(node, pid, value.as_ref());
            let delta = new_count - old_count;
            if delta != 0 {
                self.queue_count_delta(node, pid, eid, delta);
            }
        }
    }

    pub fn element_value(&self, eid: ElementId) -> Option<&Key> {
        self.elements.get(&eid).and_then(|el| el.value.as_ref())
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    // === internals ===

    fn collect_subtree(&self, eid: ElementId, out: &mut Vec<ElementId>) {
        if !self.elements.contains_key(&eid) {
            return;
        }
        out.push(eid);
        if let Some(kids) = self.children.get(&eid) {
            for k in kids.clone() {
                self.collect_subtree(k, out);
            }
        }
    }

    fn remove_single(&mut self, eid: ElementId) {
        let Some(el) = self.elements.remove(&eid) else {
            return;
        };
        if let Some(set) = self.at_path.get_mut(&el.path) {
            set.remove(&eid);
        }
        if let Some(p) = el.parent {
            if let Some(kids) = self.children.get_mut(&p) {
                kids.retain(|k| *k != eid);
            }
        }
        self.children.remove(&eid);
        self.notify_element_removed(eid, el.path, el.value.as_ref());
        let now_empty = self
            .at_path
            .get(&el.path)
            .map_or(true, |set| set.is_empty());
        if now_empty {
            self.queue_match_point_change(el.path, false);
        }
    }

    fn notify_element_added(&mut self, eid: ElementId, pid: PathId, value: Option<&Key>) {
        let nodes: Vec<(CalcId, RegistrationKind)> = self
            .regs
            .get(&pid)
            .map(|rs| rs.iter().map(|r| (r.node, r.kind)).collect())
            .unwrap_or_default();
        for (node, kind) in nodes {
            match kind {
                RegistrationKind::Presence => {
                    self.queue.push(IndexerNotification::AddMatches {
                        node,
                        pid,
                        eids: vec![eid],
                    });
                }
                RegistrationKind::SimpleValues => {
                    let count = self.match_count_for(node, pid, value);
                    if count != 0 {
                        self.queue_count_delta(node, pid, eid, count);
                    }
                }
            }
        }
    }

    fn notify_element_removed(&mut self, eid: ElementId, pid: PathId, value: Option<&Key>) {
        let nodes: Vec<(CalcId, RegistrationKind)> = self
            .regs
            .get(&pid)
            .map(|rs| rs.iter().map(|r| (r.node, r.kind)).collect())
            .unwrap_or_default();
        for (node, kind) in nodes {
            match kind {
                RegistrationKind::Presence => {
                    self.queue.push(IndexerNotification::RemoveMatches {
                        node,
                        pid,
                        eids: vec![eid],
                    });
                }
                RegistrationKind::SimpleValues => {
                    let count = self.match_count_for(node, pid, value);
                    if count != 0 {
                        self.queue_count_delta(node, pid, eid, -count);
                    }
                }
            }
        }
    }

    /// Number of `node`'s registered values matching `value`.
    fn match_count_for(&self, node: CalcId, pid: PathId, value: Option<&Key>) -> i32 {
        let Some(value) = value else {
            return 0;
        };
        let Some(regs) = self.values.get(&node) else {
            return 0;
        };
        regs.values()
            .filter(|r| r.pid == pid && value_matches(&r.iv, r.ty, value))
            .count() as i32
    }

    fn value_nodes_at(&self, pid: PathId) -> Vec<CalcId> {
        self.regs
            .get(&pid)
            .map(|rs| {
                rs.iter()
                    .filter(|r| r.kind == RegistrationKind::SimpleValues)
                    .map(|r| r.node)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn queue_count_delta(&mut self, node: CalcId, pid: PathId, eid: ElementId, delta: i32) {
        self.queue.push(IndexerNotification::UpdateMatchCount {
            node,
            pid,
            deltas: vec![(eid, delta)],
        });
        *self
            .queued_counts
            .entry(node)
            .or_default()
            .entry(eid)
            .or_insert(0) += delta;
    }

    /// Queue match-point additions/removals for every node registered at a
    /// prefix of `pid`.
    fn queue_match_point_change(&mut self, pid: PathId, added: bool) {
        let mut interested = Vec::new();
        for (reg_pid, regs) in &self.regs {
            if self.is_prefix_of(*reg_pid, pid) {
                for r in regs {
                    interested.push((r.node, *reg_pid));
                }
            }
        }
        for (node, _reg_pid) in interested {
            self.queue.push(if added {
                IndexerNotification::AddToMatchPoints { node, pid }
            } else {
                IndexerNotification::RemoveFromMatchPoints { node, pid }
            });
        }
    }

    fn matches_of_value(&self, pid: PathId, ty: KeyType, iv: &Interval) -> Vec<ElementId> {
        self.at_path
            .get(&pid)
            .map(|set| {
                set.iter()
                    .filter(|e| {
                        self.elements
                            .get(e)
                            .and_then(|el| el.value.as_ref())
                            .is_some_and(|v| value_matches(iv, ty, v))
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn value_matches(iv: &Interval, ty: KeyType, value: &Key) -> bool {
    value.key_type() == ty && iv.matches_key(value)
}

impl Indexer for MemoryIndexer {
    fn add_query_calc_to_path_node(
        &mut self,
        node: CalcId,
        pid: PathId,
        kind: RegistrationKind,
    ) -> Vec<PathId> {
        trace!(%node, %pid, ?kind, "register query calc");
        self.regs
            .entry(pid)
            .or_default()
            .push(Registration { node, kind });
        self.node_paths.insert(node, pid);
        if kind == RegistrationKind::Presence {
            let existing: Vec<ElementId> = self
                .at_path
                .get(&pid)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            if !existing.is_empty() {
                self.queue.push(IndexerNotification::AddMatches {
                    node,
                    pid,
                    eids: existing,
                });
            }
        }
        // initial match points: paths at or below pid holding elements
        let mut points: Vec<PathId> = self
            .at_path
            .iter()
            .filter(|(p, set)| !set.is_empty() && self.is_prefix_of(pid, **p))
            .map(|(p, _)| *p)
            .collect();
        points.sort();
        points
    }

    fn remove_query_calc_from_path_node(&mut self, node: CalcId, pid: PathId) {
        if let Some(rs) = self.regs.get_mut(&pid) {
            rs.retain(|r| r.node != node);
        }
        self.node_paths.remove(&node);
        self.values.remove(&node);
        self.queue.retain(|n| n.node() != node);
        self.queued_counts.remove(&node);
    }

    fn allocate_path_id_by_path_id(&mut self, pid: PathId) -> PathId {
        *self.path_refs.entry(pid).or_insert(0) += 1;
        pid
    }

    fn release_path_id(&mut self, pid: PathId) {
        if let Some(refs) = self.path_refs.get_mut(&pid) {
            *refs = refs.saturating_sub(1);
        }
    }

    fn register_query_value(
        &mut self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        key: &Interval,
    ) -> Vec<ElementId> {
        let pid = self.node_paths[&node];
        self.values.entry(node).or_default().insert(
            uid,
            ValueReg {
                ty,
                iv: key.clone(),
                pid,
            },
        );
        self.matches_of_value(pid, ty, key)
    }

    fn update_simple_query(
        &mut self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        new_key: &Interval,
        prev_key: &Interval,
    ) -> ValueUpdateDiff {
        let pid = self.node_paths[&node];
        let old: HashSet<ElementId> = self.matches_of_value(pid, ty, prev_key).into_iter().collect();
        let new: HashSet<ElementId> = self.matches_of_value(pid, ty, new_key).into_iter().collect();
        if let Some(reg) = self.values.get_mut(&node).and_then(|m| m.get_mut(&uid)) {
            reg.iv = new_key.clone();
            reg.ty = ty;
        }
        let mut added: Vec<ElementId> = new.difference(&old).copied().collect();
        let mut removed: Vec<ElementId> = old.difference(&new).copied().collect();
        added.sort_unstable();
        removed.sort_unstable();
        ValueUpdateDiff { added, removed }
    }

    fn unregister_query_value(
        &mut self,
        node: CalcId,
        uid: UniqueValueId,
        ty: KeyType,
        key: &Interval,
    ) -> Vec<ElementId> {
        if let Some(map) = self.values.get_mut(&node) {
            map.remove(&uid);
        }
        let pid = self.node_paths[&node];
        self.matches_of_value(pid, ty, key)
    }

    fn get_simple_query_value_matches(
        &self,
        node: CalcId,
        _uid: UniqueValueId,
        ty: KeyType,
        key: &Interval,
    ) -> Vec<ElementId> {
        let pid = self.node_paths[&node];
        self.matches_of_value(pid, ty, key)
    }

    fn get_simple_query_queued_updates(&self, node: CalcId) -> HashMap<ElementId, i32> {
        self.queued_counts
            .get(&node)
            .map(|m| m.iter().filter(|(_, d)| **d != 0).map(|(e, d)| (*e, *d)).collect())
            .unwrap_or_default()
    }

    fn has_range_values(&self, pid: PathId, ty: KeyType) -> bool {
        self.at_path.get(&pid).is_some_and(|set| {
            set.iter().any(|e| {
                self.elements
                    .get(e)
                    .and_then(|el| el.value.as_ref())
                    .is_some_and(|v| v.is_range() && v.key_type() == ty)
            })
        })
    }

    fn path_has_removals_pending(&self, pid: PathId, node: CalcId) -> bool {
        self.queue.iter().any(|n| match n {
            IndexerNotification::RemoveMatches {
                node: qn,
                pid: qp,
                ..
            } => *qn == node && *qp == pid,
            IndexerNotification::UpdateMatchCount {
                node: qn,
                pid: qp,
                deltas,
            } => *qn == node && *qp == pid && deltas.iter().any(|(_, d)| *d < 0),
            _ => false,
        })
    }

    fn get_all_matches(&self, pid: PathId) -> Vec<ElementId> {
        self.at_path
            .get(&pid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn get_all_matches_as_obj(&self, pid: PathId) -> HashSet<ElementId> {
        self.at_path
            .get(&pid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn filter_data_nodes_at_path(&self, pid: PathId, eids: &[ElementId]) -> Vec<ElementId> {
        let at = self.at_path.get(&pid);
        eids.iter()
            .filter(|e| at.is_some_and(|set| set.contains(e)))
            .copied()
            .collect()
    }

    fn filter_data_nodes_at_path_with_diff(&self, pid: PathId, eids: &[ElementId]) -> PathDiff {
        let at: BTreeSet<ElementId> = self
            .at_path
            .get(&pid)
            .cloned()
            .unwrap_or_default();
        let given: HashSet<ElementId> = eids.iter().copied().collect();
        PathDiff {
            added: at.iter().filter(|e| !given.contains(e)).copied().collect(),
            removed: eids
                .iter()
                .filter(|e| !at.contains(e))
                .copied()
                .collect(),
        }
    }

    fn raise_to_path(&self, eid: ElementId, pid: PathId) -> Option<ElementId> {
        let mut cur = eid;
        loop {
            let el = self.elements.get(&cur)?;
            if el.path == pid {
                return Some(cur);
            }
            cur = el.parent?;
        }
    }

    fn lower_data_elements_to(&self, eids: &[ElementId], pids: &[PathId]) -> Vec<ElementId> {
        let wanted: HashSet<PathId> = pids.iter().copied().collect();
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = eids.to_vec();
        while let Some(e) = stack.pop() {
            if let Some(el) = self.elements.get(&e) {
                if wanted.contains(&el.path) {
                    out.push(e);
                }
                if let Some(kids) = self.children.get(&e) {
                    stack.extend(kids.iter().copied());
                }
            }
        }
        out.sort_unstable();
        out
    }

    fn get_path_id(&self, eid: ElementId) -> Option<PathId> {
        self.elements.get(&eid).map(|el| el.path)
    }

    fn get_entry(&self, eid: ElementId) -> Option<ElementEntry> {
        self.elements.get(&eid).map(|el| ElementEntry {
            path_id: el.path,
            parent: el.parent,
        })
    }

    fn path_depth(&self, pid: PathId) -> usize {
        self.paths[pid.0 as usize].depth
    }

    fn is_prefix_of(&self, p1: PathId, p2: PathId) -> bool {
        let mut cur = Some(p2);
        while let Some(p) = cur {
            if p == p1 {
                return true;
            }
            cur = self.paths[p.0 as usize].parent;
        }
        false
    }

    fn pop_notification(&mut self) -> Option<IndexerNotification> {
        if self.queue.is_empty() {
            return None;
        }
        // longest path first; stable among equal depths
        let mut best = 0;
        let mut best_depth = self.path_depth(self.queue[0].pid());
        for (i, n) in self.queue.iter().enumerate().skip(1) {
            let d = self.path_depth(n.pid());
            if d > best_depth {
                best = i;
                best_depth = d;
            }
        }
        let note = self.queue.remove(best);
        if let IndexerNotification::UpdateMatchCount { node, deltas, .. } = &note {
            if let Some(counts) = self.queued_counts.get_mut(node) {
                for (eid, d) in deltas {
                    if let Some(c) = counts.get_mut(eid) {
                        *c -= d;
                        if *c == 0 {
                            counts.remove(eid);
                        }
                    }
                }
            }
        }
        Some(note)
    }

    fn has_pending_notifications(&self) -> bool {
        !self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RangeKey;

    fn num(n: f64) -> Key {
        Key::number(n)
    }

    fn e(n: u64) -> ElementId {
        ElementId(n)
    }

    fn point(n: f64) -> Interval {
        Interval::point(num(n))
    }

    fn setup() -> (MemoryIndexer, PathId, PathId) {
        let mut ix = MemoryIndexer::new();
        let x = ix.add_path(ix.root_path(), "x");
        let xa = ix.add_path(x, "a");
        (ix, x, xa)
    }

    #[test]
    fn test_path_interning_and_prefix() {
        let (mut ix, x, xa) = setup();
        assert_eq!(ix.add_path(x, "a"), xa);
        assert!(ix.is_prefix_of(x, xa));
        assert!(!ix.is_prefix_of(xa, x));
        assert!(ix.is_prefix_of(ix.root_path(), xa));
        // children allocated after parents: numeric order refines prefix order
        assert!(x < xa);
        assert_eq!(ix.path_depth(xa), 2);
    }

    #[test]
    fn test_registration_gets_match_points() {
        let (mut ix, x, xa) = setup();
        ix.add_element(e(1), x, None, None);
        ix.add_element(e(11), xa, Some(e(1)), Some(num(5.0)));
        let points =
            ix.add_query_calc_to_path_node(CalcId(1), x, RegistrationKind::SimpleValues);
        assert_eq!(points, vec![x, xa]);
    }

    #[test]
    fn test_value_registration_matching() {
        let (mut ix, x, xa) = setup();
        for (i, v) in [1.0, 2.0, 2.0, 3.0].iter().enumerate() {
            let parent = e(i as u64 + 1);
            ix.add_element(parent, x, None, None);
            ix.add_element(e(i as u64 + 11), xa, Some(parent), Some(num(*v)));
        }
        ix.add_query_calc_to_path_node(CalcId(1), xa, RegistrationKind::SimpleValues);
        let matches =
            ix.register_query_value(CalcId(1), UniqueValueId(1), KeyType::Number, &point(2.0));
        assert_eq!(matches, vec![e(12), e(13)]);
    }

    #[test]
    fn test_count_deltas_on_data_change() {
        let (mut ix, _x, xa) = setup();
        ix.add_query_calc_to_path_node(CalcId(1), xa, RegistrationKind::SimpleValues);
        ix.register_query_value(CalcId(1), UniqueValueId(1), KeyType::Number, &point(2.0));

        ix.add_element(e(11), xa, None, Some(num(2.0)));
        let queued = ix.get_simple_query_queued_updates(CalcId(1));
        assert_eq!(queued.get(&e(11)), Some(&1));

        let note = ix.pop_notification().unwrap();
        assert_eq!(
            note,
            IndexerNotification::UpdateMatchCount {
                node: CalcId(1),
                pid: xa,
                deltas: vec![(e(11), 1)],
            }
        );
        assert!(ix.get_simple_query_queued_updates(CalcId(1)).is_empty());
    }

    #[test]
    fn test_presence_registration_streams_membership() {
        let (mut ix, x, _xa) = setup();
        ix.add_element(e(1), x, None, None);
        ix.add_query_calc_to_path_node(CalcId(2), x, RegistrationKind::Presence);
        // existing element queued at registration
        let note = ix.pop_notification().unwrap();
        assert!(matches!(note, IndexerNotification::AddMatches { .. }));

        ix.add_element(e(2), x, None, None);
        ix.remove_element(e(2));
        assert!(ix.path_has_removals_pending(x, CalcId(2)));
        // drain: add then remove of e(2)
        let mut saw_remove = false;
        while let Some(n) = ix.pop_notification() {
            if matches!(n, IndexerNotification::RemoveMatches { .. }) {
                saw_remove = true;
            }
        }
        assert!(saw_remove);
        assert!(!ix.path_has_removals_pending(x, CalcId(2)));
    }

    #[test]
    fn test_pop_order_longest_path_first() {
        let (mut ix, x, xa) = setup();
        ix.add_query_calc_to_path_node(CalcId(1), x, RegistrationKind::Presence);
        ix.add_query_calc_to_path_node(CalcId(2), xa, RegistrationKind::SimpleValues);
        ix.register_query_value(CalcId(2), UniqueValueId(1), KeyType::Number, &point(1.0));

        // one change at x (shorter) queued before one at xa (longer)
        ix.add_element(e(1), x, None, None);
        ix.add_element(e(11), xa, Some(e(1)), Some(num(1.0)));

        let first = ix.pop_notification().unwrap();
        assert_eq!(first.pid(), xa);
    }

    #[test]
    fn test_update_simple_query_diff() {
        let (mut ix, _x, xa) = setup();
        for (i, v) in [5.0, 10.0, 15.0, 20.0].iter().enumerate() {
            ix.add_element(e(i as u64 + 11), xa, None, Some(num(*v)));
        }
        ix.add_query_calc_to_path_node(CalcId(1), xa, RegistrationKind::SimpleValues);
        let iv1 = Interval::from_range(&RangeKey::closed(num(8.0), num(18.0)));
        let matched =
            ix.register_query_value(CalcId(1), UniqueValueId(1), KeyType::Number, &iv1);
        assert_eq!(matched, vec![e(12), e(13)]);

        let iv2 = Interval::from_range(&RangeKey::closed(num(12.0), num(22.0)));
        let diff =
            ix.update_simple_query(CalcId(1), UniqueValueId(1), KeyType::Number, &iv2, &iv1);
        assert_eq!(diff.added, vec![e(14)]);
        assert_eq!(diff.removed, vec![e(12)]);
    }

    #[test]
    fn test_has_range_values() {
        let (mut ix, _x, xa) = setup();
        assert!(!ix.has_range_values(xa, KeyType::Number));
        ix.add_element(
            e(11),
            xa,
            None,
            Some(Key::Range(Box::new(RangeKey::closed(num(1.0), num(2.0))))),
        );
        assert!(ix.has_range_values(xa, KeyType::Number));
        assert!(!ix.has_range_values(xa, KeyType::String));
    }

    #[test]
    fn test_raise_and_lower() {
        let (mut ix, x, xa) = setup();
        ix.add_element(e(1), x, None, None);
        ix.add_element(e(11), xa, Some(e(1)), Some(num(1.0)));
        assert_eq!(ix.raise_to_path(e(11), x), Some(e(1)));
        assert_eq!(ix.raise_to_path(e(11), xa), Some(e(11)));
        assert_eq!(ix.lower_data_elements_to(&[e(1)], &[xa]), vec![e(11)]);
    }

    #[test]
    fn test_subtree_removal() {
        let (mut ix, x, xa) = setup();
        ix.add_element(e(1), x, None, None);
        ix.add_element(e(11), xa, Some(e(1)), Some(num(1.0)));
        ix.remove_element(e(1));
        assert_eq!(ix.element_count(), 0);
        assert!(ix.get_all_matches(x).is_empty());
        assert!(ix.get_all_matches(xa).is_empty());
    }

    #[test]
    fn test_filter_with_diff() {
        let (mut ix, x, _xa) = setup();
        ix.add_element(e(1), x, None, None);
        ix.add_element(e(2), x, None, None);
        let diff = ix.filter_data_nodes_at_path_with_diff(x, &[e(2), e(3)]);
        assert_eq!(diff.added, vec![e(1)]);
        assert_eq!(diff.removed, vec![e(3)]);
    }
}
