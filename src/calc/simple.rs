//! Terminal Simple-Selection Node
//!
//! Holds the query values the compiler registered under external value
//! ids, maps them to process-wide unique ids, keeps a pairwise-disjoint
//! cover per value type, and converts the indexer's raw match-count deltas
//! into add/remove streams.
//!
//! ## Match-count table discipline
//!
//! The `matches` table exists iff the node is a selection-projection, or
//! some type has two or more registered query values while the indexer
//! holds range values of that type at the node's path. Otherwise match
//! lookups re-query the indexer, corrected for still-queued count deltas.
//! When the table becomes required after the fact it is reconstructed from
//! the indexer's per-value match sets, reconciled against the queued
//! deltas.

use crate::calc::{CountTable, MatchDelta, NodeCommon};
use crate::disjoint::PairwiseDisjoint;
use crate::error::{EngineError, EngineResult};
use crate::ids::{ElementId, ResultId, UniqueValueId, ValueId};
use crate::indexer::Indexer;
use crate::key::{Interval, Key, KeyType};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone)]
struct RegisteredValue {
    ty: KeyType,
    key: Key,
    uid: UniqueValueId,
}

#[derive(Debug, Clone)]
enum ValueChange {
    Add {
        vid: ValueId,
        ty: KeyType,
        key: Key,
    },
    Modify {
        vid: ValueId,
        ty: KeyType,
        key: Key,
    },
    Remove {
        vid: ValueId,
    },
}

#[derive(Debug)]
struct FreedId {
    uid: UniqueValueId,
    ty: KeyType,
    iv: Interval,
}

/// Terminal query-calc node driven by registered disjoint query values.
#[derive(Debug)]
pub struct SimpleQueryCalc {
    pub common: NodeCommon,
    values: HashMap<ValueId, RegisteredValue>,
    pending: Vec<ValueChange>,
    disjoint: HashMap<KeyType, PairwiseDisjoint>,
    matches: Option<CountTable>,
    added_buf: Vec<ElementId>,
    removed_buf: Vec<ElementId>,
    proj_matches: HashMap<ResultId, BTreeSet<ElementId>>,
    max_match_count: u32,
}

impl SimpleQueryCalc {
    pub fn new(common: NodeCommon, max_match_count: u32) -> Self {
        SimpleQueryCalc {
            common,
            values: HashMap::new(),
            pending: Vec::new(),
            disjoint: HashMap::new(),
            matches: None,
            added_buf: Vec::new(),
            removed_buf: Vec::new(),
            proj_matches: HashMap::new(),
            max_match_count,
        }
    }

    /// Whether the match-count table is currently materialized.
    pub fn has_match_table(&self) -> bool {
        self.matches.is_some()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn has_pending_values(&self) -> bool {
        !self.pending.is_empty()
    }

    // === value mutation (buffered until the match phase) ===

    pub fn queue_add_value(&mut self, vid: ValueId, ty: KeyType, key: Key) {
        self.pending.push(ValueChange::Add { vid, ty, key });
    }

    pub fn queue_modify_value(&mut self, vid: ValueId, ty: KeyType, key: Key) -> EngineResult<()> {
        if !self.known_value(vid) {
            return Err(EngineError::UnknownValueId(vid));
        }
        self.pending.push(ValueChange::Modify { vid, ty, key });
        Ok(())
    }

    pub fn queue_remove_value(&mut self, vid: ValueId) -> EngineResult<()> {
        if !self.known_value(vid) {
            return Err(EngineError::UnknownValueId(vid));
        }
        self.pending.push(ValueChange::Remove { vid });
        Ok(())
    }

    fn known_value(&self, vid: ValueId) -> bool {
        self.values.contains_key(&vid)
            || self.pending.iter().any(|c| match c {
                ValueChange::Add { vid: v, .. } | ValueChange::Modify { vid: v, .. } => *v == vid,
                ValueChange::Remove { vid: v } => *v == vid,
            })
    }

    // === refresh machinery ===

    /// Register at the indexer path node (first match-point phase).
    pub fn register<I: Indexer>(&mut self, ix: &mut I) {
        if self.common.registered {
            return;
        }
        let points = ix.add_query_calc_to_path_node(
            self.common.id,
            self.common.path_id,
            crate::indexer::RegistrationKind::SimpleValues,
        );
        ix.allocate_path_id_by_path_id(self.common.path_id);
        self.common.match_points = points.into_iter().collect();
        self.common.registered = true;
    }

    /// Align buffered value changes with the existing unique ids, apply the
    /// resulting edit scripts to the indexer, and drain the buffered
    /// registration matches into one delta.
    ///
    /// Changes are classified into freed ids and incoming values; incoming
    /// values greedily reuse a freed id of the same type whose previous
    /// interval overlaps the new one, minimizing indexer churn.
    pub fn apply_value_changes<I: Indexer>(
        &mut self,
        ix: &mut I,
        alloc_uid: &mut dyn FnMut() -> UniqueValueId,
    ) -> EngineResult<MatchDelta> {
        let pending = std::mem::take(&mut self.pending);
        let mut freed: Vec<FreedId> = Vec::new();
        let mut incoming: Vec<(ValueId, KeyType, Key)> = Vec::new();
        let mut in_place: Vec<(ValueId, KeyType, Key, UniqueValueId)> = Vec::new();

        for change in pending {
            match change {
                ValueChange::Add { vid, ty, key } => incoming.push((vid, ty, key)),
                ValueChange::Remove { vid } => {
                    let Some(rv) = self.values.remove(&vid) else {
                        return Err(EngineError::UnknownValueId(vid));
                    };
                    freed.push(FreedId {
                        uid: rv.uid,
                        ty: rv.ty,
                        iv: Interval::from_key(&rv.key),
                    });
                }
                ValueChange::Modify { vid, ty, key } => {
                    let Some(rv) = self.values.get(&vid) else {
                        return Err(EngineError::UnknownValueId(vid));
                    };
                    if rv.ty == ty {
                        in_place.push((vid, ty, key, rv.uid));
                    } else {
                        let rv = self.values.remove(&vid).expect("checked above");
                        freed.push(FreedId {
                            uid: rv.uid,
                            ty: rv.ty,
                            iv: Interval::from_key(&rv.key),
                        });
                        incoming.push((vid, ty, key));
                    }
                }
            }
        }

        let mut scripts: Vec<(KeyType, crate::disjoint::EditScript)> = Vec::new();

        for (vid, ty, key, uid) in in_place {
            let iv = Interval::from_key(&key);
            let pd = self
                .disjoint
                .get_mut(&ty)
                .ok_or_else(|| EngineError::Corrupt("missing disjoint cover".into()))?;
            let script = pd
                .modify(uid, iv)
                .ok_or_else(|| EngineError::Corrupt("unknown unique value id".into()))?;
            self.values.insert(vid, RegisteredValue { ty, key, uid });
            scripts.push((ty, script));
        }

        for (vid, ty, key) in incoming {
            let iv = Interval::from_key(&key);
            let reuse = freed
                .iter()
                .position(|f| f.ty == ty && f.iv.overlaps(&iv));
            let uid = match reuse {
                Some(pos) => {
                    let f = freed.remove(pos);
                    let pd = self
                        .disjoint
                        .get_mut(&ty)
                        .ok_or_else(|| EngineError::Corrupt("missing disjoint cover".into()))?;
                    let script = pd
                        .modify(f.uid, iv)
                        .ok_or_else(|| EngineError::Corrupt("unknown unique value id".into()))?;
                    scripts.push((ty, script));
                    f.uid
                }
                None => {
                    let uid = alloc_uid();
                    let script = self.disjoint.entry(ty).or_default().add(uid, iv);
                    scripts.push((ty, script));
                    uid
                }
            };
            self.values.insert(vid, RegisteredValue { ty, key, uid });
        }

        for f in freed {
            if let Some(pd) = self.disjoint.get_mut(&f.ty) {
                if let Some(script) = pd.remove(f.uid) {
                    scripts.push((f.ty, script));
                }
                // the cover lives until all values of its type are gone
                if pd.is_empty() {
                    self.disjoint.remove(&f.ty);
                }
            }
        }

        for (ty, script) in scripts {
            for m in &script.modified {
                let diff =
                    ix.update_simple_query(self.common.id, m.id, ty, &m.new, &m.old);
                self.removed_buf.extend(diff.removed);
                self.added_buf.extend(diff.added);
            }
            for (uid, ext) in &script.removed {
                let removed = ix.unregister_query_value(self.common.id, *uid, ty, ext);
                self.removed_buf.extend(removed);
            }
            for (uid, ext) in &script.restored {
                let added = ix.register_query_value(self.common.id, *uid, ty, ext);
                self.added_buf.extend(added);
            }
        }

        self.drain_buffers(ix)
    }

    /// Drain `added`/`removed` buffers accumulated during registration.
    fn drain_buffers<I: Indexer>(&mut self, ix: &I) -> EngineResult<MatchDelta> {
        let removed: Vec<(ElementId, i32)> =
            self.removed_buf.drain(..).map(|e| (e, -1)).collect();
        let added: Vec<(ElementId, i32)> = self.added_buf.drain(..).map(|e| (e, 1)).collect();
        let mut deltas = removed;
        deltas.extend(added);
        self.apply_count_deltas(ix, deltas)
    }

    /// Apply match-count deltas, maintaining the table discipline, and
    /// produce the add/remove streams for the parent.
    pub fn apply_count_deltas<I: Indexer>(
        &mut self,
        ix: &I,
        deltas: Vec<(ElementId, i32)>,
    ) -> EngineResult<MatchDelta> {
        // net per element first: a removal plus an addition of the same
        // element inside one batch must not produce a spurious transition
        let mut net: HashMap<ElementId, i32> = HashMap::new();
        for (e, d) in &deltas {
            *net.entry(*e).or_insert(0) += d;
        }
        net.retain(|_, d| *d != 0);

        // a table that became required is built before the batch applies
        // (pending deltas net out on delivery); a table that is no longer
        // required is torn down only after the batch applied, so removal
        // transitions still see the counts
        let required = self.table_required(ix);
        if required && self.matches.is_none() {
            debug!(node = %self.common.id, "reconstructing match-count table");
            self.matches = Some(self.reconstruct_table(ix, &deltas)?);
        }

        let mut delta = MatchDelta::default();
        match &mut self.matches {
            Some(table) => {
                for (e, d) in net {
                    let (old, new) = table.add(e, d)?;
                    if old == 0 && new > 0 {
                        delta.added.push(e);
                    } else if old > 0 && new == 0 {
                        delta.removed.push(e);
                    }
                }
            }
            None => {
                // disjoint covers over scalar data: every net delta is a
                // 0/1 transition
                for (e, d) in net {
                    if d > 0 {
                        delta.added.push(e);
                    } else {
                        delta.removed.push(e);
                    }
                }
            }
        }
        if !required && self.matches.is_some() {
            self.matches = None;
        }
        delta.added.sort_unstable();
        delta.removed.sort_unstable();
        Ok(delta)
    }

    /// The match-count-required predicate: selection-projection nodes, or
    /// two or more query values of a type with range data at the path.
    fn table_required<I: Indexer>(&self, ix: &I) -> bool {
        self.common.selection_projection
            || self.disjoint.iter().any(|(ty, pd)| {
                pd.len() >= 2 && ix.has_range_values(self.common.path_id, *ty)
            })
    }

    /// Build or tear down the match table per the discipline. `pending`
    /// are count deltas already reflected in the indexer's data but not
    /// yet applied to this node (they are subtracted from a rebuilt table
    /// so their later application nets out).
    pub fn refresh_table_discipline<I: Indexer>(
        &mut self,
        ix: &I,
        pending: &[(ElementId, i32)],
    ) -> EngineResult<()> {
        let required = self.table_required(ix);
        match (self.matches.is_some(), required) {
            (false, true) => {
                debug!(node = %self.common.id, "reconstructing match-count table");
                self.matches = Some(self.reconstruct_table(ix, pending)?);
            }
            (true, false) => {
                self.matches = None;
            }
            _ => {}
        }
        Ok(())
    }

    fn reconstruct_table<I: Indexer>(
        &self,
        ix: &I,
        pending: &[(ElementId, i32)],
    ) -> EngineResult<CountTable> {
        let mut temp: HashMap<ElementId, i64> = HashMap::new();
        for (ty, pd) in &self.disjoint {
            for (uid, ext) in pd.materialization() {
                for e in ix.get_simple_query_value_matches(self.common.id, uid, *ty, &ext) {
                    *temp.entry(e).or_insert(0) += 1;
                }
            }
        }
        for (e, d) in ix.get_simple_query_queued_updates(self.common.id) {
            *temp.entry(e).or_insert(0) -= d as i64;
        }
        for (e, d) in pending {
            *temp.entry(*e).or_insert(0) -= *d as i64;
        }
        let mut table = CountTable::with_max(self.max_match_count);
        for (e, c) in temp {
            if c < 0 {
                return Err(EngineError::NegativeMatchCount(e));
            }
            table.set(e, c as u32);
        }
        Ok(table)
    }

    /// Full removal of all indexer matches at the node's path.
    pub fn remove_all_indexer_matches<I: Indexer>(&mut self, ix: &I) -> MatchDelta {
        let removed = self.get_matches(ix);
        if let Some(table) = &mut self.matches {
            *table = CountTable::with_max(self.max_match_count);
        }
        MatchDelta {
            removed,
            added: Vec::new(),
        }
    }

    // === match point maintenance ===

    pub fn set_match_points(&mut self, points: Vec<crate::ids::PathId>) {
        self.common.match_points = points.into_iter().collect();
    }

    pub fn add_to_match_points(&mut self, pid: crate::ids::PathId) {
        self.common.match_points.insert(pid);
    }

    pub fn remove_from_match_points(&mut self, pid: crate::ids::PathId) {
        self.common.match_points.remove(&pid);
    }

    // === consumer API ===

    /// Current matches. With the table absent, the indexer is re-queried
    /// and corrected for still-queued count deltas, so the answer reflects
    /// what the node has reported so far.
    pub fn get_matches<I: Indexer>(&self, ix: &I) -> Vec<ElementId> {
        match &self.matches {
            Some(table) => table.elements_where(|c| c >= 1),
            None => {
                let queued = ix.get_simple_query_queued_updates(self.common.id);
                let mut set: BTreeSet<ElementId> = BTreeSet::new();
                for (ty, pd) in &self.disjoint {
                    for (uid, ext) in pd.materialization() {
                        set.extend(ix.get_simple_query_value_matches(
                            self.common.id,
                            uid,
                            *ty,
                            &ext,
                        ));
                    }
                }
                for (e, d) in queued {
                    if d > 0 {
                        set.remove(&e);
                    } else if d < 0 {
                        set.insert(e);
                    }
                }
                set.into_iter().collect()
            }
        }
    }

    pub fn get_matches_as_obj<I: Indexer>(&self, ix: &I) -> BTreeSet<ElementId> {
        self.get_matches(ix).into_iter().collect()
    }

    /// Matches raised to the query root's prefix path.
    pub fn get_fully_raised_matches<I: Indexer>(&self, ix: &I) -> Vec<ElementId> {
        let mut out: Vec<ElementId> = self
            .get_matches(ix)
            .into_iter()
            .filter_map(|e| ix.raise_to_path(e, self.common.root_path_id))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn filter_matches<I: Indexer>(&self, ix: &I, eids: &[ElementId]) -> Vec<ElementId> {
        let current = self.get_matches_as_obj(ix);
        eids.iter()
            .filter(|e| current.contains(e))
            .copied()
            .collect()
    }

    pub fn filter_match_positions<I: Indexer>(&self, ix: &I, eids: &[ElementId]) -> Vec<usize> {
        let current = self.get_matches_as_obj(ix);
        eids.iter()
            .enumerate()
            .filter(|(_, e)| current.contains(e))
            .map(|(i, _)| i)
            .collect()
    }

    // === projection match bookkeeping ===

    pub fn add_proj_matches<I: Indexer>(
        &mut self,
        ix: &I,
        eids: &[ElementId],
        result_id: ResultId,
    ) {
        let current = self.get_matches_as_obj(ix);
        let entry = self.proj_matches.entry(result_id).or_default();
        for e in eids {
            if current.contains(e) {
                entry.insert(*e);
            }
        }
    }

    pub fn remove_proj_matches(&mut self, eids: &[ElementId], result_id: ResultId) {
        if let Some(entry) = self.proj_matches.get_mut(&result_id) {
            for e in eids {
                entry.remove(e);
            }
        }
    }

    pub fn get_proj_matches(&self, result_id: ResultId) -> Vec<ElementId> {
        self.proj_matches
            .get(&result_id)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The active disjoint materialization per type, for inspection.
    pub fn registered_intervals(&self) -> Vec<(KeyType, UniqueValueId, Interval)> {
        let mut out = Vec::new();
        for (ty, pd) in &self.disjoint {
            for (uid, iv) in pd.materialization() {
                out.push((*ty, uid, iv));
            }
        }
        out.sort_by_key(|(_, uid, _)| *uid);
        out
    }
}
