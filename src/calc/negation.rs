//! Negation Query-Calc Node
//!
//! Selects the elements at its path that no sub-query matches. The match
//! count table encodes the algebra: indexer membership contributes +1,
//! every selection sub-match contributes +2, and in
//! projection-adds-selections mode each projection-selection element
//! contributes +1 while the membership contribution is suppressed. An
//! element is a match of the negation iff its count is exactly 1.
//!
//! Removals arriving from sub-queries while the indexer still has queued
//! removals at the node's path are parked in a pending buffer and replayed
//! in arrival order right after the node's own path removals are
//! processed, preventing a spurious transient match.

use crate::calc::{CountTable, MatchDelta, NodeCommon, SubRole};
use crate::error::{EngineError, EngineResult};
use crate::ids::{CalcId, ElementId, PathId, ResultId};
use crate::indexer::Indexer;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Count contributions per the negation algebra.
const MEMBERSHIP: i32 = 1;
const SUB_MATCH: i32 = 2;
const PROJ_SELECTION: i32 = 1;

/// Compound node negating its sub-queries over the universe at its path.
#[derive(Debug)]
pub struct NegationQueryCalc {
    pub common: NodeCommon,
    subs: Vec<(CalcId, SubRole)>,
    /// Universe membership as delivered so far.
    universe: BTreeSet<ElementId>,
    /// Absent while the node has no sub-queries (matches are exactly the
    /// universe).
    matches: Option<CountTable>,
    /// Sub-node match points strictly below `path_id`; non-zero means
    /// sub-matches need raising.
    num_lower_match_points: usize,
    /// Projection sub match points below `path_id`, for lowering.
    proj_match_points: HashSet<PathId>,
    /// Projection-adds-selections mode.
    proj_adds: bool,
    /// Refcounted projection-selection membership (only in `proj_adds`).
    proj_selection_matches: HashMap<ElementId, u32>,
    /// Sub-query removals parked until the indexer's own-path removals
    /// are delivered.
    pending_removals: Vec<(CalcId, Vec<ElementId>)>,
    /// Snapshot served while suspended.
    suspended_matches: Option<BTreeSet<ElementId>>,
    proj_matches: HashMap<ResultId, BTreeSet<ElementId>>,
    max_match_count: u32,
}

impl NegationQueryCalc {
    pub fn new(common: NodeCommon, max_match_count: u32) -> Self {
        NegationQueryCalc {
            common,
            subs: Vec::new(),
            universe: BTreeSet::new(),
            matches: None,
            num_lower_match_points: 0,
            proj_match_points: HashSet::new(),
            proj_adds: false,
            proj_selection_matches: HashMap::new(),
            pending_removals: Vec::new(),
            suspended_matches: None,
            proj_matches: HashMap::new(),
            max_match_count,
        }
    }

    pub fn sub_count(&self) -> usize {
        self.subs.len()
    }

    pub fn projection_sub_count(&self) -> usize {
        self.subs
            .iter()
            .filter(|(_, r)| *r == SubRole::Projection)
            .count()
    }

    pub fn sub_role(&self, sub: CalcId) -> Option<SubRole> {
        self.subs.iter().find(|(s, _)| *s == sub).map(|(_, r)| *r)
    }

    pub fn subs(&self) -> &[(CalcId, SubRole)] {
        &self.subs
    }

    pub fn is_suspended(&self) -> bool {
        self.common.suspended
    }

    pub fn proj_adds_mode(&self) -> bool {
        self.proj_adds
    }

    pub fn has_pending_removals(&self) -> bool {
        !self.pending_removals.is_empty()
    }

    /// Universe membership as delivered so far.
    pub fn delivered_universe(&self) -> Vec<ElementId> {
        self.universe.iter().copied().collect()
    }

    // === registration ===

    pub fn register<I: Indexer>(&mut self, ix: &mut I) {
        if self.common.registered {
            return;
        }
        let points = ix.add_query_calc_to_path_node(
            self.common.id,
            self.common.path_id,
            crate::indexer::RegistrationKind::Presence,
        );
        ix.allocate_path_id_by_path_id(self.common.path_id);
        self.common.match_points = points.into_iter().collect();
        self.common.registered = true;
    }

    // === structural phase ===

    /// Attach a sub-node. The caller folds the sub's existing matches in
    /// afterwards (`apply_sub_delta`) and its match points via
    /// `fold_sub_match_points`.
    pub fn attach_sub(&mut self, sub: CalcId, role: SubRole) -> EngineResult<()> {
        if self.subs.iter().any(|(s, _)| *s == sub) {
            return Err(EngineError::Corrupt("sub-node attached twice".into()));
        }
        self.subs.push((sub, role));
        self.ensure_table();
        Ok(())
    }

    /// Detach a sub-node; the caller retracts its contributions first.
    pub fn detach_sub(&mut self, sub: CalcId) {
        self.subs.retain(|(s, _)| *s != sub);
    }

    /// Record a sub's role flip. Contribution changes are the caller's
    /// responsibility (retract under the old role, re-apply under the
    /// new).
    pub fn flip_sub_role(&mut self, sub: CalcId, role: SubRole) {
        for (s, r) in &mut self.subs {
            if *s == sub {
                *r = role;
            }
        }
    }

    /// Fold a newly attached sub's match points into the counters.
    pub fn fold_sub_match_points<I: Indexer>(&mut self, ix: &I, sub_points: &[PathId], role: SubRole) {
        for p in sub_points {
            if *p != self.common.path_id && ix.is_prefix_of(self.common.path_id, *p) {
                self.num_lower_match_points += 1;
                if role == SubRole::Projection {
                    self.proj_match_points.insert(*p);
                }
            }
        }
    }

    /// Mirror of `fold_sub_match_points` for a match point that went away.
    pub fn remove_sub_match_point<I: Indexer>(&mut self, ix: &I, pid: PathId, role: SubRole) {
        if pid != self.common.path_id && ix.is_prefix_of(self.common.path_id, pid) {
            self.num_lower_match_points = self.num_lower_match_points.saturating_sub(1);
            if role == SubRole::Projection {
                self.proj_match_points.remove(&pid);
            }
        }
    }

    /// Sub-node match points strictly below this node's path.
    pub fn lower_match_point_count(&self) -> usize {
        self.num_lower_match_points
    }

    /// First table construction: every delivered universe member counts 1.
    fn ensure_table(&mut self) {
        if self.matches.is_some() {
            return;
        }
        let mut table = CountTable::with_max(self.max_match_count);
        for e in &self.universe {
            table.set(*e, MEMBERSHIP as u32);
        }
        self.matches = Some(table);
    }

    // === mode flips ===

    /// Enter projection-adds-selections mode: one pass clearing the
    /// membership parity bit from every odd count. Projection-selection
    /// contributions arrive afterwards via `apply_proj_selection_delta`.
    pub fn enter_proj_adds_mode(&mut self) -> EngineResult<MatchDelta> {
        if self.proj_adds {
            return Ok(MatchDelta::default());
        }
        self.proj_adds = true;
        self.ensure_table();
        let table = self.matches.as_mut().expect("ensured above");
        let before = table.elements_where(|c| c == 1);
        table.map_counts(|c| if c % 2 == 1 { c - 1 } else { c });
        let after = table.elements_where(|c| c == 1);
        Ok(diff_sets(&before, &after))
    }

    /// Leave projection-adds-selections mode: re-sum the universe
    /// membership and drop the projection-selection contributions.
    pub fn leave_proj_adds_mode(&mut self) -> EngineResult<MatchDelta> {
        if !self.proj_adds {
            return Ok(MatchDelta::default());
        }
        self.proj_adds = false;
        self.ensure_table();
        let table = self.matches.as_mut().expect("ensured above");
        let before = table.elements_where(|c| c == 1);
        let proj: Vec<ElementId> = self.proj_selection_matches.keys().copied().collect();
        for e in proj {
            table.add(e, -PROJ_SELECTION)?;
        }
        self.proj_selection_matches.clear();
        for e in self.universe.clone() {
            table.add(e, MEMBERSHIP)?;
        }
        let after = table.elements_where(|c| c == 1);
        Ok(diff_sets(&before, &after))
    }

    // === match phase ===

    /// Universe membership additions from the indexer path node.
    pub fn apply_universe_added(&mut self, eids: &[ElementId]) -> EngineResult<MatchDelta> {
        let mut delta = MatchDelta::default();
        for e in eids {
            if !self.universe.insert(*e) {
                continue;
            }
            if self.proj_adds {
                continue; // membership suppressed
            }
            match &mut self.matches {
                Some(table) => {
                    let (old, new) = table.add(*e, MEMBERSHIP)?;
                    note_transition_static(old, new, *e, &mut delta);
                }
                None => delta.added.push(*e), // matches are exactly U
            }
        }
        Ok(self.gate_suspended(delta))
    }

    /// Universe membership removals from the indexer path node.
    pub fn apply_universe_removed(&mut self, eids: &[ElementId]) -> EngineResult<MatchDelta> {
        let mut delta = MatchDelta::default();
        for e in eids {
            if !self.universe.remove(e) {
                continue;
            }
            if self.proj_adds {
                continue;
            }
            match &mut self.matches {
                Some(table) => {
                    let (old, new) = table.add(*e, -MEMBERSHIP)?;
                    note_transition_static(old, new, *e, &mut delta);
                }
                None => delta.removed.push(*e),
            }
        }
        Ok(self.gate_suspended(delta))
    }

    /// Sub-query selection match delta (already raised to this node's
    /// path). Removals must be parked by the caller when the indexer has
    /// queued removals at this path; see `park_removals`.
    pub fn apply_sub_delta(
        &mut self,
        added: &[ElementId],
        removed: &[ElementId],
    ) -> EngineResult<MatchDelta> {
        self.ensure_table();
        let mut delta = MatchDelta::default();
        {
            let table = self.matches.as_mut().expect("ensured above");
            for e in removed {
                let (old, new) = table.add(*e, -SUB_MATCH)?;
                note_transition_static(old, new, *e, &mut delta);
            }
            for e in added {
                let (old, new) = table.add(*e, SUB_MATCH)?;
                note_transition_static(old, new, *e, &mut delta);
            }
        }
        Ok(self.gate_suspended(delta))
    }

    /// Projection-selection contribution (projection-adds mode only):
    /// refcounted indicator per element.
    pub fn apply_proj_selection_delta(
        &mut self,
        added: &[ElementId],
        removed: &[ElementId],
    ) -> EngineResult<MatchDelta> {
        debug_assert!(self.proj_adds);
        self.ensure_table();
        let mut delta = MatchDelta::default();
        {
            let table = self.matches.as_mut().expect("ensured above");
            for e in removed {
                let refs = self.proj_selection_matches.get_mut(e);
                let Some(refs) = refs else { continue };
                *refs -= 1;
                if *refs == 0 {
                    self.proj_selection_matches.remove(e);
                    let (old, new) = table.add(*e, -PROJ_SELECTION)?;
                    note_transition_static(old, new, *e, &mut delta);
                }
            }
            for e in added {
                let refs = self.proj_selection_matches.entry(*e).or_insert(0);
                *refs += 1;
                if *refs == 1 {
                    let (old, new) = table.add(*e, PROJ_SELECTION)?;
                    note_transition_static(old, new, *e, &mut delta);
                }
            }
        }
        Ok(self.gate_suspended(delta))
    }

    /// Park sub-query removals while the indexer still has undelivered
    /// removals at this node's path.
    pub fn park_removals(&mut self, from: CalcId, removed: Vec<ElementId>) {
        trace!(node = %self.common.id, %from, count = removed.len(), "parking sub removals");
        self.pending_removals.push((from, removed));
    }

    /// Replay parked removals in arrival order; called right after the
    /// node's own path removal notification was processed.
    pub fn replay_parked_removals(&mut self) -> EngineResult<MatchDelta> {
        let parked = std::mem::take(&mut self.pending_removals);
        let mut delta = MatchDelta::default();
        for (_, removed) in parked {
            delta.merge(self.apply_sub_delta(&[], &removed)?);
        }
        Ok(delta)
    }

    // === suspension ===

    /// Snapshot the match set; `get_matches` serves the snapshot until
    /// resume.
    pub fn suspend<I: Indexer>(&mut self, ix: &I) {
        if self.common.suspended {
            return;
        }
        self.common.suspended = true;
        self.suspended_matches = Some(self.live_matches(ix).into_iter().collect());
    }

    /// Resume: one delta bridges the snapshot to the current state.
    pub fn resume<I: Indexer>(&mut self, ix: &I) -> MatchDelta {
        if !self.common.suspended {
            return MatchDelta::default();
        }
        self.common.suspended = false;
        let old = self.suspended_matches.take().unwrap_or_default();
        let new: BTreeSet<ElementId> = self.live_matches(ix).into_iter().collect();
        MatchDelta {
            removed: old.difference(&new).copied().collect(),
            added: new.difference(&old).copied().collect(),
        }
    }

    /// While suspended, deltas are withheld; the resume diff covers them.
    fn gate_suspended(&self, delta: MatchDelta) -> MatchDelta {
        if self.common.suspended {
            MatchDelta::default()
        } else {
            delta
        }
    }

    // === consumer API ===

    pub fn get_matches<I: Indexer>(&self, ix: &I) -> Vec<ElementId> {
        if let Some(snapshot) = &self.suspended_matches {
            return snapshot.iter().copied().collect();
        }
        self.live_matches(ix)
    }

    fn live_matches<I: Indexer>(&self, _ix: &I) -> Vec<ElementId> {
        match &self.matches {
            Some(table) => table.elements_where(|c| c == 1),
            None => self.universe.iter().copied().collect(),
        }
    }

    pub fn get_matches_as_obj<I: Indexer>(&self, ix: &I) -> BTreeSet<ElementId> {
        self.get_matches(ix).into_iter().collect()
    }

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

    // === projection matches ===

    /// Incoming projection matches: intersect with the current matches,
    /// lower to the projection match points, and record per result. The
    /// engine forwards the lowered set to each projection sub-node.
    pub fn add_proj_matches<I: Indexer>(
        &mut self,
        ix: &I,
        eids: &[ElementId],
        result_id: ResultId,
    ) -> Vec<ElementId> {
        let current = self.get_matches_as_obj(ix);
        let matched: Vec<ElementId> = eids
            .iter()
            .filter(|e| current.contains(e))
            .copied()
            .collect();
        let lowered = if self.proj_match_points.is_empty() {
            matched.clone()
        } else {
            let pids: Vec<PathId> = self.proj_match_points.iter().copied().collect();
            ix.lower_data_elements_to(&matched, &pids)
        };
        let entry = self.proj_matches.entry(result_id).or_default();
        entry.extend(matched.iter().copied());
        lowered
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

    // === match point maintenance ===

    pub fn set_match_points(&mut self, points: Vec<PathId>) {
        self.common.match_points = points.into_iter().collect();
    }

    pub fn add_to_match_points(&mut self, pid: PathId) {
        self.common.match_points.insert(pid);
    }

    pub fn remove_from_match_points(&mut self, pid: PathId) {
        self.common.match_points.remove(&pid);
    }
}

/// An element matches the negation iff its count is exactly 1.
fn note_transition_static(old: u32, new: u32, e: ElementId, delta: &mut MatchDelta) {
    let was = old == 1;
    let is = new == 1;
    if was && !is {
        delta.removed.push(e);
    } else if !was && is {
        delta.added.push(e);
    }
}

fn diff_sets(before: &[ElementId], after: &[ElementId]) -> MatchDelta {
    let before: BTreeSet<ElementId> = before.iter().copied().collect();
    let after: BTreeSet<ElementId> = after.iter().copied().collect();
    MatchDelta {
        removed: before.difference(&after).copied().collect(),
        added: after.difference(&before).copied().collect(),
    }
}
