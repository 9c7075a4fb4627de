//! Query Engine
//!
//! Owns the query-calc node arena, the refresh queue, and the indexer, and
//! routes incremental match streams bottom-up from terminal nodes through
//! negations to the registered consumers.
//!
//! ## Refresh cycle
//!
//! `refresh` drains the queue to a fixed point in three strict phases:
//!
//! 1. **Structure**: attach/detach/flip operations, applied top-down.
//! 2. **Match points**: unregistered nodes register with the indexer,
//!    deepest paths first; match points fold into parent counters.
//! 3. **Matches**: buffered value changes turn into indexer edit
//!    scripts, then queued indexer notifications are pumped one at a
//!    time, longest path first, so children see updates before parents.
//!
//! Destruction is deferred to the quiescent end of the cycle. Within any
//! batch, removals are delivered before additions.

use crate::calc::{
    MatchConsumer, MatchDelta, NegationQueryCalc, NodeCommon, SimpleQueryCalc, SubRole,
};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::ids::{CalcId, ElementId, PathId, ResultId, UniqueValueId, ValueId};
use crate::indexer::{Indexer, IndexerNotification};
use crate::key::{Key, KeyType};
use crate::refresh::{RefreshQueue, StructureOp};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use tracing::{debug, trace};

/// Raise bookkeeping for one child node: the raised element each child
/// match mapped to (so removals resolve even after the element left the
/// indexer), and how many child matches currently raise to each element.
#[derive(Debug, Default)]
struct RaiseState {
    by_child: HashMap<ElementId, ElementId>,
    counts: HashMap<ElementId, u32>,
}

/// A node in the engine's arena.
pub enum CalcNode {
    Simple(SimpleQueryCalc),
    Negation(NegationQueryCalc),
}

impl CalcNode {
    pub fn common(&self) -> &NodeCommon {
        match self {
            CalcNode::Simple(n) => &n.common,
            CalcNode::Negation(n) => &n.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut NodeCommon {
        match self {
            CalcNode::Simple(n) => &mut n.common,
            CalcNode::Negation(n) => &mut n.common,
        }
    }
}

/// The incremental query engine over one indexer.
pub struct QueryEngine<I: Indexer> {
    indexer: I,
    nodes: HashMap<CalcId, CalcNode>,
    consumers: HashMap<CalcId, Vec<Rc<RefCell<dyn MatchConsumer>>>>,
    /// Per-child raise bookkeeping: which raised element each child match
    /// maps to, plus refcounts per raised element.
    raised: HashMap<CalcId, RaiseState>,
    queue: RefreshQueue,
    next_calc: u64,
    next_uid: u64,
    next_result: u64,
    config: Config,
}

impl<I: Indexer> QueryEngine<I> {
    pub fn new(indexer: I) -> Self {
        QueryEngine::with_config(indexer, Config::default())
    }

    pub fn with_config(indexer: I, config: Config) -> Self {
        QueryEngine {
            indexer,
            nodes: HashMap::new(),
            consumers: HashMap::new(),
            raised: HashMap::new(),
            queue: RefreshQueue::new(),
            next_calc: 1,
            next_uid: 1,
            next_result: 1,
            config,
        }
    }

    pub fn indexer(&self) -> &I {
        &self.indexer
    }

    pub fn indexer_mut(&mut self) -> &mut I {
        &mut self.indexer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // === node construction ===

    pub fn add_simple_calc(&mut self, path_id: PathId, root_path_id: PathId) -> CalcId {
        let id = self.alloc_calc();
        let common = NodeCommon::new(id, path_id, root_path_id);
        self.nodes.insert(
            id,
            CalcNode::Simple(SimpleQueryCalc::new(
                common,
                self.config.matches.max_match_count,
            )),
        );
        id
    }

    pub fn add_negation_calc(&mut self, path_id: PathId, root_path_id: PathId) -> CalcId {
        let id = self.alloc_calc();
        let common = NodeCommon::new(id, path_id, root_path_id);
        self.nodes.insert(
            id,
            CalcNode::Negation(NegationQueryCalc::new(
                common,
                self.config.matches.max_match_count,
            )),
        );
        id
    }

    fn alloc_calc(&mut self) -> CalcId {
        let id = CalcId(self.next_calc);
        self.next_calc += 1;
        id
    }

    pub fn new_result_id(&mut self) -> ResultId {
        let id = ResultId(self.next_result);
        self.next_result += 1;
        id
    }

    // === structural mutation (queued until the next refresh) ===

    pub fn attach_sub(&mut self, parent: CalcId, child: CalcId, role: SubRole) {
        self.queue.structure.push_back(StructureOp::AttachSub {
            parent,
            child,
            role,
        });
    }

    pub fn detach_sub(&mut self, parent: CalcId, child: CalcId) {
        self.queue
            .structure
            .push_back(StructureOp::DetachSub { parent, child });
    }

    pub fn flip_sub_role(&mut self, parent: CalcId, child: CalcId, role: SubRole) {
        self.queue.structure.push_back(StructureOp::FlipSubRole {
            parent,
            child,
            role,
        });
    }

    pub fn set_selection_projection(&mut self, node: CalcId, on: bool) {
        self.queue
            .structure
            .push_back(StructureOp::SetSelectionProjection { node, on });
    }

    pub fn set_proj_adds_mode(&mut self, node: CalcId, on: bool) {
        self.queue
            .structure
            .push_back(StructureOp::SetProjAddsMode { node, on });
    }

    pub fn destroy_calc(&mut self, node: CalcId) {
        self.queue.destroy.push(node);
    }

    // === value mutation ===

    pub fn add_value(
        &mut self,
        calc: CalcId,
        vid: ValueId,
        ty: KeyType,
        key: Key,
    ) -> EngineResult<()> {
        match self.nodes.get_mut(&calc) {
            Some(CalcNode::Simple(node)) => {
                node.queue_add_value(vid, ty, key);
                self.queue.value_dirty.insert(calc);
                Ok(())
            }
            Some(CalcNode::Negation(_)) => Err(EngineError::Corrupt(
                "query values belong on simple nodes".into(),
            )),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    pub fn modify_value(
        &mut self,
        calc: CalcId,
        vid: ValueId,
        ty: KeyType,
        key: Key,
    ) -> EngineResult<()> {
        match self.nodes.get_mut(&calc) {
            Some(CalcNode::Simple(node)) => {
                node.queue_modify_value(vid, ty, key)?;
                self.queue.value_dirty.insert(calc);
                Ok(())
            }
            Some(CalcNode::Negation(_)) => Err(EngineError::Corrupt(
                "query values belong on simple nodes".into(),
            )),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    pub fn remove_value(&mut self, calc: CalcId, vid: ValueId) -> EngineResult<()> {
        match self.nodes.get_mut(&calc) {
            Some(CalcNode::Simple(node)) => {
                node.queue_remove_value(vid)?;
                self.queue.value_dirty.insert(calc);
                Ok(())
            }
            Some(CalcNode::Negation(_)) => Err(EngineError::Corrupt(
                "query values belong on simple nodes".into(),
            )),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    // === consumers ===

    pub fn register_consumer(&mut self, calc: CalcId, consumer: Rc<RefCell<dyn MatchConsumer>>) {
        self.consumers.entry(calc).or_default().push(consumer);
    }

    // === suspension ===

    pub fn suspend(&mut self, calc: CalcId) -> EngineResult<()> {
        let mut node = self
            .nodes
            .remove(&calc)
            .ok_or(EngineError::UnknownCalc(calc.0))?;
        let result = match &mut node {
            CalcNode::Negation(n) => {
                n.suspend(&self.indexer);
                Ok(())
            }
            CalcNode::Simple(_) => Err(EngineError::NotSuspensible),
        };
        self.nodes.insert(calc, node);
        result
    }

    pub fn resume(&mut self, calc: CalcId) -> EngineResult<()> {
        let mut node = self
            .nodes
            .remove(&calc)
            .ok_or(EngineError::UnknownCalc(calc.0))?;
        let delta = match &mut node {
            CalcNode::Negation(n) => Ok(n.resume(&self.indexer)),
            CalcNode::Simple(_) => Err(EngineError::NotSuspensible),
        };
        self.nodes.insert(calc, node);
        self.route_delta(calc, delta?)
    }

    pub fn is_suspended(&self, calc: CalcId) -> bool {
        self.nodes
            .get(&calc)
            .map(|n| n.common().suspended)
            .unwrap_or(false)
    }

    // === the refresh cycle ===

    /// Drain the refresh queue to a fixed point.
    pub fn refresh(&mut self) -> EngineResult<()> {
        loop {
            let structural = self.run_structure_phase()?;
            self.run_match_point_phase();
            let matched = self.run_match_phase()?;
            if !structural
                && !matched
                && self.queue.is_drained()
                && !self.indexer.has_pending_notifications()
            {
                break;
            }
        }
        self.run_destroy_phase()?;
        Ok(())
    }

    /// Phase 1: structural changes, top-down (queue order).
    fn run_structure_phase(&mut self) -> EngineResult<bool> {
        let mut did_work = false;
        while let Some(op) = self.queue.structure.pop_front() {
            did_work = true;
            match op {
                StructureOp::AttachSub {
                    parent,
                    child,
                    role,
                } => self.do_attach_sub(parent, child, role)?,
                StructureOp::DetachSub { parent, child } => self.do_detach_sub(parent, child)?,
                StructureOp::FlipSubRole {
                    parent,
                    child,
                    role,
                } => self.do_flip_sub_role(parent, child, role)?,
                StructureOp::SetSelectionProjection { node, on } => {
                    self.do_set_selection_projection(node, on)?;
                }
                StructureOp::SetProjAddsMode { node, on } => {
                    self.do_set_proj_adds(node, on)?;
                }
            }
        }
        Ok(did_work)
    }

    fn do_attach_sub(&mut self, parent: CalcId, child: CalcId, role: SubRole) -> EngineResult<()> {
        debug!(%parent, %child, ?role, "attach sub-node");
        {
            let child_node = self
                .nodes
                .get_mut(&child)
                .ok_or(EngineError::UnknownCalc(child.0))?;
            child_node.common_mut().parent = Some(parent);
            child_node.common_mut().must_add_matches = true;
        }
        let child_matches = self.node_matches(child)?;
        let child_points: Vec<PathId> = self
            .nodes
            .get(&child)
            .map(|n| n.common().match_points.iter().copied().collect())
            .unwrap_or_default();

        let mut parent_node = self
            .nodes
            .remove(&parent)
            .ok_or(EngineError::UnknownCalc(parent.0))?;
        let delta = match &mut parent_node {
            CalcNode::Negation(neg) => {
                neg.attach_sub(child, role)?;
                neg.fold_sub_match_points(&self.indexer, &child_points, role);
                let raised = self.raise_child_additions(child, neg.common.path_id, &child_matches);
                if neg.proj_adds_mode() && role == SubRole::Projection {
                    neg.apply_proj_selection_delta(&raised, &[])?
                } else {
                    neg.apply_sub_delta(&raised, &[])?
                }
            }
            CalcNode::Simple(_) => {
                self.nodes.insert(parent, parent_node);
                return Err(EngineError::Corrupt(
                    "terminal nodes take no sub-nodes".into(),
                ));
            }
        };
        self.nodes.insert(parent, parent_node);
        if let Some(n) = self.nodes.get_mut(&child) {
            n.common_mut().must_add_matches = false;
        }
        self.route_delta(parent, delta)
    }

    fn do_detach_sub(&mut self, parent: CalcId, child: CalcId) -> EngineResult<()> {
        let raised_now: Vec<ElementId> = self
            .raised
            .get(&child)
            .map(|m| m.counts.keys().copied().collect())
            .unwrap_or_default();
        self.raised.remove(&child);

        let mut parent_node = self
            .nodes
            .remove(&parent)
            .ok_or(EngineError::UnknownCalc(parent.0))?;
        let delta = match &mut parent_node {
            CalcNode::Negation(neg) => {
                let role = neg.sub_role(child);
                let delta = if neg.proj_adds_mode() && role == Some(SubRole::Projection) {
                    neg.apply_proj_selection_delta(&[], &raised_now)?
                } else {
                    neg.apply_sub_delta(&[], &raised_now)?
                };
                neg.detach_sub(child);
                delta
            }
            CalcNode::Simple(_) => MatchDelta::default(),
        };
        self.nodes.insert(parent, parent_node);
        if let Some(n) = self.nodes.get_mut(&child) {
            n.common_mut().parent = None;
        }
        self.route_delta(parent, delta)
    }

    fn do_flip_sub_role(
        &mut self,
        parent: CalcId,
        child: CalcId,
        role: SubRole,
    ) -> EngineResult<()> {
        let raised_now: Vec<ElementId> = self
            .raised
            .get(&child)
            .map(|m| m.counts.keys().copied().collect())
            .unwrap_or_default();
        let mut parent_node = self
            .nodes
            .remove(&parent)
            .ok_or(EngineError::UnknownCalc(parent.0))?;
        let delta = match &mut parent_node {
            CalcNode::Negation(neg) => {
                let old_role = neg.sub_role(child);
                neg.flip_sub_role(child, role);
                if !neg.proj_adds_mode() || old_role == Some(role) {
                    MatchDelta::default()
                } else if role == SubRole::Projection {
                    // selection contributions become projection-selection
                    let mut d = neg.apply_sub_delta(&[], &raised_now)?;
                    d.merge(neg.apply_proj_selection_delta(&raised_now, &[])?);
                    d
                } else {
                    let mut d = neg.apply_proj_selection_delta(&[], &raised_now)?;
                    d.merge(neg.apply_sub_delta(&raised_now, &[])?);
                    d
                }
            }
            CalcNode::Simple(_) => MatchDelta::default(),
        };
        self.nodes.insert(parent, parent_node);
        self.route_delta(parent, delta)
    }

    fn do_set_selection_projection(&mut self, node: CalcId, on: bool) -> EngineResult<()> {
        let mut taken = self
            .nodes
            .remove(&node)
            .ok_or(EngineError::UnknownCalc(node.0))?;
        let result = match &mut taken {
            CalcNode::Simple(n) => {
                n.common.selection_projection = on;
                n.refresh_table_discipline(&self.indexer, &[])
            }
            CalcNode::Negation(n) => {
                n.common.selection_projection = on;
                Ok(())
            }
        };
        self.nodes.insert(node, taken);
        result
    }

    fn do_set_proj_adds(&mut self, node: CalcId, on: bool) -> EngineResult<()> {
        // gather projection subs' current raised matches first
        let proj_subs: Vec<CalcId> = match self.nodes.get(&node) {
            Some(CalcNode::Negation(neg)) => neg
                .subs()
                .iter()
                .filter(|(_, r)| *r == SubRole::Projection)
                .map(|(s, _)| *s)
                .collect(),
            _ => return Err(EngineError::UnknownCalc(node.0)),
        };
        let proj_raised: Vec<(CalcId, Vec<ElementId>)> = proj_subs
            .iter()
            .map(|s| {
                (
                    *s,
                    self.raised
                        .get(s)
                        .map(|m| m.counts.keys().copied().collect())
                        .unwrap_or_default(),
                )
            })
            .collect();

        let mut taken = self
            .nodes
            .remove(&node)
            .ok_or(EngineError::UnknownCalc(node.0))?;
        let delta = match &mut taken {
            CalcNode::Negation(neg) => {
                let mut delta = MatchDelta::default();
                if on && !neg.proj_adds_mode() {
                    // projection subs stop counting as negated selections
                    for (_, raised) in &proj_raised {
                        delta.merge(neg.apply_sub_delta(&[], raised)?);
                    }
                    delta.merge(neg.enter_proj_adds_mode()?);
                    for (_, raised) in &proj_raised {
                        delta.merge(neg.apply_proj_selection_delta(raised, &[])?);
                    }
                } else if !on && neg.proj_adds_mode() {
                    delta.merge(neg.leave_proj_adds_mode()?);
                    for (_, raised) in &proj_raised {
                        delta.merge(neg.apply_sub_delta(raised, &[])?);
                    }
                }
                delta
            }
            CalcNode::Simple(_) => MatchDelta::default(),
        };
        self.nodes.insert(node, taken);
        self.route_delta(node, delta)
    }

    /// Phase 2: register unregistered nodes bottom-up and fold their match
    /// points into parents.
    fn run_match_point_phase(&mut self) {
        let mut unregistered: Vec<(CalcId, usize)> = self
            .nodes
            .iter()
            .filter(|(_, n)| !n.common().registered)
            .map(|(id, n)| (*id, self.indexer.path_depth(n.common().path_id)))
            .collect();
        // deepest first: children before parents
        unregistered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        for (id, _) in unregistered {
            let mut node = match self.nodes.remove(&id) {
                Some(n) => n,
                None => continue,
            };
            match &mut node {
                CalcNode::Simple(n) => n.register(&mut self.indexer),
                CalcNode::Negation(n) => n.register(&mut self.indexer),
            }
            let points: Vec<PathId> = node.common().match_points.iter().copied().collect();
            let parent = node.common().parent;
            self.nodes.insert(id, node);

            if let Some(parent_id) = parent {
                if let Some(CalcNode::Negation(parent_node)) = self.nodes.get_mut(&parent_id) {
                    let role = parent_node.sub_role(id).unwrap_or(SubRole::Selection);
                    parent_node.fold_sub_match_points(&self.indexer, &points, role);
                }
            }
        }
    }

    /// Phase 3: apply buffered value changes, then pump queued indexer
    /// notifications longest-path-first.
    fn run_match_phase(&mut self) -> EngineResult<bool> {
        let mut did_work = false;

        let dirty: Vec<CalcId> = self.queue.value_dirty.iter().copied().collect();
        self.queue.value_dirty.clear();
        for id in dirty {
            let mut node = match self.nodes.remove(&id) {
                Some(n) => n,
                None => continue,
            };
            let delta = match &mut node {
                CalcNode::Simple(n) => {
                    if !n.common.registered {
                        // not registered yet; re-queue for the next pass
                        self.queue.value_dirty.insert(id);
                        self.nodes.insert(id, node);
                        continue;
                    }
                    let mut next_uid = self.next_uid;
                    let result = n.apply_value_changes(&mut self.indexer, &mut || {
                        let uid = UniqueValueId(next_uid);
                        next_uid += 1;
                        uid
                    });
                    self.next_uid = next_uid;
                    result
                }
                CalcNode::Negation(_) => Ok(MatchDelta::default()),
            };
            self.nodes.insert(id, node);
            did_work = true;
            let delta = delta?;
            self.route_delta(id, delta)?;
        }

        while let Some(note) = self.indexer.pop_notification() {
            did_work = true;
            self.dispatch_notification(note)?;
        }
        Ok(did_work)
    }

    fn dispatch_notification(&mut self, note: IndexerNotification) -> EngineResult<()> {
        let target = note.node();
        trace!(node = %target, "dispatch indexer notification");
        let mut node = match self.nodes.remove(&target) {
            Some(n) => n,
            None => return Ok(()), // destroyed while queued
        };
        let mut replay_parked = false;
        let mut mp_change: Option<(PathId, bool)> = None;
        let delta = match (&mut node, note) {
            (CalcNode::Simple(n), IndexerNotification::UpdateMatchCount { deltas, .. }) => {
                n.apply_count_deltas(&self.indexer, deltas)
            }
            (CalcNode::Simple(n), IndexerNotification::AddMatches { eids, .. }) => {
                n.apply_count_deltas(&self.indexer, eids.into_iter().map(|e| (e, 1)).collect())
            }
            (CalcNode::Simple(n), IndexerNotification::RemoveMatches { eids, .. }) => {
                n.apply_count_deltas(&self.indexer, eids.into_iter().map(|e| (e, -1)).collect())
            }
            (CalcNode::Simple(n), IndexerNotification::RemoveAllIndexerMatches { .. }) => {
                Ok(n.remove_all_indexer_matches(&self.indexer))
            }
            (CalcNode::Simple(n), IndexerNotification::AddToMatchPoints { pid, .. }) => {
                n.add_to_match_points(pid);
                mp_change = Some((pid, true));
                Ok(MatchDelta::default())
            }
            (CalcNode::Simple(n), IndexerNotification::RemoveFromMatchPoints { pid, .. }) => {
                n.remove_from_match_points(pid);
                mp_change = Some((pid, false));
                Ok(MatchDelta::default())
            }
            (CalcNode::Negation(n), IndexerNotification::AddMatches { eids, .. }) => {
                n.apply_universe_added(&eids)
            }
            (CalcNode::Negation(n), IndexerNotification::RemoveMatches { eids, .. }) => {
                replay_parked = true;
                n.apply_universe_removed(&eids)
            }
            (CalcNode::Negation(n), IndexerNotification::RemoveAllIndexerMatches { .. }) => {
                let universe = n.delivered_universe();
                n.apply_universe_removed(&universe)
            }
            (CalcNode::Negation(n), IndexerNotification::AddToMatchPoints { pid, .. }) => {
                n.add_to_match_points(pid);
                mp_change = Some((pid, true));
                Ok(MatchDelta::default())
            }
            (CalcNode::Negation(n), IndexerNotification::RemoveFromMatchPoints { pid, .. }) => {
                n.remove_from_match_points(pid);
                mp_change = Some((pid, false));
                Ok(MatchDelta::default())
            }
            (CalcNode::Negation(_), IndexerNotification::UpdateMatchCount { .. }) => {
                Ok(MatchDelta::default())
            }
        };
        self.nodes.insert(target, node);
        let mut delta = delta?;

        // a child's match point change also feeds its parent's counters
        if let Some((pid, added)) = mp_change {
            self.fold_match_point_into_parent(target, pid, added);
        }

        if replay_parked {
            // the indexer's own-path removals just went out: replay any
            // parked sub-query removals in arrival order
            if let Some(CalcNode::Negation(neg)) = self.nodes.get_mut(&target) {
                if neg.has_pending_removals()
                    && !self
                        .indexer
                        .path_has_removals_pending(neg.common.path_id, target)
                {
                    delta.merge(neg.replay_parked_removals()?);
                }
            }
        }
        self.route_delta(target, delta)
    }

    /// Keep a negation parent's lower-match-point counters in sync with a
    /// child whose match points changed.
    fn fold_match_point_into_parent(&mut self, child: CalcId, pid: PathId, added: bool) {
        let Some(parent_id) = self.nodes.get(&child).and_then(|n| n.common().parent) else {
            return;
        };
        if let Some(CalcNode::Negation(parent)) = self.nodes.get_mut(&parent_id) {
            let role = parent.sub_role(child).unwrap_or(SubRole::Selection);
            if added {
                parent.fold_sub_match_points(&self.indexer, &[pid], role);
            } else {
                parent.remove_sub_match_point(&self.indexer, pid, role);
            }
        }
    }

    /// Raise a child's additions into the parent's path space, refcounted
    /// so several lowered matches of one raised element count once.
    fn raise_child_additions(
        &mut self,
        child: CalcId,
        parent_path: PathId,
        added: &[ElementId],
    ) -> Vec<ElementId> {
        let state = self.raised.entry(child).or_default();
        let mut out = Vec::new();
        for e in added {
            let Some(r) = self.indexer.raise_to_path(*e, parent_path) else {
                continue;
            };
            state.by_child.insert(*e, r);
            let c = state.counts.entry(r).or_insert(0);
            *c += 1;
            if *c == 1 {
                out.push(r);
            }
        }
        out
    }

    /// Removals resolve through the remembered child-to-raised mapping:
    /// the removed element may already be gone from the indexer.
    fn raise_child_removals(
        &mut self,
        child: CalcId,
        parent_path: PathId,
        removed: &[ElementId],
    ) -> Vec<ElementId> {
        let state = self.raised.entry(child).or_default();
        let mut out = Vec::new();
        for e in removed {
            let r = match state.by_child.remove(e) {
                Some(r) => r,
                None => match self.indexer.raise_to_path(*e, parent_path) {
                    Some(r) => r,
                    None => continue,
                },
            };
            if let Some(c) = state.counts.get_mut(&r) {
                *c -= 1;
                if *c == 0 {
                    state.counts.remove(&r);
                    out.push(r);
                }
            }
        }
        out
    }

    /// Route one node's delta to its parent (raised, with removal
    /// deferral) or to its consumers. Removals always go out first.
    fn route_delta(&mut self, from: CalcId, delta: MatchDelta) -> EngineResult<()> {
        if delta.is_empty() {
            return Ok(());
        }
        let Some(node) = self.nodes.get(&from) else {
            return Ok(());
        };
        let parent = node.common().parent;

        let Some(parent_id) = parent else {
            let consumers: Vec<Rc<RefCell<dyn MatchConsumer>>> = self
                .consumers
                .get(&from)
                .map(|cs| cs.to_vec())
                .unwrap_or_default();
            for c in consumers {
                if !delta.removed.is_empty() {
                    c.borrow_mut().remove_matches(&delta.removed);
                }
                if !delta.added.is_empty() {
                    c.borrow_mut().add_matches(&delta.added);
                }
            }
            return Ok(());
        };

        let parent_path = self
            .nodes
            .get(&parent_id)
            .ok_or(EngineError::UnknownCalc(parent_id.0))?
            .common()
            .path_id;
        let raised_removed = self.raise_child_removals(from, parent_path, &delta.removed);
        let raised_added = self.raise_child_additions(from, parent_path, &delta.added);

        let mut parent_node = self
            .nodes
            .remove(&parent_id)
            .ok_or(EngineError::UnknownCalc(parent_id.0))?;
        let out = match &mut parent_node {
            CalcNode::Negation(neg) => {
                let role = neg.sub_role(from).unwrap_or(SubRole::Selection);
                if neg.proj_adds_mode() && role == SubRole::Projection {
                    neg.apply_proj_selection_delta(&raised_added, &raised_removed)
                } else {
                    let defer = !raised_removed.is_empty()
                        && self
                            .indexer
                            .path_has_removals_pending(neg.common.path_id, parent_id);
                    if defer {
                        neg.park_removals(from, raised_removed);
                        neg.apply_sub_delta(&raised_added, &[])
                    } else {
                        neg.apply_sub_delta(&raised_added, &raised_removed)
                    }
                }
            }
            CalcNode::Simple(_) => Err(EngineError::Corrupt(
                "terminal node cannot be a parent".into(),
            )),
        };
        self.nodes.insert(parent_id, parent_node);
        self.route_delta(parent_id, out?)
    }

    /// Quiescent-point destruction: retract contributions, unregister,
    /// drop.
    fn run_destroy_phase(&mut self) -> EngineResult<()> {
        let doomed = std::mem::take(&mut self.queue.destroy);
        for id in doomed {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let parent = node.common().parent;
            let pid = node.common().path_id;
            if let Some(parent_id) = parent {
                self.do_detach_sub(parent_id, id)?;
            }
            self.indexer.remove_query_calc_from_path_node(id, pid);
            self.indexer.release_path_id(pid);
            self.nodes.remove(&id);
            self.consumers.remove(&id);
            self.raised.remove(&id);
            self.queue.value_dirty.remove(&id);
        }
        Ok(())
    }

    // === consumer-facing queries ===

    fn node_matches(&self, calc: CalcId) -> EngineResult<Vec<ElementId>> {
        match self.nodes.get(&calc) {
            Some(CalcNode::Simple(n)) => Ok(n.get_matches(&self.indexer)),
            Some(CalcNode::Negation(n)) => Ok(n.get_matches(&self.indexer)),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    pub fn get_matches(&self, calc: CalcId) -> EngineResult<Vec<ElementId>> {
        self.node_matches(calc)
    }

    pub fn get_matches_as_obj(&self, calc: CalcId) -> EngineResult<BTreeSet<ElementId>> {
        Ok(self.node_matches(calc)?.into_iter().collect())
    }

    pub fn get_fully_raised_matches(&self, calc: CalcId) -> EngineResult<Vec<ElementId>> {
        match self.nodes.get(&calc) {
            Some(CalcNode::Simple(n)) => Ok(n.get_fully_raised_matches(&self.indexer)),
            Some(CalcNode::Negation(n)) => Ok(n.get_fully_raised_matches(&self.indexer)),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    pub fn filter_matches(&self, calc: CalcId, eids: &[ElementId]) -> EngineResult<Vec<ElementId>> {
        match self.nodes.get(&calc) {
            Some(CalcNode::Simple(n)) => Ok(n.filter_matches(&self.indexer, eids)),
            Some(CalcNode::Negation(n)) => Ok(n.filter_matches(&self.indexer, eids)),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    pub fn filter_match_positions(
        &self,
        calc: CalcId,
        eids: &[ElementId],
    ) -> EngineResult<Vec<usize>> {
        match self.nodes.get(&calc) {
            Some(CalcNode::Simple(n)) => Ok(n.filter_match_positions(&self.indexer, eids)),
            Some(CalcNode::Negation(n)) => Ok(n.filter_match_positions(&self.indexer, eids)),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    pub fn add_proj_matches(
        &mut self,
        calc: CalcId,
        eids: &[ElementId],
        result_id: ResultId,
    ) -> EngineResult<()> {
        let mut node = self
            .nodes
            .remove(&calc)
            .ok_or(EngineError::UnknownCalc(calc.0))?;
        let forward: Vec<(CalcId, Vec<ElementId>)> = match &mut node {
            CalcNode::Simple(n) => {
                n.add_proj_matches(&self.indexer, eids, result_id);
                Vec::new()
            }
            CalcNode::Negation(n) => {
                let lowered = n.add_proj_matches(&self.indexer, eids, result_id);
                n.subs()
                    .iter()
                    .filter(|(_, r)| *r == SubRole::Projection)
                    .map(|(s, _)| (*s, lowered.clone()))
                    .collect()
            }
        };
        self.nodes.insert(calc, node);
        for (sub, lowered) in forward {
            self.add_proj_matches(sub, &lowered, result_id)?;
        }
        Ok(())
    }

    pub fn remove_proj_matches(
        &mut self,
        calc: CalcId,
        eids: &[ElementId],
        result_id: ResultId,
    ) -> EngineResult<()> {
        let subs: Vec<CalcId> = match self.nodes.get_mut(&calc) {
            Some(CalcNode::Simple(n)) => {
                n.remove_proj_matches(eids, result_id);
                Vec::new()
            }
            Some(CalcNode::Negation(n)) => {
                n.remove_proj_matches(eids, result_id);
                n.subs()
                    .iter()
                    .filter(|(_, r)| *r == SubRole::Projection)
                    .map(|(s, _)| *s)
                    .collect()
            }
            None => return Err(EngineError::UnknownCalc(calc.0)),
        };
        for sub in subs {
            self.remove_proj_matches(sub, eids, result_id)?;
        }
        Ok(())
    }

    pub fn get_proj_matches(&self, calc: CalcId, result_id: ResultId) -> EngineResult<Vec<ElementId>> {
        match self.nodes.get(&calc) {
            Some(CalcNode::Simple(n)) => Ok(n.get_proj_matches(result_id)),
            Some(CalcNode::Negation(n)) => Ok(n.get_proj_matches(result_id)),
            None => Err(EngineError::UnknownCalc(calc.0)),
        }
    }

    /// Direct access for tests and diagnostics.
    pub fn node(&self, calc: CalcId) -> Option<&CalcNode> {
        self.nodes.get(&calc)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::CollectingConsumer;
    use crate::indexer::MemoryIndexer;

    fn e(n: u64) -> ElementId {
        ElementId(n)
    }

    fn num(n: f64) -> Key {
        Key::number(n)
    }

    /// Engine over `{a: v}` data at path x: element ids 1..=n at x, value
    /// children 11..=10+n at x/a.
    fn column_engine(values: &[f64]) -> (QueryEngine<MemoryIndexer>, PathId, PathId) {
        let mut ix = MemoryIndexer::new();
        let x = ix.add_path(ix.root_path(), "x");
        let xa = ix.add_path(x, "a");
        for (i, v) in values.iter().enumerate() {
            let parent = e(i as u64 + 1);
            ix.add_element(parent, x, None, None);
            ix.add_element(e(i as u64 + 11), xa, Some(parent), Some(num(*v)));
        }
        (QueryEngine::new(ix), x, xa)
    }

    #[test]
    fn test_refresh_reaches_fixed_point() {
        let (mut engine, x, xa) = column_engine(&[1.0, 2.0]);
        let calc = engine.add_simple_calc(xa, x);
        engine
            .add_value(calc, ValueId(1), KeyType::Number, num(2.0))
            .unwrap();
        engine.refresh().unwrap();
        assert!(!engine.indexer().has_pending_notifications());
        assert_eq!(engine.get_matches(calc).unwrap(), vec![e(12)]);

        // an empty refresh is a no-op
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(calc).unwrap(), vec![e(12)]);
    }

    #[test]
    fn test_dispatch_replays_parked_removals() {
        let (mut engine, x, xa) = column_engine(&[1.0, 1.0, 2.0]);
        let neg = engine.add_negation_calc(x, x);
        let sub = engine.add_simple_calc(xa, x);
        engine
            .add_value(sub, ValueId(1), KeyType::Number, num(2.0))
            .unwrap();
        engine.attach_sub(neg, sub, SubRole::Selection);
        let consumer = Rc::new(RefCell::new(CollectingConsumer::default()));
        engine.register_consumer(neg, consumer.clone());
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1), e(2)]);
        consumer.borrow_mut().log.clear();

        // element 3 leaves the data: the sub removal arrives before the
        // universe removal, gets parked, and is replayed after it, so the
        // consumer never hears about element 3
        engine.indexer_mut().remove_element(e(3));
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1), e(2)]);
        match engine.node(neg).unwrap() {
            CalcNode::Negation(n) => assert!(!n.has_pending_removals()),
            CalcNode::Simple(_) => unreachable!(),
        }
        for (_, eids) in &consumer.borrow().log {
            assert!(!eids.contains(&e(3)));
        }
    }

    #[test]
    fn test_raise_refcounting_collapses_lowered_matches() {
        // one element at x with two matching value children at x/a: the
        // negation must count the raised element once
        let mut ix = MemoryIndexer::new();
        let x = ix.add_path(ix.root_path(), "x");
        let xa = ix.add_path(x, "a");
        ix.add_element(e(1), x, None, None);
        ix.add_element(e(11), xa, Some(e(1)), Some(num(1.0)));
        ix.add_element(e(12), xa, Some(e(1)), Some(num(1.0)));

        let mut engine = QueryEngine::new(ix);
        let neg = engine.add_negation_calc(x, x);
        let sub = engine.add_simple_calc(xa, x);
        engine
            .add_value(sub, ValueId(1), KeyType::Number, num(1.0))
            .unwrap();
        engine.attach_sub(neg, sub, SubRole::Selection);
        engine.refresh().unwrap();
        assert!(engine.get_matches(neg).unwrap().is_empty());

        // one lowered match remains: the raised contribution persists
        engine.indexer_mut().remove_element(e(11));
        engine.refresh().unwrap();
        assert!(engine.get_matches(neg).unwrap().is_empty());

        // the last one goes: the element joins the negation
        engine.indexer_mut().remove_element(e(12));
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1)]);
    }

    #[test]
    fn test_selection_projection_flag_builds_table() {
        let (mut engine, x, xa) = column_engine(&[1.0, 2.0]);
        let calc = engine.add_simple_calc(xa, x);
        engine
            .add_value(calc, ValueId(1), KeyType::Number, num(2.0))
            .unwrap();
        engine.refresh().unwrap();
        match engine.node(calc).unwrap() {
            CalcNode::Simple(n) => assert!(!n.has_match_table()),
            CalcNode::Negation(_) => unreachable!(),
        }

        engine.set_selection_projection(calc, true);
        engine.refresh().unwrap();
        match engine.node(calc).unwrap() {
            CalcNode::Simple(n) => assert!(n.has_match_table()),
            CalcNode::Negation(_) => unreachable!(),
        }
        assert_eq!(engine.get_matches(calc).unwrap(), vec![e(12)]);

        engine.set_selection_projection(calc, false);
        engine.refresh().unwrap();
        match engine.node(calc).unwrap() {
            CalcNode::Simple(n) => assert!(!n.has_match_table()),
            CalcNode::Negation(_) => unreachable!(),
        }
    }

    #[test]
    fn test_value_mutation_errors() {
        let (mut engine, x, _xa) = column_engine(&[1.0]);
        let neg = engine.add_negation_calc(x, x);
        assert!(matches!(
            engine.add_value(neg, ValueId(1), KeyType::Number, num(1.0)),
            Err(EngineError::Corrupt(_))
        ));
        assert!(matches!(
            engine.add_value(CalcId(99), ValueId(1), KeyType::Number, num(1.0)),
            Err(EngineError::UnknownCalc(99))
        ));
        assert!(matches!(
            engine.suspend(CalcId(99)),
            Err(EngineError::UnknownCalc(99))
        ));
    }

    #[test]
    fn test_destroy_retracts_sub_contributions() {
        let (mut engine, x, xa) = column_engine(&[1.0, 2.0]);
        let neg = engine.add_negation_calc(x, x);
        let sub = engine.add_simple_calc(xa, x);
        engine
            .add_value(sub, ValueId(1), KeyType::Number, num(2.0))
            .unwrap();
        engine.attach_sub(neg, sub, SubRole::Selection);
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1)]);

        engine.destroy_calc(sub);
        engine.refresh().unwrap();
        assert_eq!(engine.node_count(), 1);
        assert!(engine.get_matches(sub).is_err());
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1), e(2)]);
    }

    #[test]
    fn test_flip_sub_role_under_proj_adds() {
        let (mut engine, x, xa) = column_engine(&[1.0, 2.0]);
        let neg = engine.add_negation_calc(x, x);
        let sub = engine.add_simple_calc(xa, x);
        engine
            .add_value(sub, ValueId(1), KeyType::Number, num(2.0))
            .unwrap();
        engine.attach_sub(neg, sub, SubRole::Projection);
        engine.refresh().unwrap();
        // a projection sub negates like a selection outside proj-adds mode
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1)]);

        engine.set_proj_adds_mode(neg, true);
        engine.refresh().unwrap();
        // membership suppressed; the sub's selection match is the only +1
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(2)]);

        // flipping the sub to selection converts its +1 back to +2
        engine.flip_sub_role(neg, sub, SubRole::Selection);
        engine.refresh().unwrap();
        assert!(engine.get_matches(neg).unwrap().is_empty());

        engine.set_proj_adds_mode(neg, false);
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1)]);
    }

    #[test]
    fn test_proj_matches_forward_to_projection_subs() {
        let (mut engine, x, xa) = column_engine(&[2.0, 2.0, 3.0]);
        let neg = engine.add_negation_calc(x, x);
        let proj = engine.add_simple_calc(xa, x);
        engine
            .add_value(proj, ValueId(1), KeyType::Number, num(3.0))
            .unwrap();
        engine.attach_sub(neg, proj, SubRole::Projection);
        engine.refresh().unwrap();
        assert_eq!(engine.get_matches(neg).unwrap(), vec![e(1), e(2)]);

        let rid = engine.new_result_id();
        engine.add_proj_matches(neg, &[e(1), e(3)], rid).unwrap();
        // intersected with the negation's matches, element 3 is dropped
        assert_eq!(engine.get_proj_matches(neg, rid).unwrap(), vec![e(1)]);
    }
}
