//! Order Service and Order Results
//!
//! `OrderService` wraps one `PartialOrderTree` per underlying data object
//! and is shared, reference-counted, among the order results pointing at
//! the same data. Incoming match updates are queued; a refresh drains the
//! queue under the freshly fetched comparator and flushes requirement
//! notifications to each result.
//!
//! ## Suspension protocol
//!
//! When the service becomes active or the comparator changes it is
//! suspended: match updates accumulate in `pending_match_updates` and the
//! host schedules a refresh. The refresh (1) re-reads the comparator from
//! the dominated data object, (2) re-sorts the tree, (3) drains the pending
//! queue in arrival order, (4) notifies requirements, and (5) tells each
//! result that all notifications went out so it can batch-forward to its
//! own consumers.

use crate::calc::{MatchConsumer, MatchSource};
use crate::error::{EngineError, EngineResult};
use crate::ids::{ElementId, PathId};
use crate::indexer::memory::MemoryIndexer;
use crate::key::{Key, KeyType};
use crate::order::requirement::{
    ElementOrderRequirement, OrderNotification, OrderOffset, OrderRequirement,
    RangeOrderRequirement,
};
use crate::order::tree::{CompareFn, PartialOrderTree, RequirementId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::trace;

/// Comparator descriptor handed out by the dominated data object.
pub struct CompInfo {
    compare: CompareFn,
}

impl CompInfo {
    pub fn new(compare: CompareFn) -> Self {
        CompInfo { compare }
    }

    pub fn get_compare_func(&self) -> CompareFn {
        Rc::clone(&self.compare)
    }
}

/// A data object that can be dominated by an order service.
pub trait ComparisonSource {
    /// The current comparator, or `None` while unavailable.
    fn get_dominated_comparison(&self) -> Option<CompInfo>;
}

/// Receiver for the notification batches a refresh produces.
pub trait RequirementSubscriber {
    fn deliver(&mut self, note: &OrderNotification);
    /// Called once per refresh after every notification went out.
    fn all_notifications_received(&mut self);
}

/// Receiver for order-tracing notifications on a range order result.
pub trait OrderTracingListener {
    fn update_pos(
        &mut self,
        ordered: Option<&[ElementId]>,
        first_offset: Option<usize>,
        last_offset: Option<usize>,
        set_size: usize,
    );
}

enum PendingUpdate {
    Add(Vec<ElementId>),
    Remove(Vec<ElementId>),
}

/// Shared ordering service over one data object.
pub struct OrderService {
    tree: PartialOrderTree,
    comp_source: Rc<dyn ComparisonSource>,
    suspended: bool,
    pending_match_updates: Vec<PendingUpdate>,
    subscribers: HashMap<RequirementId, Rc<RefCell<dyn RequirementSubscriber>>>,
}

impl OrderService {
    /// A new service starts suspended; the first refresh fetches the
    /// comparator.
    pub fn new(comp_source: Rc<dyn ComparisonSource>) -> Self {
        let initial: CompareFn = Rc::new(|a: ElementId, b: ElementId| a.cmp(&b));
        OrderService {
            tree: PartialOrderTree::new(initial),
            comp_source,
            suspended: true,
            pending_match_updates: Vec::new(),
            subscribers: HashMap::new(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Signal that the dominated comparator changed; the next refresh
    /// re-reads it and re-sorts.
    pub fn comparison_changed(&mut self) {
        self.suspended = true;
    }

    pub fn needs_refresh(&self) -> bool {
        self.suspended || !self.pending_match_updates.is_empty()
    }

    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// Register a range requirement together with its subscriber.
    pub fn register_range(
        &mut self,
        req: RangeOrderRequirement,
        subscriber: Rc<RefCell<dyn RequirementSubscriber>>,
    ) -> RequirementId {
        let id = self.tree.register_requirement(OrderRequirement::Range(req));
        self.subscribers.insert(id, subscriber);
        id
    }

    /// Register an element requirement together with its subscriber.
    pub fn register_element(
        &mut self,
        req: ElementOrderRequirement,
        subscriber: Rc<RefCell<dyn RequirementSubscriber>>,
    ) -> RequirementId {
        let id = self
            .tree
            .register_requirement(OrderRequirement::Element(req));
        self.subscribers.insert(id, subscriber);
        id
    }

    pub fn remove_requirement(&mut self, id: RequirementId) {
        self.tree.remove_requirement(id);
        self.subscribers.remove(&id);
    }

    /// Change a range requirement's window; deltas flow on the next
    /// refresh.
    pub fn update_range_offsets(&mut self, id: RequirementId, lo: OrderOffset, hi: OrderOffset) {
        if let Some(OrderRequirement::Range(r)) = self.tree.requirement_mut(id) {
            r.update_offsets(lo, hi);
        }
    }

    /// Ordered window for a range requirement under the current tree,
    /// including still-queued updates (appended unordered).
    pub fn ordered_matches(&self, id: RequirementId) -> Vec<ElementId> {
        let mut out = match self.peek_range(id) {
            Some(win) => win,
            None => return Vec::new(),
        };
        for upd in &self.pending_match_updates {
            match upd {
                PendingUpdate::Add(eids) => {
                    for e in eids {
                        if !out.contains(e) {
                            out.push(*e);
                        }
                    }
                }
                PendingUpdate::Remove(eids) => {
                    out.retain(|e| !eids.contains(e));
                }
            }
        }
        out
    }

    fn peek_range(&self, id: RequirementId) -> Option<Vec<ElementId>> {
        // requirement_mut needs &mut; peek through an immutable scan instead
        self.tree_requirement(id).map(|r| r.peek_window(&self.tree))
    }

    fn tree_requirement(&self, id: RequirementId) -> Option<&RangeOrderRequirement> {
        // the tree owns the requirements; expose the range variant
        self.tree.requirement_ref(id).and_then(|r| match r {
            OrderRequirement::Range(range) => Some(range),
            OrderRequirement::Element(_) => None,
        })
    }

    /// Run the suspension-protocol refresh on a shared service handle.
    ///
    /// Mutation happens under one borrow; notification dispatch runs after
    /// the borrow is released so subscribers may call back into the
    /// service.
    pub fn run_refresh(this: &Rc<RefCell<OrderService>>) -> EngineResult<()> {
        let (batches, subscribers) = {
            let mut svc = this.borrow_mut();
            if svc.suspended {
                match svc.comp_source.get_dominated_comparison() {
                    Some(info) => {
                        svc.tree.update_compare_func(info.get_compare_func());
                        svc.tree.refresh_order();
                    }
                    None => {
                        // absorbed locally: keep the previous order
                        trace!("order service refresh without comparator");
                    }
                }
                svc.suspended = false;
            }
            let pending = std::mem::take(&mut svc.pending_match_updates);
            for upd in pending {
                match upd {
                    PendingUpdate::Add(eids) => {
                        for e in eids {
                            svc.tree.insert_element(e);
                        }
                    }
                    PendingUpdate::Remove(eids) => {
                        for e in eids {
                            svc.tree.remove_element(e);
                        }
                    }
                }
            }
            let batches = svc.tree.notify_listeners();
            let subscribers = svc.subscribers.clone();
            (batches, subscribers)
        };

        let mut notified: Vec<Rc<RefCell<dyn RequirementSubscriber>>> = Vec::new();
        for (req, notes) in &batches {
            if let Some(sub) = subscribers.get(req) {
                for note in notes {
                    sub.borrow_mut().deliver(note);
                }
                if !notified.iter().any(|s| Rc::ptr_eq(s, sub)) {
                    notified.push(Rc::clone(sub));
                }
            }
        }
        for sub in notified {
            sub.borrow_mut().all_notifications_received();
        }
        Ok(())
    }
}

impl MatchConsumer for OrderService {
    fn add_matches(&mut self, eids: &[ElementId]) {
        self.pending_match_updates
            .push(PendingUpdate::Add(eids.to_vec()));
    }

    fn remove_matches(&mut self, eids: &[ElementId]) {
        self.pending_match_updates
            .push(PendingUpdate::Remove(eids.to_vec()));
    }

    fn remove_all_matches(&mut self) {
        self.pending_match_updates.clear();
        self.tree.remove_all_elements();
    }
}

/// Registry sharing one service per data object key.
#[derive(Default)]
pub struct OrderServiceRegistry {
    services: HashMap<u64, Weak<RefCell<OrderService>>>,
}

impl OrderServiceRegistry {
    pub fn new() -> Self {
        OrderServiceRegistry::default()
    }

    /// Fetch the shared service for `key`, creating it when no live
    /// reference remains.
    pub fn acquire(
        &mut self,
        key: u64,
        comp_source: Rc<dyn ComparisonSource>,
    ) -> Rc<RefCell<OrderService>> {
        if let Some(weak) = self.services.get(&key) {
            if let Some(live) = weak.upgrade() {
                return live;
            }
        }
        let service = Rc::new(RefCell::new(OrderService::new(comp_source)));
        self.services.insert(key, Rc::downgrade(&service));
        service
    }

    /// Drop registry entries whose services died.
    pub fn prune(&mut self) {
        self.services.retain(|_, weak| weak.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.services
            .values()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RangeResultInner {
    consumers: Vec<Rc<RefCell<dyn MatchConsumer>>>,
    tracing: Vec<Rc<RefCell<dyn OrderTracingListener>>>,
    dominated: Vec<ElementId>,
    batch_added: Vec<ElementId>,
    batch_removed: Vec<ElementId>,
}

impl RequirementSubscriber for RangeResultInner {
    fn deliver(&mut self, note: &OrderNotification) {
        match note {
            OrderNotification::Matches { added, removed } => {
                // removal before addition within a batch
                for c in &self.consumers {
                    if !removed.is_empty() {
                        c.borrow_mut().remove_matches(removed);
                    }
                    if !added.is_empty() {
                        c.borrow_mut().add_matches(added);
                    }
                }
                self.batch_removed.extend_from_slice(removed);
                self.batch_added.extend_from_slice(added);
            }
            OrderNotification::UpdatePos {
                ordered,
                first_offset,
                last_offset,
                set_size,
            } => {
                for t in &self.tracing {
                    t.borrow_mut().update_pos(
                        ordered.as_deref(),
                        *first_offset,
                        *last_offset,
                        *set_size,
                    );
                }
            }
            OrderNotification::RemoveAll => {
                for c in &self.consumers {
                    c.borrow_mut().remove_all_matches();
                }
                self.batch_removed.extend(self.dominated.iter().copied());
            }
            OrderNotification::UpdateOffset { .. } => {}
        }
    }

    fn all_notifications_received(&mut self) {
        for e in self.batch_removed.drain(..) {
            if let Some(pos) = self.dominated.iter().position(|d| *d == e) {
                self.dominated.remove(pos);
            }
        }
        self.dominated.extend(self.batch_added.drain(..));
    }
}

/// Per-consumer façade over a range requirement on a shared service.
pub struct RangeOrderResult {
    service: Rc<RefCell<OrderService>>,
    req: RequirementId,
    inner: Rc<RefCell<RangeResultInner>>,
}

impl RangeOrderResult {
    pub fn new(
        service: Rc<RefCell<OrderService>>,
        lo: OrderOffset,
        hi: OrderOffset,
        track_order: bool,
    ) -> Self {
        let inner = Rc::new(RefCell::new(RangeResultInner {
            consumers: Vec::new(),
            tracing: Vec::new(),
            dominated: Vec::new(),
            batch_added: Vec::new(),
            batch_removed: Vec::new(),
        }));
        let req = service.borrow_mut().register_range(
            RangeOrderRequirement::new(lo, hi, track_order),
            Rc::clone(&inner) as Rc<RefCell<dyn RequirementSubscriber>>,
        );
        RangeOrderResult {
            service,
            req,
            inner,
        }
    }

    pub fn add_consumer(&self, consumer: Rc<RefCell<dyn MatchConsumer>>) {
        self.inner.borrow_mut().consumers.push(consumer);
    }

    /// Subscribe to the ordered sequence within the window. Strong
    /// reference; remove explicitly.
    pub fn add_order_tracing(&self, listener: Rc<RefCell<dyn OrderTracingListener>>) {
        self.inner.borrow_mut().tracing.push(listener);
    }

    pub fn remove_order_tracing(&self, listener: &Rc<RefCell<dyn OrderTracingListener>>) {
        self.inner
            .borrow_mut()
            .tracing
            .retain(|t| !Rc::ptr_eq(t, listener));
    }

    /// Move the window.
    pub fn update_offsets(&self, lo: OrderOffset, hi: OrderOffset) {
        self.service
            .borrow_mut()
            .update_range_offsets(self.req, lo, hi);
    }

    /// Current ordered window, including still-queued updates.
    pub fn get_ordered_matches(&self) -> Vec<ElementId> {
        self.service.borrow().ordered_matches(self.req)
    }

    /// The match set as of the last delivered notifications; add/remove
    /// deltas stay fully incremental against this view.
    pub fn get_dominated_matches(&self) -> Vec<ElementId> {
        self.inner.borrow().dominated.clone()
    }

    pub fn service(&self) -> &Rc<RefCell<OrderService>> {
        &self.service
    }
}

impl Drop for RangeOrderResult {
    fn drop(&mut self) {
        if let Ok(mut svc) = self.service.try_borrow_mut() {
            svc.remove_requirement(self.req);
        }
    }
}

/// Offsets-by-key answer for `IndexOrderResult::get_values`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValues {
    pub keys: Vec<Option<Key>>,
    pub types: Vec<Option<KeyType>>,
    pub has_attrs: Vec<bool>,
}

struct IndexResultInner {
    service: Weak<RefCell<OrderService>>,
    self_ref: Weak<RefCell<IndexResultInner>>,
    reqs: HashMap<ElementId, RequirementId>,
    offsets: HashMap<ElementId, usize>,
    indexer: Rc<RefCell<MemoryIndexer>>,
    root_path: PathId,
    published: HashMap<ElementId, ElementId>,
}

impl IndexResultInner {
    fn track(&mut self, eid: ElementId) {
        if self.reqs.contains_key(&eid) {
            return;
        }
        let Some(service) = self.service.upgrade() else {
            return;
        };
        let Some(me) = self.self_ref.upgrade() else {
            return;
        };
        let req = service.borrow_mut().register_element(
            ElementOrderRequirement::new(eid, false),
            me as Rc<RefCell<dyn RequirementSubscriber>>,
        );
        self.reqs.insert(eid, req);
    }

    fn untrack(&mut self, eid: ElementId) {
        if let Some(req) = self.reqs.remove(&eid) {
            if let Some(service) = self.service.upgrade() {
                service.borrow_mut().remove_requirement(req);
            }
        }
        self.offsets.remove(&eid);
        if let Some(pub_eid) = self.published.remove(&eid) {
            self.indexer.borrow_mut().remove_element(pub_eid);
        }
    }

    fn publish(&mut self, eid: ElementId, offset: Option<usize>) {
        match offset {
            Some(o) => {
                self.offsets.insert(eid, o);
                let key = Key::number(o as f64);
                match self.published.get(&eid) {
                    Some(pub_eid) => {
                        self.indexer
                            .borrow_mut()
                            .set_element_value(*pub_eid, Some(key));
                    }
                    None => {
                        let pub_eid = self.indexer.borrow_mut().add_element_auto(
                            self.root_path,
                            None,
                            Some(key),
                        );
                        self.published.insert(eid, pub_eid);
                    }
                }
            }
            None => {
                self.offsets.remove(&eid);
                if let Some(pub_eid) = self.published.remove(&eid) {
                    self.indexer.borrow_mut().remove_element(pub_eid);
                }
            }
        }
    }
}

impl RequirementSubscriber for IndexResultInner {
    fn deliver(&mut self, note: &OrderNotification) {
        if let OrderNotification::UpdateOffset { eid, offset } = note {
            self.publish(*eid, *offset);
        }
    }

    fn all_notifications_received(&mut self) {}
}

impl MatchConsumer for IndexResultInner {
    fn add_matches(&mut self, eids: &[ElementId]) {
        for e in eids {
            self.track(*e);
        }
    }

    fn remove_matches(&mut self, eids: &[ElementId]) {
        for e in eids {
            self.untrack(*e);
        }
    }

    fn remove_all_matches(&mut self) {
        let tracked: Vec<ElementId> = self.reqs.keys().copied().collect();
        for e in tracked {
            self.untrack(e);
        }
    }
}

/// Order result publishing each tracked element's forward offset as a
/// number key at the root of a dominated secondary indexer.
///
/// Dual data inputs: the ordered data defines the sort universe (fed to
/// the shared service), the to-index data defines which elements to track.
pub struct IndexOrderResult {
    service: Rc<RefCell<OrderService>>,
    inner: Rc<RefCell<IndexResultInner>>,
}

impl IndexOrderResult {
    pub fn new(service: Rc<RefCell<OrderService>>, indexer: Rc<RefCell<MemoryIndexer>>) -> Self {
        let root_path = indexer.borrow().root_path();
        let inner = Rc::new_cyclic(|me| {
            RefCell::new(IndexResultInner {
                service: Rc::downgrade(&service),
                self_ref: me.clone(),
                reqs: HashMap::new(),
                offsets: HashMap::new(),
                indexer,
                root_path,
                published: HashMap::new(),
            })
        });
        IndexOrderResult { service, inner }
    }

    /// Connect the sort universe: the source's matches populate the order
    /// tree.
    pub fn set_ordered_data(&self, source: &mut dyn MatchSource) {
        source.register_consumer(Rc::clone(&self.service) as Rc<RefCell<dyn MatchConsumer>>);
    }

    /// Connect the tracked set: the source's matches select which elements
    /// get their offsets published.
    pub fn set_to_index_data(&self, source: &mut dyn MatchSource) {
        source.register_consumer(Rc::clone(&self.inner) as Rc<RefCell<dyn MatchConsumer>>);
    }

    /// Forward offsets for `eids`: key and type are present for elements
    /// currently in the order, absent otherwise.
    pub fn get_values(&self, eids: &[ElementId]) -> KeyValues {
        let inner = self.inner.borrow();
        let mut keys = Vec::with_capacity(eids.len());
        let mut types = Vec::with_capacity(eids.len());
        let mut has_attrs = Vec::with_capacity(eids.len());
        for e in eids {
            match inner.offsets.get(e) {
                Some(o) => {
                    keys.push(Some(Key::number(*o as f64)));
                    types.push(Some(KeyType::Number));
                }
                None => {
                    keys.push(None);
                    types.push(None);
                }
            }
            has_attrs.push(false);
        }
        KeyValues {
            keys,
            types,
            has_attrs,
        }
    }

    /// The dominated indexer holding the published offsets.
    pub fn dominated_indexer(&self) -> Rc<RefCell<MemoryIndexer>> {
        Rc::clone(&self.inner.borrow().indexer)
    }

    /// Order tracing is a range-result feature; requesting it here is a
    /// programmer error.
    pub fn add_order_tracing(
        &self,
        _listener: Rc<RefCell<dyn OrderTracingListener>>,
    ) -> EngineResult<()> {
        Err(EngineError::OrderTracingUnsupported)
    }

    pub fn service(&self) -> &Rc<RefCell<OrderService>> {
        &self.service
    }
}

impl Drop for IndexOrderResult {
    fn drop(&mut self) {
        let reqs: Vec<RequirementId> = self.inner.borrow().reqs.values().copied().collect();
        if let Ok(mut svc) = self.service.try_borrow_mut() {
            for req in reqs {
                svc.remove_requirement(req);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::CollectingConsumer;

    fn e(n: u64) -> ElementId {
        ElementId(n)
    }

    struct FixedComparison;

    impl ComparisonSource for FixedComparison {
        fn get_dominated_comparison(&self) -> Option<CompInfo> {
            Some(CompInfo::new(Rc::new(|a: ElementId, b: ElementId| {
                a.cmp(&b)
            })))
        }
    }

    struct NoComparison;

    impl ComparisonSource for NoComparison {
        fn get_dominated_comparison(&self) -> Option<CompInfo> {
            None
        }
    }

    fn new_service(source: Rc<dyn ComparisonSource>) -> Rc<RefCell<OrderService>> {
        Rc::new(RefCell::new(OrderService::new(source)))
    }

    /// One-shot feed for the dual data inputs of an index order result.
    struct Feed {
        matches: Vec<ElementId>,
        consumers: Vec<Rc<RefCell<dyn MatchConsumer>>>,
    }

    impl Feed {
        fn new(matches: Vec<ElementId>) -> Self {
            Feed {
                matches,
                consumers: Vec::new(),
            }
        }

        fn remove(&mut self, eids: &[ElementId]) {
            for c in &self.consumers {
                c.borrow_mut().remove_matches(eids);
            }
        }
    }

    impl MatchSource for Feed {
        fn register_consumer(&mut self, consumer: Rc<RefCell<dyn MatchConsumer>>) {
            consumer.borrow_mut().add_matches(&self.matches);
            self.consumers.push(consumer);
        }
    }

    /// Subscriber that re-enters the service during delivery; panics with
    /// a borrow error if the refresh still holds the service borrow.
    struct ReentrantProbe {
        service: std::rc::Weak<RefCell<OrderService>>,
        sizes_seen: Vec<usize>,
        finished: bool,
    }

    impl RequirementSubscriber for ReentrantProbe {
        fn deliver(&mut self, _note: &OrderNotification) {
            if let Some(svc) = self.service.upgrade() {
                self.sizes_seen.push(svc.borrow().size());
            }
        }

        fn all_notifications_received(&mut self) {
            self.finished = true;
        }
    }

    #[test]
    fn test_updates_queue_until_refresh() {
        let service = new_service(Rc::new(FixedComparison));
        assert!(service.borrow().is_suspended());

        service.borrow_mut().add_matches(&[e(2), e(1), e(3)]);
        assert_eq!(service.borrow().size(), 0);
        assert!(service.borrow().needs_refresh());

        OrderService::run_refresh(&service).unwrap();
        assert_eq!(service.borrow().size(), 3);
        assert!(!service.borrow().is_suspended());
        assert!(!service.borrow().needs_refresh());
    }

    #[test]
    fn test_refresh_dispatches_after_borrow_released() {
        let service = new_service(Rc::new(FixedComparison));
        let probe = Rc::new(RefCell::new(ReentrantProbe {
            service: Rc::downgrade(&service),
            sizes_seen: Vec::new(),
            finished: false,
        }));
        service.borrow_mut().register_range(
            RangeOrderRequirement::new(OrderOffset::forward(0), OrderOffset::forward(9), false),
            probe.clone() as Rc<RefCell<dyn RequirementSubscriber>>,
        );

        service.borrow_mut().add_matches(&[e(1), e(2), e(3)]);
        OrderService::run_refresh(&service).unwrap();

        // the probe borrowed the service from inside deliver()
        assert_eq!(probe.borrow().sizes_seen, vec![3]);
        assert!(probe.borrow().finished);
    }

    #[test]
    fn test_missing_comparator_is_absorbed() {
        let service = new_service(Rc::new(NoComparison));
        let result = RangeOrderResult::new(
            Rc::clone(&service),
            OrderOffset::forward(0),
            OrderOffset::forward(9),
            false,
        );
        service.borrow_mut().add_matches(&[e(3), e(1), e(2)]);
        OrderService::run_refresh(&service).unwrap();

        // no comparator: the resort is skipped, the previous (element-id)
        // order stands and the refresh completes
        assert!(!service.borrow().is_suspended());
        assert_eq!(result.get_ordered_matches(), vec![e(1), e(2), e(3)]);
    }

    #[test]
    fn test_comparison_changed_resuspends() {
        let service = new_service(Rc::new(FixedComparison));
        OrderService::run_refresh(&service).unwrap();
        assert!(!service.borrow().is_suspended());

        service.borrow_mut().comparison_changed();
        assert!(service.borrow().is_suspended());
        OrderService::run_refresh(&service).unwrap();
        assert!(!service.borrow().is_suspended());
    }

    #[test]
    fn test_range_result_ordered_vs_dominated() {
        let service = new_service(Rc::new(FixedComparison));
        let result = RangeOrderResult::new(
            Rc::clone(&service),
            OrderOffset::forward(0),
            OrderOffset::forward(9),
            false,
        );
        let consumer = Rc::new(RefCell::new(CollectingConsumer::default()));
        result.add_consumer(consumer.clone());

        service.borrow_mut().add_matches(&[e(1), e(2)]);
        OrderService::run_refresh(&service).unwrap();
        assert_eq!(result.get_dominated_matches(), vec![e(1), e(2)]);

        // queued updates show in the ordered view, not the dominated one
        service.borrow_mut().add_matches(&[e(3)]);
        service.borrow_mut().remove_matches(&[e(1)]);
        assert_eq!(result.get_ordered_matches(), vec![e(2), e(3)]);
        assert_eq!(result.get_dominated_matches(), vec![e(1), e(2)]);

        OrderService::run_refresh(&service).unwrap();
        assert_eq!(result.get_dominated_matches(), vec![e(2), e(3)]);
        assert_eq!(
            consumer.borrow().current,
            [e(2), e(3)].into_iter().collect()
        );
    }

    #[test]
    fn test_requirement_removed_on_result_drop() {
        let service = new_service(Rc::new(FixedComparison));
        {
            let _result = RangeOrderResult::new(
                Rc::clone(&service),
                OrderOffset::forward(0),
                OrderOffset::forward(9),
                false,
            );
            assert_eq!(service.borrow().subscribers.len(), 1);
        }
        assert!(service.borrow().subscribers.is_empty());
    }

    #[test]
    fn test_registry_shares_per_key_and_prunes() {
        let mut registry = OrderServiceRegistry::new();
        let source: Rc<dyn ComparisonSource> = Rc::new(FixedComparison);

        let first = registry.acquire(1, Rc::clone(&source));
        let second = registry.acquire(1, Rc::clone(&source));
        assert!(Rc::ptr_eq(&first, &second));
        let other = registry.acquire(2, Rc::clone(&source));
        assert!(!Rc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);

        // dead weak entries are replaced on the next acquire
        drop(first);
        drop(second);
        assert_eq!(registry.len(), 1);
        let revived = registry.acquire(1, Rc::clone(&source));
        assert_eq!(registry.len(), 2);
        drop(revived);
        drop(other);
        registry.prune();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_index_result_publishes_and_untracks() {
        let service = new_service(Rc::new(FixedComparison));
        let dominated = Rc::new(RefCell::new(MemoryIndexer::new()));
        let result = IndexOrderResult::new(Rc::clone(&service), Rc::clone(&dominated));

        let mut ordered = Feed::new(vec![e(1), e(2), e(3)]);
        let mut to_index = Feed::new(vec![e(2), e(3), e(9)]);
        result.set_ordered_data(&mut ordered);
        result.set_to_index_data(&mut to_index);
        OrderService::run_refresh(&service).unwrap();

        let values = result.get_values(&[e(2), e(3), e(9)]);
        assert_eq!(values.keys[0], Some(Key::number(1.0)));
        assert_eq!(values.keys[1], Some(Key::number(2.0)));
        assert_eq!(values.keys[2], None);
        assert_eq!(dominated.borrow().element_count(), 2);

        // untracking unpublishes from the dominated indexer
        to_index.remove(&[e(2)]);
        assert_eq!(dominated.borrow().element_count(), 1);
        let values = result.get_values(&[e(2)]);
        assert_eq!(values.keys[0], None);
    }
}
