//! Order Requirements
//!
//! Per-consumer observers on a `PartialOrderTree`. A range requirement
//! tracks a window of offsets (forward or backward, open or closed,
//! possibly complemented); an element requirement tracks one element's
//! offset. On each notification pass a requirement diffs its window
//! against the current tree state and emits incremental notifications.
//!
//! Backward offsets are translated with the current set size at
//! notification time; listeners always receive forward offsets plus the
//! set size and do any backward translation themselves.

use crate::ids::ElementId;
use crate::order::tree::PartialOrderTree;
use std::collections::HashSet;

/// One endpoint of a range requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderOffset {
    pub offset: usize,
    /// Counted from the end of the order when set.
    pub backward: bool,
    /// Excludes the element at the endpoint when set.
    pub open: bool,
}

impl OrderOffset {
    pub fn forward(offset: usize) -> Self {
        OrderOffset {
            offset,
            backward: false,
            open: false,
        }
    }

    pub fn backward(offset: usize) -> Self {
        OrderOffset {
            offset,
            backward: true,
            open: false,
        }
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    /// Forward translation under the current set size. `None` when a
    /// backward offset reaches before the first element.
    fn to_forward(self, size: usize) -> Option<isize> {
        if self.backward {
            Some(size as isize - 1 - self.offset as isize)
        } else {
            Some(self.offset as isize)
        }
    }
}

/// Notification payloads produced by a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderNotification {
    /// Set-level delta; not ordered.
    Matches {
        added: Vec<ElementId>,
        removed: Vec<ElementId>,
    },
    /// Ordered window segment that may have moved. A size-only change
    /// carries `None` for the ordered fields.
    UpdatePos {
        ordered: Option<Vec<ElementId>>,
        first_offset: Option<usize>,
        last_offset: Option<usize>,
        set_size: usize,
    },
    /// The whole order was dropped.
    RemoveAll,
    /// Element requirement: the tracked element's offset changed.
    UpdateOffset {
        eid: ElementId,
        offset: Option<usize>,
    },
}

/// A registered requirement: a range window or a single element.
pub enum OrderRequirement {
    Range(RangeOrderRequirement),
    Element(ElementOrderRequirement),
}

impl OrderRequirement {
    pub(crate) fn notify(
        &mut self,
        tree: &PartialOrderTree,
        cleared: bool,
    ) -> Vec<OrderNotification> {
        match self {
            OrderRequirement::Range(r) => r.notify(tree, cleared),
            OrderRequirement::Element(r) => r.notify(tree),
        }
    }
}

/// Observer for a window of offsets.
pub struct RangeOrderRequirement {
    pub lo: OrderOffset,
    pub hi: OrderOffset,
    /// Materialize the outside of the window instead.
    pub complement: bool,
    /// Emit `UpdatePos` notifications describing order within the window.
    pub track_order: bool,
    matched: HashSet<ElementId>,
    prev_window: Vec<ElementId>,
    prev_size: usize,
    primed: bool,
}

impl RangeOrderRequirement {
    pub fn new(lo: OrderOffset, hi: OrderOffset, track_order: bool) -> Self {
        RangeOrderRequirement {
            lo,
            hi,
            complement: false,
            track_order,
            matched: HashSet::new(),
            prev_window: Vec::new(),
            prev_size: 0,
            primed: false,
        }
    }

    pub fn complemented(mut self) -> Self {
        self.complement = true;
        self
    }

    /// Change the window; deltas flow on the next notification pass.
    pub fn update_offsets(&mut self, lo: OrderOffset, hi: OrderOffset) {
        self.lo = lo;
        self.hi = hi;
    }

    /// The window's forward-offset bounds under `size`, or `None` when the
    /// window is empty.
    fn forward_bounds(&self, size: usize) -> Option<(usize, usize)> {
        if size == 0 {
            return None;
        }
        let e1 = self.lo.to_forward(size)?;
        let e2 = self.hi.to_forward(size)?;
        let ((mut a, a_open), (mut b, b_open)) = if e1 <= e2 {
            ((e1, self.lo.open), (e2, self.hi.open))
        } else {
            ((e2, self.hi.open), (e1, self.lo.open))
        };
        if a_open {
            a += 1;
        }
        if b_open {
            b -= 1;
        }
        let a = a.max(0) as usize;
        if b < 0 || a as isize > b {
            return None;
        }
        let b = (b as usize).min(size - 1);
        if a > b {
            return None;
        }
        Some((a, b))
    }

    /// Current window contents: `(ordered, window_start_offset)`.
    fn window(&self, tree: &PartialOrderTree, size: usize) -> (Vec<ElementId>, usize) {
        let bounds = self.forward_bounds(size);
        if self.complement {
            let mut out = Vec::new();
            match bounds {
                Some((a, b)) => {
                    if a > 0 {
                        out.extend(tree.range_by_offset(0, a - 1));
                    }
                    if b + 1 < size {
                        out.extend(tree.range_by_offset(b + 1, size - 1));
                    }
                }
                None => {
                    if size > 0 {
                        out.extend(tree.range_by_offset(0, size - 1));
                    }
                }
            }
            (out, 0)
        } else {
            match bounds {
                Some((a, b)) => (tree.range_by_offset(a, b), a),
                None => (Vec::new(), 0),
            }
        }
    }

    fn notify(&mut self, tree: &PartialOrderTree, cleared: bool) -> Vec<OrderNotification> {
        let mut notes = Vec::new();
        if cleared {
            if !self.matched.is_empty() {
                notes.push(OrderNotification::RemoveAll);
            }
            self.matched.clear();
            self.prev_window.clear();
            self.prev_size = 0;
            self.primed = tree.size() == 0;
            if tree.is_empty() {
                return notes;
            }
        }

        let size = tree.size();
        let (ordered, start) = self.window(tree, size);
        let window_set: HashSet<ElementId> = ordered.iter().copied().collect();

        let added: Vec<ElementId> = ordered
            .iter()
            .copied()
            .filter(|e| !self.matched.contains(e))
            .collect();
        let mut removed: Vec<ElementId> = self
            .matched
            .iter()
            .copied()
            .filter(|e| !window_set.contains(e))
            .collect();
        removed.sort_unstable();
        if !added.is_empty() || !removed.is_empty() {
            notes.push(OrderNotification::Matches { added, removed });
        }

        if self.track_order && self.primed {
            if let Some(pos) = self.position_note(&ordered, start, size) {
                notes.push(pos);
            }
        }

        self.matched = window_set;
        self.prev_window = ordered;
        self.prev_size = size;
        self.primed = true;
        notes
    }

    /// Minimal changed span of the ordered window, or a size-only update.
    fn position_note(
        &self,
        ordered: &[ElementId],
        start: usize,
        size: usize,
    ) -> Option<OrderNotification> {
        let prev = &self.prev_window;
        let max_len = prev.len().max(ordered.len());
        let mut first_diff = None;
        for i in 0..max_len {
            if prev.get(i) != ordered.get(i) {
                first_diff = Some(i);
                break;
            }
        }
        match first_diff {
            None => {
                if size != self.prev_size {
                    Some(OrderNotification::UpdatePos {
                        ordered: None,
                        first_offset: None,
                        last_offset: None,
                        set_size: size,
                    })
                } else {
                    None
                }
            }
            Some(first) => {
                // trim the common suffix only when lengths agree, since a
                // length change shifts every later offset
                let mut last = ordered.len();
                if prev.len() == ordered.len() {
                    while last > first && prev.get(last - 1) == ordered.get(last - 1) {
                        last -= 1;
                    }
                }
                if first >= last {
                    return Some(OrderNotification::UpdatePos {
                        ordered: None,
                        first_offset: None,
                        last_offset: None,
                        set_size: size,
                    });
                }
                Some(OrderNotification::UpdatePos {
                    ordered: Some(ordered[first..last].to_vec()),
                    first_offset: Some(start + first),
                    last_offset: Some(start + last - 1),
                    set_size: size,
                })
            }
        }
    }

    /// The window under the tree's current state, without touching the
    /// materialized set.
    pub(crate) fn peek_window(&self, tree: &PartialOrderTree) -> Vec<ElementId> {
        self.window(tree, tree.size()).0
    }

    /// The materialized match set as of the last notification pass.
    pub fn current_matches(&self) -> &HashSet<ElementId> {
        &self.matched
    }

    /// The ordered window as of the last notification pass.
    pub fn current_window(&self) -> &[ElementId] {
        &self.prev_window
    }
}

/// Observer for a single element's offset.
pub struct ElementOrderRequirement {
    pub eid: ElementId,
    /// Report the offset counted from the end of the order.
    pub backward: bool,
    last: Option<Option<usize>>,
}

impl ElementOrderRequirement {
    pub fn new(eid: ElementId, backward: bool) -> Self {
        ElementOrderRequirement {
            eid,
            backward,
            last: None,
        }
    }

    fn notify(&mut self, tree: &PartialOrderTree) -> Vec<OrderNotification> {
        let size = tree.size();
        let offset = tree.offset_of(self.eid).map(|f| {
            if self.backward {
                size - 1 - f
            } else {
                f
            }
        });
        if self.last == Some(offset) {
            return Vec::new();
        }
        self.last = Some(offset);
        vec![OrderNotification::UpdateOffset {
            eid: self.eid,
            offset,
        }]
    }

    /// The last published offset, if any notification went out yet.
    pub fn last_published(&self) -> Option<Option<usize>> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tree::CompareFn;
    use std::rc::Rc;

    fn alpha_cmp() -> CompareFn {
        Rc::new(|a: ElementId, b: ElementId| a.0.cmp(&b.0))
    }

    fn e(n: u64) -> ElementId {
        ElementId(n)
    }

    fn tree_with(elems: &[u64]) -> PartialOrderTree {
        let mut t = PartialOrderTree::new(alpha_cmp());
        for n in elems {
            t.insert_element(e(*n));
        }
        t
    }

    #[test]
    fn test_forward_window_initial_population() {
        let tree = tree_with(&[1, 2, 3, 4, 5]);
        let mut req =
            RangeOrderRequirement::new(OrderOffset::forward(1), OrderOffset::forward(3), false);
        let notes = req.notify(&tree, false);
        assert_eq!(notes.len(), 1);
        match &notes[0] {
            OrderNotification::Matches { added, removed } => {
                assert_eq!(added, &vec![e(2), e(3), e(4)]);
                assert!(removed.is_empty());
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_backward_offsets_translate_at_notify_time() {
        let tree = tree_with(&[10, 20, 30, 40, 50]);
        // last two elements
        let mut req =
            RangeOrderRequirement::new(OrderOffset::backward(1), OrderOffset::backward(0), false);
        let notes = req.notify(&tree, false);
        match &notes[0] {
            OrderNotification::Matches { added, .. } => {
                assert_eq!(added, &vec![e(40), e(50)]);
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_open_endpoints() {
        let tree = tree_with(&[1, 2, 3, 4, 5]);
        let mut req = RangeOrderRequirement::new(
            OrderOffset::forward(0).open(),
            OrderOffset::forward(4).open(),
            false,
        );
        let notes = req.notify(&tree, false);
        match &notes[0] {
            OrderNotification::Matches { added, .. } => {
                assert_eq!(added, &vec![e(2), e(3), e(4)]);
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_complement_window() {
        let tree = tree_with(&[1, 2, 3, 4, 5]);
        let mut req =
            RangeOrderRequirement::new(OrderOffset::forward(1), OrderOffset::forward(3), false)
                .complemented();
        let notes = req.notify(&tree, false);
        match &notes[0] {
            OrderNotification::Matches { added, .. } => {
                assert_eq!(added, &vec![e(1), e(5)]);
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_membership_delta_after_removal() {
        let mut tree = tree_with(&[1, 2, 3, 4, 5]);
        let mut req =
            RangeOrderRequirement::new(OrderOffset::forward(1), OrderOffset::forward(3), true);
        req.notify(&tree, false);

        tree.remove_element(e(3));
        let notes = req.notify(&tree, false);
        // window over [1,2,4,5] at offsets 1..=3 is [2,4,5]
        match &notes[0] {
            OrderNotification::Matches { added, removed } => {
                assert_eq!(added, &vec![e(5)]);
                assert_eq!(removed, &vec![e(3)]);
            }
            other => panic!("unexpected note {other:?}"),
        }
        // order positions shifted for the tail of the window
        match &notes[1] {
            OrderNotification::UpdatePos {
                ordered,
                first_offset,
                last_offset,
                set_size,
            } => {
                assert_eq!(ordered.as_deref(), Some(&[e(4), e(5)][..]));
                assert_eq!((*first_offset, *last_offset), (Some(2), Some(3)));
                assert_eq!(*set_size, 4);
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_size_only_change() {
        let mut tree = tree_with(&[1, 2, 3, 4, 5]);
        let mut req =
            RangeOrderRequirement::new(OrderOffset::forward(1), OrderOffset::forward(3), true);
        req.notify(&tree, false);

        // insert past the window: contents unchanged, size changes
        tree.insert_element(e(9));
        let notes = req.notify(&tree, false);
        assert_eq!(notes.len(), 1);
        match &notes[0] {
            OrderNotification::UpdatePos {
                ordered, set_size, ..
            } => {
                assert!(ordered.is_none());
                assert_eq!(*set_size, 6);
            }
            other => panic!("unexpected note {other:?}"),
        }
    }

    #[test]
    fn test_remove_all_emits_remove_all() {
        let mut tree = tree_with(&[1, 2, 3]);
        let mut req =
            RangeOrderRequirement::new(OrderOffset::forward(0), OrderOffset::forward(2), false);
        req.notify(&tree, false);
        tree.remove_all_elements();
        let notes = req.notify(&tree, true);
        assert_eq!(notes, vec![OrderNotification::RemoveAll]);
    }

    #[test]
    fn test_element_requirement() {
        let mut tree = tree_with(&[1, 2, 3, 4]);
        let mut req = ElementOrderRequirement::new(e(3), false);
        let notes = req.notify(&tree);
        assert_eq!(
            notes,
            vec![OrderNotification::UpdateOffset {
                eid: e(3),
                offset: Some(2)
            }]
        );
        // unchanged: silent
        assert!(req.notify(&tree).is_empty());

        tree.remove_element(e(1));
        let notes = req.notify(&tree);
        assert_eq!(
            notes,
            vec![OrderNotification::UpdateOffset {
                eid: e(3),
                offset: Some(1)
            }]
        );

        tree.remove_element(e(3));
        let notes = req.notify(&tree);
        assert_eq!(
            notes,
            vec![OrderNotification::UpdateOffset {
                eid: e(3),
                offset: None
            }]
        );
    }

    #[test]
    fn test_element_requirement_backward() {
        let tree = tree_with(&[1, 2, 3, 4]);
        let mut req = ElementOrderRequirement::new(e(3), true);
        let notes = req.notify(&tree);
        assert_eq!(
            notes,
            vec![OrderNotification::UpdateOffset {
                eid: e(3),
                offset: Some(1)
            }]
        );
    }

    #[test]
    fn test_window_narrower_than_data() {
        let tree = tree_with(&[1]);
        let mut req =
            RangeOrderRequirement::new(OrderOffset::forward(3), OrderOffset::forward(5), false);
        assert!(req.notify(&tree, false).is_empty());
    }
}
