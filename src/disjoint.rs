//! Pairwise-Disjoint Interval Cover
//!
//! Maintains the set of intervals registered with the indexer for one value
//! type as a pairwise-disjoint cover: overlapping inserted intervals are
//! merged under a single carrier id, hidden members are remembered, and
//! every mutation returns an edit script telling the caller exactly which
//! registrations to add, drop, or update.
//!
//! Invariant: the active spans are pairwise disjoint and their union equals
//! the union of all inserted intervals.
//!
//! ## Example
//!
//! ```
//! use avql::disjoint::PairwiseDisjoint;
//! use avql::ids::UniqueValueId;
//! use avql::key::{Interval, Key, RangeKey};
//!
//! let mut pd = PairwiseDisjoint::new();
//! let a = UniqueValueId(1);
//! let b = UniqueValueId(2);
//! let iv = |lo, hi| Interval::from_range(&RangeKey::closed(Key::number(lo), Key::number(hi)));
//!
//! pd.add(a, iv(0.0, 10.0));
//! let script = pd.add(b, iv(5.0, 15.0));
//! // the cover is now a single span [0, 15] carried by `a`
//! assert_eq!(pd.materialization().len(), 1);
//! assert_eq!(script.modified[0].id, a);
//! ```

use crate::ids::UniqueValueId;
use crate::key::Interval;
use std::collections::HashMap;

/// One active (registered) span of the disjoint cover.
#[derive(Debug, Clone)]
struct Span {
    /// Id under which this span is registered with the indexer.
    id: UniqueValueId,
    /// Extent of the span: the hull of its members.
    extent: Interval,
    /// Inserted intervals covered by this span (the carrier included).
    members: Vec<UniqueValueId>,
}

/// An active span whose registered extent changed in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedInterval {
    pub id: UniqueValueId,
    pub old: Interval,
    pub new: Interval,
}

/// Registration changes produced by one mutation.
///
/// Applying the script to the previous registered materialization yields
/// the new one: unregister `removed`, register `restored`, update
/// `modified`. `covering` reports the active span that covers the mutated
/// id afterwards (absent after a removal that emptied its span).
#[derive(Debug, Clone, Default)]
pub struct EditScript {
    pub removed: Vec<(UniqueValueId, Interval)>,
    pub restored: Vec<(UniqueValueId, Interval)>,
    pub modified: Vec<ModifiedInterval>,
    pub covering: Option<(UniqueValueId, Interval)>,
}

impl EditScript {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.restored.is_empty() && self.modified.is_empty()
    }
}

/// Pairwise-disjoint cover over inserted intervals, keyed by unique value
/// id. Created on demand per value type; lives until all values of that
/// type are removed.
#[derive(Debug, Default)]
pub struct PairwiseDisjoint {
    inserted: HashMap<UniqueValueId, Interval>,
    /// Active spans, sorted by low endpoint, pairwise disjoint.
    spans: Vec<Span>,
}

impl PairwiseDisjoint {
    pub fn new() -> Self {
        PairwiseDisjoint::default()
    }

    /// Number of inserted intervals.
    pub fn len(&self) -> usize {
        self.inserted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty()
    }

    /// The registered materialization: active `(id, extent)` pairs in low
    /// endpoint order.
    pub fn materialization(&self) -> Vec<(UniqueValueId, Interval)> {
        self.spans
            .iter()
            .map(|s| (s.id, s.extent.clone()))
            .collect()
    }

    /// The interval originally inserted under `id`.
    pub fn inserted_interval(&self, id: UniqueValueId) -> Option<&Interval> {
        self.inserted.get(&id)
    }

    /// The active span id covering the inserted interval `id`.
    pub fn covering_id(&self, id: UniqueValueId) -> Option<UniqueValueId> {
        self.spans
            .iter()
            .find(|s| s.members.contains(&id))
            .map(|s| s.id)
    }

    /// Insert a new interval under a fresh id.
    pub fn add(&mut self, id: UniqueValueId, iv: Interval) -> EditScript {
        debug_assert!(!self.inserted.contains_key(&id), "duplicate interval id");
        self.inserted.insert(id, iv.clone());

        let overlapping = self.overlapping_range(&iv);
        let mut script = EditScript::default();

        if overlapping.is_empty() {
            let pos = self.insert_pos(&iv);
            self.spans.insert(
                pos,
                Span {
                    id,
                    extent: iv.clone(),
                    members: vec![id],
                },
            );
            script.restored.push((id, iv.clone()));
            script.covering = Some((id, iv));
            return script;
        }

        let first = overlapping[0];
        if overlapping.len() == 1 && self.spans[first].extent.contains_interval(&iv) {
            // fully hidden under an existing span
            self.spans[first].members.push(id);
            let s = &self.spans[first];
            script.covering = Some((s.id, s.extent.clone()));
            return script;
        }

        // merge all overlapped spans plus the new interval into the first
        let mut hull = iv;
        let mut absorbed_members = vec![id];
        for &i in overlapping.iter().rev() {
            if i == first {
                continue;
            }
            let span = self.spans.remove(i);
            hull = hull.hull(&span.extent);
            script.removed.push((span.id, span.extent));
            absorbed_members.extend(span.members);
        }
        let carrier = &mut self.spans[first];
        hull = hull.hull(&carrier.extent);
        let old_extent = carrier.extent.clone();
        carrier.extent = hull.clone();
        carrier.members.extend(absorbed_members);
        script.modified.push(ModifiedInterval {
            id: carrier.id,
            old: old_extent,
            new: hull.clone(),
        });
        script.covering = Some((carrier.id, hull));
        script
    }

    /// Remove the interval inserted under `id`. Returns `None` when the id
    /// is unknown.
    pub fn remove(&mut self, id: UniqueValueId) -> Option<EditScript> {
        self.inserted.remove(&id)?;

        let idx = self.spans.iter().position(|s| s.members.contains(&id))?;
        let span = self.spans.remove(idx);
        let mut script = EditScript::default();

        let remaining: Vec<UniqueValueId> =
            span.members.iter().copied().filter(|m| *m != id).collect();
        if remaining.is_empty() {
            script.removed.push((span.id, span.extent));
            return Some(script);
        }

        let groups = self.regroup(&remaining);
        let carrier_alive = span.id != id && remaining.contains(&span.id);
        if !carrier_alive {
            script.removed.push((span.id, span.extent.clone()));
        }

        for (extent, members) in groups {
            let keeps_carrier = carrier_alive && members.contains(&span.id);
            let group_id = if keeps_carrier { span.id } else { members[0] };
            if keeps_carrier {
                if extent == span.extent {
                    script.covering = Some((group_id, extent.clone()));
                } else {
                    script.modified.push(ModifiedInterval {
                        id: group_id,
                        old: span.extent.clone(),
                        new: extent.clone(),
                    });
                }
            } else {
                script.restored.push((group_id, extent.clone()));
            }
            let pos = self.insert_pos(&extent);
            self.spans.insert(
                pos,
                Span {
                    id: group_id,
                    extent,
                    members,
                },
            );
        }
        Some(script)
    }

    /// Replace the interval inserted under `id`, composing the removal and
    /// re-insertion into one script (same-id unregister/register pairs
    /// collapse into `modified`).
    pub fn modify(&mut self, id: UniqueValueId, iv: Interval) -> Option<EditScript> {
        let removal = self.remove(id)?;
        let addition = self.add(id, iv);
        Some(compose(removal, addition))
    }

    /// Indices of spans overlapping `iv` (contiguous, since spans are
    /// sorted and disjoint).
    fn overlapping_range(&self, iv: &Interval) -> Vec<usize> {
        self.spans
            .iter()
            .enumerate()
            .filter(|(_, s)| s.extent.overlaps(iv))
            .map(|(i, _)| i)
            .collect()
    }

    fn insert_pos(&self, iv: &Interval) -> usize {
        self.spans
            .iter()
            .position(|s| iv.lo < s.extent.lo)
            .unwrap_or(self.spans.len())
    }

    /// Re-form disjoint groups from member ids, sweeping by low endpoint.
    fn regroup(&self, members: &[UniqueValueId]) -> Vec<(Interval, Vec<UniqueValueId>)> {
        let mut sorted: Vec<(UniqueValueId, Interval)> = members
            .iter()
            .map(|m| (*m, self.inserted[m].clone()))
            .collect();
        sorted.sort_by(|a, b| a.1.lo.cmp(&b.1.lo).then_with(|| a.0.cmp(&b.0)));

        let mut groups: Vec<(Interval, Vec<UniqueValueId>)> = Vec::new();
        for (m, iv) in sorted {
            match groups.last_mut() {
                Some((extent, ids)) if extent.overlaps(&iv) => {
                    *extent = extent.hull(&iv);
                    ids.push(m);
                }
                _ => groups.push((iv, vec![m])),
            }
        }
        groups
    }
}

/// Sequentially compose two edit scripts, cancelling unregister/register
/// pairs on the same id into in-place modifications.
fn compose(first: EditScript, second: EditScript) -> EditScript {
    let mut removed = first.removed;
    let mut restored = first.restored;
    let mut modified = first.modified;
    modified.extend(second.modified);

    for (id, ext) in second.removed {
        if let Some(pos) = restored.iter().position(|(i, _)| *i == id) {
            restored.remove(pos);
        } else {
            removed.push((id, ext));
        }
    }
    for (id, ext) in second.restored {
        if let Some(pos) = removed.iter().position(|(i, _)| *i == id) {
            let (_, old) = removed.remove(pos);
            if old != ext {
                modified.push(ModifiedInterval { id, old, new: ext });
            }
        } else {
            restored.push((id, ext));
        }
    }

    EditScript {
        removed,
        restored,
        modified,
        covering: second.covering,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Key, RangeKey};

    fn iv(lo: f64, hi: f64) -> Interval {
        Interval::from_range(&RangeKey::closed(Key::number(lo), Key::number(hi)))
    }

    fn uid(n: u64) -> UniqueValueId {
        UniqueValueId(n)
    }

    /// Apply a script to a materialization the way the query calc applies
    /// it to the indexer.
    fn apply(
        mat: &mut Vec<(UniqueValueId, Interval)>,
        script: &EditScript,
    ) {
        for m in &script.modified {
            let entry = mat
                .iter_mut()
                .find(|(i, _)| *i == m.id)
                .expect("modified id must be registered");
            assert_eq!(entry.1, m.old);
            entry.1 = m.new.clone();
        }
        for (id, ext) in &script.removed {
            let pos = mat
                .iter()
                .position(|(i, e)| i == id && e == ext)
                .expect("removed id must be registered");
            mat.remove(pos);
        }
        for (id, ext) in &script.restored {
            assert!(!mat.iter().any(|(i, _)| i == id));
            mat.push((*id, ext.clone()));
        }
        mat.sort_by(|a, b| a.1.lo.cmp(&b.1.lo));
    }

    #[test]
    fn test_disjoint_inserts_stay_separate() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 5.0));
        let script = pd.add(uid(2), iv(10.0, 15.0));
        assert_eq!(script.restored.len(), 1);
        assert_eq!(pd.materialization().len(), 2);
    }

    #[test]
    fn test_overlap_merges_into_carrier() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 10.0));
        let script = pd.add(uid(2), iv(5.0, 15.0));
        assert!(script.restored.is_empty());
        assert_eq!(script.modified.len(), 1);
        assert_eq!(script.modified[0].id, uid(1));
        assert_eq!(script.modified[0].new, iv(0.0, 15.0));

        let mat = pd.materialization();
        assert_eq!(mat.len(), 1);
        assert_eq!(mat[0], (uid(1), iv(0.0, 15.0)));
    }

    #[test]
    fn test_remove_carrier_restores_member() {
        // S4 shape: r(0,10) + r(5,15) merge, removing the carrier restores
        // the survivor under its own id
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 10.0));
        pd.add(uid(2), iv(5.0, 15.0));

        let script = pd.remove(uid(1)).unwrap();
        assert_eq!(script.removed, vec![(uid(1), iv(0.0, 15.0))]);
        assert_eq!(script.restored, vec![(uid(2), iv(5.0, 15.0))]);
        assert_eq!(pd.materialization(), vec![(uid(2), iv(5.0, 15.0))]);
    }

    #[test]
    fn test_remove_hidden_member_shrinks_carrier() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 10.0));
        pd.add(uid(2), iv(5.0, 15.0));

        let script = pd.remove(uid(2)).unwrap();
        assert!(script.removed.is_empty());
        assert!(script.restored.is_empty());
        assert_eq!(script.modified.len(), 1);
        assert_eq!(script.modified[0].new, iv(0.0, 10.0));
        assert_eq!(pd.materialization(), vec![(uid(1), iv(0.0, 10.0))]);
    }

    #[test]
    fn test_remove_splits_span() {
        // a bridge interval holds two others together; removing it splits
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 4.0));
        pd.add(uid(2), iv(8.0, 12.0));
        pd.add(uid(3), iv(3.0, 9.0));
        assert_eq!(pd.materialization().len(), 1);

        let script = pd.remove(uid(3)).unwrap();
        let mat = pd.materialization();
        assert_eq!(mat.len(), 2);
        assert_eq!(mat[0].1, iv(0.0, 4.0));
        assert_eq!(mat[1].1, iv(8.0, 12.0));
        // carrier survives in one group; the other is restored
        assert_eq!(script.restored.len(), 1);
    }

    #[test]
    fn test_three_way_merge() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 4.0));
        pd.add(uid(2), iv(8.0, 12.0));
        let script = pd.add(uid(3), iv(3.0, 9.0));
        assert_eq!(script.removed.len(), 1);
        assert_eq!(script.modified.len(), 1);
        assert_eq!(pd.materialization(), vec![(uid(1), iv(0.0, 12.0))]);
    }

    #[test]
    fn test_hidden_add_is_silent() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 20.0));
        let script = pd.add(uid(2), iv(5.0, 10.0));
        assert!(script.is_empty());
        assert_eq!(script.covering, Some((uid(1), iv(0.0, 20.0))));
    }

    #[test]
    fn test_modify_composes_to_modified() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 10.0));
        let script = pd.modify(uid(1), iv(2.0, 12.0)).unwrap();
        assert!(script.removed.is_empty());
        assert!(script.restored.is_empty());
        assert_eq!(script.modified.len(), 1);
        assert_eq!(script.modified[0].new, iv(2.0, 12.0));
    }

    #[test]
    fn test_edit_scripts_replay_materialization() {
        // property 4: applying each script to the previous materialization
        // yields the next one
        let mut pd = PairwiseDisjoint::new();
        let mut mat: Vec<(UniqueValueId, Interval)> = Vec::new();

        let ops: Vec<(u64, f64, f64)> = vec![
            (1, 0.0, 10.0),
            (2, 5.0, 15.0),
            (3, 20.0, 30.0),
            (4, 14.0, 21.0),
            (5, 40.0, 50.0),
        ];
        for (id, lo, hi) in ops {
            let script = pd.add(uid(id), iv(lo, hi));
            apply(&mut mat, &script);
            assert_eq!(mat, pd.materialization(), "after add {id}");
        }
        for id in [4u64, 1, 3, 5, 2] {
            let script = pd.remove(uid(id)).unwrap();
            apply(&mut mat, &script);
            assert_eq!(mat, pd.materialization(), "after remove {id}");
        }
        assert!(pd.is_empty());
        assert!(mat.is_empty());
    }

    #[test]
    fn test_pairwise_disjoint_invariant() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), iv(0.0, 10.0));
        pd.add(uid(2), iv(5.0, 15.0));
        pd.add(uid(3), iv(12.0, 20.0));
        pd.add(uid(4), iv(30.0, 35.0));

        let mat = pd.materialization();
        for i in 0..mat.len() {
            for j in (i + 1)..mat.len() {
                assert!(!mat[i].1.overlaps(&mat[j].1));
            }
        }
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut pd = PairwiseDisjoint::new();
        assert!(pd.remove(uid(9)).is_none());
    }

    #[test]
    fn test_point_values() {
        let mut pd = PairwiseDisjoint::new();
        pd.add(uid(1), Interval::point(Key::number(2.0)));
        let script = pd.add(uid(2), Interval::point(Key::number(2.0)));
        // identical points merge: second hides under first
        assert!(script.is_empty());
        assert_eq!(pd.covering_id(uid(2)), Some(uid(1)));
        assert_eq!(pd.materialization().len(), 1);
    }
}
