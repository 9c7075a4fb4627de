//! Property-based tests (proptest) for the disjoint interval cover and
//! the partial order tree.

use avql::disjoint::{EditScript, PairwiseDisjoint};
use avql::ids::{ElementId, UniqueValueId};
use avql::key::{Interval, Key, RangeKey};
use avql::order::requirement::{OrderOffset, RangeOrderRequirement};
use avql::order::tree::{CompareFn, PartialOrderTree};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::rc::Rc;

fn iv(lo: f64, hi: f64) -> Interval {
    Interval::from_range(&RangeKey::closed(Key::number(lo), Key::number(hi)))
}

/// Mirror of the registered materialization; applies scripts the way the
/// simple query-calc applies them to the indexer.
fn apply_script(mat: &mut BTreeMap<UniqueValueId, Interval>, script: &EditScript) {
    for m in &script.modified {
        let entry = mat.get_mut(&m.id).expect("modified id registered");
        assert_eq!(*entry, m.old, "modify must start from the registered extent");
        *entry = m.new.clone();
    }
    for (id, ext) in &script.removed {
        let prev = mat.remove(id).expect("removed id registered");
        assert_eq!(prev, *ext);
    }
    for (id, ext) in &script.restored {
        let prev = mat.insert(*id, ext.clone());
        assert!(prev.is_none(), "restored id must not be registered");
    }
}

/// The materialization covers a sample point iff some inserted interval
/// covers it.
fn covers(mat: &BTreeMap<UniqueValueId, Interval>, point: f64) -> bool {
    mat.values().any(|e| e.contains_point(&Key::number(point)))
}

#[derive(Debug, Clone)]
enum Op {
    Add(u64, f64, f64),
    Remove(u64),
    Modify(u64, f64, f64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u64..12, 0.0f64..100.0, 0.0f64..30.0)
            .prop_map(|(id, lo, w)| Op::Add(id, lo, lo + w)),
        (0u64..12).prop_map(Op::Remove),
        (0u64..12, 0.0f64..100.0, 0.0f64..30.0)
            .prop_map(|(id, lo, w)| Op::Modify(id, lo, lo + w)),
    ]
}

proptest! {
    /// Property 4: stored intervals stay pairwise disjoint with the same
    /// union as the inserted multiset, and every edit script replays the
    /// previous materialization into the next one.
    #[test]
    fn prop_disjoint_cover(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut pd = PairwiseDisjoint::new();
        let mut mat: BTreeMap<UniqueValueId, Interval> = BTreeMap::new();
        let mut inserted: BTreeMap<u64, (f64, f64)> = BTreeMap::new();

        for op in ops {
            let script = match op {
                Op::Add(id, lo, hi) => {
                    if inserted.contains_key(&id) {
                        continue;
                    }
                    inserted.insert(id, (lo, hi));
                    Some(pd.add(UniqueValueId(id), iv(lo, hi)))
                }
                Op::Remove(id) => {
                    inserted.remove(&id);
                    pd.remove(UniqueValueId(id))
                }
                Op::Modify(id, lo, hi) => {
                    if !inserted.contains_key(&id) {
                        continue;
                    }
                    inserted.insert(id, (lo, hi));
                    pd.modify(UniqueValueId(id), iv(lo, hi))
                }
            };
            if let Some(script) = script {
                apply_script(&mut mat, &script);
            }

            // the script-replayed materialization equals the live one
            let live: BTreeMap<UniqueValueId, Interval> =
                pd.materialization().into_iter().collect();
            prop_assert_eq!(&mat, &live);

            // pairwise disjoint
            let spans: Vec<&Interval> = mat.values().collect();
            for i in 0..spans.len() {
                for j in (i + 1)..spans.len() {
                    prop_assert!(!spans[i].overlaps(spans[j]));
                }
            }

            // same union as the inserted intervals, probed at endpoints
            // and midpoints
            for (lo, hi) in inserted.values() {
                for p in [*lo, *hi, (lo + hi) / 2.0] {
                    prop_assert!(covers(&mat, p));
                }
            }
            let inserted_covers = |p: f64| {
                inserted.values().any(|(lo, hi)| *lo <= p && p <= *hi)
            };
            for probe in [0.0, 25.0, 50.0, 75.0, 100.0, 130.0] {
                prop_assert_eq!(covers(&mat, probe), inserted_covers(probe));
            }
        }
    }

    /// The order tree agrees with a sorted model under arbitrary insert
    /// and remove interleavings.
    #[test]
    fn prop_order_tree_matches_model(ops in prop::collection::vec((0u64..60, any::<bool>()), 1..120)) {
        let cmp: CompareFn = Rc::new(|a: ElementId, b: ElementId| a.0.cmp(&b.0));
        let mut tree = PartialOrderTree::new(cmp);
        let mut model: Vec<u64> = Vec::new();

        for (n, insert) in ops {
            if insert {
                if !model.contains(&n) {
                    model.push(n);
                    model.sort_unstable();
                }
                tree.insert_element(ElementId(n));
            } else {
                model.retain(|m| *m != n);
                tree.remove_element(ElementId(n));
            }

            prop_assert_eq!(tree.size(), model.len());
            let order: Vec<u64> = tree.in_order().into_iter().map(|e| e.0).collect();
            prop_assert_eq!(&order, &model);
            for (i, m) in model.iter().enumerate() {
                prop_assert_eq!(tree.offset_of(ElementId(*m)), Some(i));
                prop_assert_eq!(tree.at_offset(i), Some(ElementId(*m)));
            }
        }
    }

    /// Property 3: after any insert/remove sequence plus a notification
    /// pass, a range requirement's set equals the brute-force window under
    /// the current comparator.
    #[test]
    fn prop_range_requirement_window(
        ops in prop::collection::vec((0u64..40, any::<bool>()), 1..60),
        lo in 0usize..6,
        width in 0usize..8,
    ) {
        use avql::order::OrderRequirement;

        let cmp: CompareFn = Rc::new(|a: ElementId, b: ElementId| a.0.cmp(&b.0));
        let mut tree = PartialOrderTree::new(cmp);
        let req_id = tree.register_requirement(OrderRequirement::Range(
            RangeOrderRequirement::new(
                OrderOffset::forward(lo),
                OrderOffset::forward(lo + width),
                false,
            ),
        ));
        let mut model: Vec<u64> = Vec::new();

        for (n, insert) in ops {
            if insert {
                if !model.contains(&n) {
                    model.push(n);
                    model.sort_unstable();
                }
                tree.insert_element(ElementId(n));
            } else {
                model.retain(|m| *m != n);
                tree.remove_element(ElementId(n));
            }
            tree.notify_listeners();

            let expected: Vec<ElementId> = model
                .iter()
                .enumerate()
                .filter(|(i, _)| *i >= lo && *i <= lo + width)
                .map(|(_, m)| ElementId(*m))
                .collect();
            let req = match tree.requirement_ref(req_id) {
                Some(OrderRequirement::Range(r)) => r,
                _ => unreachable!("registered above"),
            };
            let mut actual: Vec<ElementId> = req.current_matches().iter().copied().collect();
            actual.sort_unstable();
            prop_assert_eq!(actual, expected);
        }
    }
}
