//! Simple-Query Compiler
//!
//! Recursive dispatch from a declarative term to the best specialized
//! executor. The chosen specialization is determined by the shape of the
//! term, never by its contents; unrecognized shapes fall back to the
//! interpreted executor (logged at warn level when runtime warnings are
//! enabled). Compilation raises no errors: a shape that cannot match
//! compiles to `SelectNone`.
//!
//! Compiled executors are memoized by term identity (`Rc` pointer), so
//! queries sharing a parse share an executor.

use crate::key::Key;
use crate::query::exec::{RangeSel, SimpleQuery, SubstringPat};
use crate::query::term::QueryTerm;
use crate::valuetype::ValueType;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::warn;

/// Entries above this many trigger an opportunistic sweep of dead terms.
const MEMO_SWEEP_THRESHOLD: usize = 256;

struct MemoEntry {
    term: Weak<QueryTerm>,
    exec: Rc<SimpleQuery>,
}

/// Shape-dispatch compiler with an identity-keyed weak memo.
pub struct QueryCompiler {
    memo: RefCell<HashMap<usize, MemoEntry>>,
    runtime_warnings: bool,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        QueryCompiler::new(true)
    }
}

impl QueryCompiler {
    pub fn new(runtime_warnings: bool) -> Self {
        QueryCompiler {
            memo: RefCell::new(HashMap::new()),
            runtime_warnings,
        }
    }

    /// Compile a term, reusing the memoized executor for the same term
    /// object.
    pub fn compile(&self, term: &Rc<QueryTerm>) -> Rc<SimpleQuery> {
        self.compile_typed(term, None)
    }

    /// Compile with a value-type description of the data; the type is
    /// consulted only for per-attribute projection safety.
    pub fn compile_typed(
        &self,
        term: &Rc<QueryTerm>,
        value_type: Option<&ValueType>,
    ) -> Rc<SimpleQuery> {
        let key = Rc::as_ptr(term) as usize;
        if let Some(entry) = self.memo.borrow().get(&key) {
            if let Some(live) = entry.term.upgrade() {
                if Rc::ptr_eq(&live, term) {
                    return Rc::clone(&entry.exec);
                }
            }
        }
        let exec = Rc::new(self.build(term, value_type));
        let mut memo = self.memo.borrow_mut();
        if memo.len() > MEMO_SWEEP_THRESHOLD {
            memo.retain(|_, e| e.term.strong_count() > 0);
        }
        memo.insert(
            key,
            MemoEntry {
                term: Rc::downgrade(term),
                exec: Rc::clone(&exec),
            },
        );
        exec
    }

    fn build(&self, term: &Rc<QueryTerm>, value_type: Option<&ValueType>) -> SimpleQuery {
        match &**term {
            QueryTerm::Wildcard => SimpleQuery::PassThrough,
            QueryTerm::Undefined => SimpleQuery::SelectNone,
            QueryTerm::Scalar(Key::Bool(true)) => SimpleQuery::TrueSelection,
            QueryTerm::Scalar(Key::Bool(false)) => SimpleQuery::FalseSelection,
            QueryTerm::Scalar(k) => SimpleQuery::ValueSelection { value: k.clone() },
            QueryTerm::Range(r) => SimpleQuery::RangeSelection {
                range: RangeSel::new(r.clone()),
            },
            QueryTerm::Substring(s) => SimpleQuery::SubstringSelection {
                pat: SubstringPat::new(s.clone()),
            },
            QueryTerm::ElementRef(e) => SimpleQuery::ElementRefSelection { eid: *e },
            QueryTerm::Negation(subs) => self.build_negation(term, subs),
            QueryTerm::Set(subs) => self.build_set(term, subs),
            QueryTerm::Attr(map) => self.build_attr(term, map, value_type),
        }
    }

    fn build_negation(&self, term: &Rc<QueryTerm>, subs: &[Rc<QueryTerm>]) -> SimpleQuery {
        if subs.is_empty() {
            return SimpleQuery::PassThrough;
        }
        let mut compiled = Vec::with_capacity(subs.len());
        for sub in subs {
            let exec = self.compile(sub);
            if exec.is_projection() {
                return self.fallback(term);
            }
            compiled.push(exec);
        }
        SimpleQuery::Negation { subs: compiled }
    }

    fn build_set(&self, term: &Rc<QueryTerm>, subs: &[Rc<QueryTerm>]) -> SimpleQuery {
        if subs.is_empty() {
            return SimpleQuery::SelectNone;
        }
        if subs
            .iter()
            .all(|s| matches!(&**s, QueryTerm::ElementRef(_)))
        {
            let eids = subs
                .iter()
                .map(|s| match &**s {
                    QueryTerm::ElementRef(e) => *e,
                    _ => unreachable!("all element refs"),
                })
                .collect();
            return SimpleQuery::ElementRefMultipleSelection { eids };
        }
        if let Some(values) = scalar_set(subs) {
            return SimpleQuery::ValueMultipleSelection { values };
        }
        let mut compiled = Vec::with_capacity(subs.len());
        for sub in subs {
            let exec = self.compile(sub);
            if exec.is_projection() {
                return self.fallback(term);
            }
            compiled.push(exec);
        }
        SimpleQuery::Or { subs: compiled }
    }

    fn build_attr(
        &self,
        term: &Rc<QueryTerm>,
        map: &std::collections::BTreeMap<String, Rc<QueryTerm>>,
        value_type: Option<&ValueType>,
    ) -> SimpleQuery {
        if map.is_empty() {
            return SimpleQuery::PassThrough;
        }
        if map.len() == 1 {
            let (attr, sub) = map.iter().next().expect("len checked");
            return self.build_single_attr(term, attr, sub, true, value_type);
        }

        // several attribute predicates: AND-composed chain with at most
        // one terminal projection
        let mut selections = Vec::new();
        let mut projection = None;
        for (attr, sub) in map {
            if matches!(&**sub, QueryTerm::Wildcard) {
                if projection.is_some() {
                    // a second wildcard site has no simple form
                    return self.fallback(term);
                }
                if !projection_safe(attr, value_type) {
                    return self.fallback(term);
                }
                projection = Some(Rc::new(SimpleQuery::AttrProjection { attr: attr.clone() }));
                continue;
            }
            let step = self.build_single_attr(term, attr, sub, false, value_type);
            match step {
                SimpleQuery::SelectNone => return SimpleQuery::SelectNone,
                SimpleQuery::Interpreted { .. } => return self.fallback(term),
                other => selections.push(Rc::new(other)),
            }
        }
        SimpleQuery::Chain {
            selections,
            projection,
        }
    }

    fn build_single_attr(
        &self,
        term: &Rc<QueryTerm>,
        attr: &str,
        sub: &Rc<QueryTerm>,
        standalone: bool,
        value_type: Option<&ValueType>,
    ) -> SimpleQuery {
        let attr = attr.to_string();
        match &**sub {
            QueryTerm::Scalar(Key::Bool(true)) => SimpleQuery::AttrTrue { attr },
            QueryTerm::Scalar(Key::Bool(false)) => SimpleQuery::AttrFalse { attr },
            QueryTerm::Scalar(k) => SimpleQuery::AttrValue {
                attr,
                value: k.clone(),
            },
            QueryTerm::Range(r) => {
                let range = RangeSel::new(r.clone());
                if standalone {
                    SimpleQuery::AttrRangeQuery { attr, range }
                } else {
                    SimpleQuery::AttrRangeSelection { attr, range }
                }
            }
            QueryTerm::Substring(s) => {
                let pat = SubstringPat::new(s.clone());
                if standalone {
                    SimpleQuery::AttrSubstringQuery { attr, pat }
                } else {
                    SimpleQuery::AttrSubstringSelection { attr, pat }
                }
            }
            QueryTerm::Wildcard => {
                if projection_safe(&attr, value_type) {
                    SimpleQuery::AttrProjection { attr }
                } else {
                    self.fallback(term)
                }
            }
            QueryTerm::Negation(negated) => match negated.len() {
                0 => SimpleQuery::AttrAbsent { attr },
                1 => match &*negated[0] {
                    QueryTerm::Scalar(Key::Bool(true)) => SimpleQuery::AttrPresentFalse { attr },
                    QueryTerm::Scalar(k) => SimpleQuery::AttrValueInv {
                        attr,
                        value: k.clone(),
                    },
                    _ => self.fallback(term),
                },
                _ => match scalar_set(negated) {
                    Some(values) => SimpleQuery::AttrValueInvMultiple { attr, values },
                    None => self.fallback(term),
                },
            },
            QueryTerm::Set(subs) => {
                if subs.is_empty() {
                    return SimpleQuery::SelectNone;
                }
                match scalar_set(subs) {
                    Some(values) => SimpleQuery::AttrValueMultiple { attr, values },
                    None => self.fallback(term),
                }
            }
            QueryTerm::Attr(inner) => {
                // {k1: {k2: _}} is the double-attribute projection shape;
                // recognized but routed through the interpreter
                if inner.len() == 1
                    && matches!(
                        inner.values().next().map(|t| &**t),
                        Some(QueryTerm::Wildcard)
                    )
                {
                    return self.fallback(term);
                }
                self.fallback(term)
            }
            QueryTerm::Undefined | QueryTerm::ElementRef(_) => self.fallback(term),
        }
    }

    fn fallback(&self, term: &Rc<QueryTerm>) -> SimpleQuery {
        if self.runtime_warnings {
            warn!(term = ?term, "no simple-query specialization; using interpreter");
        }
        SimpleQuery::Interpreted {
            term: Rc::clone(term),
            projection: term.contains_wildcard(),
        }
    }
}

/// Collect a pure scalar value set, or `None` when any sub-term is not a
/// scalar.
fn scalar_set(subs: &[Rc<QueryTerm>]) -> Option<std::collections::BTreeSet<Key>> {
    let mut values = std::collections::BTreeSet::new();
    for sub in subs {
        match &**sub {
            QueryTerm::Scalar(k) => {
                values.insert(k.clone());
            }
            _ => return None,
        }
    }
    Some(values)
}

/// Projection over `attr` is safe when no value type is supplied or the
/// attribute's inferred type is a strict selection.
fn projection_safe(attr: &str, value_type: Option<&ValueType>) -> bool {
    match value_type {
        None => true,
        Some(vt) => match vt.attr_type(attr) {
            Some(t) => t.is_strict_selection(),
            None => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::RangeKey;
    use crate::query::term::QueryTerm as T;

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(false)
    }

    #[test]
    fn test_pass_through_shapes() {
        let c = compiler();
        assert!(matches!(
            *c.compile(&T::wildcard()),
            SimpleQuery::PassThrough
        ));
        assert!(matches!(*c.compile(&T::empty()), SimpleQuery::PassThrough));
        assert!(matches!(
            *c.compile(&T::negation(vec![])),
            SimpleQuery::PassThrough
        ));
    }

    #[test]
    fn test_select_none_shapes() {
        let c = compiler();
        assert!(matches!(
            *c.compile(&T::undefined()),
            SimpleQuery::SelectNone
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::set(vec![]))),
            SimpleQuery::SelectNone
        ));
    }

    #[test]
    fn test_boolean_shapes() {
        let c = compiler();
        assert!(matches!(
            *c.compile(&T::boolean(true)),
            SimpleQuery::TrueSelection
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::boolean(true))),
            SimpleQuery::AttrTrue { .. }
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::negation(vec![T::boolean(true)]))),
            SimpleQuery::AttrPresentFalse { .. }
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::negation(vec![]))),
            SimpleQuery::AttrAbsent { .. }
        ));
    }

    #[test]
    fn test_scalar_shapes() {
        let c = compiler();
        assert!(matches!(
            *c.compile(&T::av("k", T::number(2.0))),
            SimpleQuery::AttrValue { .. }
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::set(vec![T::number(1.0), T::number(2.0)]))),
            SimpleQuery::AttrValueMultiple { .. }
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::negation(vec![T::number(1.0), T::number(2.0)]))),
            SimpleQuery::AttrValueInvMultiple { .. }
        ));
    }

    #[test]
    fn test_range_and_substring_shapes() {
        let c = compiler();
        let range = RangeKey::closed(Key::number(1.0), Key::number(5.0));
        assert!(matches!(
            *c.compile(&T::av("k", T::range(range.clone()))),
            SimpleQuery::AttrRangeQuery { .. }
        ));
        assert!(matches!(
            *c.compile(&T::range(range)),
            SimpleQuery::RangeSelection { .. }
        ));
        assert!(matches!(
            *c.compile(&T::av("k", T::substring("abc"))),
            SimpleQuery::AttrSubstringQuery { .. }
        ));
    }

    #[test]
    fn test_projection_and_chain() {
        let c = compiler();
        assert!(matches!(
            *c.compile(&T::av("k", T::wildcard())),
            SimpleQuery::AttrProjection { .. }
        ));

        let chained = T::object(vec![
            ("kind", T::scalar(Key::string("book"))),
            ("title", T::wildcard()),
        ]);
        match &*c.compile(&chained) {
            SimpleQuery::Chain {
                selections,
                projection,
            } => {
                assert_eq!(selections.len(), 1);
                assert!(matches!(
                    **selections.first().unwrap(),
                    SimpleQuery::AttrValue { .. }
                ));
                assert!(projection.is_some());
            }
            other => panic!("unexpected executor {other:?}"),
        }
    }

    #[test]
    fn test_range_inside_chain_is_selection_variant() {
        let c = compiler();
        let range = RangeKey::closed(Key::number(1.0), Key::number(5.0));
        let chained = T::object(vec![
            ("a", T::range(range)),
            ("b", T::scalar(Key::string("x"))),
        ]);
        match &*c.compile(&chained) {
            SimpleQuery::Chain { selections, .. } => {
                assert!(selections
                    .iter()
                    .any(|s| matches!(**s, SimpleQuery::AttrRangeSelection { .. })));
            }
            other => panic!("unexpected executor {other:?}"),
        }
    }

    #[test]
    fn test_double_attribute_projection_disabled() {
        let c = compiler();
        let term = T::av("a", T::av("b", T::wildcard()));
        match &*c.compile(&term) {
            SimpleQuery::Interpreted { projection, .. } => assert!(projection),
            other => panic!("expected interpreted fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_two_wildcards_fall_back() {
        let c = compiler();
        let term = T::object(vec![("a", T::wildcard()), ("b", T::wildcard())]);
        assert!(matches!(
            &*c.compile(&term),
            SimpleQuery::Interpreted { projection: true, .. }
        ));
    }

    #[test]
    fn test_or_and_negation() {
        let c = compiler();
        let or = T::set(vec![
            T::av("a", T::number(1.0)),
            T::av("b", T::number(2.0)),
        ]);
        assert!(matches!(&*c.compile(&or), SimpleQuery::Or { .. }));

        let neg = T::negation(vec![T::av("a", T::number(1.0))]);
        assert!(matches!(&*c.compile(&neg), SimpleQuery::Negation { .. }));
    }

    #[test]
    fn test_memoized_by_identity() {
        let c = compiler();
        let term = T::av("a", T::number(2.0));
        let first = c.compile(&term);
        let second = c.compile(&term);
        assert!(Rc::ptr_eq(&first, &second));

        // structurally equal but a different object: fresh executor
        let other = T::av("a", T::number(2.0));
        let third = c.compile(&other);
        assert!(!Rc::ptr_eq(&first, &third));
        assert!(first.is_equal(&third));
    }

    #[test]
    fn test_projection_gated_by_value_type() {
        let c = compiler();
        let term = T::av("a", T::wildcard());

        let mut attrs = std::collections::BTreeMap::new();
        let mut projector = ValueType::number();
        projector.projector = true;
        attrs.insert("a".to_string(), projector);
        let vt = ValueType::object(attrs);
        assert!(matches!(
            &*c.compile_typed(&term, Some(&vt)),
            SimpleQuery::Interpreted { .. }
        ));

        let safe_term = T::av("a", T::wildcard());
        let mut safe_attrs = std::collections::BTreeMap::new();
        safe_attrs.insert("a".to_string(), ValueType::number());
        let safe_vt = ValueType::object(safe_attrs);
        assert!(matches!(
            &*c.compile_typed(&safe_term, Some(&safe_vt)),
            SimpleQuery::AttrProjection { .. }
        ));
    }

    #[test]
    fn test_element_ref_set() {
        let c = compiler();
        let term = T::set(vec![
            T::element_ref(crate::ids::ElementId(1)),
            T::element_ref(crate::ids::ElementId(2)),
        ]);
        assert!(matches!(
            &*c.compile(&term),
            SimpleQuery::ElementRefMultipleSelection { .. }
        ));
    }
}
