//! Declarative Query Terms
//!
//! The input language of the simple-query compiler: wildcards, scalars,
//! ranges, substring patterns, element references, attribute–value
//! objects, negations `n(q1..qn)` and sets `o(q1..qn)`.
//!
//! Terms are shared behind `Rc`; the compiler memoizes by term identity,
//! so queries sharing a parse share an executor.

use crate::ids::ElementId;
use crate::key::{Key, RangeKey};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A declarative query term.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTerm {
    /// `_`: selects (and projects) everything.
    Wildcard,
    /// `undefined`: selects nothing.
    Undefined,
    /// A scalar to match, including `true`/`false`.
    Scalar(Key),
    /// `r(min, max)`: interval over an ordered type.
    Range(RangeKey),
    /// `s(..)`: case-insensitive substring pattern.
    Substring(String),
    /// Reference to a specific element.
    ElementRef(ElementId),
    /// Attribute–value object; `{}` is the empty map.
    Attr(BTreeMap<String, Rc<QueryTerm>>),
    /// `n(q1..qn)`: matches what no sub-term matches; `n()` passes all.
    Negation(Vec<Rc<QueryTerm>>),
    /// `o(q1..qn)`: matches what any sub-term matches; `o()` is empty.
    Set(Vec<Rc<QueryTerm>>),
}

impl QueryTerm {
    pub fn wildcard() -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Wildcard)
    }

    pub fn undefined() -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Undefined)
    }

    pub fn scalar(k: Key) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Scalar(k))
    }

    pub fn number(n: f64) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Scalar(Key::number(n)))
    }

    pub fn boolean(b: bool) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Scalar(Key::Bool(b)))
    }

    pub fn range(r: RangeKey) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Range(r))
    }

    pub fn substring(s: impl Into<String>) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Substring(s.into()))
    }

    pub fn element_ref(e: ElementId) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::ElementRef(e))
    }

    /// `{}`: the empty attribute–value object.
    pub fn empty() -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Attr(BTreeMap::new()))
    }

    /// `{attr: sub}`: single-attribute object.
    pub fn av(attr: impl Into<String>, sub: Rc<QueryTerm>) -> Rc<QueryTerm> {
        let mut map = BTreeMap::new();
        map.insert(attr.into(), sub);
        Rc::new(QueryTerm::Attr(map))
    }

    /// Multi-attribute object.
    pub fn object(attrs: Vec<(&str, Rc<QueryTerm>)>) -> Rc<QueryTerm> {
        let mut map = BTreeMap::new();
        for (k, v) in attrs {
            map.insert(k.to_string(), v);
        }
        Rc::new(QueryTerm::Attr(map))
    }

    pub fn negation(subs: Vec<Rc<QueryTerm>>) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Negation(subs))
    }

    pub fn set(subs: Vec<Rc<QueryTerm>>) -> Rc<QueryTerm> {
        Rc::new(QueryTerm::Set(subs))
    }

    /// Whether the term contains a wildcard site anywhere.
    pub fn contains_wildcard(&self) -> bool {
        match self {
            QueryTerm::Wildcard => true,
            QueryTerm::Undefined
            | QueryTerm::Scalar(_)
            | QueryTerm::Range(_)
            | QueryTerm::Substring(_)
            | QueryTerm::ElementRef(_) => false,
            QueryTerm::Attr(map) => map.values().any(|t| t.contains_wildcard()),
            QueryTerm::Negation(subs) | QueryTerm::Set(subs) => {
                subs.iter().any(|t| t.contains_wildcard())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let t = QueryTerm::av("a", QueryTerm::number(2.0));
        match &*t {
            QueryTerm::Attr(map) => {
                assert_eq!(map.len(), 1);
                assert_eq!(*map["a"], QueryTerm::Scalar(Key::number(2.0)));
            }
            other => panic!("unexpected term {other:?}"),
        }
    }

    #[test]
    fn test_contains_wildcard() {
        assert!(QueryTerm::av("a", QueryTerm::wildcard()).contains_wildcard());
        assert!(!QueryTerm::av("a", QueryTerm::number(1.0)).contains_wildcard());
        assert!(QueryTerm::set(vec![QueryTerm::wildcard()]).contains_wildcard());
    }
}
