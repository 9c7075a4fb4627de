//! Interpreted Query Fallback
//!
//! Generic term evaluation for shapes the compiler has no specialization
//! for. `project` returns `None` for a rejected item and the projected
//! values for an accepted one; pure selection terms project the item
//! itself.

use crate::data::DataItem;
use crate::key::Interval;
use crate::query::term::QueryTerm;

/// Whether `item` satisfies `term` as a selection.
pub fn test(term: &QueryTerm, item: &DataItem) -> bool {
    match term {
        QueryTerm::Wildcard => !item.is_missing(),
        QueryTerm::Undefined => false,
        QueryTerm::Scalar(k) => item
            .as_scalar()
            .is_some_and(|v| Interval::point(k.clone()).matches_key(v)),
        QueryTerm::Range(r) => item
            .as_scalar()
            .is_some_and(|v| Interval::from_range(r).matches_key(v)),
        QueryTerm::Substring(needle) => item
            .as_scalar()
            .and_then(|v| v.as_str())
            .is_some_and(|s| contains_ci(s, needle)),
        QueryTerm::ElementRef(e) => item
            .as_scalar()
            .is_some_and(|v| matches!(v, crate::key::Key::ElementRef(x) if x == e)),
        QueryTerm::Attr(map) => {
            if map.is_empty() {
                return !item.is_missing();
            }
            map.iter().all(|(attr, sub)| test_on_set(sub, item.attr(attr)))
        }
        QueryTerm::Negation(subs) => {
            if subs.is_empty() {
                !item.is_missing()
            } else {
                !item.is_missing() && !subs.iter().any(|s| test(s, item))
            }
        }
        QueryTerm::Set(subs) => subs.iter().any(|s| test(s, item)),
    }
}

/// Evaluate a term against an attribute's value set. A negation constrains
/// the whole set: `n()` requires absence, `n(q..)` requires presence with
/// no value matching any sub-term. Every other term is satisfied by any
/// one value.
fn test_on_set(term: &QueryTerm, values: &[DataItem]) -> bool {
    match term {
        QueryTerm::Negation(subs) => {
            if subs.is_empty() {
                values.is_empty()
            } else {
                !values.is_empty()
                    && !values.iter().any(|v| subs.iter().any(|s| test(s, v)))
            }
        }
        other => values.iter().any(|v| test(other, v)),
    }
}

/// Evaluate `term` with projection: `None` rejects the item, `Some`
/// carries the projected values (the item itself for selection terms).
pub fn project(term: &QueryTerm, item: &DataItem) -> Option<Vec<DataItem>> {
    match term {
        QueryTerm::Wildcard => Some(vec![item.clone()]),
        QueryTerm::Attr(map) if term.contains_wildcard() => {
            let mut projected = Vec::new();
            for (attr, sub) in map {
                let values = item.attr(attr);
                if sub.contains_wildcard() {
                    let mut out = Vec::new();
                    for v in values {
                        if let Some(mut vals) = project(sub, v) {
                            out.append(&mut vals);
                        }
                    }
                    // empty projection yields no element
                    if out.is_empty() {
                        return None;
                    }
                    projected.extend(out);
                } else if !test_on_set(sub, values) {
                    return None;
                }
            }
            Some(projected)
        }
        QueryTerm::Set(subs) if term.contains_wildcard() => {
            let mut out = Vec::new();
            let mut accepted = false;
            for sub in subs {
                if let Some(mut vals) = project(sub, item) {
                    accepted = true;
                    out.append(&mut vals);
                }
            }
            if accepted {
                Some(out)
            } else {
                None
            }
        }
        selection => {
            if test(selection, item) {
                Some(vec![item.clone()])
            } else {
                None
            }
        }
    }
}

/// Case-insensitive substring containment used by interpreted substring
/// terms; the compiled executors precompile a regex instead.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::av;
    use crate::key::{Key, RangeKey};
    use crate::query::term::QueryTerm as T;

    #[test]
    fn test_scalar_and_range() {
        let item = av("a", Key::number(5.0));
        assert!(test(&T::av("a", T::number(5.0)), &item));
        assert!(!test(&T::av("a", T::number(6.0)), &item));
        let range = T::av(
            "a",
            T::range(RangeKey::closed(Key::number(0.0), Key::number(10.0))),
        );
        assert!(test(&range, &item));
    }

    #[test]
    fn test_attr_negation_set_semantics() {
        let item = av("a", Key::Bool(false));
        // present and not true
        assert!(test(&T::av("a", T::negation(vec![T::boolean(true)])), &item));
        // n() requires absence
        assert!(!test(&T::av("a", T::negation(vec![])), &item));
        let no_attr = av("b", Key::number(1.0));
        assert!(test(&T::av("a", T::negation(vec![])), &no_attr));
    }

    #[test]
    fn test_projection() {
        let item = av("a", Key::number(3.0));
        let proj = T::av("a", T::wildcard());
        let out = project(&proj, &item).unwrap();
        assert_eq!(out, vec![DataItem::number(3.0)]);

        let miss = av("b", Key::number(3.0));
        assert!(project(&proj, &miss).is_none());
    }

    #[test]
    fn test_projection_with_selection_sibling() {
        let item = DataItem::Object(
            crate::data::AvObject::new()
                .with_scalar("a", Key::number(3.0))
                .with_scalar("b", Key::string("keep")),
        );
        let term = T::object(vec![
            ("a", T::wildcard()),
            ("b", T::scalar(Key::string("keep"))),
        ]);
        assert_eq!(
            project(&term, &item).unwrap(),
            vec![DataItem::number(3.0)]
        );

        let reject = T::object(vec![
            ("a", T::wildcard()),
            ("b", T::scalar(Key::string("drop"))),
        ]);
        assert!(project(&reject, &item).is_none());
    }

    #[test]
    fn test_substring_ci() {
        let item = av("name", Key::string("Hello World"));
        assert!(test(&T::av("name", T::substring("world")), &item));
        assert!(!test(&T::av("name", T::substring("mars")), &item));
    }
}
