//! Value-Type Inference Lattice
//!
//! A sum-of-flags description of the values an expression can produce,
//! consumed by the simple-query compiler to decide whether a per-attribute
//! projection is safe. Only the operations the compiler needs are carried
//! here; the inference algebra producing these descriptions lives with the
//! query compiler upstream.

use std::collections::BTreeMap;

/// Cardinality estimate: inclusive range of possible set sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRange {
    pub min: usize,
    pub max: usize,
}

impl SizeRange {
    pub fn exact(n: usize) -> Self {
        SizeRange { min: n, max: n }
    }

    pub fn at_least(n: usize) -> Self {
        SizeRange {
            min: n,
            max: usize::MAX,
        }
    }

    fn merge(self, other: SizeRange) -> SizeRange {
        SizeRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Sum-of-flags value type description.
///
/// Each flag admits one class of values; `object` admits attribute–value
/// objects with per-attribute types. `unknown` is the lattice top.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueType {
    pub unknown: bool,
    pub remote: bool,
    pub data_source: bool,
    pub any_data: bool,
    pub undef: bool,
    pub string: bool,
    pub number: bool,
    pub boolean: bool,
    pub query: bool,
    pub range: bool,
    pub projector: bool,
    pub terminal_symbol: bool,
    pub foreign_interface: bool,
    pub defun: Option<Box<ValueType>>,
    pub comparison_function: Option<Vec<ValueType>>,
    pub object: Option<BTreeMap<String, ValueType>>,
    pub areas: Option<BTreeMap<u64, ValueType>>,
    /// Cardinality estimates; empty means no estimate.
    pub sizes: Vec<SizeRange>,
}

impl ValueType {
    pub fn new() -> Self {
        ValueType::default()
    }

    pub fn unknown() -> Self {
        ValueType {
            unknown: true,
            ..ValueType::default()
        }
    }

    pub fn number() -> Self {
        ValueType {
            number: true,
            ..ValueType::default()
        }
    }

    pub fn string() -> Self {
        ValueType {
            string: true,
            ..ValueType::default()
        }
    }

    pub fn boolean() -> Self {
        ValueType {
            boolean: true,
            ..ValueType::default()
        }
    }

    pub fn undef() -> Self {
        ValueType {
            undef: true,
            ..ValueType::default()
        }
    }

    pub fn object(attrs: BTreeMap<String, ValueType>) -> Self {
        ValueType {
            object: Some(attrs),
            ..ValueType::default()
        }
    }

    /// The type of values under `attr`, when known.
    pub fn attr_type(&self, attr: &str) -> Option<&ValueType> {
        self.object.as_ref()?.get(attr)
    }

    /// Least upper bound of the two descriptions.
    pub fn merge(&self, other: &ValueType) -> ValueType {
        let object = match (&self.object, &other.object) {
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                for (k, v) in b {
                    merged
                        .entry(k.clone())
                        .and_modify(|t| *t = t.merge(v))
                        .or_insert_with(|| v.clone());
                }
                Some(merged)
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        let areas = match (&self.areas, &other.areas) {
            (Some(a), Some(b)) => {
                let mut merged = a.clone();
                for (k, v) in b {
                    merged
                        .entry(*k)
                        .and_modify(|t| *t = t.merge(v))
                        .or_insert_with(|| v.clone());
                }
                Some(merged)
            }
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        let defun = match (&self.defun, &other.defun) {
            (Some(a), Some(b)) => Some(Box::new(a.merge(b))),
            (Some(a), None) => Some(a.clone()),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
        let comparison_function = match (&self.comparison_function, &other.comparison_function) {
            (Some(a), Some(b)) if a.len() == b.len() => {
                Some(a.iter().zip(b).map(|(x, y)| x.merge(y)).collect())
            }
            (Some(a), _) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        let mut sizes = self.sizes.clone();
        for s in &other.sizes {
            sizes = match sizes.first() {
                Some(head) => vec![head.merge(*s)],
                None => vec![*s],
            };
        }
        ValueType {
            unknown: self.unknown || other.unknown,
            remote: self.remote || other.remote,
            data_source: self.data_source || other.data_source,
            any_data: self.any_data || other.any_data,
            undef: self.undef || other.undef,
            string: self.string || other.string,
            number: self.number || other.number,
            boolean: self.boolean || other.boolean,
            query: self.query || other.query,
            range: self.range || other.range,
            projector: self.projector || other.projector,
            terminal_symbol: self.terminal_symbol || other.terminal_symbol,
            foreign_interface: self.foreign_interface || other.foreign_interface,
            defun,
            comparison_function,
            object,
            areas,
            sizes,
        }
    }

    /// True when every value admitted by `other` is admitted by `self`.
    pub fn subsumes(&self, other: &ValueType) -> bool {
        if self.unknown {
            return true;
        }
        if other.unknown {
            return false;
        }
        let flags_ok = (!other.remote || self.remote)
            && (!other.data_source || self.data_source)
            && (!other.any_data || self.any_data)
            && (!other.undef || self.undef)
            && (!other.string || self.string || self.any_data)
            && (!other.number || self.number || self.any_data)
            && (!other.boolean || self.boolean || self.any_data)
            && (!other.query || self.query)
            && (!other.range || self.range)
            && (!other.projector || self.projector)
            && (!other.terminal_symbol || self.terminal_symbol)
            && (!other.foreign_interface || self.foreign_interface);
        if !flags_ok {
            return false;
        }
        match (&self.object, &other.object) {
            (_, None) => true,
            (None, Some(_)) => self.any_data,
            (Some(a), Some(b)) => b.iter().all(|(k, vb)| match a.get(k) {
                Some(va) => va.subsumes(vb),
                None => false,
            }),
        }
    }

    /// Whether the two descriptions admit a common value.
    pub fn can_match(&self, other: &ValueType) -> bool {
        if self.unknown || other.unknown || self.any_data || other.any_data {
            return true;
        }
        if (self.string && other.string)
            || (self.number && other.number)
            || (self.boolean && other.boolean)
            || (self.undef && other.undef)
            || (self.range && other.range)
        {
            return true;
        }
        match (&self.object, &other.object) {
            (Some(a), Some(b)) => a
                .iter()
                .any(|(k, va)| b.get(k).is_some_and(|vb| va.can_match(vb))),
            _ => false,
        }
    }

    /// Narrow this type under a query selecting `attr`.
    pub fn apply_query(&self, attr: &str) -> ValueType {
        if self.unknown || self.any_data {
            return ValueType::unknown();
        }
        match self.attr_type(attr) {
            Some(t) => t.clone(),
            None => ValueType::undef(),
        }
    }

    pub fn add_size(&mut self, size: SizeRange) {
        match self.sizes.first().copied() {
            Some(head) => self.sizes = vec![head.merge(size)],
            None => self.sizes.push(size),
        }
    }

    /// A strict selection never projects and admits only concrete data
    /// values; attribute predicates over such a type are safe to compile
    /// into specialized selection executors.
    pub fn is_strict_selection(&self) -> bool {
        !self.unknown
            && !self.projector
            && !self.query
            && !self.data_source
            && !self.remote
            && !self.foreign_interface
            && self.defun.is_none()
    }

    /// When this type is a single-attribute object chain, the chain of
    /// attribute names down to the leaf.
    pub fn extract_write_path(&self) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut cur = self;
        loop {
            let obj = match &cur.object {
                Some(o) if o.len() == 1 => o,
                Some(_) | None => {
                    return if path.is_empty() { None } else { Some(path) };
                }
            };
            let (attr, inner) = obj.iter().next().expect("len checked");
            path.push(attr.clone());
            cur = inner;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_flags() {
        let merged = ValueType::number().merge(&ValueType::string());
        assert!(merged.number && merged.string);
        assert!(!merged.boolean);
    }

    #[test]
    fn test_subsumes() {
        let ns = ValueType::number().merge(&ValueType::string());
        assert!(ns.subsumes(&ValueType::number()));
        assert!(!ValueType::number().subsumes(&ns));
        assert!(ValueType::unknown().subsumes(&ns));
    }

    #[test]
    fn test_can_match_objects() {
        let mut a = BTreeMap::new();
        a.insert("x".to_string(), ValueType::number());
        let mut b = BTreeMap::new();
        b.insert("x".to_string(), ValueType::string());
        let ta = ValueType::object(a);
        let tb = ValueType::object(b);
        assert!(!ta.can_match(&tb));

        let both = tb.merge(&ta);
        assert!(ta.can_match(&both));
    }

    #[test]
    fn test_apply_query() {
        let mut attrs = BTreeMap::new();
        attrs.insert("a".to_string(), ValueType::number());
        let t = ValueType::object(attrs);
        assert!(t.apply_query("a").number);
        assert!(t.apply_query("missing").undef);
    }

    #[test]
    fn test_strict_selection() {
        assert!(ValueType::number().is_strict_selection());
        let mut p = ValueType::number();
        p.projector = true;
        assert!(!p.is_strict_selection());
    }

    #[test]
    fn test_extract_write_path() {
        let mut inner = BTreeMap::new();
        inner.insert("b".to_string(), ValueType::number());
        let mut outer = BTreeMap::new();
        outer.insert("a".to_string(), ValueType::object(inner));
        let t = ValueType::object(outer);
        assert_eq!(
            t.extract_write_path(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(ValueType::number().extract_write_path(), None);
    }

    #[test]
    fn test_size_merge() {
        let mut t = ValueType::number();
        t.add_size(SizeRange::exact(1));
        t.add_size(SizeRange::exact(4));
        assert_eq!(t.sizes, vec![SizeRange { min: 1, max: 4 }]);
    }
}
