//! Runtime data model for query execution.
//!
//! Simple-query executors evaluate over ordered sets of `DataItem`s: tagged
//! scalars or attribute–value objects whose attributes map to ordered value
//! sets. `DataPosition` records the provenance of each output element so a
//! downstream consumer can map results back to input positions, including
//! the expansion a projection performs.

use crate::key::Key;
use std::collections::BTreeMap;

/// A single runtime value: absent, a scalar key, or an attribute–value
/// object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataItem {
    Missing,
    Scalar(Key),
    Object(AvObject),
}

/// An attribute–value object; each attribute holds an ordered value set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AvObject {
    attrs: BTreeMap<String, Vec<DataItem>>,
}

/// Identifier attached to a data element in executor input.
pub type Ident = Key;

/// Provenance of one output element of `execute`.
///
/// `index` is the position in the input. For projections that expand a
/// single input into `n` outputs, `length` is `n` and `sub_attr` names the
/// projected attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPosition {
    pub index: usize,
    pub length: Option<usize>,
    pub sub_attr: Option<String>,
}

impl DataPosition {
    pub fn plain(index: usize) -> Self {
        DataPosition {
            index,
            length: None,
            sub_attr: None,
        }
    }

    pub fn expanded(index: usize, length: usize, sub_attr: &str) -> Self {
        DataPosition {
            index,
            length: Some(length),
            sub_attr: Some(sub_attr.to_string()),
        }
    }
}

impl DataItem {
    pub fn scalar(k: Key) -> Self {
        DataItem::Scalar(k)
    }

    pub fn number(n: f64) -> Self {
        DataItem::Scalar(Key::number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        DataItem::Scalar(Key::string(s))
    }

    pub fn boolean(b: bool) -> Self {
        DataItem::Scalar(Key::Bool(b))
    }

    pub fn as_scalar(&self) -> Option<&Key> {
        match self {
            DataItem::Scalar(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&AvObject> {
        match self {
            DataItem::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, DataItem::Missing)
    }

    /// Values under `attr`; empty when absent or not an object.
    pub fn attr(&self, attr: &str) -> &[DataItem] {
        match self {
            DataItem::Object(o) => o.get(attr),
            _ => &[],
        }
    }

    /// Whether this item has at least one value under `attr`.
    pub fn has_attr(&self, attr: &str) -> bool {
        !self.attr(attr).is_empty()
    }
}

impl AvObject {
    pub fn new() -> Self {
        AvObject::default()
    }

    pub fn with(mut self, attr: impl Into<String>, values: Vec<DataItem>) -> Self {
        self.attrs.insert(attr.into(), values);
        self
    }

    /// Single-valued attribute shorthand.
    pub fn with_scalar(self, attr: impl Into<String>, k: Key) -> Self {
        self.with(attr, vec![DataItem::Scalar(k)])
    }

    pub fn set(&mut self, attr: impl Into<String>, values: Vec<DataItem>) {
        self.attrs.insert(attr.into(), values);
    }

    pub fn get(&self, attr: &str) -> &[DataItem] {
        self.attrs.get(attr).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, attr: &str) -> bool {
        !self.get(attr).is_empty()
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &[DataItem])> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Convenience constructor for test fixtures: `{attr: scalar}`.
pub fn av(attr: &str, k: Key) -> DataItem {
    DataItem::Object(AvObject::new().with_scalar(attr, k))
}
