//! # Key Type System
//!
//! Keys are the values the engine selects and orders by: tagged primitive
//! scalars (number, string, boolean, element reference) and range values
//! denoting an interval over an ordered primitive type.
//!
//! Numbers use a total order (`f64::total_cmp`), so keys are `Eq + Ord +
//! Hash` and usable in maps and sorted indices. Cross-type comparison
//! orders by type tag first.
//!
//! ## Usage
//!
//! ```
//! use avql::key::{Key, RangeKey, Interval};
//!
//! let k = Key::number(10.0);
//! let r = RangeKey::closed(Key::number(8.0), Key::number(18.0));
//! assert!(Interval::from_range(&r).contains_point(&k));
//! ```

use crate::ids::ElementId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Type tags for primitive key values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Number,
    String,
    Boolean,
    ElementRef,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyType::Number => "number",
            KeyType::String => "string",
            KeyType::Boolean => "boolean",
            KeyType::ElementRef => "elementRef",
        };
        f.write_str(s)
    }
}

/// A primitive scalar or a range value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    Number(f64),
    String(String),
    Bool(bool),
    ElementRef(ElementId),
    Range(Box<RangeKey>),
}

/// An interval over an ordered primitive type.
///
/// `min`/`max` must be scalars of the same type; construction goes through
/// the checked constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeKey {
    pub min: Key,
    pub max: Key,
    pub closed_lower: bool,
    pub closed_upper: bool,
}

impl Key {
    pub fn number(n: f64) -> Self {
        Key::Number(n)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Key::String(s.into())
    }

    /// The type tag of this key; ranges report their endpoint type.
    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Number(_) => KeyType::Number,
            Key::String(_) => KeyType::String,
            Key::Bool(_) => KeyType::Boolean,
            Key::ElementRef(_) => KeyType::ElementRef,
            Key::Range(r) => r.min.key_type(),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Key::Range(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Key::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Compare two scalars of the same type. `None` when the types differ
    /// or either side is a range.
    pub fn scalar_cmp(&self, other: &Key) -> Option<Ordering> {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => Some(a.total_cmp(b)),
            (Key::String(a), Key::String(b)) => Some(a.cmp(b)),
            (Key::Bool(a), Key::Bool(b)) => Some(a.cmp(b)),
            (Key::ElementRef(a), Key::ElementRef(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Bool(_) => 2,
            Key::ElementRef(_) => 3,
            Key::Range(_) => 4,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b) == Ordering::Equal,
            (Key::String(a), Key::String(b)) => a == b,
            (Key::Bool(a), Key::Bool(b)) => a == b,
            (Key::ElementRef(a), Key::ElementRef(b)) => a == b,
            (Key::Range(a), Key::Range(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::ElementRef(a), Key::ElementRef(b)) => a.cmp(b),
            (Key::Range(a), Key::Range(b)) => a
                .min
                .cmp(&b.min)
                .then_with(|| a.max.cmp(&b.max))
                .then_with(|| a.closed_lower.cmp(&b.closed_lower))
                .then_with(|| a.closed_upper.cmp(&b.closed_upper)),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Key::Number(n) => n.to_bits().hash(state),
            Key::String(s) => s.hash(state),
            Key::Bool(b) => b.hash(state),
            Key::ElementRef(e) => e.hash(state),
            Key::Range(r) => {
                r.min.hash(state);
                r.max.hash(state);
                r.closed_lower.hash(state);
                r.closed_upper.hash(state);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::String(s) => write!(f, "\"{s}\""),
            Key::Bool(b) => write!(f, "{b}"),
            Key::ElementRef(e) => write!(f, "{e}"),
            Key::Range(r) => {
                let lo = if r.closed_lower { '[' } else { '(' };
                let hi = if r.closed_upper { ']' } else { ')' };
                write!(f, "{lo}{}, {}{hi}", r.min, r.max)
            }
        }
    }
}

impl RangeKey {
    /// Closed range `[min, max]`.
    pub fn closed(min: Key, max: Key) -> Self {
        RangeKey {
            min,
            max,
            closed_lower: true,
            closed_upper: true,
        }
    }

    /// Open range `(min, max)`.
    pub fn open(min: Key, max: Key) -> Self {
        RangeKey {
            min,
            max,
            closed_lower: false,
            closed_upper: false,
        }
    }

    pub fn new(min: Key, max: Key, closed_lower: bool, closed_upper: bool) -> Self {
        RangeKey {
            min,
            max,
            closed_lower,
            closed_upper,
        }
    }
}

/// An interval with open/closed endpoints, the unit the pairwise-disjoint
/// cover and the indexer's value registrations operate on.
///
/// A point value is represented as a degenerate closed interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub lo: Key,
    pub lo_open: bool,
    pub hi: Key,
    pub hi_open: bool,
}

impl Interval {
    /// Degenerate interval for a point value.
    pub fn point(k: Key) -> Self {
        Interval {
            lo: k.clone(),
            lo_open: false,
            hi: k,
            hi_open: false,
        }
    }

    pub fn from_range(r: &RangeKey) -> Self {
        Interval {
            lo: r.min.clone(),
            lo_open: !r.closed_lower,
            hi: r.max.clone(),
            hi_open: !r.closed_upper,
        }
    }

    /// Interval form of any key: ranges map to their extent, scalars to a
    /// point interval.
    pub fn from_key(k: &Key) -> Self {
        match k {
            Key::Range(r) => Interval::from_range(r),
            other => Interval::point(other.clone()),
        }
    }

    pub fn key_type(&self) -> KeyType {
        self.lo.key_type()
    }

    pub fn is_point(&self) -> bool {
        !self.lo_open && !self.hi_open && self.lo == self.hi
    }

    /// An interval is empty when lo > hi, or lo == hi with an open end.
    pub fn is_empty(&self) -> bool {
        match self.lo.scalar_cmp(&self.hi) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => self.lo_open || self.hi_open,
            _ => false,
        }
    }

    pub fn contains_point(&self, k: &Key) -> bool {
        let lo = match k.scalar_cmp(&self.lo) {
            Some(Ordering::Greater) => true,
            Some(Ordering::Equal) => !self.lo_open,
            _ => false,
        };
        if !lo {
            return false;
        }
        match k.scalar_cmp(&self.hi) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => !self.hi_open,
            _ => false,
        }
    }

    /// Whether the key (scalar or range) intersects this interval.
    pub fn matches_key(&self, k: &Key) -> bool {
        match k {
            Key::Range(r) => self.overlaps(&Interval::from_range(r)),
            scalar => self.contains_point(scalar),
        }
    }

    /// True when the two intervals share at least one point.
    pub fn overlaps(&self, other: &Interval) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        // self.lo <= other.hi and other.lo <= self.hi, honoring openness
        let a = match self.lo.scalar_cmp(&other.hi) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => !self.lo_open && !other.hi_open,
            _ => false,
        };
        let b = match other.lo.scalar_cmp(&self.hi) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => !other.lo_open && !self.hi_open,
            _ => false,
        };
        a && b
    }

    /// True when `other` lies entirely inside this interval.
    pub fn contains_interval(&self, other: &Interval) -> bool {
        let lo_ok = match self.lo.scalar_cmp(&other.lo) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => !self.lo_open || other.lo_open,
            _ => false,
        };
        if !lo_ok {
            return false;
        }
        match other.hi.scalar_cmp(&self.hi) {
            Some(Ordering::Less) => true,
            Some(Ordering::Equal) => !self.hi_open || other.hi_open,
            _ => false,
        }
    }

    /// Smallest interval covering both inputs.
    pub fn hull(&self, other: &Interval) -> Interval {
        let (lo, lo_open) = match self.lo.scalar_cmp(&other.lo) {
            Some(Ordering::Less) => (self.lo.clone(), self.lo_open),
            Some(Ordering::Greater) => (other.lo.clone(), other.lo_open),
            _ => (self.lo.clone(), self.lo_open && other.lo_open),
        };
        let (hi, hi_open) = match self.hi.scalar_cmp(&other.hi) {
            Some(Ordering::Greater) => (self.hi.clone(), self.hi_open),
            Some(Ordering::Less) => (other.hi.clone(), other.hi_open),
            _ => (self.hi.clone(), self.hi_open && other.hi_open),
        };
        Interval {
            lo,
            lo_open,
            hi,
            hi_open,
        }
    }

    /// The key this interval registers as: a point key for degenerate
    /// intervals, a range key otherwise.
    pub fn to_key(&self) -> Key {
        if self.is_point() {
            self.lo.clone()
        } else {
            Key::Range(Box::new(RangeKey {
                min: self.lo.clone(),
                max: self.hi.clone(),
                closed_lower: !self.lo_open,
                closed_upper: !self.hi_open,
            }))
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = if self.lo_open { '(' } else { '[' };
        let hi = if self.hi_open { ')' } else { ']' };
        write!(f, "{lo}{}, {}{hi}", self.lo, self.hi)
    }
}
