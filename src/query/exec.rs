//! Simple-Query Executors
//!
//! The compiled form of a declarative query term: a tagged variant per
//! recognized shape, each with a dedicated evaluation path. Executors are
//! immutable; per-result acceleration state lives in `ResultCache`,
//! attached to the consumer's result object.
//!
//! ## Execution contract
//!
//! `execute` walks the input in order and pushes accepted (or projected)
//! values. When identifiers are supplied, surviving identifiers come out
//! aligned with the data; when positions are requested, each output
//! carries a `DataPosition` with its input index and, for projections, the
//! expansion length and sub-attribute. Selection preserves input values
//! unchanged; output order is input order.

use crate::data::{DataItem, DataPosition, Ident};
use crate::error::{EngineError, EngineResult};
use crate::ids::ElementId;
use crate::key::{Interval, Key, KeyType, RangeKey};
use crate::query::interp;
use crate::query::term::QueryTerm;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// Precompiled case-insensitive substring pattern.
#[derive(Debug, Clone)]
pub struct SubstringPat {
    needle: String,
    regex: Regex,
}

impl SubstringPat {
    pub fn new(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let pattern = format!("(?i){}", regex::escape(&needle));
        let regex = Regex::new(&pattern).expect("escaped literal always compiles");
        SubstringPat { needle, regex }
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

/// Range predicate over an ordered type; the four open/closed endpoint
/// combinations share this representation.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSel {
    pub range: RangeKey,
}

impl RangeSel {
    pub fn new(range: RangeKey) -> Self {
        RangeSel { range }
    }

    pub fn interval(&self) -> Interval {
        Interval::from_range(&self.range)
    }

    pub fn key_type(&self) -> KeyType {
        self.range.min.key_type()
    }
}

/// Specialized query executor, one variant per recognized term shape.
#[derive(Debug, Clone)]
pub enum SimpleQuery {
    /// `{}`, wildcard, or `n()`: selects all; deduplicates by identifier
    /// in identifier mode.
    PassThrough,
    /// `undefined` or `{k: o()}`: selects nothing.
    SelectNone,
    /// Root-level `true`.
    TrueSelection,
    /// Root-level `false`.
    FalseSelection,
    /// `{k: true}`.
    AttrTrue { attr: String },
    /// `{k: false}`: attribute present, non-empty, holding `false`.
    AttrFalse { attr: String },
    /// `{k: n(true)}`: attribute present with no `true` value.
    AttrPresentFalse { attr: String },
    /// `{k: n()}`: attribute absent or empty.
    AttrAbsent { attr: String },
    /// `{k: v}` for a scalar `v`.
    AttrValue { attr: String, value: Key },
    /// `{k: o(v1..)}` for scalars; the value set is cached.
    AttrValueMultiple { attr: String, values: BTreeSet<Key> },
    /// `{k: n(v)}`.
    AttrValueInv { attr: String, value: Key },
    /// `{k: n(v1..)}`; equality over these is set equality.
    AttrValueInvMultiple { attr: String, values: BTreeSet<Key> },
    /// `{k: r(..)}` used as a chain step: selection only.
    AttrRangeSelection { attr: String, range: RangeSel },
    /// `{k: r(..)}` standalone: selects and projects the matched values.
    AttrRangeQuery { attr: String, range: RangeSel },
    /// `{k: s(..)}` used as a chain step.
    AttrSubstringSelection { attr: String, pat: SubstringPat },
    /// `{k: s(..)}` standalone: selects and projects the matched values.
    AttrSubstringQuery { attr: String, pat: SubstringPat },
    /// `{k: _}`: projects the attribute's values.
    AttrProjection { attr: String },
    /// Root-level scalar.
    ValueSelection { value: Key },
    /// Root-level `o(v1..)` of scalars.
    ValueMultipleSelection { values: BTreeSet<Key> },
    /// Root-level substring pattern.
    SubstringSelection { pat: SubstringPat },
    /// Root-level element reference.
    ElementRefSelection { eid: ElementId },
    /// Root-level `o(e1..)` of element references.
    ElementRefMultipleSelection { eids: BTreeSet<ElementId> },
    /// Root-level range; covers the CC/CO/OC/OO endpoint combinations.
    RangeSelection { range: RangeSel },
    /// `n(q1..qn)` where every sub-term compiled simple.
    Negation { subs: Vec<Rc<SimpleQuery>> },
    /// `o(q1..qn)` with no projection sub-term.
    Or { subs: Vec<Rc<SimpleQuery>> },
    /// Selection steps AND-composed, optionally ending in a projection.
    Chain {
        selections: Vec<Rc<SimpleQuery>>,
        projection: Option<Rc<SimpleQuery>>,
    },
    /// Fallback: generic interpretation of the term.
    Interpreted {
        term: Rc<QueryTerm>,
        projection: bool,
    },
}

/// Output of one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub data: Vec<DataItem>,
    pub idents: Option<Vec<Ident>>,
    pub positions: Option<Vec<DataPosition>>,
}

impl SimpleQuery {
    /// Whether this executor projects rather than merely selects.
    pub fn is_projection(&self) -> bool {
        match self {
            SimpleQuery::AttrProjection { .. } => true,
            SimpleQuery::Chain { projection, .. } => projection.is_some(),
            SimpleQuery::Interpreted { projection, .. } => *projection,
            _ => false,
        }
    }

    /// Whether `execute_and_cache` is available: scalar-value-matching and
    /// range selections.
    pub fn can_cache(&self) -> bool {
        matches!(
            self,
            SimpleQuery::AttrValue { .. }
                | SimpleQuery::AttrValueMultiple { .. }
                | SimpleQuery::AttrRangeSelection { .. }
                | SimpleQuery::AttrRangeQuery { .. }
                | SimpleQuery::ValueSelection { .. }
                | SimpleQuery::ValueMultipleSelection { .. }
                | SimpleQuery::RangeSelection { .. }
        )
    }

    /// Test one value.
    pub fn test_single(&self, item: &DataItem) -> bool {
        match self {
            SimpleQuery::PassThrough => !item.is_missing(),
            SimpleQuery::SelectNone => false,
            SimpleQuery::TrueSelection => item.as_scalar() == Some(&Key::Bool(true)),
            SimpleQuery::FalseSelection => item.as_scalar() == Some(&Key::Bool(false)),
            SimpleQuery::AttrTrue { attr } => attr_has_key(item, attr, &Key::Bool(true)),
            SimpleQuery::AttrFalse { attr } => attr_has_key(item, attr, &Key::Bool(false)),
            SimpleQuery::AttrPresentFalse { attr } => {
                item.has_attr(attr) && !attr_has_key(item, attr, &Key::Bool(true))
            }
            SimpleQuery::AttrAbsent { attr } => !item.has_attr(attr),
            SimpleQuery::AttrValue { attr, value } => {
                let iv = Interval::point(value.clone());
                item.attr(attr)
                    .iter()
                    .filter_map(DataItem::as_scalar)
                    .any(|k| iv.matches_key(k))
            }
            SimpleQuery::AttrValueMultiple { attr, values } => item
                .attr(attr)
                .iter()
                .filter_map(DataItem::as_scalar)
                .any(|k| key_in_set(values, k)),
            SimpleQuery::AttrValueInv { attr, value } => {
                let iv = Interval::point(value.clone());
                item.has_attr(attr)
                    && !item
                        .attr(attr)
                        .iter()
                        .filter_map(DataItem::as_scalar)
                        .any(|k| iv.matches_key(k))
            }
            SimpleQuery::AttrValueInvMultiple { attr, values } => {
                item.has_attr(attr)
                    && !item
                        .attr(attr)
                        .iter()
                        .filter_map(DataItem::as_scalar)
                        .any(|k| key_in_set(values, k))
            }
            SimpleQuery::AttrRangeSelection { attr, range }
            | SimpleQuery::AttrRangeQuery { attr, range } => {
                let iv = range.interval();
                item.attr(attr)
                    .iter()
                    .filter_map(DataItem::as_scalar)
                    .any(|k| iv.matches_key(k))
            }
            SimpleQuery::AttrSubstringSelection { attr, pat }
            | SimpleQuery::AttrSubstringQuery { attr, pat } => item
                .attr(attr)
                .iter()
                .filter_map(DataItem::as_scalar)
                .filter_map(Key::as_str)
                .any(|s| pat.is_match(s)),
            SimpleQuery::AttrProjection { attr } => item.has_attr(attr),
            SimpleQuery::ValueSelection { value } => item
                .as_scalar()
                .is_some_and(|k| Interval::point(value.clone()).matches_key(k)),
            SimpleQuery::ValueMultipleSelection { values } => {
                item.as_scalar().is_some_and(|k| key_in_set(values, k))
            }
            SimpleQuery::SubstringSelection { pat } => item
                .as_scalar()
                .and_then(Key::as_str)
                .is_some_and(|s| pat.is_match(s)),
            SimpleQuery::ElementRefSelection { eid } => {
                matches!(item.as_scalar(), Some(Key::ElementRef(e)) if e == eid)
            }
            SimpleQuery::ElementRefMultipleSelection { eids } => {
                matches!(item.as_scalar(), Some(Key::ElementRef(e)) if eids.contains(e))
            }
            SimpleQuery::RangeSelection { range } => item
                .as_scalar()
                .is_some_and(|k| range.interval().matches_key(k)),
            SimpleQuery::Negation { subs } => {
                !item.is_missing() && !subs.iter().any(|s| s.test_single(item))
            }
            SimpleQuery::Or { subs } => subs.iter().any(|s| s.test_single(item)),
            SimpleQuery::Chain {
                selections,
                projection,
            } => {
                selections.iter().all(|s| s.test_single(item))
                    && projection.as_ref().map_or(true, |p| p.test_single(item))
            }
            SimpleQuery::Interpreted { term, .. } => interp::test(term, item),
        }
    }

    /// Test an ordered-set value: true when any member matches.
    pub fn test_os(&self, items: &[DataItem]) -> bool {
        items.iter().any(|item| self.test_single(item))
    }

    /// Run the executor over `data`.
    ///
    /// `idents` aligns identifiers with inputs; surviving identifiers come
    /// out aligned with outputs. `want_positions` requests per-output
    /// `DataPosition`s; `data_positions`, when supplied, replaces the raw
    /// input index with the input's own recorded position.
    pub fn execute(
        &self,
        data: &[DataItem],
        idents: Option<&[Ident]>,
        want_positions: bool,
        data_positions: Option<&[DataPosition]>,
    ) -> ExecOutput {
        let mut out = ExecOutput {
            data: Vec::new(),
            idents: idents.map(|_| Vec::new()),
            positions: want_positions.then(Vec::new),
        };
        let mut seen_idents: Vec<Ident> = Vec::new();

        for (i, item) in data.iter().enumerate() {
            let src = data_positions
                .and_then(|ps| ps.get(i))
                .map_or(i, |p| p.index);
            match self.project_item(item) {
                Projected::Rejected => {}
                Projected::Selected => {
                    if matches!(self, SimpleQuery::PassThrough) {
                        if let Some(ids) = idents {
                            // identifier mode deduplicates
                            if seen_idents.contains(&ids[i]) {
                                continue;
                            }
                            seen_idents.push(ids[i].clone());
                        }
                    }
                    out.data.push(item.clone());
                    if let (Some(out_ids), Some(ids)) = (&mut out.idents, idents) {
                        out_ids.push(ids[i].clone());
                    }
                    if let Some(ps) = &mut out.positions {
                        ps.push(DataPosition::plain(src));
                    }
                }
                Projected::Values(vals, sub_attr) => {
                    let n = vals.len();
                    for v in vals {
                        out.data.push(v);
                        if let (Some(out_ids), Some(ids)) = (&mut out.idents, idents) {
                            out_ids.push(ids[i].clone());
                        }
                        if let Some(ps) = &mut out.positions {
                            ps.push(if sub_attr.is_empty() {
                                DataPosition {
                                    index: src,
                                    length: Some(n),
                                    sub_attr: None,
                                }
                            } else {
                                DataPosition::expanded(src, n, &sub_attr)
                            });
                        }
                    }
                }
            }
        }
        out
    }

    /// Per-item evaluation shared by `execute` and the cached path.
    fn project_item(&self, item: &DataItem) -> Projected {
        match self {
            SimpleQuery::AttrProjection { attr } => {
                let vals: Vec<DataItem> = item.attr(attr).to_vec();
                if vals.is_empty() {
                    Projected::Rejected
                } else {
                    Projected::Values(vals, attr.clone())
                }
            }
            SimpleQuery::Chain {
                selections,
                projection,
            } => {
                if !selections.iter().all(|s| s.test_single(item)) {
                    return Projected::Rejected;
                }
                match projection {
                    Some(p) => p.project_item(item),
                    None => Projected::Selected,
                }
            }
            SimpleQuery::Interpreted { term, projection } => {
                if *projection {
                    match interp::project(term, item) {
                        Some(vals) if vals.is_empty() => Projected::Rejected,
                        Some(vals) => Projected::Values(vals, String::new()),
                        None => Projected::Rejected,
                    }
                } else if interp::test(term, item) {
                    Projected::Selected
                } else {
                    Projected::Rejected
                }
            }
            selection => {
                if selection.test_single(item) {
                    Projected::Selected
                } else {
                    Projected::Rejected
                }
            }
        }
    }

    /// Run through a per-result index, building it on first use.
    ///
    /// Available on scalar-value and range selections only; calling it on
    /// any other executor is a programmer error. When the indexed data
    /// contains range-typed values, caching is disabled for that data and
    /// plain `execute` answers.
    pub fn execute_and_cache(
        &self,
        data: &[DataItem],
        idents: Option<&[Ident]>,
        want_positions: bool,
        cache: &mut ResultCache,
    ) -> EngineResult<ExecOutput> {
        if !self.can_cache() {
            return Err(EngineError::CacheUnsupported);
        }
        let spec = self.cache_spec();
        if !cache.valid_for(data, idents, &spec) {
            cache.build(data, idents, &spec);
        }
        if cache.disabled {
            return Ok(self.execute(data, idents, want_positions, None));
        }

        let mut entries: Vec<&CacheEntry> = match self {
            SimpleQuery::AttrValue { value, .. } | SimpleQuery::ValueSelection { value } => {
                cache.lookup_scalar(value)
            }
            SimpleQuery::AttrValueMultiple { values, .. }
            | SimpleQuery::ValueMultipleSelection { values } => {
                let mut found = Vec::new();
                for v in values {
                    found.extend(cache.lookup_scalar(v));
                }
                found
            }
            SimpleQuery::AttrRangeSelection { range, .. }
            | SimpleQuery::AttrRangeQuery { range, .. }
            | SimpleQuery::RangeSelection { range } => cache.lookup_range(&range.interval()),
            _ => unreachable!("can_cache() gates the variants"),
        };
        entries.sort_by_key(|e| e.pos);
        entries.dedup_by_key(|e| e.pos);

        let mut out = ExecOutput {
            data: Vec::with_capacity(entries.len()),
            idents: idents.map(|_| Vec::with_capacity(entries.len())),
            positions: want_positions.then(Vec::new),
        };
        for e in entries {
            out.data.push(e.item.clone());
            if let Some(ps) = &mut out.positions {
                ps.push(DataPosition::plain(e.pos));
            }
            if let Some(out_ids) = &mut out.idents {
                if let Some(id) = &e.ident {
                    out_ids.push(id.clone());
                }
            }
        }
        Ok(out)
    }

    fn cache_spec(&self) -> CacheSpec {
        match self {
            SimpleQuery::AttrValue { attr, .. } | SimpleQuery::AttrValueMultiple { attr, .. } => {
                CacheSpec {
                    attr: Some(attr.clone()),
                    kind: CacheKind::Scalar,
                }
            }
            SimpleQuery::ValueSelection { .. } | SimpleQuery::ValueMultipleSelection { .. } => {
                CacheSpec {
                    attr: None,
                    kind: CacheKind::Scalar,
                }
            }
            SimpleQuery::AttrRangeSelection { attr, range }
            | SimpleQuery::AttrRangeQuery { attr, range } => CacheSpec {
                attr: Some(attr.clone()),
                kind: CacheKind::Range(range.key_type()),
            },
            SimpleQuery::RangeSelection { range } => CacheSpec {
                attr: None,
                kind: CacheKind::Range(range.key_type()),
            },
            _ => unreachable!("can_cache() gates the variants"),
        }
    }

    /// Structural equality. Inverse-multiple selections compare as sets;
    /// `Or` compares sub-queries pairwise in order.
    pub fn is_equal(&self, other: &SimpleQuery) -> bool {
        use SimpleQuery::*;
        match (self, other) {
            (PassThrough, PassThrough)
            | (SelectNone, SelectNone)
            | (TrueSelection, TrueSelection)
            | (FalseSelection, FalseSelection) => true,
            (AttrTrue { attr: a }, AttrTrue { attr: b })
            | (AttrFalse { attr: a }, AttrFalse { attr: b })
            | (AttrPresentFalse { attr: a }, AttrPresentFalse { attr: b })
            | (AttrAbsent { attr: a }, AttrAbsent { attr: b })
            | (AttrProjection { attr: a }, AttrProjection { attr: b }) => a == b,
            (AttrValue { attr: a, value: va }, AttrValue { attr: b, value: vb }) => {
                a == b && va == vb
            }
            (
                AttrValueMultiple {
                    attr: a,
                    values: va,
                },
                AttrValueMultiple {
                    attr: b,
                    values: vb,
                },
            ) => a == b && va == vb,
            (AttrValueInv { attr: a, value: va }, AttrValueInv { attr: b, value: vb }) => {
                a == b && va == vb
            }
            (
                AttrValueInvMultiple {
                    attr: a,
                    values: va,
                },
                AttrValueInvMultiple {
                    attr: b,
                    values: vb,
                },
            ) => a == b && va == vb,
            (
                AttrRangeSelection { attr: a, range: ra },
                AttrRangeSelection { attr: b, range: rb },
            )
            | (AttrRangeQuery { attr: a, range: ra }, AttrRangeQuery { attr: b, range: rb }) => {
                a == b && ra == rb
            }
            (
                AttrSubstringSelection { attr: a, pat: pa },
                AttrSubstringSelection { attr: b, pat: pb },
            )
            | (AttrSubstringQuery { attr: a, pat: pa }, AttrSubstringQuery { attr: b, pat: pb }) => {
                a == b && pa.needle == pb.needle
            }
            (ValueSelection { value: a }, ValueSelection { value: b }) => a == b,
            (ValueMultipleSelection { values: a }, ValueMultipleSelection { values: b }) => a == b,
            (SubstringSelection { pat: a }, SubstringSelection { pat: b }) => {
                a.needle == b.needle
            }
            (ElementRefSelection { eid: a }, ElementRefSelection { eid: b }) => a == b,
            (
                ElementRefMultipleSelection { eids: a },
                ElementRefMultipleSelection { eids: b },
            ) => a == b,
            (RangeSelection { range: a }, RangeSelection { range: b }) => a == b,
            (Negation { subs: a }, Negation { subs: b }) | (Or { subs: a }, Or { subs: b }) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_equal(y))
            }
            (
                Chain {
                    selections: sa,
                    projection: pa,
                },
                Chain {
                    selections: sb,
                    projection: pb,
                },
            ) => {
                sa.len() == sb.len()
                    && sa.iter().zip(sb).all(|(x, y)| x.is_equal(y))
                    && match (pa, pb) {
                        (Some(x), Some(y)) => x.is_equal(y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Interpreted { term: a, .. }, Interpreted { term: b, .. }) => a == b,
            _ => false,
        }
    }
}

enum Projected {
    Rejected,
    Selected,
    Values(Vec<DataItem>, String),
}

fn attr_has_key(item: &DataItem, attr: &str, key: &Key) -> bool {
    item.attr(attr)
        .iter()
        .any(|v| v.as_scalar() == Some(key))
}

fn key_in_set(values: &BTreeSet<Key>, k: &Key) -> bool {
    if values.contains(k) {
        return true;
    }
    // a range-typed data value matches when it covers any sought scalar
    if k.is_range() {
        let iv = Interval::from_key(k);
        return values.iter().any(|v| iv.matches_key(v));
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CacheKind {
    Scalar,
    Range(KeyType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheSpec {
    attr: Option<String>,
    kind: CacheKind,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    pos: usize,
    item: DataItem,
    ident: Option<Ident>,
}

/// Per-result acceleration index for `execute_and_cache`.
///
/// Owned by the consumer's result object and keyed by the identity of the
/// indexed data slice; a different slice (or a different indexed attribute
/// or kind) triggers a rebuild. Data containing range-typed values at the
/// indexed site disables the index for that data.
#[derive(Debug, Default)]
pub struct ResultCache {
    data_id: Option<(usize, usize)>,
    spec: Option<CacheSpec>,
    has_idents: bool,
    disabled: bool,
    scalar: HashMap<Key, Vec<usize>>,
    sorted: Vec<(Key, usize)>,
    entries: Vec<CacheEntry>,
    builds: usize,
}

impl ResultCache {
    pub fn new() -> Self {
        ResultCache::default()
    }

    /// How many times an index was (re)built; exposed for tests.
    pub fn build_count(&self) -> usize {
        self.builds
    }

    fn valid_for(&self, data: &[DataItem], idents: Option<&[Ident]>, spec: &CacheSpec) -> bool {
        self.data_id == Some(data_identity(data))
            && self.spec.as_ref() == Some(spec)
            && self.has_idents == idents.is_some()
    }

    fn build(&mut self, data: &[DataItem], idents: Option<&[Ident]>, spec: &CacheSpec) {
        self.data_id = Some(data_identity(data));
        self.spec = Some(spec.clone());
        self.has_idents = idents.is_some();
        self.disabled = false;
        self.scalar.clear();
        self.sorted.clear();
        self.entries.clear();
        self.builds += 1;

        for (pos, item) in data.iter().enumerate() {
            let keys: Vec<&Key> = match &spec.attr {
                Some(attr) => item.attr(attr).iter().filter_map(DataItem::as_scalar).collect(),
                None => item.as_scalar().into_iter().collect(),
            };
            for k in keys {
                let range_hit = match &spec.kind {
                    CacheKind::Scalar => k.is_range(),
                    CacheKind::Range(ty) => k.is_range() && k.key_type() == *ty,
                };
                if range_hit {
                    self.disabled = true;
                    self.scalar.clear();
                    self.sorted.clear();
                    self.entries.clear();
                    return;
                }
                let idx = self.entries.len();
                self.entries.push(CacheEntry {
                    pos,
                    item: item.clone(),
                    ident: idents.map(|ids| ids[pos].clone()),
                });
                match &spec.kind {
                    CacheKind::Scalar => {
                        self.scalar.entry(k.clone()).or_default().push(idx);
                    }
                    CacheKind::Range(ty) => {
                        if k.key_type() == *ty {
                            self.sorted.push((k.clone(), idx));
                        }
                    }
                }
            }
        }
        self.sorted.sort_by(|a, b| a.0.cmp(&b.0));
    }

    fn lookup_scalar(&self, key: &Key) -> Vec<&CacheEntry> {
        self.scalar
            .get(key)
            .map(|idxs| idxs.iter().map(|i| &self.entries[*i]).collect())
            .unwrap_or_default()
    }

    fn lookup_range(&self, iv: &Interval) -> Vec<&CacheEntry> {
        // binary-search bounds over the sorted key column
        let lo = self.sorted.partition_point(|(k, _)| {
            match k.scalar_cmp(&iv.lo) {
                Some(std::cmp::Ordering::Less) => true,
                Some(std::cmp::Ordering::Equal) => iv.lo_open,
                _ => false,
            }
        });
        let hi = self.sorted.partition_point(|(k, _)| {
            match k.scalar_cmp(&iv.hi) {
                Some(std::cmp::Ordering::Less) => true,
                Some(std::cmp::Ordering::Equal) => !iv.hi_open,
                _ => false,
            }
        });
        self.sorted[lo..hi]
            .iter()
            .map(|(_, i)| &self.entries[*i])
            .collect()
    }
}

fn data_identity(data: &[DataItem]) -> (usize, usize) {
    (data.as_ptr() as usize, data.len())
}
