//! Documents, filters, queries and update descriptions.
//!
//! These types are backend-neutral: a backend that speaks a real query
//! language translates them, and [`Filter::matches`] / [`Update::apply`]
//! give the reference semantics every backend must agree with.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::StoreResult;

/// Primary key field of every document.
pub const ID_FIELD: &str = "_id";

/// A stored record: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// An anchored literal prefix pattern.
///
/// The input is treated as literal text: the compiled expression is `^`
/// followed by the escaped input.
#[derive(Clone, Debug)]
pub struct Pattern {
    literal: String,
    regex: Regex,
}

impl Pattern {
    /// Build a pattern matching every string starting with `prefix`.
    pub fn anchored(prefix: &str) -> StoreResult<Self> {
        let regex = Regex::new(&format!("^{}", regex::escape(prefix)))?;
        Ok(Self {
            literal: prefix.to_string(),
            regex,
        })
    }

    /// The literal prefix this pattern anchors on.
    pub fn literal_prefix(&self) -> &str {
        &self.literal
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

impl Eq for Pattern {}

/// A predicate over documents.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Every document.
    All,
    /// Field equals value. A missing field equals `null`.
    Eq(String, Value),
    /// Field is strictly less than value (same-typed comparison only).
    Lt(String, Value),
    /// Field is an array containing value.
    Contains(String, Value),
    /// Field is a string matching the pattern.
    Matches(String, Pattern),
    /// Every sub-filter matches.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains(field.into(), value.into())
    }

    /// Anchored prefix match on a string field.
    pub fn prefix(field: impl Into<String>, prefix: &str) -> StoreResult<Self> {
        Ok(Self::Matches(field.into(), Pattern::anchored(prefix)?))
    }

    /// Exact match on the primary key.
    pub fn id(id: &str) -> Self {
        Self::eq(ID_FIELD, id)
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, f) | (f, Filter::All) => f,
            (Filter::And(mut a), Filter::And(b)) => {
                a.extend(b);
                Filter::And(a)
            }
            (Filter::And(mut a), f) => {
                a.push(f);
                Filter::And(a)
            }
            (f, Filter::And(mut b)) => {
                b.insert(0, f);
                Filter::And(b)
            }
            (a, b) => Filter::And(vec![a, b]),
        }
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field).unwrap_or(&Value::Null) == value,
            Filter::Lt(field, value) => doc
                .get(field)
                .and_then(|v| compare_values(v, value))
                .is_some_and(|ord| ord == Ordering::Less),
            Filter::Contains(field, value) => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Filter::Matches(field, pattern) => doc
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|s| pattern.is_match(s)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }

    /// The literal `_id` prefix this filter is anchored on, if any.
    ///
    /// Backends with ordered primary keys use this to turn the query into
    /// a range scan.
    pub fn id_prefix(&self) -> Option<&str> {
        match self {
            Filter::Matches(field, pattern) if field == ID_FIELD => Some(pattern.literal_prefix()),
            Filter::And(filters) => filters.iter().find_map(Filter::id_prefix),
            _ => None,
        }
    }

    /// The exact `_id` this filter pins, if any.
    pub fn id_exact(&self) -> Option<&str> {
        match self {
            Filter::Eq(field, Value::String(id)) if field == ID_FIELD => Some(id),
            Filter::And(filters) => filters.iter().find_map(Filter::id_exact),
            _ => None,
        }
    }
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Sort order: one field and a direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// A find request: filter plus ordering and paging.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub sort: Option<Sort>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order,
        });
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Self::new(filter)
    }
}

/// A partial update applied by `upsert`.
///
/// - `set` overwrites fields
/// - `set_on_insert` is applied only when the document is being created
/// - `add_to_set` appends each value not already present in an array field
///   (a missing or non-array field becomes an empty array first)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub set_on_insert: Document,
    pub add_to_set: BTreeMap<String, Vec<Value>>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn set_on_insert(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_on_insert.insert(field.into(), value.into());
        self
    }

    pub fn add_to_set(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.add_to_set.entry(field.into()).or_default().extend(values);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.set_on_insert.is_empty() && self.add_to_set.is_empty()
    }

    /// Apply the update to `doc`. `inserting` is true when the document did
    /// not exist before this write.
    pub fn apply(&self, doc: &mut Document, inserting: bool) {
        if inserting {
            for (field, value) in &self.set_on_insert {
                doc.insert(field.clone(), value.clone());
            }
        }
        for (field, value) in &self.set {
            doc.insert(field.clone(), value.clone());
        }
        for (field, values) in &self.add_to_set {
            let slot = doc
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
        }
    }
}

/// Compare two JSON values of the same type.
///
/// Integers compare exactly, other numbers as floats, strings
/// lexicographically, booleans `false < true`. Mismatched types (and
/// arrays/objects) are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Ordering used for sorted queries: missing and `null` sort first,
/// incomparable values are treated as equal.
pub(crate) fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}
