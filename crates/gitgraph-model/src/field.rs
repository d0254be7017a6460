//! Typed entity attributes that record their own changes.
//!
//! An entity owns its attribute values as plain struct fields and a single
//! [`Changes`] document. Setters on [`Scalar`] and [`SetField`] update the
//! value and record the matching [`FieldOp`] in that document; the session
//! turns the accumulated operations into one partial update at flush time.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use gitgraph_store::Document;
use gitgraph_types::RepositoryId;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// A value that can be stored in an entity field.
pub trait FieldValue: Clone + PartialEq + Sized {
    fn to_value(&self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

impl FieldValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FieldValue for u64 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FieldValue for i64 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FieldValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FieldValue for RepositoryId {
    fn to_value(&self) -> Value {
        Value::String(self.as_str().to_string())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(RepositoryId::new)
    }
}

/// Timestamps are stored as integer milliseconds since the Unix epoch so
/// that range filters compare numerically.
impl FieldValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::from(self.timestamp_millis())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(DateTime::from_timestamp_millis)
    }
}

/// One pending operation on a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldOp {
    /// Overwrite the field.
    Set(Value),
    /// Add each value to the array field unless already present.
    AddToSet(Vec<Value>),
}

/// Pending operations keyed by field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Changes {
    ops: BTreeMap<String, FieldOp>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldOp> {
        self.ops.get(field)
    }

    /// Whether any operation is pending on `field`.
    pub fn touches(&self, field: &str) -> bool {
        self.ops.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldOp)> {
        self.ops.iter().map(|(field, op)| (field.as_str(), op))
    }

    pub fn record_set(&mut self, field: &str, value: Value) {
        self.ops.insert(field.to_string(), FieldOp::Set(value));
    }

    pub fn record_add(&mut self, field: &str, values: Vec<Value>) {
        if values.is_empty() {
            return;
        }
        match self.ops.get_mut(field) {
            Some(FieldOp::AddToSet(existing)) => {
                for value in values {
                    if !existing.contains(&value) {
                        existing.push(value);
                    }
                }
            }
            _ => {
                self.ops.insert(field.to_string(), FieldOp::AddToSet(values));
            }
        }
    }

    /// Fold a later change document into this one.
    ///
    /// A later `Set` replaces an earlier one; `AddToSet` values are unioned.
    pub fn merge(&mut self, later: Changes) {
        for (field, op) in later.ops {
            match op {
                FieldOp::Set(value) => self.record_set(&field, value),
                FieldOp::AddToSet(values) => self.record_add(&field, values),
            }
        }
    }
}

/// A single-valued attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Scalar<T> {
    name: &'static str,
    value: T,
}

impl<T: FieldValue> Scalar<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self { name, value }
    }

    /// Read the field from a stored document. A missing or `null` field
    /// takes `default`.
    pub fn load(name: &'static str, doc: &Document, default: T) -> ModelResult<Self> {
        match doc.get(name) {
            None | Some(Value::Null) => Ok(Self::new(name, default)),
            Some(raw) => T::from_value(raw)
                .map(|value| Self::new(name, value))
                .ok_or_else(|| {
                    ModelError::Validation(format!("field {name} has unexpected value {raw}"))
                }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Store `value`, recording a `Set` if it differs from the current
    /// value. Returns whether anything changed.
    pub fn set(&mut self, value: T, changes: &mut Changes) -> bool {
        if self.value == value {
            return false;
        }
        changes.record_set(self.name, value.to_value());
        self.value = value;
        true
    }

    pub fn write(&self, doc: &mut Document) {
        doc.insert(self.name.to_string(), self.value.to_value());
    }
}

/// A set-valued attribute stored as an array.
#[derive(Clone, Debug, PartialEq)]
pub struct SetField<T: Ord> {
    name: &'static str,
    values: BTreeSet<T>,
}

impl<T: FieldValue + Ord> SetField<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: BTreeSet::new(),
        }
    }

    /// Read the field from a stored document. A missing field is empty.
    pub fn load(name: &'static str, doc: &Document) -> ModelResult<Self> {
        let mut field = Self::new(name);
        let items = match doc.get(name) {
            None | Some(Value::Null) => return Ok(field),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ModelError::Validation(format!(
                    "field {name} must be an array, got {other}"
                )))
            }
        };
        for raw in items {
            let value = T::from_value(raw).ok_or_else(|| {
                ModelError::Validation(format!("field {name} has unexpected member {raw}"))
            })?;
            field.values.insert(value);
        }
        Ok(field)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn contains(&self, value: &T) -> bool {
        self.values.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn add(&mut self, value: T, changes: &mut Changes) -> bool {
        self.add_all([value], changes) == 1
    }

    /// Add every value not already present and record one `AddToSet` with
    /// the new members. Returns how many were added.
    pub fn add_all(&mut self, values: impl IntoIterator<Item = T>, changes: &mut Changes) -> usize {
        let mut added = Vec::new();
        for value in values {
            if !self.values.contains(&value) {
                added.push(value.to_value());
                self.values.insert(value);
            }
        }
        let count = added.len();
        changes.record_add(self.name, added);
        count
    }

    pub fn write(&self, doc: &mut Document) {
        let items = self.values.iter().map(FieldValue::to_value).collect();
        doc.insert(self.name.to_string(), Value::Array(items));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("test document must be an object"),
        }
    }

    // -----------------------------------------------------------------------
    // Scalar
    // -----------------------------------------------------------------------

    #[test]
    fn scalar_set_equal_value_is_noop() {
        let mut changes = Changes::new();
        let mut flag = Scalar::new("approved", false);
        assert!(!flag.set(false, &mut changes));
        assert!(changes.is_empty());

        assert!(flag.set(true, &mut changes));
        assert!(*flag.get());
        assert_eq!(changes.get("approved"), Some(&FieldOp::Set(json!(true))));
    }

    #[test]
    fn scalar_load_defaults_and_rejects_wrong_type() {
        let d = doc(json!({"count": 7, "indexing": "yes"}));
        assert_eq!(*Scalar::<u64>::load("count", &d, 0).unwrap().get(), 7);
        assert_eq!(*Scalar::<u64>::load("missing", &d, 3).unwrap().get(), 3);
        assert!(Scalar::<bool>::load("indexing", &d, false).is_err());
    }

    #[test]
    fn timestamps_round_trip_as_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let mut d = Document::new();
        Scalar::new("last_index", at).write(&mut d);
        assert_eq!(d["last_index"], json!(1_700_000_000_123_i64));
        let back = Scalar::<DateTime<Utc>>::load("last_index", &d, DateTime::<Utc>::UNIX_EPOCH).unwrap();
        assert_eq!(*back.get(), at);
    }

    // -----------------------------------------------------------------------
    // SetField
    // -----------------------------------------------------------------------

    #[test]
    fn set_add_all_records_only_new_members() {
        let mut changes = Changes::new();
        let mut labels = SetField::<String>::new("labels");
        assert_eq!(labels.add_all(["a".to_string(), "b".to_string()], &mut changes), 2);
        assert_eq!(labels.add_all(["b".to_string(), "c".to_string()], &mut changes), 1);
        assert_eq!(
            changes.get("labels"),
            Some(&FieldOp::AddToSet(vec![json!("a"), json!("b"), json!("c")]))
        );
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn set_add_present_value_records_nothing() {
        let mut changes = Changes::new();
        let mut labels = SetField::<String>::load("labels", &doc(json!({"labels": ["x"]}))).unwrap();
        assert!(!labels.add("x".into(), &mut changes));
        assert!(changes.is_empty());
    }

    #[test]
    fn set_load_rejects_non_array() {
        let d = doc(json!({"repository_ids": "r1"}));
        assert!(SetField::<RepositoryId>::load("repository_ids", &d).is_err());
        let d = doc(json!({"repository_ids": [1]}));
        assert!(SetField::<RepositoryId>::load("repository_ids", &d).is_err());
    }

    // -----------------------------------------------------------------------
    // Changes
    // -----------------------------------------------------------------------

    #[test]
    fn merge_later_set_wins_and_sets_union() {
        let mut first = Changes::new();
        first.record_set("indexing", json!(true));
        first.record_add("labels", vec![json!("a")]);

        let mut later = Changes::new();
        later.record_set("indexing", json!(false));
        later.record_add("labels", vec![json!("a"), json!("b")]);
        later.record_set("url", json!("u"));

        first.merge(later);
        assert_eq!(first.get("indexing"), Some(&FieldOp::Set(json!(false))));
        assert_eq!(
            first.get("labels"),
            Some(&FieldOp::AddToSet(vec![json!("a"), json!("b")]))
        );
        assert!(first.touches("url"));
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn record_add_ignores_empty() {
        let mut changes = Changes::new();
        changes.record_add("labels", Vec::new());
        assert!(changes.is_empty());
    }
}
