// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core record types exchanged between the store, the association resolver, and
// the method-call bridge.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use serde_json::{Map, Value as Json, json};

use crate::error::{Result, SyncwerkError};

/// Name of the primary key field carried by every record.
pub const ID_FIELD: &str = "id";

/// Field name → value, in deterministic field order.
pub type Fields = BTreeMap<String, Value>;

/// Temporal scalar types understood by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Temporal {
    /// ISO-8601 date-time with offset.
    DateTime(DateTime<FixedOffset>),
    /// Calendar date without time.
    Date(NaiveDate),
    /// Wall-clock time without date.
    Time(NaiveTime),
    /// Seconds since the Unix epoch.
    Timestamp(i64),
}

impl Temporal {
    /// Wire form sent across the bridge: formatted strings, or epoch seconds
    /// for timestamps.
    pub fn to_json(&self) -> Json {
        match self {
            Self::DateTime(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => Json::String(t.format("%H:%M:%S%.f").to_string()),
            Self::Timestamp(secs) => json!(secs),
        }
    }
}

/// A single field value inside a [`SerializedRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Temporal(Temporal),
    List(Vec<Value>),
    /// A nested record. For to-one associations this is usually a placeholder
    /// that only carries the foreign key in its `id`.
    Record(Box<SerializedRecord>),
}

/// How nested records are rendered when converting to JSON.
#[derive(Clone, Copy)]
enum Encoding {
    /// Plain field maps, as persisted by the local store.
    Storage,
    /// `{ id, modelName, serializedData }` maps, as sent across the bridge.
    Bridge,
}

impl Value {
    /// Parse a JSON value. Objects become nested record placeholders whose
    /// model name is unknown (empty).
    pub fn from_json(json: Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Null, Self::Float),
            },
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Json::Object(map) => {
                Self::Record(Box::new(SerializedRecord::from_json_map(String::new(), map)))
            }
        }
    }

    /// Storage form: nested records collapse to their plain field maps.
    pub fn to_json(&self) -> Json {
        self.encode(Encoding::Storage)
    }

    fn encode(&self, encoding: Encoding) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => json!(i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Temporal(t) => t.to_json(),
            Self::List(items) => Json::Array(items.iter().map(|v| v.encode(encoding)).collect()),
            Self::Record(record) => match encoding {
                Encoding::Storage => record.data_json(),
                Encoding::Bridge => record.to_bridge_map(),
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&SerializedRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Render the value as an identifier, the way foreign keys are compared.
    pub fn as_id(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Ordering between two scalar values.
    ///
    /// Integers and floats compare numerically, temporals compare against
    /// values of the same kind or against their string wire form. Returns
    /// `None` for nulls, records, lists, and mismatched kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Temporal(a), Self::Temporal(b)) => compare_temporal(a, b),
            (Self::Temporal(t), Self::String(s)) => {
                t.to_json().as_str().map(|own| own.cmp(s.as_str()))
            }
            (Self::String(s), Self::Temporal(t)) => {
                t.to_json().as_str().map(|own| s.as_str().cmp(own))
            }
            _ => None,
        }
    }
}

fn compare_temporal(a: &Temporal, b: &Temporal) -> Option<Ordering> {
    match (a, b) {
        (Temporal::DateTime(x), Temporal::DateTime(y)) => Some(x.cmp(y)),
        (Temporal::Date(x), Temporal::Date(y)) => Some(x.cmp(y)),
        (Temporal::Time(x), Temporal::Time(y)) => Some(x.cmp(y)),
        (Temporal::Timestamp(x), Temporal::Timestamp(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Temporal> for Value {
    fn from(t: Temporal) -> Self {
        Self::Temporal(t)
    }
}

impl From<SerializedRecord> for Value {
    fn from(record: SerializedRecord) -> Self {
        Self::Record(Box::new(record))
    }
}

/// A model instance as produced by the store: model name, primary key, and
/// its serialized fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedRecord {
    pub model_name: String,
    pub id: String,
    pub fields: Fields,
}

impl SerializedRecord {
    /// Create a record with only its `id` field populated.
    pub fn new(model_name: impl Into<String>, id: impl Into<String>) -> Self {
        let id = id.into();
        let mut fields = Fields::new();
        fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        Self {
            model_name: model_name.into(),
            id,
            fields,
        }
    }

    /// A nested to-one placeholder carrying just the foreign key.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self::new(String::new(), id)
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Foreign key held by the nested placeholder in `field`.
    ///
    /// Returns `None` when the field is absent, null, not a record, or the
    /// placeholder carries no id.
    pub fn nested_id(&self, field: &str) -> Option<&str> {
        let nested = self.field(field)?.as_record()?;
        if nested.id.is_empty() {
            None
        } else {
            Some(&nested.id)
        }
    }

    fn from_json_map(model_name: String, map: Map<String, Json>) -> Self {
        let id = map
            .get(ID_FIELD)
            .and_then(|v| match v {
                Json::String(s) => Some(s.clone()),
                Json::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_default();
        let fields = map
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect();
        Self {
            model_name,
            id,
            fields,
        }
    }

    /// Parse a plain field map (storage form or an incoming `serializedModel`
    /// payload). Nested objects become nested placeholder records.
    pub fn from_data_json(model_name: impl Into<String>, json: Json) -> Result<Self> {
        let model_name = model_name.into();
        let Json::Object(map) = json else {
            return Err(SyncwerkError::MalformedRequest(format!(
                "serialized {model_name} is not a map"
            )));
        };
        let record = Self::from_json_map(model_name, map);
        if record.id.is_empty() {
            return Err(SyncwerkError::MalformedRequest(format!(
                "serialized {} has no id",
                record.model_name
            )));
        }
        Ok(record)
    }

    /// Storage form: a plain JSON object of the fields.
    pub fn data_json(&self) -> Json {
        Json::Object(self.encode_fields(Encoding::Storage))
    }

    fn encode_fields(&self, encoding: Encoding) -> Map<String, Json> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.encode(encoding)))
            .collect()
    }

    /// Bridge form: `{ id, modelName, serializedData }`.
    pub fn to_bridge_map(&self) -> Json {
        json!({
            "id": self.id,
            "modelName": self.model_name,
            "serializedData": Json::Object(self.encode_fields(Encoding::Bridge)),
        })
    }
}

/// A record with its to-one associations hydrated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub record: SerializedRecord,
    /// Association field → fully resolved associated record. Fields whose
    /// target row was not found locally are absent.
    pub associations: BTreeMap<String, ResolvedRecord>,
}

impl ResolvedRecord {
    /// Wrap a record with no associations resolved.
    pub fn unresolved(record: SerializedRecord) -> Self {
        Self {
            record,
            associations: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn model_name(&self) -> &str {
        &self.record.model_name
    }

    pub fn association(&self, field: &str) -> Option<&ResolvedRecord> {
        self.associations.get(field)
    }

    /// Serialized data with every resolved association replacing its
    /// placeholder field by the associated record's own serialized data.
    fn serialized_data(&self) -> Json {
        let mut data = self.record.encode_fields(Encoding::Bridge);
        for (field, nested) in &self.associations {
            data.insert(field.clone(), nested.serialized_data());
        }
        Json::Object(data)
    }

    /// Bridge form: `{ id, modelName, serializedData }`.
    pub fn to_bridge_map(&self) -> Json {
        json!({
            "id": self.record.id,
            "modelName": self.record.model_name,
            "serializedData": self.serialized_data(),
        })
    }
}

impl From<SerializedRecord> for ResolvedRecord {
    fn from(record: SerializedRecord) -> Self {
        Self::unresolved(record)
    }
}

/// Kind of change reported by the store's observe stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A single change observed on the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub record: SerializedRecord,
    pub event_type: ChangeType,
}

impl ChangeEvent {
    /// Bridge form: `{ item, eventType }`.
    pub fn to_bridge_map(&self) -> Json {
        json!({
            "item": self.record.to_bridge_map(),
            "eventType": self.event_type.as_str(),
        })
    }
}
