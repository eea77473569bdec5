//! Core types for crm-core.
//!
//! This module defines the data structures shared by the query layer, the
//! storage adapters, and the HTTP surface: the stored [`CompanyDocument`] and
//! its typed [`StoredValue`]s, the normalised [`CompanyRecord`] returned to
//! callers, and the [`CompanyFilter`] / [`EqualityPredicate`] pair used to
//! describe a search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field → new-value mapping accepted by a partial update, exactly as the
/// client sent it.
pub type FieldUpdates = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Stored representation
// ---------------------------------------------------------------------------

/// A single typed value as held by the document store.
///
/// Mirrors the value kinds a document database distinguishes. The one that
/// matters to this crate is [`StoredValue::Timestamp`]: dates may be stored
/// either natively or as plain strings, and normalisation has to cope with
/// both.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<StoredValue>),
    Map(BTreeMap<String, StoredValue>),
}

impl StoredValue {
    /// Borrow the inner string if this is a [`StoredValue::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StoredValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render back to JSON. Timestamps become RFC 3339 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            StoredValue::Null => Value::Null,
            StoredValue::Boolean(b) => Value::Bool(*b),
            StoredValue::Integer(i) => Value::from(*i),
            StoredValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StoredValue::String(s) => Value::String(s.clone()),
            StoredValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            StoredValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            StoredValue::Map(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&serde_json::Value> for StoredValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => StoredValue::Null,
            Value::Bool(b) => StoredValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => StoredValue::Integer(i),
                None => {
                    if n.is_u64() {
                        tracing::warn!(value = %n, "integer beyond i64 range stored as double");
                    }
                    StoredValue::Double(n.as_f64().unwrap_or_default())
                }
            },
            Value::String(s) => StoredValue::String(s.clone()),
            Value::Array(items) => StoredValue::Array(items.iter().map(Self::from).collect()),
            Value::Object(fields) => StoredValue::Map(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for StoredValue {
    fn from(value: &str) -> Self {
        StoredValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for StoredValue {
    fn from(value: DateTime<Utc>) -> Self {
        StoredValue::Timestamp(value)
    }
}

/// A company document as the storage layer holds it.
///
/// `id` is the storage-assigned document identifier. It lives outside
/// `fields`, so a stray `id` field written by a client never changes it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyDocument {
    pub id: String,
    pub fields: BTreeMap<String, StoredValue>,
}

impl CompanyDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<StoredValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&StoredValue> {
        self.fields.get(field)
    }
}

// ---------------------------------------------------------------------------
// Output representation
// ---------------------------------------------------------------------------

/// A normalised company record, as returned at the HTTP boundary.
///
/// `last_engagement_date` is always `None` or a `YYYY-MM-DD` string here,
/// whatever the stored form was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    pub id: String,
    pub name: String,
    pub town: String,
    pub sector: String,
    pub status: String,
    pub last_engagement_date: Option<String>,
}

/// The declared company attributes a client may update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompanyField {
    Name,
    Town,
    Sector,
    Status,
    LastEngagementDate,
}

impl CompanyField {
    pub const ALL: [CompanyField; 5] = [
        CompanyField::Name,
        CompanyField::Town,
        CompanyField::Sector,
        CompanyField::Status,
        CompanyField::LastEngagementDate,
    ];

    /// Field name as stored and as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            CompanyField::Name => "name",
            CompanyField::Town => "town",
            CompanyField::Sector => "sector",
            CompanyField::Status => "status",
            CompanyField::LastEngagementDate => "lastEngagementDate",
        }
    }

    /// Look up a declared field by its wire name. Exact match only.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl std::fmt::Display for CompanyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// An exact-match predicate delegated to the storage layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualityPredicate {
    pub field: CompanyField,
    pub value: String,
}

impl EqualityPredicate {
    pub fn new(field: CompanyField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    /// Whether a stored document satisfies this predicate. Case-sensitive.
    pub fn matches(&self, doc: &CompanyDocument) -> bool {
        doc.get(self.field.as_str())
            .and_then(StoredValue::as_str)
            .is_some_and(|v| v == self.value)
    }
}

/// Body of `POST /companies/search`. Every field is optional; empty strings
/// count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompanyFilter {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl CompanyFilter {
    /// Equality predicates for `town`, `sector` and `status`, in that order.
    pub fn predicates(&self) -> Vec<EqualityPredicate> {
        [
            (CompanyField::Town, &self.town),
            (CompanyField::Sector, &self.sector),
            (CompanyField::Status, &self.status),
        ]
        .into_iter()
        .filter_map(|(field, value)| {
            non_empty(value).map(|v| EqualityPredicate::new(field, v))
        })
        .collect()
    }

    /// The name substring to match, if one was given.
    pub fn name_query(&self) -> Option<&str> {
        non_empty(&self.query)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
