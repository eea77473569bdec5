//! Firestore REST value codec.
//!
//! Firestore's JSON API wraps every value in a single-key object naming its
//! type (`{"stringValue": "Rochdale"}`, `{"timestampValue": "2025-02-01T00:00:00Z"}`).
//! This module converts between that form and [`StoredValue`], and builds the
//! `structuredQuery` body for equality searches.

use chrono::{DateTime, SecondsFormat, Utc};
use crm_core::{CompanyDocument, EqualityPredicate, StoreError, StoredValue};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// A document resource as returned by the REST API.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDocument {
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// One element of the `documents:runQuery` response array. Rows that only
/// report progress (`readTime`, `skippedResults`) carry no document.
#[derive(Debug, Deserialize)]
pub(crate) struct RunQueryRow {
    #[serde(default)]
    pub document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Pull a readable message out of a Firestore error response body.
pub(crate) fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => match error.status {
            Some(status) => format!("{status}: {}", error.message),
            None => error.message,
        },
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

pub fn encode_value(value: &StoredValue) -> Value {
    match value {
        StoredValue::Null => json!({ "nullValue": null }),
        StoredValue::Boolean(b) => json!({ "booleanValue": b }),
        StoredValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        StoredValue::Double(d) => json!({ "doubleValue": d }),
        StoredValue::String(s) => json!({ "stringValue": s }),
        StoredValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        StoredValue::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        StoredValue::Map(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

pub fn encode_fields(fields: &BTreeMap<String, StoredValue>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

pub fn decode_value(value: &Value) -> Result<StoredValue, StoreError> {
    let Some(obj) = value.as_object() else {
        return Err(StoreError::Decode(format!("expected a typed value object, got {value}")));
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Ok(StoredValue::Null);
    };

    let decoded = match kind.as_str() {
        "nullValue" => StoredValue::Null,
        "booleanValue" => StoredValue::Boolean(inner.as_bool().unwrap_or_default()),
        "integerValue" => {
            // Sent as a decimal string; accept a bare number too.
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            StoredValue::Integer(parsed.ok_or_else(|| {
                StoreError::Decode(format!("bad integerValue {inner}"))
            })?)
        }
        "doubleValue" => match inner {
            // NaN and the infinities arrive as strings.
            Value::String(s) => StoredValue::Double(s.parse::<f64>().unwrap_or(f64::NAN)),
            other => StoredValue::Double(other.as_f64().unwrap_or_default()),
        },
        "stringValue" => StoredValue::String(inner.as_str().unwrap_or_default().to_string()),
        "timestampValue" => {
            let raw = inner.as_str().unwrap_or_default();
            let ts = DateTime::parse_from_rfc3339(raw)
                .map_err(|e| StoreError::Decode(format!("bad timestampValue {raw:?}: {e}")))?;
            StoredValue::Timestamp(ts.with_timezone(&Utc))
        }
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default();
            StoredValue::Array(items)
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default();
            StoredValue::Map(fields)
        }
        other => {
            tracing::debug!(kind = other, "unsupported firestore value kind, reading as null");
            StoredValue::Null
        }
    };
    Ok(decoded)
}

pub fn decode_fields(fields: &Map<String, Value>) -> Result<BTreeMap<String, StoredValue>, StoreError> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
        .collect()
}

/// The document id is the final segment of the resource name
/// (`projects/p/databases/d/documents/companies/<id>`).
pub(crate) fn decode_document(raw: &RawDocument) -> Result<CompanyDocument, StoreError> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("document name without id: {:?}", raw.name)))?;
    Ok(CompanyDocument {
        id: id.to_string(),
        fields: decode_fields(&raw.fields)?,
    })
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// `runQuery` request body selecting documents of `collection` that satisfy
/// every predicate.
pub fn run_query_body(collection: &str, predicates: &[EqualityPredicate]) -> Value {
    let mut filters: Vec<Value> = predicates
        .iter()
        .map(|p| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": field_path(p.field.as_str()) },
                    "op": "EQUAL",
                    "value": { "stringValue": p.value },
                }
            })
        })
        .collect();

    let mut query = json!({ "from": [{ "collectionId": collection }] });
    let filter = match filters.len() {
        0 => None,
        1 => filters.pop(),
        _ => Some(json!({ "compositeFilter": { "op": "AND", "filters": filters } })),
    };
    if let Some(filter) = filter {
        query["where"] = filter;
    }
    json!({ "structuredQuery": query })
}

/// Quote a field name for use in a field path. Plain identifiers pass
/// through; anything else is wrapped in backticks.
pub fn field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        return name.to_string();
    }
    let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
    format!("`{escaped}`")
}
