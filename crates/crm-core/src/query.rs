//! Query layer — search, list and partial update over a [`CompanyStore`].
//!
//! Equality predicates (`town`, `sector`, `status`) are pushed down to the
//! store. The name substring match runs here, after retrieval, because the
//! storage query language is not assumed to support it. Every record leaving
//! this layer has been through [`normalize_document`].

use crate::normalizer::normalize_document;
use crate::store::{CompanyStore, StoreError};
use crate::types::{CompanyField, CompanyFilter, CompanyRecord, FieldUpdates};
use serde::Deserialize;
use std::sync::Arc;

/// Errors surfaced by [`CompanyQuery`]. Everything except [`QueryError::Store`]
/// is the caller's fault.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Missing company ID")]
    MissingId,
    #[error("No update fields provided")]
    NoUpdateFields,
    #[error("Unknown update field: {0}")]
    UnknownField(String),
    #[error("Integer out of range for field: {0}")]
    IntegerOutOfRange(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub fn is_client_error(&self) -> bool {
        !matches!(self, QueryError::Store(_))
    }
}

/// How [`CompanyQuery::update`] treats field names outside [`CompanyField`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Accept any key and forward it; undeclared keys are logged.
    #[default]
    Permissive,
    /// Reject any key that is not a declared [`CompanyField`].
    Strict,
}

/// Echo of a successful partial update.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    pub id: String,
    pub updates: FieldUpdates,
}

/// The company query service. Cheap to clone; clones share the store.
#[derive(Debug)]
pub struct CompanyQuery<S> {
    store: Arc<S>,
    policy: UpdatePolicy,
}

impl<S> Clone for CompanyQuery<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: CompanyStore> CompanyQuery<S> {
    pub fn new(store: S, policy: UpdatePolicy) -> Self {
        Self {
            store: Arc::new(store),
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Records matching `filter`, in storage order.
    pub async fn search(&self, filter: &CompanyFilter) -> Result<Vec<CompanyRecord>, QueryError> {
        let predicates = filter.predicates();
        let docs = self.store.find(&predicates).await?;
        let candidates = docs.len();

        let records: Vec<CompanyRecord> = match filter.name_query() {
            Some(q) => {
                let needle = q.to_lowercase();
                docs.iter()
                    .filter(|doc| {
                        doc.get(CompanyField::Name.as_str())
                            .and_then(|v| v.as_str())
                            .is_some_and(|name| name.to_lowercase().contains(&needle))
                    })
                    .map(normalize_document)
                    .collect()
            }
            None => docs.iter().map(normalize_document).collect(),
        };

        tracing::debug!(
            predicates = predicates.len(),
            candidates,
            matched = records.len(),
            "company search"
        );
        Ok(records)
    }

    /// Every record, unfiltered.
    pub async fn list_all(&self) -> Result<Vec<CompanyRecord>, QueryError> {
        let docs = self.store.all().await?;
        Ok(docs.iter().map(normalize_document).collect())
    }

    /// Apply a partial update to company `id`.
    ///
    /// The id check runs before the field check, so a request missing both
    /// reports the id. A blank id counts as missing; any other id is used
    /// exactly as given.
    pub async fn update(&self, id: &str, updates: FieldUpdates) -> Result<AppliedUpdate, QueryError> {
        if id.trim().is_empty() {
            return Err(QueryError::MissingId);
        }
        if updates.is_empty() {
            return Err(QueryError::NoUpdateFields);
        }

        for (key, value) in &updates {
            if !fits_stored_integer(value) {
                return Err(QueryError::IntegerOutOfRange(key.clone()));
            }
            if CompanyField::from_name(key).is_some() {
                continue;
            }
            match self.policy {
                UpdatePolicy::Strict => return Err(QueryError::UnknownField(key.clone())),
                UpdatePolicy::Permissive => {
                    tracing::warn!(company = id, field = %key, "persisting undeclared company field")
                }
            }
        }

        self.store.update(id, &updates).await?;
        tracing::info!(company = id, fields = updates.len(), "company updated");

        Ok(AppliedUpdate {
            id: id.to_string(),
            updates,
        })
    }
}

/// Stored integers are 64-bit signed; larger JSON integers would be
/// silently widened to doubles.
fn fits_stored_integer(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Number(n) => n.is_i64() || n.is_f64(),
        Value::Array(items) => items.iter().all(fits_stored_integer),
        Value::Object(fields) => fields.values().all(fits_stored_integer),
        _ => true,
    }
}
