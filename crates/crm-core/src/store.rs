//! Store — the storage seam behind the query layer.
//!
//! [`CompanyStore`] is the narrow set of primitives a document database has to
//! offer: equality filtering on named fields and per-document partial update.
//! [`MemoryStore`] is the process-local implementation used for development
//! and tests; the Firestore adapter lives in the `crm-firestore` crate.

use crate::types::{CompanyDocument, EqualityPredicate, FieldUpdates, StoredValue};
use chrono::{TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors raised by a storage backend. None of these reach an HTTP caller
/// verbatim; the API layer reports them as a generic internal error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage transport error: {0}")]
    Transport(String),
    #[error("storage returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("company {0} not found")]
    NotFound(String),
    #[error("could not decode storage response: {0}")]
    Decode(String),
    #[error("invalid storage request: {0}")]
    InvalidRequest(String),
}

/// A document collection of companies.
///
/// Implementations are constructed once at startup and shared by every
/// request, so they must be `Send + Sync` and return `Send` futures.
pub trait CompanyStore: Send + Sync + 'static {
    /// Every document satisfying all `predicates`, in storage order. An empty
    /// slice returns the whole collection.
    fn find(
        &self,
        predicates: &[EqualityPredicate],
    ) -> impl Future<Output = Result<Vec<CompanyDocument>, StoreError>> + Send;

    /// Merge `fields` into the existing document `id`. Keys are written
    /// verbatim; no schema check happens here.
    fn update(
        &self,
        id: &str,
        fields: &FieldUpdates,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The whole collection.
    fn all(&self) -> impl Future<Output = Result<Vec<CompanyDocument>, StoreError>> + Send {
        self.find(&[])
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process document collection. Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    docs: Arc<RwLock<Vec<CompanyDocument>>>,
}

impl MemoryStore {
    pub fn new(docs: Vec<CompanyDocument>) -> Self {
        Self {
            docs: Arc::new(RwLock::new(docs)),
        }
    }

    /// A store seeded with [`sample_companies`].
    pub fn with_sample_data() -> Self {
        Self::new(sample_companies())
    }

    /// Fetch a single document by id.
    pub async fn get(&self, id: &str) -> Option<CompanyDocument> {
        self.docs.read().await.iter().find(|d| d.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CompanyStore for MemoryStore {
    async fn find(
        &self,
        predicates: &[EqualityPredicate],
    ) -> Result<Vec<CompanyDocument>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|doc| predicates.iter().all(|p| p.matches(doc)))
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, fields: &FieldUpdates) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        let doc = docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        for (key, value) in fields {
            doc.fields.insert(key.clone(), StoredValue::from(value));
        }
        Ok(())
    }
}

/// The three companies the development server starts with.
///
/// Rushton's engagement date is held as a native timestamp, the others as
/// strings, so both normalisation paths are live from the first request.
pub fn sample_companies() -> Vec<CompanyDocument> {
    vec![
        CompanyDocument::new("1")
            .with("name", "Green IT Disposal")
            .with("town", "Rochdale")
            .with("sector", "IT / Recycling")
            .with("status", "Active")
            .with("lastEngagementDate", "2025-02-01"),
        CompanyDocument::new("2")
            .with("name", "Rushton Developments")
            .with("town", "Rochdale")
            .with("sector", "Construction")
            .with("status", "Active")
            .with(
                "lastEngagementDate",
                Utc.with_ymd_and_hms(2025, 1, 11, 9, 30, 0)
                    .single()
                    .map(StoredValue::Timestamp)
                    .unwrap_or(StoredValue::Null),
            ),
        CompanyDocument::new("3")
            .with("name", "First Bus Rochdale")
            .with("town", "Rochdale")
            .with("sector", "Transport")
            .with("status", "Prospect")
            .with("lastEngagementDate", StoredValue::Null),
    ]
}
