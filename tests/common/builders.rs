//! Test builders — ergonomic constructors for company documents and stores.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use chrono::{TimeZone, Utc};
use crm_core::{
    CompanyDocument, CompanyQuery, CompanyStore, EqualityPredicate, FieldUpdates, MemoryStore,
    StoreError, StoredValue, UpdatePolicy,
};

// ---------------------------------------------------------------------------
// CompanyBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`CompanyDocument`] fixtures.
///
/// # Example
///
/// ```rust
/// let doc = CompanyBuilder::new("7", "Heywood Packaging")
///     .town("Heywood")
///     .sector("Manufacturing")
///     .engaged_at(2025, 3, 14)
///     .build();
/// ```
pub struct CompanyBuilder {
    doc: CompanyDocument,
}

impl CompanyBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            doc: CompanyDocument::new(id)
                .with("name", name)
                .with("town", "Rochdale")
                .with("sector", "Services")
                .with("status", "Active"),
        }
    }

    pub fn town(mut self, town: &str) -> Self {
        self.doc = self.doc.with("town", town);
        self
    }

    pub fn sector(mut self, sector: &str) -> Self {
        self.doc = self.doc.with("sector", sector);
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.doc = self.doc.with("status", status);
        self
    }

    /// Engagement date stored as a native timestamp at 15:45 UTC.
    pub fn engaged_at(mut self, y: i32, m: u32, d: u32) -> Self {
        let ts = Utc.with_ymd_and_hms(y, m, d, 15, 45, 0).unwrap();
        self.doc = self.doc.with("lastEngagementDate", StoredValue::Timestamp(ts));
        self
    }

    /// Engagement date stored as a plain string.
    pub fn engaged_on(mut self, date: &str) -> Self {
        self.doc = self.doc.with("lastEngagementDate", date);
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<StoredValue>) -> Self {
        self.doc = self.doc.with(key, value);
        self
    }

    pub fn build(self) -> CompanyDocument {
        self.doc
    }
}

// ---------------------------------------------------------------------------
// Query constructors
// ---------------------------------------------------------------------------

/// A permissive query service over the given documents.
pub fn memory_query(docs: Vec<CompanyDocument>) -> CompanyQuery<MemoryStore> {
    CompanyQuery::new(MemoryStore::new(docs), UpdatePolicy::Permissive)
}

/// Turn a JSON object literal into an update mapping.
pub fn field_updates(value: serde_json::Value) -> FieldUpdates {
    value
        .as_object()
        .cloned()
        .expect("field_updates takes a JSON object")
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

/// A store whose every call fails with a transport error.
#[derive(Debug, Default)]
pub struct FailingStore;

impl CompanyStore for FailingStore {
    async fn find(&self, _predicates: &[EqualityPredicate]) -> Result<Vec<CompanyDocument>, StoreError> {
        Err(StoreError::Transport("connection refused (10.0.0.7:443)".into()))
    }

    async fn update(&self, id: &str, _fields: &FieldUpdates) -> Result<(), StoreError> {
        Err(StoreError::Status {
            status: 503,
            message: format!("UNAVAILABLE: backend down while updating {id}"),
        })
    }
}
