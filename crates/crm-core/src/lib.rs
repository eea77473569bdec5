//! crm-core — company records and the query layer behind crm-api.
//!
//! This crate holds everything that does not depend on a particular storage
//! service or on HTTP: the shared types, the [`CompanyStore`] seam with its
//! in-memory implementation, date normalisation, the [`CompanyQuery`]
//! service, and configuration.
//!
//! # Architecture
//!
//! ```text
//! HTTP ──► CompanyQuery ──► CompanyStore ──► MemoryStore | FirestoreStore
//!               │
//!               └──► normalizer
//! ```

pub mod config;
pub mod normalizer;
pub mod query;
pub mod store;
pub mod types;

pub use query::{AppliedUpdate, CompanyQuery, QueryError, UpdatePolicy};
pub use store::{CompanyStore, MemoryStore, StoreError};
pub use types::{
    CompanyDocument, CompanyField, CompanyFilter, CompanyRecord, EqualityPredicate, FieldUpdates,
    StoredValue,
};
