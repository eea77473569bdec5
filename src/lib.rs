//! crm-api — REST API over CRM company records.
//!
//! Exposes search, listing, and partial update of company records stored in
//! a document database. The query and normalisation logic lives in
//! `crm-core`; this crate wires it to HTTP.
//!
//! # Routes
//!
//! | Method & path            | Body                               |
//! |--------------------------|------------------------------------|
//! | `POST /companies/search` | `{query?, town?, sector?, status?}` |
//! | `GET /companies`         | none                               |
//! | `PATCH /companies/{id}`  | field → value object               |

pub mod api;
pub mod server;

pub use server::{router, run, serve};
