//! crm-firestore — Cloud Firestore storage adapter for crm-api.
//!
//! [`FirestoreStore`] implements [`CompanyStore`] over the Firestore REST API
//! (v1): equality searches go through `documents:runQuery`, partial updates
//! through `PATCH` with an update mask. The transport is HTTP/1.1 via
//! `hyper-util` over a `hyper-rustls` connector: `https` for the hosted
//! service, plain `http` for the emulator.

pub mod codec;

use bytes::Bytes;
use crm_core::config::StorageConfig;
use crm_core::{CompanyDocument, CompanyStore, EqualityPredicate, FieldUpdates, StoreError, StoredValue};
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::json;
use url::Url;

/// Connection settings for a [`FirestoreStore`].
#[derive(Clone, PartialEq, Eq)]
pub struct FirestoreSettings {
    /// Scheme and authority, optionally with a path prefix
    /// (e.g. `https://firestore.googleapis.com` or `http://localhost:8080`).
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    pub collection: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub access_token: Option<String>,
}

impl FirestoreSettings {
    pub fn from_config(storage: &StorageConfig) -> Self {
        Self {
            base_url: storage.firestore.base_url.clone(),
            project_id: storage.firestore.project_id.clone(),
            database: storage.firestore.database.clone(),
            collection: storage.collection.clone(),
            access_token: storage.firestore.access_token.clone(),
        }
    }
}

impl std::fmt::Debug for FirestoreSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreSettings")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Company collection stored in Firestore.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    /// `{base}/v1/projects/{project}/databases/{database}/documents`
    documents_url: Url,
    collection: String,
    access_token: Option<String>,
}

impl std::fmt::Debug for FirestoreStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreStore")
            .field("documents_url", &self.documents_url.as_str())
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl FirestoreStore {
    /// Build the client. No connection is made until the first request.
    pub fn new(settings: FirestoreSettings) -> Result<Self, StoreError> {
        let mut documents_url = Url::parse(&settings.base_url)
            .map_err(|e| StoreError::InvalidRequest(format!("bad base url {:?}: {e}", settings.base_url)))?;
        if !matches!(documents_url.scheme(), "https" | "http") {
            return Err(StoreError::InvalidRequest(format!(
                "unsupported scheme in {:?}: expected https or http",
                settings.base_url
            )));
        }
        documents_url
            .path_segments_mut()
            .map_err(|_| StoreError::InvalidRequest(format!("{:?} cannot be a base url", settings.base_url)))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                settings.project_id.as_str(),
                "databases",
                settings.database.as_str(),
                "documents",
            ]);

        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| StoreError::InvalidRequest(format!("tls setup failed: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        tracing::debug!(url = %documents_url, collection = %settings.collection, "firestore store ready");

        Ok(Self {
            client,
            documents_url,
            collection: settings.collection,
            access_token: settings.access_token,
        })
    }

    fn run_query_url(&self) -> Result<Url, StoreError> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidRequest("base url cannot carry a path".into()))?
            .pop()
            .push("documents:runQuery");
        Ok(url)
    }

    fn document_url(&self, id: &str, fields: &FieldUpdates) -> Result<Url, StoreError> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidRequest("base url cannot carry a path".into()))?
            .push(&self.collection)
            .push(id);
        {
            let mut query = url.query_pairs_mut();
            for key in fields.keys() {
                query.append_pair("updateMask.fieldPaths", &codec::field_path(key));
            }
            query.append_pair("currentDocument.exists", "true");
        }
        Ok(url)
    }

    /// Send a JSON request and return the body of a 2xx response.
    async fn send(&self, method: Method, url: Url, body: serde_json::Value) -> Result<Bytes, StoreError> {
        let uri: Uri = url
            .as_str()
            .parse()
            .map_err(|e| StoreError::InvalidRequest(format!("bad request uri {url}: {e}")))?;

        let mut request = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.access_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = request
            .body(Full::new(Bytes::from(body.to_string())))
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?
            .to_bytes();

        tracing::debug!(%method, path = url.path(), status = status.as_u16(), "firestore request");

        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: codec::error_message(&bytes),
            });
        }
        Ok(bytes)
    }
}

impl CompanyStore for FirestoreStore {
    async fn find(&self, predicates: &[EqualityPredicate]) -> Result<Vec<CompanyDocument>, StoreError> {
        let body = codec::run_query_body(&self.collection, predicates);
        let bytes = self.send(Method::POST, self.run_query_url()?, body).await?;

        let rows: Vec<codec::RunQueryRow> =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(e.to_string()))?;
        rows.iter()
            .filter_map(|row| row.document.as_ref())
            .map(codec::decode_document)
            .collect()
    }

    async fn update(&self, id: &str, fields: &FieldUpdates) -> Result<(), StoreError> {
        let encoded: serde_json::Map<String, serde_json::Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), codec::encode_value(&StoredValue::from(v))))
            .collect();
        let url = self.document_url(id, fields)?;

        match self.send(Method::PATCH, url, json!({ "fields": encoded })).await {
            Err(StoreError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }
}
