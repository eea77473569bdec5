//! Fake Firestore REST server for integration tests.
//!
//! Spins up a minimal `axum` HTTP server on a random TCP port bound to
//! 127.0.0.1. Serves the two endpoints the adapter uses:
//! - `POST /v1/projects/{p}/databases/{d}/documents:runQuery`: `EQUAL`
//!   field filters, single or AND-composed
//! - `PATCH /v1/projects/{p}/databases/{d}/documents/{collection}/{id}`:
//!   update mask and `currentDocument.exists` precondition
//!
//! Every request is recorded so tests can assert on the exact wire traffic.
//!
//! # Example
//!
//! ```rust,no_run
//! let fake = FakeFirestore::start().await.unwrap();
//! fake.insert("companies", &CompanyBuilder::new("1", "Green IT Disposal").build()).await;
//! let store = FirestoreStore::new(fake.settings("companies")).unwrap();
//! ```

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use crm_core::CompanyDocument;
use crm_firestore::{codec, FirestoreSettings};
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const PROJECT: &str = "crm-test";
pub const DATABASE: &str = "(default)";
pub const ACCESS_TOKEN: &str = "test-token";
const FAKE_TIME: &str = "2025-03-01T12:00:00.000000Z";

/// A request as the fake received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Debug, Clone)]
struct FakeDocument {
    collection: String,
    id: String,
    fields: Map<String, Value>,
}

#[derive(Default)]
struct FirestoreState {
    documents: Vec<FakeDocument>,
    requests: Vec<RecordedRequest>,
    fail_with: Option<u16>,
}

/// Handle to the running fake Firestore server.
pub struct FakeFirestore {
    addr: SocketAddr,
    state: Arc<Mutex<FirestoreState>>,
}

impl FakeFirestore {
    /// Start the fake on a random port. Returns once the listener is bound.
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(FirestoreState::default()));

        let app = Router::new()
            .route(
                "/v1/projects/{project}/databases/{database}/documents:runQuery",
                post(run_query),
            )
            .route(
                "/v1/projects/{project}/databases/{database}/documents/{collection}/{id}",
                patch(patch_document),
            )
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(Self { addr, state })
    }

    /// Base URL for the API (e.g. `http://127.0.0.1:PORT`).
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Adapter settings pointing at this fake.
    pub fn settings(&self, collection: &str) -> FirestoreSettings {
        FirestoreSettings {
            base_url: self.base_url(),
            project_id: PROJECT.to_string(),
            database: DATABASE.to_string(),
            collection: collection.to_string(),
            access_token: Some(ACCESS_TOKEN.to_string()),
        }
    }

    /// Store a document, encoded as Firestore would hold it.
    pub async fn insert(&self, collection: &str, doc: &CompanyDocument) {
        self.insert_raw(collection, &doc.id, codec::encode_fields(&doc.fields)).await;
    }

    /// Store a document from already-encoded Firestore fields.
    pub async fn insert_raw(&self, collection: &str, id: &str, fields: Map<String, Value>) {
        self.state.lock().await.documents.push(FakeDocument {
            collection: collection.to_string(),
            id: id.to_string(),
            fields,
        });
    }

    /// Encoded fields of a stored document.
    pub async fn document(&self, collection: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .await
            .documents
            .iter()
            .find(|d| d.collection == collection && d.id == id)
            .map(|d| d.fields.clone())
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Answer every subsequent request with `status`.
    pub async fn fail_with(&self, status: u16) {
        self.state.lock().await.fail_with = Some(status);
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

type SharedState = Arc<Mutex<FirestoreState>>;

fn record(state: &mut FirestoreState, method: Method, uri: &Uri, headers: &HeaderMap, body: &Value) {
    state.requests.push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });
}

fn error(code: u16, status: &str, message: impl Into<String>) -> Response {
    let http = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": { "code": code, "message": message.into(), "status": status } });
    (http, Json(body)).into_response()
}

fn document_name(project: &str, database: &str, doc: &FakeDocument) -> String {
    format!(
        "projects/{project}/databases/{database}/documents/{}/{}",
        doc.collection, doc.id
    )
}

/// Flatten a `where` clause into `(fieldPath, value)` equality pairs.
fn equality_filters(filter: &Value) -> Vec<(String, Value)> {
    if let Some(field) = filter.get("fieldFilter") {
        assert_eq!(field["op"], "EQUAL", "fake only supports EQUAL filters");
        let path = field["field"]["fieldPath"].as_str().unwrap_or_default();
        return vec![(unquote(path), field["value"].clone())];
    }
    if let Some(composite) = filter.get("compositeFilter") {
        assert_eq!(composite["op"], "AND", "fake only supports AND composites");
        return composite["filters"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(equality_filters)
            .collect();
    }
    Vec::new()
}

fn unquote(path: &str) -> String {
    match path.strip_prefix('`').and_then(|p| p.strip_suffix('`')) {
        Some(inner) => inner.replace("\\`", "`").replace("\\\\", "\\"),
        None => path.to_string(),
    }
}

async fn run_query(
    State(state): State<SharedState>,
    Path((project, database)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    record(&mut state, Method::POST, &uri, &headers, &body);
    if let Some(code) = state.fail_with {
        return error(code, "UNAVAILABLE", "injected failure");
    }

    let query = &body["structuredQuery"];
    let collection = query["from"][0]["collectionId"].as_str().unwrap_or_default();
    let filters = equality_filters(&query["where"]);

    let rows: Vec<Value> = state
        .documents
        .iter()
        .filter(|d| d.collection == collection)
        .filter(|d| filters.iter().all(|(path, value)| d.fields.get(path) == Some(value)))
        .map(|d| {
            json!({
                "document": {
                    "name": document_name(&project, &database, d),
                    "fields": d.fields,
                    "createTime": FAKE_TIME,
                    "updateTime": FAKE_TIME,
                },
                "readTime": FAKE_TIME,
            })
        })
        .collect();

    if rows.is_empty() {
        // Firestore reports an empty result as a lone progress row.
        return Json(json!([{ "readTime": FAKE_TIME }])).into_response();
    }
    Json(Value::Array(rows)).into_response()
}

async fn patch_document(
    State(state): State<SharedState>,
    Path((project, database, collection, id)): Path<(String, String, String, String)>,
    RawQuery(raw_query): RawQuery,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().await;
    record(&mut state, Method::PATCH, &uri, &headers, &body);
    if let Some(code) = state.fail_with {
        return error(code, "UNAVAILABLE", "injected failure");
    }

    let mut mask = Vec::new();
    let mut must_exist = false;
    for (key, value) in url::form_urlencoded::parse(raw_query.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "updateMask.fieldPaths" => mask.push(unquote(&value)),
            "currentDocument.exists" => must_exist = value == "true",
            _ => {}
        }
    }
    let incoming = body["fields"].as_object().cloned().unwrap_or_default();

    let position = state
        .documents
        .iter()
        .position(|d| d.collection == collection && d.id == id);
    let index = match position {
        Some(index) => index,
        None if must_exist => {
            return error(
                404,
                "NOT_FOUND",
                format!("No document to update: projects/{project}/databases/{database}/documents/{collection}/{id}"),
            );
        }
        None => {
            state.documents.push(FakeDocument {
                collection: collection.clone(),
                id: id.clone(),
                fields: Map::new(),
            });
            state.documents.len() - 1
        }
    };

    let doc = &mut state.documents[index];
    for path in mask {
        match incoming.get(&path) {
            Some(value) => {
                doc.fields.insert(path, value.clone());
            }
            None => {
                doc.fields.remove(&path);
            }
        }
    }

    let name = document_name(&project, &database, doc);
    Json(json!({ "name": name, "fields": doc.fields, "updateTime": FAKE_TIME })).into_response()
}
