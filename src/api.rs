//! Route handlers and the JSON error contract.
//!
//! Client mistakes come back as `400 {"error": "<message>"}`. Storage
//! failures are logged and reported as a bare
//! `500 {"error": "Internal server error"}`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use crm_core::{CompanyFilter, CompanyQuery, CompanyRecord, CompanyStore, FieldUpdates, QueryError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const INTERNAL_ERROR: &str = "Internal server error";
pub const INVALID_BODY: &str = "Invalid JSON body";

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct CompaniesResponse {
    pub companies: Vec<CompanyRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub id: String,
    pub updates: FieldUpdates,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Query(QueryError),
    /// Body was present but not JSON of the expected shape.
    InvalidBody(String),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Query(err) if err.is_client_error() => (StatusCode::BAD_REQUEST, err.to_string()),
            ApiError::Query(err) => {
                tracing::error!(error = %err, "company request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
            }
            ApiError::InvalidBody(detail) => {
                tracing::debug!(%detail, "rejected request body");
                (StatusCode::BAD_REQUEST, INVALID_BODY.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Whether the request declares an `application/json` body. Parameters such
/// as `charset` are ignored.
fn declares_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Decode a JSON body. A body that is empty or not declared as JSON is
/// ignored and decodes as `T::default()`.
fn lenient_json<T: DeserializeOwned + Default>(headers: &HeaderMap, body: &Bytes) -> Result<T, ApiError> {
    if !declares_json(headers) || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /companies/search`
pub async fn search_companies<S: CompanyStore>(
    State(query): State<CompanyQuery<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CompaniesResponse>, ApiError> {
    let filter: CompanyFilter = lenient_json(&headers, &body)?;
    let companies = query.search(&filter).await?;
    Ok(Json(CompaniesResponse { companies }))
}

/// `GET /companies`
pub async fn list_companies<S: CompanyStore>(
    State(query): State<CompanyQuery<S>>,
) -> Result<Json<CompaniesResponse>, ApiError> {
    let companies = query.list_all().await?;
    Ok(Json(CompaniesResponse { companies }))
}

/// `PATCH /companies/{id}`
pub async fn update_company<S: CompanyStore>(
    State(query): State<CompanyQuery<S>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UpdateResponse>, ApiError> {
    apply_update(&query, &id, &headers, &body).await
}

/// `PATCH /companies/` (empty id segment)
pub async fn update_company_without_id<S: CompanyStore>(
    State(query): State<CompanyQuery<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UpdateResponse>, ApiError> {
    apply_update(&query, "", &headers, &body).await
}

async fn apply_update<S: CompanyStore>(
    query: &CompanyQuery<S>,
    id: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Json<UpdateResponse>, ApiError> {
    let updates: FieldUpdates = lenient_json(headers, body)?;
    let applied = query.update(id, updates).await?;
    Ok(Json(UpdateResponse {
        success: true,
        id: applied.id,
        updates: applied.updates,
    }))
}
