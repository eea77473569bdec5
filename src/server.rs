//! Router assembly, middleware, and process bootstrap.

use crate::api;
use anyhow::Context;
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use crm_core::{
    config::{Backend, Config},
    CompanyQuery, CompanyStore, MemoryStore,
};
use crm_firestore::{FirestoreSettings, FirestoreStore};
use std::time::Instant;
use tokio::net::TcpListener;

const ALLOW_METHODS: &str = "GET, POST, PATCH, OPTIONS";
const ALLOW_HEADERS: &str = "content-type, authorization";

/// Build the HTTP router over `query`.
pub fn router<S: CompanyStore>(query: CompanyQuery<S>) -> Router {
    Router::new()
        .route("/companies", get(api::list_companies::<S>))
        .route("/companies/search", post(api::search_companies::<S>))
        .route("/companies/", patch(api::update_company_without_id::<S>))
        .route("/companies/{id}", patch(api::update_company::<S>))
        .layer(middleware::from_fn(cors))
        .layer(middleware::from_fn(trace_request))
        .with_state(query)
}

/// Allow any origin. Preflight requests are answered here without reaching
/// a handler.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        let mut preflight = StatusCode::NO_CONTENT.into_response();
        let headers = preflight.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
        preflight
    } else {
        next.run(request).await
    };
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

async fn trace_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    tracing::debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}

/// Serve `query` on `listener` until Ctrl-C.
pub async fn serve<S: CompanyStore>(listener: TcpListener, query: CompanyQuery<S>) -> anyhow::Result<()> {
    axum::serve(listener, router(query))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

/// Construct the configured store and serve it.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let policy = config.updates.policy;

    tracing::info!(
        backend = %config.storage.backend,
        update_policy = ?policy,
        "CRM API running on port {}",
        config.server.port
    );

    match config.storage.backend {
        Backend::Memory => {
            tracing::warn!("serving built-in sample companies from memory; updates are lost on exit");
            serve(listener, CompanyQuery::new(MemoryStore::with_sample_data(), policy)).await
        }
        Backend::Firestore => {
            let store = FirestoreStore::new(FirestoreSettings::from_config(&config.storage))
                .context("configuring firestore")?;
            serve(listener, CompanyQuery::new(store, policy)).await
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
