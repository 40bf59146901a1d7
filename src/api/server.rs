//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::{
    handlers,
    models::{ApiResponse, SearchParams},
};
use crate::config::Config;
use crate::error::RefreshError;
use crate::refresh::RefreshService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RefreshService>,
    pub config: Arc<Config>,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

/// Build the router with all routes and middleware
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Health check endpoints (both paths for compatibility)
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        // Catalog endpoints
        .route("/api/catalog", get(list_catalog_handler))
        .route("/api/catalog/search", get(search_catalog_handler))
        .route("/api/catalog/refresh", post(refresh_handler))
        .route("/api/catalog/refresh/status", get(refresh_status_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

/// Configure and start the HTTP server
pub async fn start_http_server(service: Arc<RefreshService>, config: Arc<Config>) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = router(AppState { service, config });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 API server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    match handlers::health_check().await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Catalog listing handler
async fn list_catalog_handler(State(state): State<AppState>) -> impl IntoResponse {
    match handlers::list_catalog(state.service.store()).await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// Catalog search handler
async fn search_catalog_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    match handlers::search_catalog(state.service.store(), params.q.as_deref()).await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

/// On-demand refresh handler
async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    match handlers::trigger_refresh(&state.service).await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(e @ RefreshError::AlreadyRunning) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(e @ RefreshError::StoreUnavailable(_)) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        Err(e @ RefreshError::Interrupted(_)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Refresh status handler
async fn refresh_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(handlers::refresh_status(&state.service).await))
}
