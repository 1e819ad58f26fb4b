//! HTTP boundary of the collection engine.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /files/{*key}`: Blob download through a signed link
//! - `/api/collection/...`: Schema and entry operations (auth required)

mod auth;
mod error;
mod files;
mod routes;

pub use auth::{ApiKeyStore, AuthUser, PERM_COLLECTIONS, PERM_SCHEMAS};
pub use error::{ApiError, ApiResult};

use axum::{
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::app::App;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub app: App,
    pub api_keys: Arc<ApiKeyStore>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the full router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/files/{*key}", get(files::get_file));

    let collection_routes = Router::new()
        .route("/all", get(routes::list_collections))
        .route("/", post(routes::create_collection))
        .route(
            "/{name}",
            get(routes::get_collection)
                .put(routes::update_collection)
                .delete(routes::delete_collection),
        )
        .route("/{name}/schema", get(routes::get_schema))
        .route(
            "/{name}/schema/settings",
            patch(routes::update_schema_settings),
        )
        .route(
            "/{name}/schema/{field}/settings",
            patch(routes::update_field_settings),
        )
        .route(
            "/{name}/entry",
            post(routes::add_entry).delete(routes::delete_entries),
        )
        .route(
            "/{name}/entry/{id}",
            get(routes::get_entry).put(routes::update_entry),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .nest("/api/collection", collection_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
