//! Bearer API-key authentication and permission checks.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::config::ApiKeyEntry;

use super::error::ApiError;
use super::AppState;

/// Permission to create, change and delete schemas.
pub const PERM_SCHEMAS: &str = "schemas";
/// Permission to read collections and work with entries.
pub const PERM_COLLECTIONS: &str = "collections";

/// Authenticated user info, added to request extensions after auth
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub permissions: Vec<String>,
}

impl AuthUser {
    pub fn require(&self, permission: &'static str) -> Result<(), ApiError> {
        if self.permissions.iter().any(|p| p == permission) {
            Ok(())
        } else {
            tracing::warn!(
                "User '{}' lacks permission '{}'",
                self.user_id,
                permission
            );
            Err(ApiError::Forbidden(permission))
        }
    }
}

/// API key store - maps key -> AuthUser
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: &[ApiKeyEntry]) -> Self {
        let keys: HashMap<_, _> = entries
            .iter()
            .map(|entry| {
                (
                    entry.key.clone(),
                    AuthUser {
                        user_id: entry.user_id.clone(),
                        permissions: entry.permissions.clone(),
                    },
                )
            })
            .collect();

        if keys.is_empty() {
            tracing::warn!("No API keys loaded - all authenticated requests will fail");
        } else {
            tracing::info!("Loaded {} API key(s)", keys.len());
        }
        Self { keys }
    }

    /// Validate an API key and return the associated user
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }
}

/// Auth error response
#[derive(Serialize)]
struct AuthError {
    error: &'static str,
    message: &'static str,
}

fn unauthorized(error: &'static str, message: &'static str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(AuthError { error, message })).into_response()
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => return unauthorized("missing_auth", "Authorization header required"),
    };

    match state.api_keys.validate(api_key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}
