//! Error taxonomy shared by the collection registry and the entry service.
//!
//! Client-shaped errors carry a `path` so the HTTP layer can render them as
//! field-level errors. Everything else collapses into [`CmsError::Server`],
//! which is logged with its cause and surfaced with a generic message.

use serde::Serialize;
use thiserror::Error;

use crate::migration::MigrationError;
use crate::schema::DiffError;

/// A single field-level error, rendered as `{ "path": ..., "msg": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub msg: String,
}

/// Errors returned by the core services.
#[derive(Debug, Error)]
pub enum CmsError {
    /// The caller sent something we can't act on.
    #[error("bad request at '{path}': {message}")]
    BadRequest { path: String, message: String },

    /// A schema, collection, field or entry doesn't exist.
    #[error("not found at '{path}': {message}")]
    NotFound { path: String, message: String },

    /// A unique name or title is already taken.
    #[error("conflict at '{path}': {message}")]
    Conflict { path: String, message: String },

    /// Storage or collaborator failure. The message is for logs only.
    #[error("server error: {0}")]
    Server(String),
}

impl CmsError {
    pub fn bad_request(path: impl Into<String>, message: impl Into<String>) -> Self {
        CmsError::BadRequest {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>, message: impl Into<String>) -> Self {
        CmsError::NotFound {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        CmsError::Conflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Logs `context` together with the underlying cause and wraps it.
    pub fn server(context: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, cause);
        CmsError::Server(format!("{}: {}", context, cause))
    }

    /// Field-level rendering for client errors, `None` for server errors.
    pub fn field_error(&self) -> Option<FieldError> {
        match self {
            CmsError::BadRequest { path, message }
            | CmsError::NotFound { path, message }
            | CmsError::Conflict { path, message } => Some(FieldError {
                path: path.clone(),
                msg: message.clone(),
            }),
            CmsError::Server(_) => None,
        }
    }
}

impl From<DiffError> for CmsError {
    fn from(err: DiffError) -> Self {
        CmsError::bad_request(err.path().to_string(), err.to_string())
    }
}

impl From<MigrationError> for CmsError {
    fn from(err: MigrationError) -> Self {
        match err {
            MigrationError::Plan(diff) => diff.into(),
            other => CmsError::server("Failed to migrate entries", other),
        }
    }
}

pub type CmsResult<T> = Result<T, CmsError>;
