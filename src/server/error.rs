//! Rendering of service errors as HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{CmsError, FieldError};

#[derive(Debug)]
pub enum ApiError {
    Cms(CmsError),
    /// The caller lacks the named permission.
    Forbidden(&'static str),
}

impl From<CmsError> for ApiError {
    fn from(err: CmsError) -> Self {
        ApiError::Cms(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    errors: Vec<FieldError>,
}

#[derive(Serialize)]
struct MessageBody {
    message: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Forbidden(_) => {
                return (
                    StatusCode::FORBIDDEN,
                    Json(MessageBody {
                        message: "Missing permission",
                    }),
                )
                    .into_response();
            }
            ApiError::Cms(err) => err,
        };

        let status = match &err {
            CmsError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            CmsError::NotFound { .. } => StatusCode::NOT_FOUND,
            CmsError::Conflict { .. } => StatusCode::CONFLICT,
            CmsError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match err.field_error() {
            Some(field) => (
                status,
                Json(ErrorBody {
                    errors: vec![field],
                }),
            )
                .into_response(),
            // Cause was logged where the error was created.
            None => (
                status,
                Json(MessageBody {
                    message: "Internal server error",
                }),
            )
                .into_response(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
