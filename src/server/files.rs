//! Download of blobs through signed links.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;

#[derive(Deserialize)]
pub struct SignedQuery {
    expires: Option<i64>,
    signature: Option<String>,
}

/// Content type of blobs served inline. Only raster images qualify; SVG and
/// everything else goes out as an attachment.
fn content_type(key: &str) -> Option<&'static str> {
    let extension = key.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Serves `key` if the link is signed and not expired.
pub async fn get_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Response {
    let (Some(expires), Some(signature)) = (query.expires, query.signature) else {
        return StatusCode::FORBIDDEN.into_response();
    };
    if !state.app.files.verify(&key, expires, &signature) {
        return StatusCode::FORBIDDEN.into_response();
    }

    match state.app.files.read_object(&key).await {
        Ok(Some(bytes)) => {
            let nosniff = (header::X_CONTENT_TYPE_OPTIONS, "nosniff");
            match content_type(&key) {
                Some(image) => ([(header::CONTENT_TYPE, image), nosniff], bytes).into_response(),
                None => (
                    [
                        (header::CONTENT_TYPE, "application/octet-stream"),
                        (header::CONTENT_DISPOSITION, "attachment"),
                        nosniff,
                    ],
                    bytes,
                )
                    .into_response(),
            }
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!("Failed to read blob '{}': {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
