//! Handlers under `/api/collection`.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::CollectionSummary;
use crate::error::CmsError;
use crate::schema::{CollectionSchema, FieldSettings, SchemaSettings};
use crate::services::CollectionView;

use super::auth::{AuthUser, PERM_COLLECTIONS, PERM_SCHEMAS};
use super::error::ApiResult;
use super::AppState;

/// A JSON request body whose rejection is rendered by the handler.
type JsonBody = Result<Json<Value>, JsonRejection>;

fn json_body(body: JsonBody, path: &str) -> Result<Value, CmsError> {
    body.map(|Json(value)| value)
        .map_err(|e| CmsError::bad_request(path, e.body_text()))
}

/// Deserializes a request body, reporting syntax and shape errors as
/// BadRequest.
fn parse_body<T: DeserializeOwned>(body: JsonBody, path: &str) -> Result<T, CmsError> {
    serde_json::from_value(json_body(body, path)?)
        .map_err(|e| CmsError::bad_request(path, e.to_string()))
}

fn entry_object(body: JsonBody) -> Result<Map<String, Value>, CmsError> {
    match json_body(body, "entry")? {
        Value::Object(map) => Ok(map),
        _ => Err(CmsError::bad_request("entry", "Entry must be a JSON object.")),
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: String,
}

pub async fn list_collections(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<CollectionSummary>>> {
    user.require(PERM_COLLECTIONS)?;
    Ok(Json(state.app.collections.get_all_collection_names().await?))
}

pub async fn create_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: JsonBody,
) -> ApiResult<impl IntoResponse> {
    user.require(PERM_SCHEMAS)?;
    let mut schema: CollectionSchema = parse_body(body, "fields")?;
    if schema.creator.is_none() {
        schema.creator = Some(user.user_id.clone());
    }

    let schema = state.app.collections.create_collection(schema).await?;
    Ok((StatusCode::CREATED, Json(schema)))
}

pub async fn get_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
) -> ApiResult<Json<CollectionView>> {
    user.require(PERM_COLLECTIONS)?;
    Ok(Json(state.app.entries.get_collection(&name).await?))
}

pub async fn update_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
    body: JsonBody,
) -> ApiResult<Json<CollectionSchema>> {
    user.require(PERM_SCHEMAS)?;
    let schema: CollectionSchema = parse_body(body, "fields")?;
    Ok(Json(
        state.app.collections.update_collection(&name, schema).await?,
    ))
}

pub async fn delete_collection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    user.require(PERM_SCHEMAS)?;
    // Blob cleanup keeps running after the response and logs its outcome.
    let _cleanup = state.app.collections.delete_collection(&name).await?;
    Ok(Json(MessageResponse {
        message: format!("Collection '{}' deleted.", name),
    }))
}

pub async fn get_schema(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
) -> ApiResult<Json<CollectionSchema>> {
    user.require(PERM_COLLECTIONS)?;
    Ok(Json(state.app.collections.get_collection_schema(&name).await?))
}

pub async fn update_schema_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
    body: JsonBody,
) -> ApiResult<Json<CollectionSchema>> {
    user.require(PERM_SCHEMAS)?;
    let settings: SchemaSettings = parse_body(body, "settings")?;
    Ok(Json(
        state
            .app
            .collections
            .update_schema_settings(&name, settings)
            .await?,
    ))
}

pub async fn update_field_settings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((name, field)): Path<(String, String)>,
    body: JsonBody,
) -> ApiResult<Json<CollectionSchema>> {
    user.require(PERM_SCHEMAS)?;
    let settings: FieldSettings = parse_body(body, "settings")?;
    Ok(Json(
        state
            .app
            .collections
            .update_field_settings(&name, &field, settings)
            .await?,
    ))
}

pub async fn add_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
    body: JsonBody,
) -> ApiResult<impl IntoResponse> {
    user.require(PERM_COLLECTIONS)?;
    let entry = state.app.entries.add_entry(&name, entry_object(body)?).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEntriesRequest {
    entry_ids: Vec<String>,
}

#[derive(Serialize)]
pub struct DeleteEntriesResponse {
    deleted: u64,
}

pub async fn delete_entries(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(name): Path<String>,
    body: JsonBody,
) -> ApiResult<Json<DeleteEntriesResponse>> {
    user.require(PERM_COLLECTIONS)?;
    let request: DeleteEntriesRequest = parse_body(body, "entryIds")?;
    let outcome = state
        .app
        .entries
        .delete_entries(&name, &request.entry_ids)
        .await?;
    Ok(Json(DeleteEntriesResponse {
        deleted: outcome.deleted,
    }))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((name, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    user.require(PERM_COLLECTIONS)?;
    Ok(Json(state.app.entries.get_entry(&name, &id).await?))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((name, id)): Path<(String, String)>,
    body: JsonBody,
) -> ApiResult<Json<Value>> {
    user.require(PERM_COLLECTIONS)?;
    let updated = state
        .app
        .entries
        .update_entry(&name, &id, entry_object(body)?)
        .await?;
    Ok(Json(updated.entry))
}
