//! Image references stored inside entries.
//!
//! An image field holds an array of objects like
//! `{ "originalName": "a.png", "key": "uploads/a.png", "size": 1024 }`.
//! Only top-level entry keys are inspected.

use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::objects::{LocalObjectStorage, ObjectStorage, ObjectStorageError};

const SIGNED_URL_KEY: &str = "signedUrl";

fn is_image_object(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    let non_empty_str =
        |key: &str| matches!(object.get(key), Some(Value::String(s)) if !s.is_empty());
    let size_ok = object
        .get("size")
        .and_then(Value::as_f64)
        .map(|size| size != 0.0)
        .unwrap_or(false);

    non_empty_str("originalName") && non_empty_str("key") && size_ok
}

/// A non-empty array whose elements are all image objects.
pub fn is_image_array(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty() && items.iter().all(is_image_object),
        _ => false,
    }
}

fn keys_in(value: &Value) -> impl Iterator<Item = &str> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|image| image.get("key").and_then(Value::as_str))
}

/// Every blob key referenced by the image fields of an entry.
pub fn image_keys(data: &Map<String, Value>) -> Vec<String> {
    data.values()
        .filter(|value| is_image_array(value))
        .flat_map(keys_in)
        .map(String::from)
        .collect()
}

/// Keys referenced by `old` image fields that an update to those fields no
/// longer references. Fields absent from `update` are untouched.
pub fn removed_image_keys(old: &Map<String, Value>, update: &Map<String, Value>) -> Vec<String> {
    let mut removed = Vec::new();

    for (field, old_value) in old {
        if !is_image_array(old_value) {
            continue;
        }
        let Some(new_value) = update.get(field) else {
            continue;
        };
        let kept: HashSet<&str> = keys_in(new_value).collect();
        removed.extend(
            keys_in(old_value)
                .filter(|key| !kept.contains(key))
                .map(String::from),
        );
    }

    removed
}

/// Checks every image key against the storage key rules. On failure the
/// offending field name is returned with the error.
pub fn validate_image_keys(data: &Map<String, Value>) -> Result<(), (&str, ObjectStorageError)> {
    for (field, value) in data {
        if !is_image_array(value) {
            continue;
        }
        for key in keys_in(value) {
            LocalObjectStorage::validate_key(key).map_err(|e| (field.as_str(), e))?;
        }
    }
    Ok(())
}

/// Adds a `signedUrl` to every image object of an entry. An image that
/// can't be signed is logged and left without a link.
pub async fn resolve_image_urls(storage: &dyn ObjectStorage, data: &mut Map<String, Value>) {
    for value in data.values_mut() {
        if !is_image_array(value) {
            continue;
        }
        if let Value::Array(images) = value {
            for image in images.iter_mut() {
                if let Value::Object(object) = image {
                    let key = match object.get("key").and_then(Value::as_str) {
                        Some(key) => key.to_string(),
                        None => continue,
                    };
                    match storage.signed_url(&key).await {
                        Ok(url) => {
                            object.insert(SIGNED_URL_KEY.to_string(), Value::String(url));
                        }
                        Err(e) => tracing::warn!("Failed to sign image '{}': {}", key, e),
                    }
                }
            }
        }
    }
}

/// Drops `signedUrl` from image objects before an entry is written, so
/// expiring links are never persisted.
pub fn strip_signed_urls(data: &mut Map<String, Value>) {
    for value in data.values_mut() {
        if !is_image_array(value) {
            continue;
        }
        if let Value::Array(items) = value {
            for item in items.iter_mut() {
                if let Value::Object(object) = item {
                    object.remove(SIGNED_URL_KEY);
                }
            }
        }
    }
}

/// Outcome of a blob cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes all `keys` concurrently. Failures are logged and reported.
pub async fn delete_blobs(storage: &dyn ObjectStorage, keys: Vec<String>) -> CleanupReport {
    let results = join_all(keys.into_iter().map(|key| async move {
        let result = storage.delete_object(&key).await;
        (key, result)
    }))
    .await;

    let mut report = CleanupReport::default();
    for (key, result) in results {
        match result {
            Ok(()) => report.deleted.push(key),
            Err(e) => {
                tracing::warn!("Failed to delete blob '{}': {}", key, e);
                report.failed.push(key);
            }
        }
    }
    report
}

/// Runs [`delete_blobs`] on a background task.
pub fn spawn_cleanup(
    storage: Arc<dyn ObjectStorage>,
    keys: Vec<String>,
) -> JoinHandle<CleanupReport> {
    tokio::spawn(async move {
        if keys.is_empty() {
            return CleanupReport::default();
        }
        let report = delete_blobs(storage.as_ref(), keys).await;
        tracing::info!(
            "Blob cleanup finished: {} deleted, {} failed",
            report.deleted.len(),
            report.failed.len()
        );
        report
    })
}
