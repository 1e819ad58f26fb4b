//! Entry CRUD on top of the collection registry.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db::{Entry, EntryStore, StoreRegistry, ID_KEY};
use crate::error::{CmsError, CmsResult};
use crate::images::{
    delete_blobs, image_keys, removed_image_keys, resolve_image_urls, spawn_cleanup,
    strip_signed_urls, validate_image_keys, CleanupReport,
};
use crate::objects::ObjectStorage;
use crate::schema::CollectionSchema;

use super::collections::CollectionRegistry;

/// A collection's schema together with all of its entries.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionView {
    pub schema: CollectionSchema,
    pub entries: Vec<Value>,
}

/// Result of an entry update.
#[derive(Debug)]
pub struct UpdatedEntry {
    pub entry: Value,
    /// Blobs no longer referenced by the entry.
    pub cleanup: CleanupReport,
}

/// Result of a bulk delete. The cleanup runs after the entries are gone.
#[derive(Debug)]
pub struct DeletedEntries {
    pub deleted: u64,
    pub cleanup: JoinHandle<CleanupReport>,
}

pub struct EntryService {
    collections: Arc<CollectionRegistry>,
    stores: Arc<StoreRegistry>,
    storage: Arc<dyn ObjectStorage>,
}

impl EntryService {
    pub fn new(
        collections: Arc<CollectionRegistry>,
        stores: Arc<StoreRegistry>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            collections,
            stores,
            storage,
        }
    }

    /// Resolves the store of an existing collection.
    async fn store_for(&self, collection: &str) -> CmsResult<(CollectionSchema, EntryStore)> {
        let record = self.collections.require_collection(collection).await?;
        let store = self
            .stores
            .get_or_create(&record.name)
            .await
            .map_err(|e| CmsError::server("Failed to open entry store", e))?;
        Ok((record.schema, store))
    }

    async fn present(&self, entry: Entry) -> Value {
        let mut entry = entry;
        resolve_image_urls(self.storage.as_ref(), &mut entry.data).await;
        entry.into_value()
    }

    pub async fn get_entry(&self, collection: &str, entry_id: &str) -> CmsResult<Value> {
        let (_, store) = self.store_for(collection).await?;
        let entry = store
            .get(entry_id)
            .await
            .map_err(|e| CmsError::server("Failed to load entry", e))?
            .ok_or_else(|| entry_not_found(entry_id))?;
        Ok(self.present(entry).await)
    }

    pub async fn add_entry(&self, collection: &str, data: Map<String, Value>) -> CmsResult<Value> {
        let (_, store) = self.store_for(collection).await?;

        let mut data = data;
        data.remove(ID_KEY);
        strip_signed_urls(&mut data);
        check_image_keys(&data)?;

        let entry = store
            .insert(data)
            .await
            .map_err(|e| CmsError::server("Failed to add entry", e))?;
        tracing::info!("Added entry {} to '{}'", entry.id, store.collection());
        Ok(self.present(entry).await)
    }

    /// Sets the given top-level keys on an entry.
    ///
    /// Blobs dropped from an image field are deleted once the entry has been
    /// written; failures end up in the returned report.
    pub async fn update_entry(
        &self,
        collection: &str,
        entry_id: &str,
        update: Map<String, Value>,
    ) -> CmsResult<UpdatedEntry> {
        let (_, store) = self.store_for(collection).await?;

        let mut update = update;
        update.remove(ID_KEY);
        strip_signed_urls(&mut update);
        check_image_keys(&update)?;

        let current = store
            .get(entry_id)
            .await
            .map_err(|e| CmsError::server("Failed to load entry", e))?
            .ok_or_else(|| entry_not_found(entry_id))?;

        let orphaned = removed_image_keys(&current.data, &update);
        let mut data = current.data;
        data.extend(update);

        let entry = store
            .replace(entry_id, data)
            .await
            .map_err(|e| CmsError::server("Failed to update entry", e))?
            .ok_or_else(|| entry_not_found(entry_id))?;

        let cleanup = delete_blobs(self.storage.as_ref(), orphaned).await;
        if !cleanup.is_clean() {
            tracing::warn!(
                "Entry {} updated, {} orphaned blobs could not be deleted",
                entry_id,
                cleanup.failed.len()
            );
        }

        tracing::info!("Updated entry {} in '{}'", entry_id, store.collection());
        Ok(UpdatedEntry {
            entry: self.present(entry).await,
            cleanup,
        })
    }

    /// Deletes entries and schedules deletion of their blobs.
    pub async fn delete_entries(
        &self,
        collection: &str,
        entry_ids: &[String],
    ) -> CmsResult<DeletedEntries> {
        if entry_ids.is_empty() {
            return Err(CmsError::bad_request("entryIds", "No entry ids given."));
        }

        let (_, store) = self.store_for(collection).await?;

        let existing = store
            .get_many(entry_ids)
            .await
            .map_err(|e| CmsError::server("Failed to load entries", e))?;
        if existing.is_empty() {
            return Err(CmsError::bad_request(
                "entryIds",
                "None of the given entries exist.",
            ));
        }
        let keys: Vec<String> = existing.iter().flat_map(|e| image_keys(&e.data)).collect();

        let deleted = store
            .delete_many(entry_ids)
            .await
            .map_err(|e| CmsError::server("Failed to delete entries", e))?;

        tracing::info!("Deleted {} entries from '{}'", deleted, store.collection());
        Ok(DeletedEntries {
            deleted,
            cleanup: spawn_cleanup(self.storage.clone(), keys),
        })
    }

    /// All entries of a collection, image fields signed.
    pub async fn list_entries(&self, collection: &str) -> CmsResult<Vec<Value>> {
        let (_, store) = self.store_for(collection).await?;
        self.list_in(&store).await
    }

    async fn list_in(&self, store: &EntryStore) -> CmsResult<Vec<Value>> {
        let entries = store
            .list()
            .await
            .map_err(|e| CmsError::server("Failed to list entries", e))?;

        let mut values = Vec::with_capacity(entries.len());
        for entry in entries {
            values.push(self.present(entry).await);
        }
        Ok(values)
    }

    pub async fn get_collection(&self, collection: &str) -> CmsResult<CollectionView> {
        let (schema, store) = self.store_for(collection).await?;
        let entries = self.list_in(&store).await?;
        Ok(CollectionView { schema, entries })
    }
}

fn check_image_keys(data: &Map<String, Value>) -> CmsResult<()> {
    validate_image_keys(data)
        .map_err(|(field, e)| CmsError::bad_request(field, format!("Invalid image: {}.", e)))
}

fn entry_not_found(entry_id: &str) -> CmsError {
    CmsError::not_found("entryId", format!("Entry '{}' not found.", entry_id))
}
