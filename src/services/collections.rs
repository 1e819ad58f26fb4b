//! Collection registry: schema records and the lifecycle of their entry
//! stores.

use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{MigrationConfig, NotifyConfig};
use crate::db::{
    is_unique_violation, CollectionRecord, CollectionRepository, CollectionSummary, EntryStore,
    StoreRegistry,
};
use crate::email::{Notifier, OutboundEmail};
use crate::error::{CmsError, CmsResult};
use crate::images::{image_keys, spawn_cleanup, CleanupReport};
use crate::migration::{apply_plan, retry_transient, MigrationError};
use crate::objects::ObjectStorage;
use crate::schema::{
    normalize_name, plan_migration, CollectionSchema, FieldSettings, MigrationPlan, SchemaSettings,
};

/// Owns every schema record and the entry store that belongs to it.
pub struct CollectionRegistry {
    pool: SqlitePool,
    repo: CollectionRepository,
    stores: Arc<StoreRegistry>,
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn Notifier>,
    notify: NotifyConfig,
    migration: MigrationConfig,
}

impl CollectionRegistry {
    pub fn new(
        pool: SqlitePool,
        stores: Arc<StoreRegistry>,
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn Notifier>,
        notify: NotifyConfig,
        migration: MigrationConfig,
    ) -> Self {
        Self {
            repo: CollectionRepository::new(pool.clone()),
            pool,
            stores,
            storage,
            notifier,
            notify,
            migration,
        }
    }

    /// Stores a new schema and materializes its entry store.
    pub async fn create_collection(
        &self,
        mut schema: CollectionSchema,
    ) -> CmsResult<CollectionSchema> {
        schema.validate()?;
        schema.name = normalize_name(&schema.name)?;
        schema.title = schema.title.trim().to_string();

        self.check_available(&schema, None).await?;

        let record = CollectionRecord::new(schema.clone());
        let store = self.stores.handle(&record.name);

        let result: Result<(), sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;
            self.repo.insert(&mut tx, &record).await?;
            store.create_table(&mut tx).await?;
            tx.commit().await
        }
        .await;

        if let Err(e) = result {
            if is_unique_violation(&e) {
                return Err(taken(&schema));
            }
            return Err(CmsError::server("Failed to create collection", e));
        }

        self.stores.remember(store).await;
        tracing::info!("Created collection '{}'", schema.name);
        Ok(schema)
    }

    pub async fn get_collection_schema(&self, name: &str) -> CmsResult<CollectionSchema> {
        Ok(self.require_collection(name).await?.schema)
    }

    /// Loads a schema record, failing with NotFound if there is none.
    pub async fn require_collection(&self, name: &str) -> CmsResult<CollectionRecord> {
        let key = name.trim().to_lowercase();
        self.repo
            .get_by_name(&key)
            .await
            .map_err(|e| CmsError::server("Failed to load collection", e))?
            .ok_or_else(|| {
                CmsError::not_found(
                    "collectionName",
                    format!("Collection '{}' not found.", name),
                )
            })
    }

    /// Replaces a schema, migrating its entries in the same transaction.
    ///
    /// Ambiguous structural changes are rejected before anything is
    /// written. A changed name renames the entry store.
    pub async fn update_collection(
        &self,
        name: &str,
        mut schema: CollectionSchema,
    ) -> CmsResult<CollectionSchema> {
        schema.validate()?;
        schema.name = normalize_name(&schema.name)?;
        schema.title = schema.title.trim().to_string();

        let old = self.require_collection(name).await?;
        let plan = plan_migration(&old.schema.fields, &schema.fields)?;
        self.check_available(&schema, Some(&old)).await?;

        let store = retry_transient(&self.migration, MigrationError::is_transient, || {
            self.commit_update(&old, &schema, &plan)
        })
        .await
        .map_err(|e| match e {
            MigrationError::Database(db) if is_unique_violation(&db) => taken(&schema),
            other => other.into(),
        })?;

        if store.collection() != old.name {
            self.stores.forget(&old.name).await;
        }
        self.stores.remember(store).await;

        tracing::info!(
            "Updated collection '{}' ({} migration steps)",
            schema.name,
            plan.len()
        );
        self.notify_change(format!("Collection '{}' was updated.", schema.title));
        Ok(schema)
    }

    async fn commit_update(
        &self,
        old: &CollectionRecord,
        schema: &CollectionSchema,
        plan: &MigrationPlan,
    ) -> Result<EntryStore, MigrationError> {
        let mut tx = self.pool.begin().await?;

        let mut store = self.stores.handle(&old.name);
        store.create_table(&mut tx).await?;
        apply_plan(&store, plan, &mut tx, self.migration.batch_size).await?;

        if schema.name != old.name {
            store = store.rename_table(&mut tx, &schema.name).await?;
        }
        self.repo.overwrite(&mut tx, old.id, schema).await?;

        tx.commit().await?;
        Ok(store)
    }

    /// Drops a schema record together with all of its entries.
    ///
    /// Blobs referenced by the dropped entries are deleted in the
    /// background; the handle yields the cleanup report.
    pub async fn delete_collection(&self, name: &str) -> CmsResult<JoinHandle<CleanupReport>> {
        let record = self.require_collection(name).await?;
        let store = self.stores.handle(&record.name);

        let keys = match store.list().await {
            Ok(entries) => entries
                .iter()
                .flat_map(|e| image_keys(&e.data))
                .collect::<Vec<_>>(),
            Err(e) => {
                tracing::warn!(
                    "Could not read entries of '{}' before deleting: {}",
                    record.name,
                    e
                );
                Vec::new()
            }
        };

        let result: Result<(), sqlx::Error> = async {
            let mut tx = self.pool.begin().await?;
            store.drop_table(&mut tx).await?;
            self.repo.delete(&mut tx, record.id).await?;
            tx.commit().await
        }
        .await;
        result.map_err(|e| CmsError::server("Failed to delete collection", e))?;

        self.stores.forget(&record.name).await;
        tracing::info!("Deleted collection '{}'", record.name);
        self.notify_change(format!("Collection '{}' was deleted.", record.title));

        Ok(spawn_cleanup(self.storage.clone(), keys))
    }

    pub async fn get_all_collection_names(&self) -> CmsResult<Vec<CollectionSummary>> {
        self.repo
            .list_summaries()
            .await
            .map_err(|e| CmsError::server("Failed to list collections", e))
    }

    /// Merges collection-level display settings. Never migrates entries.
    pub async fn update_schema_settings(
        &self,
        name: &str,
        settings: SchemaSettings,
    ) -> CmsResult<CollectionSchema> {
        let mut record = self.require_collection(name).await?;

        if let Some(update) = settings.data_table {
            let current = record
                .schema
                .settings
                .get_or_insert_with(Default::default)
                .data_table
                .get_or_insert_with(Default::default);
            if update.entries_per_page.is_some() {
                current.entries_per_page = update.entries_per_page;
            }
        }

        self.save_settings(&record).await?;
        Ok(record.schema)
    }

    /// Merges display settings of one top-level field.
    pub async fn update_field_settings(
        &self,
        name: &str,
        field_name: &str,
        settings: FieldSettings,
    ) -> CmsResult<CollectionSchema> {
        let mut record = self.require_collection(name).await?;

        let field = record.schema.field_mut(field_name).ok_or_else(|| {
            CmsError::not_found(
                "fieldName",
                format!(
                    "Field '{}' not found in collection '{}'.",
                    field_name, record.name
                ),
            )
        })?;
        field
            .settings
            .get_or_insert_with(Default::default)
            .merge(&settings);

        self.save_settings(&record).await?;
        Ok(record.schema)
    }

    async fn save_settings(&self, record: &CollectionRecord) -> CmsResult<()> {
        self.repo
            .save_schema(record.id, &record.schema)
            .await
            .map_err(|e| CmsError::server("Failed to save settings", e))?;
        tracing::info!("Updated settings of collection '{}'", record.name);
        Ok(())
    }

    /// Fails with Conflict if another collection uses the name or title.
    async fn check_available(
        &self,
        schema: &CollectionSchema,
        current: Option<&CollectionRecord>,
    ) -> CmsResult<()> {
        let is_other = |record: &CollectionRecord| current.map(|c| c.id) != Some(record.id);

        let by_name = self
            .repo
            .get_by_name(&schema.name)
            .await
            .map_err(|e| CmsError::server("Failed to load collection", e))?;
        if by_name.as_ref().is_some_and(is_other) {
            return Err(CmsError::conflict(
                "collectionName",
                format!("Collection '{}' already exists.", schema.name),
            ));
        }

        let by_title = self
            .repo
            .get_by_title(&schema.title)
            .await
            .map_err(|e| CmsError::server("Failed to load collection", e))?;
        if by_title.as_ref().is_some_and(is_other) {
            return Err(CmsError::conflict(
                "title",
                format!("A collection titled '{}' already exists.", schema.title),
            ));
        }

        Ok(())
    }

    /// Sends an update email to every configured recipient in the background.
    fn notify_change(&self, summary: String) {
        for recipient in &self.notify.recipients {
            let notifier = self.notifier.clone();
            let email = OutboundEmail::update(recipient.clone(), summary.clone());
            tokio::spawn(async move {
                let recipient = email.recipient.clone();
                if let Err(e) = notifier.send_email(email).await {
                    tracing::warn!("Failed to notify {}: {}", recipient, e);
                }
            });
        }
    }
}

fn taken(schema: &CollectionSchema) -> CmsError {
    CmsError::conflict(
        "collectionName",
        format!(
            "Collection name '{}' or title '{}' is already taken.",
            schema.name, schema.title
        ),
    )
}
