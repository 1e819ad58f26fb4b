//! Registry of materialized entry stores, keyed by collection name.

use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::entry_store::EntryStore;

/// Looks up or creates the entry store of a collection.
///
/// Creation is idempotent: the table is created with `IF NOT EXISTS` while
/// holding the write lock, so concurrent first requests for the same name
/// produce one table and one cached handle.
#[derive(Debug)]
pub struct StoreRegistry {
    pool: SqlitePool,
    stores: RwLock<HashMap<String, EntryStore>>,
}

impl StoreRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the store for `collection`, creating its table if needed.
    pub async fn get_or_create(&self, collection: &str) -> Result<EntryStore, sqlx::Error> {
        if let Some(store) = self.stores.read().await.get(collection) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(collection) {
            return Ok(store.clone());
        }

        let store = EntryStore::new(self.pool.clone(), collection);
        let mut conn = self.pool.acquire().await?;
        store.create_table(&mut conn).await?;

        tracing::debug!("Materialized entry store for '{}'", collection);
        stores.insert(collection.to_string(), store.clone());
        Ok(store)
    }

    /// A handle for use inside a caller-owned transaction. The table is not
    /// touched and the handle is not cached.
    pub fn handle(&self, collection: &str) -> EntryStore {
        EntryStore::new(self.pool.clone(), collection)
    }

    /// Caches a handle whose table was created or renamed in a committed
    /// transaction.
    pub async fn remember(&self, store: EntryStore) {
        self.stores
            .write()
            .await
            .insert(store.collection().to_string(), store);
    }

    /// Drops the cached handle of a dropped or renamed store.
    pub async fn forget(&self, collection: &str) {
        self.stores.write().await.remove(collection);
    }

    pub async fn is_cached(&self, collection: &str) -> bool {
        self.stores.read().await.contains_key(collection)
    }
}
