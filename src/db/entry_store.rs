//! Schema-less entry storage for one collection.
//!
//! Every collection owns a table `entries_<name>` holding one JSON object per
//! entry. Keys are never validated or stripped; the collection schema only
//! drives migrations.

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Key under which the entry id is exposed in entry objects.
pub const ID_KEY: &str = "_id";

/// One stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Entry {
    /// The entry as a JSON object with its id under `_id`.
    pub fn into_value(self) -> Value {
        let mut data = self.data;
        data.insert(ID_KEY.to_string(), Value::String(self.id));
        Value::Object(data)
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    data: String,
}

/// A raw row used by cursor-driven rewrites.
#[derive(Debug, sqlx::FromRow)]
pub struct EntryBatchRow {
    pub rowid: i64,
    pub id: String,
    pub data: String,
}

/// Handle to a collection's entry table.
///
/// Handles are cheap to clone. Obtain them through
/// [`StoreRegistry`](super::StoreRegistry) so the table is guaranteed to exist.
#[derive(Debug, Clone)]
pub struct EntryStore {
    pool: SqlitePool,
    collection: String,
    table: String,
}

impl EntryStore {
    pub(crate) fn new(pool: SqlitePool, collection: &str) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
            table: format!("\"entries_{}\"", collection),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Creates the table if it doesn't exist yet.
    pub async fn create_table(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            self.table
        ))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Drops the table. A missing table is not an error.
    pub async fn drop_table(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Renames the table for a renamed collection and returns the new handle.
    pub async fn rename_table(
        &self,
        conn: &mut SqliteConnection,
        new_collection: &str,
    ) -> Result<EntryStore, sqlx::Error> {
        let renamed = EntryStore::new(self.pool.clone(), new_collection);
        sqlx::query(&format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table, renamed.table
        ))
        .execute(&mut *conn)
        .await?;
        Ok(renamed)
    }

    pub async fn insert(&self, data: Map<String, Value>) -> Result<Entry, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(&format!(
            "INSERT INTO {} (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)",
            self.table
        ))
        .bind(&id)
        .bind(encode(&data)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(Entry { id, data })
    }

    pub async fn get(&self, id: &str) -> Result<Option<Entry>, sqlx::Error> {
        let row: Option<EntryRow> =
            sqlx::query_as(&format!("SELECT id, data FROM {} WHERE id = ?", self.table))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(hydrate).transpose()
    }

    /// All entries in insertion order.
    pub async fn list(&self) -> Result<Vec<Entry>, sqlx::Error> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT id, data FROM {} ORDER BY rowid",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hydrate).collect()
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Replaces the data of an entry. Returns `None` if it doesn't exist.
    pub async fn replace(
        &self,
        id: &str,
        data: Map<String, Value>,
    ) -> Result<Option<Entry>, sqlx::Error> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET data = ?, updated_at = ? WHERE id = ?",
            self.table
        ))
        .bind(encode(&data)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(Entry {
            id: id.to_string(),
            data,
        }))
    }

    /// Loads the entries among `ids` that exist.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<Entry>, sqlx::Error> {
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.get(id).await? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Deletes the given entries in one transaction. Returns how many existed.
    pub async fn delete_many(&self, ids: &[String]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for id in ids {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", self.table))
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    /// Removes a JSON path from every entry that has it, in one statement.
    pub async fn bulk_unset(
        &self,
        conn: &mut SqliteConnection,
        json_path: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET data = json_remove(data, ?1), updated_at = ?2
            WHERE json_type(data, ?1) IS NOT NULL
            "#,
            self.table
        ))
        .bind(json_path)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Moves the value at `from` to `to` in every entry that has it, in one
    /// statement. Both paths must share the same parent object.
    pub async fn bulk_rename(
        &self,
        conn: &mut SqliteConnection,
        from: &str,
        to: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET data = json_set(json_remove(data, ?1), ?2, json(data -> ?1)), updated_at = ?3
            WHERE json_type(data, ?1) IS NOT NULL
            "#,
            self.table
        ))
        .bind(from)
        .bind(to)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Next batch of raw rows after `after_rowid`, in rowid order.
    pub async fn fetch_batch(
        &self,
        conn: &mut SqliteConnection,
        after_rowid: i64,
        limit: i64,
    ) -> Result<Vec<EntryBatchRow>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT rowid, id, data FROM {} WHERE rowid > ? ORDER BY rowid LIMIT ?",
            self.table
        ))
        .bind(after_rowid)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
    }

    /// Persists a rewritten document.
    pub async fn write_document(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        doc: &Value,
    ) -> Result<(), sqlx::Error> {
        let data = serde_json::to_string(doc).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(&format!(
            "UPDATE {} SET data = ?, updated_at = ? WHERE id = ?",
            self.table
        ))
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

fn encode(data: &Map<String, Value>) -> Result<String, sqlx::Error> {
    serde_json::to_string(data).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn hydrate(row: EntryRow) -> Result<Entry, sqlx::Error> {
    let data: Map<String, Value> =
        serde_json::from_str(&row.data).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Entry { id: row.id, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use serde_json::json;
    use tempfile::TempDir;

    struct TestContext {
        pool: SqlitePool,
        store: EntryStore,
        _temp_dir: TempDir,
    }

    async fn setup_store() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let store = EntryStore::new(pool.clone(), "posts");
        let mut conn = pool.acquire().await.unwrap();
        store.create_table(&mut conn).await.unwrap();
        TestContext {
            pool,
            store,
            _temp_dir: temp_dir,
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_get_list() {
        let ctx = setup_store().await;

        let first = ctx
            .store
            .insert(object(json!({ "title": "a", "extra": { "x": 1 } })))
            .await
            .unwrap();
        ctx.store.insert(object(json!({ "title": "b" }))).await.unwrap();

        let fetched = ctx.store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(fetched.data, object(json!({ "title": "a", "extra": { "x": 1 } })));

        let all = ctx.store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(ctx.store.count().await.unwrap(), 2);
    }

    #[test]
    fn test_into_value_exposes_id() {
        let entry = Entry {
            id: "abc".to_string(),
            data: object(json!({ "title": "a" })),
        };
        assert_eq!(entry.into_value(), json!({ "title": "a", "_id": "abc" }));
    }

    #[tokio::test]
    async fn test_replace_missing_returns_none() {
        let ctx = setup_store().await;
        let result = ctx
            .store
            .replace("nope", object(json!({ "title": "x" })))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_many_counts_existing() {
        let ctx = setup_store().await;
        let a = ctx.store.insert(object(json!({ "n": 1 }))).await.unwrap();
        let b = ctx.store.insert(object(json!({ "n": 2 }))).await.unwrap();

        let deleted = ctx
            .store
            .delete_many(&[a.id.clone(), "missing".to_string()])
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(ctx.store.get(&a.id).await.unwrap().is_none());
        assert!(ctx.store.get(&b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bulk_unset_nested_path() {
        let ctx = setup_store().await;
        let a = ctx
            .store
            .insert(object(json!({ "meta": { "author": "ann", "year": 1 }, "t": "x" })))
            .await
            .unwrap();
        let b = ctx.store.insert(object(json!({ "t": "y" }))).await.unwrap();

        let mut conn = ctx.pool.acquire().await.unwrap();
        let changed = ctx
            .store
            .bulk_unset(&mut conn, "$.\"meta\".\"author\"")
            .await
            .unwrap();

        assert_eq!(changed, 1);
        let a = ctx.store.get(&a.id).await.unwrap().unwrap();
        assert_eq!(a.data, object(json!({ "meta": { "year": 1 }, "t": "x" })));
        let b = ctx.store.get(&b.id).await.unwrap().unwrap();
        assert_eq!(b.data, object(json!({ "t": "y" })));
    }

    #[tokio::test]
    async fn test_bulk_rename_keeps_value_types() {
        let ctx = setup_store().await;
        let a = ctx
            .store
            .insert(object(json!({ "title": "hi", "n": 1 })))
            .await
            .unwrap();
        let b = ctx
            .store
            .insert(object(json!({ "title": { "nested": [1, 2] } })))
            .await
            .unwrap();
        let c = ctx.store.insert(object(json!({ "n": 3 }))).await.unwrap();

        let mut conn = ctx.pool.acquire().await.unwrap();
        let changed = ctx
            .store
            .bulk_rename(&mut conn, "$.\"title\"", "$.\"headline\"")
            .await
            .unwrap();

        assert_eq!(changed, 2);
        let a = ctx.store.get(&a.id).await.unwrap().unwrap();
        assert_eq!(a.data, object(json!({ "headline": "hi", "n": 1 })));
        let b = ctx.store.get(&b.id).await.unwrap().unwrap();
        assert_eq!(b.data, object(json!({ "headline": { "nested": [1, 2] } })));
        let c = ctx.store.get(&c.id).await.unwrap().unwrap();
        assert_eq!(c.data, object(json!({ "n": 3 })));
    }

    #[tokio::test]
    async fn test_fetch_batch_pages_by_rowid() {
        let ctx = setup_store().await;
        for n in 0..5 {
            ctx.store.insert(object(json!({ "n": n }))).await.unwrap();
        }

        let mut conn = ctx.pool.acquire().await.unwrap();
        let first = ctx.store.fetch_batch(&mut conn, 0, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = ctx
            .store
            .fetch_batch(&mut conn, first[1].rowid, 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn test_rename_and_drop_table() {
        let ctx = setup_store().await;
        ctx.store.insert(object(json!({ "n": 1 }))).await.unwrap();

        let mut conn = ctx.pool.acquire().await.unwrap();
        let renamed = ctx.store.rename_table(&mut conn, "articles").await.unwrap();
        assert_eq!(renamed.collection(), "articles");
        assert_eq!(renamed.count().await.unwrap(), 1);

        renamed.drop_table(&mut conn).await.unwrap();
        // Dropping twice is tolerated.
        renamed.drop_table(&mut conn).await.unwrap();
        assert!(renamed.count().await.is_err());
    }
}
