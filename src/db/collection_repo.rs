use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::schema::CollectionSchema;

/// A stored schema record.
#[derive(Debug, Clone)]
pub struct CollectionRecord {
    pub id: Uuid,
    pub name: String,
    pub title: String,
    pub schema: CollectionSchema,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionRecord {
    pub fn new(schema: CollectionSchema) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: schema.name.clone(),
            title: schema.title.clone(),
            schema,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Name and title of a collection, as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CollectionSummary {
    pub name: String,
    pub title: String,
}

#[derive(sqlx::FromRow)]
struct CollectionRow {
    id: String,
    name: String,
    title: String,
    schema_json: String,
    created_at: String,
    updated_at: String,
}

/// Sole reader and writer of the `collections` table.
#[derive(Debug, Clone)]
pub struct CollectionRepository {
    pool: SqlitePool,
}

impl CollectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<CollectionRecord>, sqlx::Error> {
        let row: Option<CollectionRow> = sqlx::query_as("SELECT * FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(hydrate).transpose()
    }

    pub async fn get_by_title(
        &self,
        title: &str,
    ) -> Result<Option<CollectionRecord>, sqlx::Error> {
        let row: Option<CollectionRow> =
            sqlx::query_as("SELECT * FROM collections WHERE title = ?")
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;

        row.map(hydrate).transpose()
    }

    pub async fn list_summaries(&self) -> Result<Vec<CollectionSummary>, sqlx::Error> {
        sqlx::query_as("SELECT name, title FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &CollectionRecord,
    ) -> Result<(), sqlx::Error> {
        let schema_json = encode_schema(&record.schema)?;

        sqlx::query(
            r#"
            INSERT INTO collections (id, name, title, schema_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.title)
        .bind(&schema_json)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Overwrites name, title and schema JSON of an existing record.
    pub async fn overwrite(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        schema: &CollectionSchema,
    ) -> Result<(), sqlx::Error> {
        let schema_json = encode_schema(schema)?;

        sqlx::query(
            r#"
            UPDATE collections
            SET name = ?, title = ?, schema_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&schema.name)
        .bind(&schema.title)
        .bind(&schema_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Rewrites only the stored schema JSON (display settings changes).
    pub async fn save_schema(&self, id: Uuid, schema: &CollectionSchema) -> Result<(), sqlx::Error> {
        let schema_json = encode_schema(schema)?;

        sqlx::query("UPDATE collections SET schema_json = ?, updated_at = ? WHERE id = ?")
            .bind(&schema_json)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn delete(&self, conn: &mut SqliteConnection, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

fn encode_schema(schema: &CollectionSchema) -> Result<String, sqlx::Error> {
    serde_json::to_string(schema).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn hydrate(row: CollectionRow) -> Result<CollectionRecord, sqlx::Error> {
    let schema: CollectionSchema =
        serde_json::from_str(&row.schema_json).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let id = Uuid::parse_str(&row.id).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(CollectionRecord {
        id,
        name: row.name,
        title: row.title,
        schema,
        created_at: DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&row.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
