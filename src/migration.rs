//! Applies a [`MigrationPlan`] to an entry store.
//!
//! Steps that stay outside arrays become one JSON1 statement each. Steps
//! below an array boundary rewrite documents in Rust, walking the table in
//! rowid batches. All work happens on the caller's connection, so it
//! commits or rolls back with the surrounding transaction.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use sqlx::SqliteConnection;
use thiserror::Error;

use crate::config::MigrationConfig;
use crate::db::EntryStore;
use crate::schema::{DiffError, MigrationPlan, MigrationStep};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Plan(#[from] DiffError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("entry '{id}' in '{collection}' is not valid JSON: {source}")]
    CorruptEntry {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl MigrationError {
    /// Whether retrying the whole transaction may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MigrationError::Database(err) => is_transient_db_error(err),
            _ => false,
        }
    }
}

/// Busy and locked databases, and pool timeouts, go away on their own.
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            // SQLITE_BUSY and SQLITE_LOCKED, including extended codes.
            let primary = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            matches!(primary, Some(5) | Some(6))
        }
        _ => false,
    }
}

/// What a migration touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub steps: usize,
    /// Entries changed, summed over steps.
    pub entries_updated: u64,
}

/// Runs every step of `plan` against `store` on `conn`.
pub async fn apply_plan(
    store: &EntryStore,
    plan: &MigrationPlan,
    conn: &mut SqliteConnection,
    batch_size: usize,
) -> Result<MigrationReport, MigrationError> {
    let mut report = MigrationReport::default();

    for step in plan.steps() {
        let updated = match bulk_paths(step) {
            Some(BulkStep::Unset(path)) => store.bulk_unset(conn, &path).await?,
            Some(BulkStep::Rename(from, to)) => store.bulk_rename(conn, &from, &to).await?,
            None => rewrite_documents(store, step, conn, batch_size).await?,
        };

        tracing::info!(
            "Migrated '{}': {} ({} entries)",
            store.collection(),
            step,
            updated
        );
        report.steps += 1;
        report.entries_updated += updated;
    }

    Ok(report)
}

enum BulkStep {
    Unset(String),
    Rename(String, String),
}

fn bulk_paths(step: &MigrationStep) -> Option<BulkStep> {
    match step {
        MigrationStep::Unset { .. } => step.path().to_json_path().map(BulkStep::Unset),
        MigrationStep::Rename { parent, from, to } => {
            let from = parent.child(from).to_json_path()?;
            let to = parent.child(to).to_json_path()?;
            Some(BulkStep::Rename(from, to))
        }
    }
}

async fn rewrite_documents(
    store: &EntryStore,
    step: &MigrationStep,
    conn: &mut SqliteConnection,
    batch_size: usize,
) -> Result<u64, MigrationError> {
    let limit = batch_size.max(1) as i64;
    let mut cursor = 0;
    let mut scanned = 0u64;
    let mut updated = 0u64;

    loop {
        let batch = store.fetch_batch(conn, cursor, limit).await?;
        let Some(last) = batch.last() else {
            break;
        };
        cursor = last.rowid;
        scanned += batch.len() as u64;

        for row in &batch {
            let mut doc: Value =
                serde_json::from_str(&row.data).map_err(|source| MigrationError::CorruptEntry {
                    collection: store.collection().to_string(),
                    id: row.id.clone(),
                    source,
                })?;
            if step.apply(&mut doc) {
                store.write_document(conn, &row.id, &doc).await?;
                updated += 1;
            }
        }

        tracing::debug!(
            "Rewriting '{}' for {}: {} scanned, {} updated",
            store.collection(),
            step,
            scanned,
            updated
        );
    }

    Ok(updated)
}

/// Runs `op` until it succeeds, fails permanently, or retries run out.
///
/// `op` must start from scratch on every call; it is expected to own its
/// transaction.
pub async fn retry_transient<T, E, F, Fut>(
    config: &MigrationConfig,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(err) if attempt < config.max_retries && is_transient(&err) => {
                let delay = config.retry_backoff_ms.saturating_mul(1 << attempt.min(16));
                attempt += 1;
                tracing::warn!(
                    "Transient failure (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    config.max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            result => return result,
        }
    }
}
