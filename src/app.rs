//! Wiring of the services shared by the server and the CLI.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{init_db, StoreRegistry};
use crate::email::{EmailConfig, LogNotifier, Notifier, SmtpNotifier};
use crate::objects::LocalObjectStorage;
use crate::services::{CollectionRegistry, EntryService};

#[derive(Clone)]
pub struct App {
    pub pool: SqlitePool,
    pub collections: Arc<CollectionRegistry>,
    pub entries: Arc<EntryService>,
    pub files: Arc<LocalObjectStorage>,
}

impl App {
    /// Opens the configured database and builds the services.
    pub async fn open(config: &Config) -> Result<Self, sqlx::Error> {
        let pool = init_db(&config.database_path).await?;
        Ok(Self::new(pool, config))
    }

    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        let notifier: Arc<dyn Notifier> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpNotifier::new(EmailConfig::from_smtp(
                smtp,
                &config.storage.public_url,
            ))),
            None => Arc::new(LogNotifier),
        };
        Self::with_notifier(pool, config, notifier)
    }

    pub fn with_notifier(pool: SqlitePool, config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        let files = Arc::new(LocalObjectStorage::from_config(&config.storage));
        let stores = Arc::new(StoreRegistry::new(pool.clone()));

        let collections = Arc::new(CollectionRegistry::new(
            pool.clone(),
            stores.clone(),
            files.clone(),
            notifier,
            config.notify.clone(),
            config.migration.clone(),
        ));
        let entries = Arc::new(EntryService::new(
            collections.clone(),
            stores,
            files.clone(),
        ));

        Self {
            pool,
            collections,
            entries,
            files,
        }
    }
}
