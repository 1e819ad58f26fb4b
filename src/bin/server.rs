//! Modulux Server
//!
//! HTTP service for schema-driven content collections.
//!
//! # Configuration
//!
//! Environment variables:
//! - `MODULUX_CONFIG`: Path to config file (default: ~/.config/modulux/config.yaml)
//! - `MODULUX_PORT`: Port to listen on (default: 8080)
//! - `MODULUX_DATABASE_PATH`: SQLite database (default: ~/.local/share/modulux/modulux.db)
//! - `RUST_LOG`: Log filter (default: modulux=info,tower_http=info)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "admin"
//!     permissions: [schemas, collections]
//! storage:
//!   root: /var/lib/modulux/objects
//!   public_url: https://cms.example.com
//! notify:
//!   recipients: [editors@example.com]
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modulux::app::App;
use modulux::config::Config;
use modulux::server::{router, ApiKeyStore, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modulux=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(None)?;

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Object storage: {}", config.storage.root.display());

    let app = App::open(&config).await?;
    let state = AppState {
        app,
        api_keys: Arc::new(ApiKeyStore::from_entries(&config.api_keys)),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
