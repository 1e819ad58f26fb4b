#![allow(dead_code)]

use serde_json::{Map, Value};
use tempfile::TempDir;

use modulux::app::App;
use modulux::config::{ApiKeyEntry, Config};
use modulux::db::init_db;

pub struct TestContext {
    pub app: App,
    pub config: Config,
    _temp_dir: TempDir, // Keep alive for duration of test
}

pub async fn setup() -> TestContext {
    let temp_dir = TempDir::new().unwrap();

    let mut config = Config {
        database_path: temp_dir.path().join("test.db"),
        ..Config::default()
    };
    config.storage.root = temp_dir.path().join("objects");
    config.storage.public_url = "http://cms.test".to_string();
    config.storage.signing_secret = Some("test-secret".to_string());
    config.migration.batch_size = 2;
    config.api_keys = vec![
        ApiKeyEntry {
            key: "admin-key".to_string(),
            user_id: "admin".to_string(),
            permissions: vec!["schemas".to_string(), "collections".to_string()],
        },
        ApiKeyEntry {
            key: "editor-key".to_string(),
            user_id: "editor".to_string(),
            permissions: vec!["collections".to_string()],
        },
    ];

    let pool = init_db(&config.database_path).await.unwrap();
    let app = App::new(pool, &config);

    TestContext {
        app,
        config,
        _temp_dir: temp_dir,
    }
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

pub fn schema(value: Value) -> modulux::schema::CollectionSchema {
    serde_json::from_value(value).unwrap()
}

/// An entry value without its `_id`.
pub fn without_id(mut entry: Value) -> Value {
    if let Value::Object(map) = &mut entry {
        map.remove("_id");
    }
    entry
}

pub fn id_of(entry: &Value) -> String {
    entry["_id"].as_str().unwrap().to_string()
}
