use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// API key entry in config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    #[serde(skip_serializing)]
    pub key: String,
    pub user_id: String,
    /// Granted permissions, e.g. `schemas` and `collections`.
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Blob storage for image fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the blobs
    pub root: PathBuf,
    /// Base URL signed links are built from
    pub public_url: String,
    /// Secret used to sign links. Generated per process when unset.
    #[serde(skip_serializing)]
    pub signing_secret: Option<String>,
    /// Lifetime of signed links in seconds
    pub url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: data_dir().join("objects"),
            public_url: "http://localhost:8080".to_string(),
            signing_secret: None,
            url_ttl_secs: 3600,
        }
    }
}

/// Outgoing mail server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub pass: Option<String>,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Modulux".to_string()
}

/// Who hears about schema changes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub recipients: Vec<String>,
}

/// Tuning for entry migrations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Documents rewritten per batch when a change crosses an array
    pub batch_size: usize,
    /// Retries of a migration that failed on a busy or locked database
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt
    pub retry_backoff_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Config file the values were read from, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Port the HTTP server listens on
    pub port: u16,
    pub api_keys: Vec<ApiKeyEntry>,
    pub storage: StorageConfig,
    pub smtp: Option<SmtpConfig>,
    pub notify: NotifyConfig,
    pub migration: MigrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: None,
            database_path: data_dir().join("modulux.db"),
            port: 8080,
            api_keys: Vec::new(),
            storage: StorageConfig::default(),
            smtp: None,
            notify: NotifyConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

/// Default data directory: ~/.local/share/modulux
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modulux")
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Self::default();

        // Try to load from config file
        let path = config_path
            .or_else(|| std::env::var("MODULUX_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
            config.config_file = Some(path);
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(db_path) = std::env::var("MODULUX_DATABASE_PATH") {
            self.database_path = PathBuf::from(db_path);
        }
        if let Ok(port) = std::env::var("MODULUX_PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MODULUX_PORT", port))?;
        }
        if let Ok(root) = std::env::var("MODULUX_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(url) = std::env::var("MODULUX_PUBLIC_URL") {
            self.storage.public_url = url;
        }
        if let Ok(secret) = std::env::var("MODULUX_SIGNING_SECRET") {
            self.storage.signing_secret = Some(secret);
        }
        if let Ok(recipients) = std::env::var("MODULUX_NOTIFY_RECIPIENTS") {
            self.notify.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(host) = std::env::var("MODULUX_SMTP_HOST") {
            let from_email = std::env::var("MODULUX_SMTP_FROM")
                .map_err(|_| ConfigError::MissingValue("MODULUX_SMTP_FROM"))?;
            let port = match std::env::var("MODULUX_SMTP_PORT") {
                Ok(port) => port
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("MODULUX_SMTP_PORT", port))?,
                Err(_) => default_smtp_port(),
            };
            self.smtp = Some(SmtpConfig {
                host,
                port,
                user: std::env::var("MODULUX_SMTP_USER").ok(),
                pass: std::env::var("MODULUX_SMTP_PASS").ok(),
                from_email,
                from_name: default_from_name(),
            });
        }
        Ok(())
    }

    /// Default config file path: ~/.config/modulux/config.yaml
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modulux")
            .join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
    MissingValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::InvalidValue(var, value) => {
                write!(f, "Invalid value '{}' for {}", value, var)
            }
            ConfigError::MissingValue(var) => write!(f, "{} must be set", var),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database_path.to_string_lossy().contains("modulux.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.storage.url_ttl_secs, 3600);
        assert_eq!(config.migration.batch_size, 500);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_load_no_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nonexistent.yaml");

        let config = Config::load(Some(config_path)).unwrap();
        assert!(config.api_keys.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "database_path: /custom/path/db.sqlite").unwrap();
        writeln!(file, "api_keys:").unwrap();
        writeln!(file, "  - key: secret").unwrap();
        writeln!(file, "    user_id: admin").unwrap();
        writeln!(file, "    permissions: [schemas, collections]").unwrap();
        writeln!(file, "storage:").unwrap();
        writeln!(file, "  url_ttl_secs: 60").unwrap();
        writeln!(file, "smtp:").unwrap();
        writeln!(file, "  host: smtp.example.com").unwrap();
        writeln!(file, "  from_email: noreply@example.com").unwrap();

        let config = Config::load(Some(config_path.clone())).unwrap();
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(
            config.database_path,
            PathBuf::from("/custom/path/db.sqlite")
        );
        assert_eq!(config.api_keys.len(), 1);
        assert_eq!(config.api_keys[0].permissions, vec!["schemas", "collections"]);
        assert_eq!(config.storage.url_ttl_secs, 60);
        // Unset nested values keep their defaults
        assert_eq!(config.storage.public_url, "http://localhost:8080");
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from_name, "Modulux");
    }

    #[test]
    fn test_env_var_overrides_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "notify:").unwrap();
        writeln!(file, "  recipients: [file@example.com]").unwrap();

        // Set env var
        std::env::set_var("MODULUX_NOTIFY_RECIPIENTS", "a@example.com, b@example.com");

        let config = Config::load(Some(config_path)).unwrap();
        assert_eq!(
            config.notify.recipients,
            vec!["a@example.com", "b@example.com"]
        );

        // Clean up
        std::env::remove_var("MODULUX_NOTIFY_RECIPIENTS");
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut config = Config::default();
        config.storage.signing_secret = Some("hunter2".to_string());
        config.api_keys.push(ApiKeyEntry {
            key: "top-secret".to_string(),
            user_id: "admin".to_string(),
            permissions: vec![],
        });

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("top-secret"));
    }

    #[test]
    fn test_invalid_yaml_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "invalid: yaml: content: [").unwrap();

        let result = Config::load(Some(config_path));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
