//! Blob storage for image fields.
//!
//! Blobs are addressed by key. Clients never see storage paths, only
//! time-limited signed URLs.
//!
//! ```text
//! <root>/
//!   <key segments...>
//! ```

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum ObjectStorageError {
    /// The key would escape the storage root or is otherwise unusable.
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("signing secret cannot be used as a MAC key")]
    InvalidSecret,

    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),
}

/// Signs and deletes blobs referenced from entries.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// A URL granting temporary read access to `key`.
    async fn signed_url(&self, key: &str) -> Result<String, ObjectStorageError>;

    /// Deletes `key`. Deleting a missing object succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), ObjectStorageError>;
}

/// Filesystem-backed storage with signed, expiring download links.
#[derive(Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_url: String,
    secret: String,
    ttl_secs: u64,
}

impl LocalObjectStorage {
    pub fn new(
        root: impl Into<PathBuf>,
        public_url: impl Into<String>,
        secret: impl Into<String>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
            ttl_secs,
        }
    }

    /// Builds the storage from config. Without a configured secret a random
    /// one is generated, so links don't survive a restart.
    pub fn from_config(config: &StorageConfig) -> Self {
        let secret = match &config.signing_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!("No signing secret configured, generating one for this process");
                generate_secret()
            }
        };
        Self::new(
            config.root.clone(),
            config.public_url.clone(),
            secret,
            config.url_ttl_secs,
        )
    }

    /// Validates that a key stays inside the storage root.
    pub fn validate_key(key: &str) -> Result<(), ObjectStorageError> {
        if key.is_empty() || key.contains('\\') || key.contains('\0') {
            return Err(ObjectStorageError::InvalidKey(key.to_string()));
        }
        let all_normal = Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !all_normal || key.split('/').any(str::is_empty) {
            return Err(ObjectStorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStorageError> {
        Self::validate_key(key)?;
        Ok(self.root.join(key))
    }

    /// HMAC-SHA256 over `key:expires`.
    fn mac(&self, key: &str, expires: i64) -> Result<Hmac<Sha256>, ObjectStorageError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|_| ObjectStorageError::InvalidSecret)?;
        mac.update(key.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    fn sign(&self, key: &str, expires: i64) -> Result<String, ObjectStorageError> {
        let tag = self.mac(key, expires)?.finalize().into_bytes();
        Ok(URL_SAFE_NO_PAD.encode(tag))
    }

    /// Signed URL expiring at the given unix timestamp.
    pub fn signed_url_at(&self, key: &str, expires: i64) -> Result<String, ObjectStorageError> {
        Self::validate_key(key)?;
        Ok(format!(
            "{}/files/{}?expires={}&signature={}",
            self.public_url,
            key.split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/"),
            expires,
            self.sign(key, expires)?
        ))
    }

    /// Checks a signature presented with a download request.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        if expires < chrono::Utc::now().timestamp() {
            return false;
        }
        if Self::validate_key(key).is_err() {
            return false;
        }
        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        // verify_slice compares in constant time
        match self.mac(key, expires) {
            Ok(mac) => mac.verify_slice(&signature).is_ok(),
            Err(_) => false,
        }
    }

    pub async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), ObjectStorageError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStorageError::Io(parent.to_path_buf(), e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ObjectStorageError::Io(path, e))
    }

    /// Reads a blob. Returns `None` if it doesn't exist.
    pub async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>, ObjectStorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ObjectStorageError::Io(path, e)),
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn signed_url(&self, key: &str) -> Result<String, ObjectStorageError> {
        let expires = chrono::Utc::now().timestamp() + self.ttl_secs as i64;
        self.signed_url_at(key, expires)
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjectStorageError> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ObjectStorageError::Io(path, e)),
        }
    }
}

impl std::fmt::Debug for LocalObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalObjectStorage")
            .field("root", &self.root)
            .field("public_url", &self.public_url)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// 32 random bytes, base64url encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
