//! Persistence of pairing credentials
//!
//! The session core only reads credentials; collaborators decide where they live.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::PairingCredential;

/// Credential store keyed by accessory pairing identifier
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credential for an accessory, if paired
    async fn load(&self, accessory_id: &str) -> Option<PairingCredential>;

    /// Insert or replace the credential for `credential.accessory_id`
    ///
    /// # Errors
    ///
    /// Returns error if storage fails
    async fn save(&mut self, credential: &PairingCredential) -> Result<(), StorageError>;

    /// Forget an accessory
    ///
    /// # Errors
    ///
    /// Returns error if removal fails
    async fn remove(&mut self, accessory_id: &str) -> Result<(), StorageError>;

    /// All stored accessory identifiers
    async fn list_devices(&self) -> Vec<String>;

    /// Record the address an accessory was last reached at
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the accessory is not stored.
    async fn update_address(
        &mut self,
        accessory_id: &str,
        address: SocketAddr,
    ) -> Result<(), StorageError> {
        let mut credential = self
            .load(accessory_id)
            .await
            .ok_or_else(|| StorageError::NotFound(accessory_id.to_string()))?;
        if credential.address == address {
            return Ok(());
        }
        credential.address = address;
        self.save(&credential).await
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no credential stored for {0}")]
    NotFound(String),
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    credentials: HashMap<String, PairingCredential>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStorage {
    async fn load(&self, accessory_id: &str) -> Option<PairingCredential> {
        self.credentials.get(accessory_id).cloned()
    }

    async fn save(&mut self, credential: &PairingCredential) -> Result<(), StorageError> {
        self.credentials
            .insert(credential.accessory_id.clone(), credential.clone());
        Ok(())
    }

    async fn remove(&mut self, accessory_id: &str) -> Result<(), StorageError> {
        self.credentials.remove(accessory_id);
        Ok(())
    }

    async fn list_devices(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }
}

/// JSON file credential store, rewritten on every change
pub struct FileStorage {
    path: PathBuf,
    cache: HashMap<String, PairingCredential>,
}

impl FileStorage {
    /// Open (or create) the store at `path`
    ///
    /// # Errors
    ///
    /// Returns error if directory cannot be created or file loaded
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cache = Self::load_all(&path).await?;
        tracing::debug!(
            "Loaded {} pairing credential(s) from {}",
            cache.len(),
            path.display()
        );

        Ok(Self { path, cache })
    }

    async fn load_all(path: &Path) -> Result<HashMap<String, PairingCredential>, StorageError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(HashMap::new());
        }

        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Ok(HashMap::new());
        }

        tokio::task::spawn_blocking(move || serde_json::from_slice(&bytes))
            .await
            .map_err(|e| StorageError::Serialization(format!("deserialization task failed: {e}")))?
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn save_all(&self) -> Result<(), StorageError> {
        let cache = self.cache.clone();

        let bytes = tokio::task::spawn_blocking(move || serde_json::to_vec_pretty(&cache))
            .await
            .map_err(|e| StorageError::Serialization(format!("serialization task failed: {e}")))?
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStorage {
    async fn load(&self, accessory_id: &str) -> Option<PairingCredential> {
        self.cache.get(accessory_id).cloned()
    }

    async fn save(&mut self, credential: &PairingCredential) -> Result<(), StorageError> {
        self.cache
            .insert(credential.accessory_id.clone(), credential.clone());
        self.save_all().await
    }

    async fn remove(&mut self, accessory_id: &str) -> Result<(), StorageError> {
        if self.cache.remove(accessory_id).is_some() {
            self.save_all().await?;
        }
        Ok(())
    }

    async fn list_devices(&self) -> Vec<String> {
        self.cache.keys().cloned().collect()
    }
}
