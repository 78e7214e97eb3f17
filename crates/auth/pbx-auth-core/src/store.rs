//! Durable token storage.
//!
//! The store is the source of truth for token state; the cookie cache is
//! reconciled from it. `InMemoryTokenStore` backs tests and single-process
//! setups, `FileTokenStore` persists records as a JSON file so tokens
//! survive restarts. A production deployment implements [`TokenStore`]
//! against the CRM's own database.

use crate::error::StoreError;
use crate::record::TokenRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Trait for durable token record storage, one record per user.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the record for a user, if any.
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Insert or replace the record for `record.user_id`. An update keeps
    /// the existing row's `created_at`.
    async fn upsert(&self, record: TokenRecord) -> Result<(), StoreError>;

    /// Remove the record for a user. Removing a missing record is not an
    /// error.
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}

/// In-memory implementation of [`TokenStore`].
pub struct InMemoryTokenStore {
    records: Arc<RwLock<HashMap<String, TokenRecord>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }

    async fn upsert(&self, mut record: TokenRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&record.user_id) {
            record.created_at = existing.created_at;
        }
        records.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.remove(user_id);
        Ok(())
    }
}

/// File-backed implementation of [`TokenStore`].
///
/// Keeps the full record map in memory and rewrites the state file on every
/// mutation, via a temp file and rename so a crash mid-write never leaves a
/// truncated file behind.
pub struct FileTokenStore {
    state_file: PathBuf,
    records: RwLock<HashMap<String, TokenRecord>>,
}

impl FileTokenStore {
    /// Open the store at `state_file`, loading any existing records.
    pub async fn open(state_file: impl AsRef<Path>) -> Result<Self, StoreError> {
        let state_file = state_file.as_ref().to_path_buf();

        if let Some(parent) = state_file.parent() {
            fs::create_dir_all(parent).await?;
        }

        let records = match fs::read_to_string(&state_file).await {
            Ok(contents) => {
                let records: HashMap<String, TokenRecord> = serde_json::from_str(&contents)?;
                info!(
                    count = records.len(),
                    path = %state_file.display(),
                    "loaded token records"
                );
                records
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %state_file.display(), "no token state file, starting empty");
                HashMap::new()
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            state_file,
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &HashMap<String, TokenRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.state_file.with_extension("tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.state_file).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(user_id).cloned())
    }

    async fn upsert(&self, mut record: TokenRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&record.user_id) {
            record.created_at = existing.created_at;
        }
        records.insert(record.user_id.clone(), record);
        self.persist(&records).await
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.remove(user_id).is_some() {
            self.persist(&records).await?;
        }
        Ok(())
    }
}
