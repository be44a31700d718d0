//! Mock storage implementations for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Result, StorageError, Swap, VersionStore};

/// Key type for version records: (handler, resource).
type VersionKey = (String, Vec<u8>);

/// A swap staged in a [`MockUnit`].
#[derive(Debug, Clone)]
struct PendingSwap {
    key: VersionKey,
    current: Vec<u8>,
    next: Vec<u8>,
}

/// Atomic unit for the mock store: business rows plus one staged swap,
/// applied together on commit.
#[derive(Debug, Default)]
pub struct MockUnit {
    swap: Option<PendingSwap>,
    rows: Vec<(String, Vec<u8>)>,
}

impl MockUnit {
    /// Stage a business row write.
    pub fn put_row(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.rows.push((key.into(), value.into()));
    }
}

/// Mock version store that keeps versions and business rows in memory.
#[derive(Default)]
pub struct MockVersionStore {
    versions: RwLock<HashMap<VersionKey, Vec<u8>>>,
    rows: RwLock<HashMap<String, Vec<u8>>>,
    fail_on_query: RwLock<bool>,
    fail_on_commit: RwLock<bool>,
}

impl MockVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    pub async fn set_fail_on_commit(&self, fail: bool) {
        *self.fail_on_commit.write().await = fail;
    }

    /// A committed business row.
    pub async fn row(&self, key: &str) -> Option<Vec<u8>> {
        self.rows.read().await.get(key).cloned()
    }

    /// Number of version records currently stored.
    pub async fn version_count(&self) -> usize {
        self.versions.read().await.len()
    }
}

#[async_trait]
impl VersionStore for MockVersionStore {
    type Unit = MockUnit;

    async fn query(&self, handler: &str, resource: &[u8]) -> Result<Vec<u8>> {
        if *self.fail_on_query.read().await {
            return Err(StorageError::Injected("query"));
        }
        let key = (handler.to_string(), resource.to_vec());
        Ok(self
            .versions
            .read()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn begin(&self) -> Result<Self::Unit> {
        Ok(MockUnit::default())
    }

    async fn compare_and_swap(
        &self,
        unit: &mut Self::Unit,
        handler: &str,
        resource: &[u8],
        current: &[u8],
        next: &[u8],
    ) -> Result<bool> {
        unit.swap = Some(PendingSwap {
            key: (handler.to_string(), resource.to_vec()),
            current: current.to_vec(),
            next: next.to_vec(),
        });
        Ok(true)
    }

    async fn commit(&self, unit: Self::Unit) -> Result<bool> {
        if *self.fail_on_commit.read().await {
            return Err(StorageError::Injected("commit"));
        }

        // Lock order: versions, then rows.
        let mut versions = self.versions.write().await;
        let mut rows = self.rows.write().await;

        if let Some(pending) = unit.swap {
            let stored = versions.get(&pending.key);
            let applied = match Swap::classify(&pending.current, &pending.next) {
                Swap::Insert { .. } | Swap::Absent => stored.is_none(),
                Swap::Update { current, .. } | Swap::Delete { current } => {
                    stored.map(Vec::as_slice) == Some(current)
                }
            };

            if !applied {
                return Ok(false);
            }

            if pending.next.is_empty() {
                // No-op for an absence check: there is nothing to remove.
                versions.remove(&pending.key);
            } else {
                versions.insert(pending.key, pending.next);
            }
        }

        rows.extend(unit.rows);
        Ok(true)
    }

    async fn rollback(&self, _unit: Self::Unit) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, handler: &str, resource: &[u8]) -> Result<()> {
        let key = (handler.to_string(), resource.to_vec());
        self.versions.write().await.remove(&key);
        Ok(())
    }

    async fn store(&self, handler: &str, resource: &[u8], version: &[u8]) -> Result<()> {
        let key = (handler.to_string(), resource.to_vec());
        let mut versions = self.versions.write().await;
        if version.is_empty() {
            versions.remove(&key);
        } else {
            versions.insert(key, version.to_vec());
        }
        Ok(())
    }

    async fn provision(&self) -> Result<()> {
        Ok(())
    }

    async fn deprovision(&self) -> Result<()> {
        self.versions.write().await.clear();
        Ok(())
    }
}
