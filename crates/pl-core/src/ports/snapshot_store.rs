use async_trait::async_trait;

use super::StorageError;
use crate::registry::RegistrySnapshot;

/// Persistence collaborator for the registry snapshot.
#[async_trait]
pub trait SnapshotStorePort: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<RegistrySnapshot>, StorageError>;

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StorageError>;
}
