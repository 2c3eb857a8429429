//! JSON file snapshot store for the device registry.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use pl_core::ports::{SnapshotStorePort, StorageError};
use pl_core::registry::{RegistrySnapshot, SNAPSHOT_VERSION};

pub const DEFAULT_SNAPSHOT_FILE: &str = "registry.json";

pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn with_defaults(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DEFAULT_SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_parent_dir(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStorePort for JsonSnapshotStore {
    async fn load(&self) -> Result<Option<RegistrySnapshot>, StorageError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let snapshot: RegistrySnapshot = serde_json::from_str(&content)
            .map_err(|e| StorageError::Format(format!("{}: {}", self.path.display(), e)))?;

        if snapshot.version > SNAPSHOT_VERSION {
            warn!(
                path = %self.path.display(),
                version = snapshot.version,
                "snapshot written by a newer version; loading known fields only"
            );
        }
        debug!(path = %self.path.display(), devices = snapshot.devices.len(), "loaded registry snapshot");
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StorageError> {
        self.ensure_parent_dir().await?;

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StorageError::Format(e.to_string()))?;

        // Readers never observe a partially written snapshot.
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), devices = snapshot.devices.len(), "saved registry snapshot");
        Ok(())
    }
}
