//! File io for the device id.

use anyhow::{Context, Result};
use std::path::Path;
use pl_core::DeviceId;

const DEVICE_ID_FILE: &str = "device_id.txt";

/// `Ok(None)` when the file is missing or empty.
pub(crate) fn load_from_disk(data_dir: &Path) -> Result<Option<DeviceId>> {
    let path = data_dir.join(DEVICE_ID_FILE);

    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("read device_id file failed: {}", path.display()))?;

    let id_str = content.trim();
    if id_str.is_empty() {
        return Ok(None);
    }

    uuid::Uuid::parse_str(id_str)
        .with_context(|| format!("invalid device_id UUID in file: {}", path.display()))?;

    Ok(Some(DeviceId::new(id_str)))
}

/// Write through a temp file and rename; fall back to a direct write when the
/// rename is refused (cross-device temp dirs).
pub(crate) fn save_to_disk(data_dir: &Path, id: &DeviceId) -> Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create data dir failed: {}", data_dir.display()))?;

    let path = data_dir.join(DEVICE_ID_FILE);
    let tmp_path = path.with_extension("txt.tmp");
    std::fs::write(&tmp_path, id.as_str())
        .with_context(|| format!("write temp device_id failed: {}", tmp_path.display()))?;

    if let Err(rename_err) = std::fs::rename(&tmp_path, &path) {
        std::fs::write(&path, id.as_str()).with_context(|| {
            format!(
                "direct write device_id failed after rename error ({}): {}",
                rename_err,
                path.display()
            )
        })?;
        let _ = std::fs::remove_file(&tmp_path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_dir_loads_none() {
        let dir = TempDir::new().unwrap();
        let result = load_from_disk(&dir.path().join("nope")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn empty_file_loads_none() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEVICE_ID_FILE), "  \n").unwrap();
        assert!(load_from_disk(dir.path()).unwrap().is_none());
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(DEVICE_ID_FILE), "not-a-uuid").unwrap();
        assert!(load_from_disk(dir.path()).is_err());
    }

    #[test]
    fn save_creates_nested_dir_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let id = DeviceId::generate();

        save_to_disk(&nested, &id).unwrap();

        assert_eq!(load_from_disk(&nested).unwrap(), Some(id));
        assert!(!nested.join("device_id.txt.tmp").exists());
    }
}
