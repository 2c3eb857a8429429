use anyhow::Context;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "peerlink";
const PROFILE_ENV: &str = "PEERLINK_PROFILE";

/// `peerlink`, or `peerlink-<profile>` so several instances can share a host.
fn app_dir_name(profile: Option<&str>) -> String {
    match profile {
        Some(profile) if !profile.is_empty() => format!("{APP_DIR_NAME}-{profile}"),
        _ => APP_DIR_NAME.to_string(),
    }
}

/// `<platform data-local dir>/peerlink[-<PEERLINK_PROFILE>]`.
pub fn default_data_dir() -> anyhow::Result<PathBuf> {
    let profile = std::env::var(PROFILE_ENV).ok();
    let base = dirs::data_local_dir().context("No local data directory on this platform")?;
    Ok(base.join(app_dir_name(profile.as_deref())))
}

/// Relative paths from the config file are relative to the data directory.
pub fn resolve_in(data_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_suffixes_the_directory_name() {
        assert_eq!(app_dir_name(None), "peerlink");
        assert_eq!(app_dir_name(Some("")), "peerlink");
        assert_eq!(app_dir_name(Some("peer-b")), "peerlink-peer-b");
    }

    #[test]
    fn relative_paths_resolve_against_data_dir() {
        let data_dir = Path::new("/var/lib/peerlink");
        assert_eq!(
            resolve_in(data_dir, Path::new("registry.json")),
            PathBuf::from("/var/lib/peerlink/registry.json")
        );
        assert_eq!(
            resolve_in(data_dir, Path::new("/tmp/registry.json")),
            PathBuf::from("/tmp/registry.json")
        );
    }
}
