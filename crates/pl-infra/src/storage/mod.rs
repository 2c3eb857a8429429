mod json_snapshot;

pub use json_snapshot::{JsonSnapshotStore, DEFAULT_SNAPSHOT_FILE};
