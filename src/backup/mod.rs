//! Snapshot export, durable backup files and restore.

pub mod engine;
pub mod snapshot;

pub use engine::{BackupEngine, BackupReport, Export, RestoreResult, TableRestoreCount};
pub use snapshot::{SNAPSHOT_FORMAT_VERSION, Snapshot, SnapshotStore};
