use crate::core::{NexusError, Result, Row, SchemaVersion, TableName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const SNAPSHOT_PREFIX: &str = "backup-";
const SNAPSHOT_EXTENSION: &str = "json";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Point-in-time export of every registered table.
///
/// A snapshot is built once by [`BackupEngine`](super::BackupEngine) and
/// only read afterwards. Table names are kept as plain strings so files
/// written by other tools (or holding tables this build no longer knows) can
/// still be loaded; restore decides what to do with unknown names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    version: u32,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_version: Option<SchemaVersion>,
    tables: BTreeMap<String, Vec<Row>>,
}

impl Snapshot {
    pub fn new(
        captured_at: DateTime<Utc>,
        schema_version: Option<SchemaVersion>,
        tables: BTreeMap<TableName, Vec<Row>>,
    ) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            timestamp: captured_at,
            schema_version,
            tables: tables
                .into_iter()
                .map(|(name, rows)| (name.as_str().to_string(), rows))
                .collect(),
        }
    }

    pub fn format_version(&self) -> u32 {
        self.version
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Ledger version of the store when the snapshot was taken.
    pub fn schema_version(&self) -> Option<SchemaVersion> {
        self.schema_version
    }

    pub fn tables(&self) -> &BTreeMap<String, Vec<Row>> {
        &self.tables
    }

    pub fn rows(&self, table: TableName) -> Option<&[Row]> {
        self.tables.get(table.as_str()).map(Vec::as_slice)
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// Directory of snapshot files. Files are only ever created, never replaced.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Durably write `snapshot` under a new timestamped name and return its path.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            NexusError::SnapshotWrite(format!(
                "Failed to create backup directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut temp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| NexusError::SnapshotWrite(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, snapshot)
                .map_err(|e| NexusError::SnapshotWrite(format!("Failed to serialize snapshot: {}", e)))?;
            writer
                .flush()
                .map_err(|e| NexusError::SnapshotWrite(format!("Failed to flush snapshot: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| NexusError::SnapshotWrite(format!("Failed to sync snapshot: {}", e)))?;

        let stamp = snapshot.captured_at().format("%Y%m%dT%H%M%S%.3fZ");
        for seq in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(format!(
                "{}{}-{:03}.{}",
                SNAPSHOT_PREFIX, stamp, seq, SNAPSHOT_EXTENSION
            ));
            match temp.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => temp = e.file,
                Err(e) => {
                    return Err(NexusError::SnapshotWrite(format!(
                        "Failed to persist snapshot '{}': {}",
                        path.display(),
                        e.error
                    )));
                }
            }
        }

        Err(NexusError::SnapshotWrite(format!(
            "No free snapshot name for {} in '{}'",
            stamp,
            self.dir.display()
        )))
    }

    /// Load a snapshot from any path.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            NexusError::SnapshotRead(format!("Failed to open '{}': {}", path.display(), e))
        })?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            NexusError::SnapshotRead(format!("Failed to parse '{}': {}", path.display(), e))
        })?;

        if snapshot.version > SNAPSHOT_FORMAT_VERSION {
            return Err(NexusError::SnapshotRead(format!(
                "'{}' uses snapshot format {}, newest supported is {}",
                path.display(),
                snapshot.version,
                SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(snapshot)
    }

    /// Snapshot files in this directory, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_snapshot = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    name.starts_with(SNAPSHOT_PREFIX)
                        && name.ends_with(&format!(".{}", SNAPSHOT_EXTENSION))
                });
            if is_snapshot {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list()?.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample() -> Snapshot {
        let mut tables = BTreeMap::new();
        tables.insert(TableName::PhoneNumbers, vec![json!({"id": "n1"})]);
        tables.insert(TableName::AuditLog, Vec::new());
        Snapshot::new(Utc::now(), Some(2), tables)
    }

    #[test]
    fn file_uses_documented_top_level_keys() {
        let value = serde_json::to_value(sample()).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["version"], json!(SNAPSHOT_FORMAT_VERSION));
        assert!(object["timestamp"].is_string());
        assert_eq!(object["tables"]["phone_numbers"][0]["id"], "n1");
        assert_eq!(object["tables"]["audit_log"], json!([]));
    }

    #[test]
    fn same_timestamp_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snapshot = sample();

        let first = store.write(&snapshot).unwrap();
        let second = store.write(&snapshot).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list().unwrap(), vec![first.clone(), second.clone()]);
        assert_eq!(store.latest().unwrap(), Some(second));
        assert_eq!(SnapshotStore::read(&first).unwrap(), snapshot);
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(
            &path,
            r#"{"version": 99, "timestamp": "2026-01-01T00:00:00Z", "tables": {}}"#,
        )
        .unwrap();
        assert!(matches!(
            SnapshotStore::read(&path),
            Err(NexusError::SnapshotRead(_))
        ));
    }

    #[test]
    fn unwritable_directory_is_a_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let store = SnapshotStore::new(&blocker);
        assert!(matches!(
            store.write(&sample()),
            Err(NexusError::SnapshotWrite(_))
        ));
    }
}
