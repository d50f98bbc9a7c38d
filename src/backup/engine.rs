use super::snapshot::{Snapshot, SnapshotStore};
use crate::core::{NexusError, Result, Row, TableName};
use crate::ledger::VersionLedger;
use crate::storage::StorageEngine;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Snapshot plus the tables whose fetch failed while building it.
#[derive(Debug, Clone)]
pub struct Export {
    pub snapshot: Snapshot,
    pub failed_tables: Vec<TableName>,
}

/// Result of a standalone `backup`.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub success: bool,
    pub message: String,
    pub backup_reference: Option<String>,
    pub schema_version: Option<u32>,
    pub row_count: usize,
    pub failed_tables: Vec<TableName>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableRestoreCount {
    pub restored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub message: String,
    pub per_table: BTreeMap<TableName, TableRestoreCount>,
    /// Snapshot tables this build does not know, left untouched.
    pub skipped_tables: Vec<String>,
    /// Ledger version after the restore; `None` when it could not be written.
    pub schema_version: Option<u32>,
}

impl RestoreResult {
    fn aborted(message: String) -> Self {
        Self {
            success: false,
            message,
            per_table: BTreeMap::new(),
            skipped_tables: Vec::new(),
            schema_version: None,
        }
    }

    pub fn total_restored(&self) -> usize {
        self.per_table.values().map(|c| c.restored).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.per_table.values().map(|c| c.failed).sum()
    }
}

/// Exports a store into snapshots and reloads snapshots into a store.
pub struct BackupEngine<'a> {
    store: &'a dyn StorageEngine,
    snapshots: SnapshotStore,
}

impl<'a> BackupEngine<'a> {
    pub fn new(store: &'a dyn StorageEngine, snapshots: SnapshotStore) -> Self {
        Self { store, snapshots }
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub async fn export_all(&self) -> Snapshot {
        self.export().await.snapshot
    }

    /// Fetch every registered table and assemble a snapshot.
    ///
    /// Tables are fetched concurrently. A table that does not exist yet is
    /// left out; a table whose fetch fails is recorded as empty and reported
    /// in `failed_tables`, and the remaining tables are still exported.
    pub async fn export(&self) -> Export {
        let reading = VersionLedger::new(self.store).read().await;
        let captured_at = Utc::now();

        let fetches = TableName::ALL.map(|table| async move {
            (table, self.store.scan_table(table).await)
        });

        let mut tables = BTreeMap::new();
        let mut failed_tables = Vec::new();
        for (table, fetched) in join_all(fetches).await {
            match fetched {
                Ok(rows) => {
                    debug!(table = %table, rows = rows.len(), "Exported table");
                    tables.insert(table, rows);
                }
                Err(NexusError::TableNotFound(_)) => {
                    debug!(table = %table, "Table not present, skipping export");
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Failed to export table, recording it as empty");
                    tables.insert(table, Vec::new());
                    failed_tables.push(table);
                }
            }
        }

        let schema_version = (!reading.degraded).then_some(reading.version);
        Export {
            snapshot: Snapshot::new(captured_at, schema_version, tables),
            failed_tables,
        }
    }

    pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let path = self.snapshots.write(snapshot)?;
        info!(path = %path.display(), rows = snapshot.row_count(), "Snapshot written");
        Ok(path)
    }

    /// Export and write in one go.
    pub async fn backup(&self) -> BackupReport {
        let export = self.export().await;
        let row_count = export.snapshot.row_count();
        let schema_version = export.snapshot.schema_version();

        match self.write_snapshot(&export.snapshot) {
            Ok(path) => BackupReport {
                success: true,
                message: if export.failed_tables.is_empty() {
                    "Backup completed successfully".to_string()
                } else {
                    format!(
                        "Backup completed with {} table(s) recorded empty after fetch errors",
                        export.failed_tables.len()
                    )
                },
                backup_reference: Some(path.display().to_string()),
                schema_version,
                row_count,
                failed_tables: export.failed_tables,
            },
            Err(e) => {
                error!(error = %e, "Backup failed");
                BackupReport {
                    success: false,
                    message: e.to_string(),
                    backup_reference: None,
                    schema_version,
                    row_count,
                    failed_tables: export.failed_tables,
                }
            }
        }
    }

    /// Reload the snapshot at `path`, replacing the store's contents.
    ///
    /// Tables are processed one at a time: clear and reload happen inside a
    /// single table transaction, committed before the next table starts.
    /// Every row is inserted independently, so one bad row only counts as a
    /// failure for itself.
    ///
    /// The ledger is then reset to the snapshot's schema version. A snapshot
    /// without one resets it to 0, so the next `migrate` re-applies every
    /// step over the restored data. When a table could not be restored it
    /// keeps its previous contents, and the ledger is reset to the lower of
    /// the snapshot's and the store's versions instead.
    pub async fn restore<P: AsRef<Path>>(&self, path: P) -> RestoreResult {
        let path = path.as_ref();
        let snapshot = match SnapshotStore::read(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Restore aborted");
                return RestoreResult::aborted(e.to_string());
            }
        };
        info!(
            path = %path.display(),
            captured_at = %snapshot.captured_at(),
            rows = snapshot.row_count(),
            "Restoring snapshot"
        );

        let mut skipped_tables = Vec::new();
        for name in snapshot.tables().keys() {
            if name.parse::<TableName>().is_err() {
                warn!(table = %name, "Snapshot table is not registered, skipping");
                skipped_tables.push(name.clone());
            }
        }

        let ledger = VersionLedger::new(self.store);
        let version_before = ledger.read().await.version;

        let mut per_table = BTreeMap::new();
        let mut table_errors = Vec::new();
        for table in TableName::ALL {
            let rows: &[Row] = match snapshot.rows(table) {
                Some(rows) => rows,
                None => {
                    if !self.store.table_exists(table).await.unwrap_or(false) {
                        continue;
                    }
                    &[]
                }
            };

            let count = match self.restore_table(table, rows).await {
                Ok(count) => count,
                Err(e) => {
                    error!(table = %table, error = %e, "Failed to restore table");
                    table_errors.push(format!("{}: {}", table, e));
                    TableRestoreCount {
                        restored: 0,
                        failed: rows.len(),
                    }
                }
            };
            info!(table = %table, restored = count.restored, failed = count.failed, "Table restored");
            per_table.insert(table, count);
        }

        let mut version = snapshot.schema_version().unwrap_or_else(|| {
            warn!("Snapshot carries no schema version, resetting the ledger to 0");
            0
        });
        if !table_errors.is_empty() && version_before < version {
            warn!(
                snapshot_version = version,
                version_before, "Restore incomplete, keeping the ledger at the store's version"
            );
            version = version_before;
        }
        let mut schema_version = None;
        match ledger.reset(version).await {
            Ok(()) => schema_version = Some(version),
            Err(e) => table_errors.push(format!("version ledger: {}", e)),
        }

        let failed_rows: usize = per_table.values().map(|c| c.failed).sum();
        let success = table_errors.is_empty() && failed_rows == 0;
        let message = if success {
            "Restore completed successfully".to_string()
        } else if table_errors.is_empty() {
            format!("Restore completed with {} failed row(s)", failed_rows)
        } else {
            format!("Restore incomplete: {}", table_errors.join("; "))
        };

        RestoreResult {
            success,
            message,
            per_table,
            skipped_tables,
            schema_version,
        }
    }

    async fn restore_table(&self, table: TableName, rows: &[Row]) -> Result<TableRestoreCount> {
        self.store.create_table(table).await?;
        let mut tx = self.store.begin(table).await?;
        tx.clear();

        let mut count = TableRestoreCount::default();
        for row in rows {
            match tx.insert(row.clone()) {
                Ok(()) => count.restored += 1,
                Err(e) => {
                    warn!(table = %table, error = %e, "Skipping row during restore");
                    count.failed += 1;
                }
            }
        }

        self.store.commit(tx).await?;
        Ok(count)
    }
}
