//! Consistency check of a store against the table registry and the latest
//! schema version.

use crate::backup::SnapshotStore;
use crate::core::{SchemaVersion, TableName};
use crate::ledger::VersionLedger;
use crate::storage::StorageEngine;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub success: bool,
    pub current_version: SchemaVersion,
    pub target_version: SchemaVersion,
    pub tables: BTreeMap<TableName, usize>,
    pub latest_backup: Option<String>,
    pub issues: Vec<String>,
}

pub struct Verifier<'a> {
    store: &'a dyn StorageEngine,
    target_version: SchemaVersion,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a dyn StorageEngine, target_version: SchemaVersion) -> Self {
        Self {
            store,
            target_version,
        }
    }

    /// Checks the ledger, the presence of every table expected at the current
    /// version, row shapes and key uniqueness, and (when given) that the
    /// newest snapshot can be read back.
    pub async fn verify(&self, snapshots: Option<&SnapshotStore>) -> VerifyReport {
        let mut issues = Vec::new();

        let reading = VersionLedger::new(self.store).read().await;
        if reading.degraded {
            issues.push("schema version could not be read".to_string());
        } else if reading.version < self.target_version {
            issues.push(format!(
                "store is at version {}, expected {}; run migrate",
                reading.version, self.target_version
            ));
        } else if reading.version > self.target_version {
            issues.push(format!(
                "store is at version {}, newer than this build supports ({})",
                reading.version, self.target_version
            ));
        }

        let mut tables = BTreeMap::new();
        for table in TableName::ALL {
            let expected = table.descriptor().introduced_in <= reading.version;
            match self.store.scan_table(table).await {
                Ok(rows) => {
                    let descriptor = table.descriptor();
                    let mut keys = HashSet::new();
                    let mut malformed = 0;
                    let mut duplicates = 0;
                    for row in &rows {
                        if descriptor.validate(row).is_err() {
                            malformed += 1;
                        } else if !keys.insert(row[descriptor.key_field].to_string()) {
                            duplicates += 1;
                        }
                    }
                    if malformed > 0 {
                        issues.push(format!("{}: {} malformed row(s)", table, malformed));
                    }
                    if duplicates > 0 {
                        issues.push(format!("{}: {} duplicate key(s)", table, duplicates));
                    }
                    tables.insert(table, rows.len());
                }
                Err(_) if !expected => {}
                Err(e) => issues.push(format!("{}: {}", table, e)),
            }
        }

        let mut latest_backup = None;
        if let Some(snapshots) = snapshots {
            match snapshots.latest() {
                Ok(Some(path)) => {
                    if let Err(e) = SnapshotStore::read(&path) {
                        issues.push(format!("latest backup is unreadable: {}", e));
                    }
                    latest_backup = Some(path.display().to_string());
                }
                Ok(None) => {}
                Err(e) => issues.push(format!("backup directory: {}", e)),
            }
        }

        for issue in &issues {
            warn!(issue = %issue, "Verification issue");
        }
        let success = issues.is_empty();
        info!(success, version = reading.version, "Verification finished");

        VerifyReport {
            success,
            current_version: reading.version,
            target_version: self.target_version,
            tables,
            latest_backup,
            issues,
        }
    }
}
