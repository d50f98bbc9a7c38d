//! Command surface shared by the binary and the integration tests.

use crate::backup::{BackupEngine, SnapshotStore};
use crate::config::NexusConfig;
use crate::core::SchemaVersion;
use crate::journal::{RunEvent, RunJournal, append_to_log};
use crate::migration::{MigrationRunner, default_plan};
use crate::storage::FileStorage;
use crate::verify::Verifier;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "phone-range-nexus")]
#[command(about = "Schema migration, backup and restore for the Phone Range Nexus store")]
pub struct Cli {
    /// Directory holding the store (overrides NEXUS_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory for snapshot files (overrides NEXUS_BACKUP_DIR)
    #[arg(long, global = true)]
    pub backup_dir: Option<PathBuf>,

    /// Append-only log file (overrides NEXUS_LOG_FILE)
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Back up the store, then migrate it to TARGET_VERSION (latest by default)
    Migrate { target_version: Option<SchemaVersion> },
    /// Write a snapshot of every table to the backup directory
    Backup,
    /// Replace the store's contents with a snapshot file
    Restore { file: PathBuf },
    /// Check the store against the latest schema
    Verify,
    /// Print a snapshot of the store as JSON
    Export {
        /// Write the snapshot to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> NexusConfig {
        let mut config = NexusConfig::from_env();
        if let Some(dir) = &self.data_dir {
            config = config.data_dir(dir);
        }
        if let Some(dir) = &self.backup_dir {
            config = config.backup_dir(dir);
        }
        if let Some(path) = &self.log_file {
            config = config.log_file(path);
        }
        config
    }
}

/// Final result of one command: what gets printed and how the process exits.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub report: Value,
}

impl CommandOutput {
    fn from_report<T: Serialize>(success: bool, report: &T) -> Result<Self> {
        Ok(Self {
            success,
            report: serde_json::to_value(report).context("Failed to encode command result")?,
        })
    }

    pub fn exit_code(&self) -> u8 {
        if self.success { 0 } else { 1 }
    }
}

/// Run one command against the store described by `config`.
///
/// The store is opened for the duration of the command and closed before
/// returning. Journal events are appended to the configured log file as
/// they are recorded.
pub async fn execute(config: &NexusConfig, command: &Command) -> Result<CommandOutput> {
    let store = FileStorage::open(&config.data_dir).with_context(|| {
        format!("Failed to open store in '{}'", config.data_dir.display())
    })?;
    let snapshots = SnapshotStore::new(config.resolved_backup_dir());
    let journal = RunJournal::with_log_file(config.resolved_log_file());

    let output = run_command(&store, &snapshots, config, command, journal).await?;

    store.close().await.context("Failed to close store")?;
    Ok(output)
}

async fn run_command(
    store: &FileStorage,
    snapshots: &SnapshotStore,
    config: &NexusConfig,
    command: &Command,
    mut journal: RunJournal,
) -> Result<CommandOutput> {
    let backup = BackupEngine::new(store, snapshots.clone());

    let output = match command {
        Command::Migrate { target_version } => {
            let plan = default_plan().context("Built-in migration plan is invalid")?;
            let target = target_version.unwrap_or(config.target_version);
            let result = MigrationRunner::new(store, backup, &plan)
                .with_journal(journal)
                .run(Some(target))
                .await;
            CommandOutput::from_report(result.success, &result)?
        }
        Command::Backup => {
            let report = backup.backup().await;
            match &report.backup_reference {
                Some(path) if report.success => journal.info(format!("Backup created: {}", path)),
                _ => journal.error(format!("Backup failed: {}", report.message)),
            }
            for table in &report.failed_tables {
                journal.warn(format!("Table {} could not be read and was backed up empty", table));
            }
            CommandOutput::from_report(report.success, &report)?
        }
        Command::Restore { file } => {
            journal.info(format!("Restoring from {}", file.display()));
            let result = backup.restore(file).await;
            for (table, count) in &result.per_table {
                journal.info(format!(
                    "Restored {}: {} row(s), {} failed",
                    table, count.restored, count.failed
                ));
            }
            if result.success {
                journal.info(result.message.clone());
            } else {
                journal.error(result.message.clone());
            }
            CommandOutput::from_report(result.success, &result)?
        }
        Command::Verify => {
            let report = Verifier::new(store, config.target_version)
                .verify(Some(snapshots))
                .await;
            if report.success {
                journal.info("Verification passed");
            } else {
                journal.error(format!("Verification failed: {}", report.issues.join("; ")));
            }
            CommandOutput::from_report(report.success, &report)?
        }
        Command::Export { out } => {
            let export = backup.export().await;
            for table in &export.failed_tables {
                journal.warn(format!("Table {} could not be read and was exported empty", table));
            }
            match out {
                Some(path) => {
                    let encoded = serde_json::to_string_pretty(&export.snapshot)
                        .context("Failed to encode snapshot")?;
                    fs::write(path, encoded)
                        .with_context(|| format!("Failed to write '{}'", path.display()))?;
                    journal.info(format!(
                        "Exported {} row(s) to {}",
                        export.snapshot.row_count(),
                        path.display()
                    ));
                    CommandOutput {
                        success: true,
                        report: json!({
                            "success": true,
                            "path": path.display().to_string(),
                            "row_count": export.snapshot.row_count(),
                            "failed_tables": export.failed_tables,
                        }),
                    }
                }
                None => {
                    journal.info(format!("Exported {} row(s)", export.snapshot.row_count()));
                    CommandOutput::from_report(true, &export.snapshot)?
                }
            }
        }
    };
    Ok(output)
}

/// Best-effort append of events recorded outside a journal, such as a
/// command that failed before it could start; a log failure never fails the
/// command.
pub fn record_events(config: &NexusConfig, events: &[RunEvent]) {
    let path = config.resolved_log_file();
    if let Err(e) = append_to_log(&path, events) {
        warn!(path = %path.display(), error = %e, "Could not append to log file");
    }
}
