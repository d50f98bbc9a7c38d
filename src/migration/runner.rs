use super::plan::MigrationPlan;
use crate::backup::BackupEngine;
use crate::core::SchemaVersion;
use crate::journal::{RunEvent, RunJournal};
use crate::ledger::VersionLedger;
use crate::storage::StorageEngine;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Where a run is (or stopped) on the version line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "version", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    BackingUp,
    /// Applying the step that produces this version
    RunningStep(SchemaVersion),
    Completed,
    /// Stopped with the ledger at this version
    Failed(SchemaVersion),
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    pub run_id: Uuid,
    pub success: bool,
    pub message: String,
    /// Path of the snapshot taken before the run; `None` only when writing it failed.
    pub backup_reference: Option<String>,
    pub duration_seconds: f64,
    pub version_before: SchemaVersion,
    pub version_after: SchemaVersion,
    pub target_version: SchemaVersion,
    pub steps_completed: usize,
    pub steps_warned: usize,
    pub steps_failed: usize,
    pub state: RunState,
    #[serde(skip)]
    pub events: Vec<RunEvent>,
}

/// Drives one migration run against a single store.
///
/// The store is assumed to be owned by this run for its whole duration;
/// concurrent runs against the same store must be prevented by the caller.
pub struct MigrationRunner<'a> {
    store: &'a dyn StorageEngine,
    backup: BackupEngine<'a>,
    plan: &'a MigrationPlan,
    journal: RunJournal,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(
        store: &'a dyn StorageEngine,
        backup: BackupEngine<'a>,
        plan: &'a MigrationPlan,
    ) -> Self {
        Self {
            store,
            backup,
            plan,
            journal: RunJournal::new(),
        }
    }

    /// Record the run's events into `journal`, e.g. one writing through to
    /// the operator log file.
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Run to `target` (the plan's latest version when `None`).
    ///
    /// A snapshot is always written first, even when nothing needs to run.
    /// Steps are applied strictly in order; the ledger advances after each
    /// successful step and the run stops at the first failure without
    /// undoing earlier steps.
    pub async fn run(mut self, target: Option<SchemaVersion>) -> MigrationResult {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let plan = self.plan;
        let target = target.unwrap_or(plan.latest_version());
        let ledger = VersionLedger::new(self.store);

        self.journal
            .info(format!("Migration run {} started, target version {}", run_id, target));

        enter(RunState::BackingUp);
        let export = self.backup.export().await;
        for table in &export.failed_tables {
            self.journal
                .warn(format!("Table {} could not be read and was backed up empty", table));
        }
        let backup_reference = match self.backup.write_snapshot(&export.snapshot) {
            Ok(path) => {
                let path = path.display().to_string();
                self.journal.info(format!("Backup created: {}", path));
                path
            }
            Err(e) => {
                let version = export.snapshot.schema_version().unwrap_or(0);
                self.journal.error(format!("Backup failed: {}", e));
                return self.finish(Summary {
                    run_id,
                    started,
                    success: false,
                    message: format!("Migration aborted, no backup could be written: {}", e),
                    backup_reference: None,
                    version_before: version,
                    version_after: version,
                    target,
                    counts: StepCounts::default(),
                    state: RunState::Failed(version),
                });
            }
        };

        let reading = ledger.read().await;
        let before = reading.version;
        if reading.degraded {
            self.journal
                .error("Current schema version could not be read, refusing to migrate");
            return self.finish(Summary {
                run_id,
                started,
                success: false,
                message: "Migration aborted, current schema version is unknown".to_string(),
                backup_reference: Some(backup_reference),
                version_before: before,
                version_after: before,
                target,
                counts: StepCounts::default(),
                state: RunState::Failed(before),
            });
        }

        if before >= target {
            self.journal.info(format!(
                "No migration needed, store at version {} (target {})",
                before, target
            ));
            return self.finish(Summary {
                run_id,
                started,
                success: true,
                message: "No migration needed".to_string(),
                backup_reference: Some(backup_reference),
                version_before: before,
                version_after: before,
                target,
                counts: StepCounts::default(),
                state: RunState::Completed,
            });
        }

        let chain = match plan.resolve_chain(before, target) {
            Ok(chain) => chain,
            Err(e) => {
                self.journal.error(format!("Cannot plan migration: {}", e));
                return self.finish(Summary {
                    run_id,
                    started,
                    success: false,
                    message: e.to_string(),
                    backup_reference: Some(backup_reference),
                    version_before: before,
                    version_after: before,
                    target,
                    counts: StepCounts::default(),
                    state: RunState::Failed(before),
                });
            }
        };

        let mut counts = StepCounts::default();
        let mut current = before;
        for step in chain {
            let key = step.key();
            enter(RunState::RunningStep(step.to_version));
            self.journal
                .info(format!("Starting migration step {}: {}", key, step.name));

            let outcome = match step.apply(self.store).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    counts.failed += 1;
                    self.journal
                        .error(format!("Migration step {} failed: {}", key, e));
                    return self.finish(Summary {
                        run_id,
                        started,
                        success: false,
                        message: format!("Migration failed at step {}: {}", key, e),
                        backup_reference: Some(backup_reference),
                        version_before: before,
                        version_after: current,
                        target,
                        counts,
                        state: RunState::Failed(current),
                    });
                }
            };

            if let Err(e) = ledger.advance(step.to_version).await {
                counts.failed += 1;
                self.journal.error(format!(
                    "Migration step {} applied but the version could not be recorded: {}",
                    key, e
                ));
                return self.finish(Summary {
                    run_id,
                    started,
                    success: false,
                    message: format!("Migration failed recording step {}: {}", key, e),
                    backup_reference: Some(backup_reference),
                    version_before: before,
                    version_after: current,
                    target,
                    counts,
                    state: RunState::Failed(current),
                });
            }
            current = step.to_version;

            for warning in &outcome.warnings {
                self.journal.warn(format!("{}: {}", key, warning));
            }
            if outcome.warnings.is_empty() {
                counts.completed += 1;
            } else {
                counts.warned += 1;
            }
            self.journal.info(format!(
                "Completed migration step {}, schema version is now {}",
                key, current
            ));
        }

        self.finish(Summary {
            run_id,
            started,
            success: true,
            message: "Migration completed successfully".to_string(),
            backup_reference: Some(backup_reference),
            version_before: before,
            version_after: current,
            target,
            counts,
            state: RunState::Completed,
        })
    }

    fn finish(mut self, summary: Summary) -> MigrationResult {
        enter(summary.state);
        self.journal.info(format!(
            "Migration run finished: version {} -> {}, {} completed, {} warned, {} failed, backup {}",
            summary.version_before,
            summary.version_after,
            summary.counts.completed,
            summary.counts.warned,
            summary.counts.failed,
            summary.backup_reference.as_deref().unwrap_or("none"),
        ));

        MigrationResult {
            run_id: summary.run_id,
            success: summary.success,
            message: summary.message,
            backup_reference: summary.backup_reference,
            duration_seconds: summary.started.elapsed().as_secs_f64(),
            version_before: summary.version_before,
            version_after: summary.version_after,
            target_version: summary.target,
            steps_completed: summary.counts.completed,
            steps_warned: summary.counts.warned,
            steps_failed: summary.counts.failed,
            state: summary.state,
            events: self.journal.into_events(),
        }
    }
}

fn enter(state: RunState) {
    debug!(state = ?state, "Migration state change");
}

#[derive(Debug, Clone, Copy, Default)]
struct StepCounts {
    completed: usize,
    warned: usize,
    failed: usize,
}

struct Summary {
    run_id: Uuid,
    started: Instant,
    success: bool,
    message: String,
    backup_reference: Option<String>,
    version_before: SchemaVersion,
    version_after: SchemaVersion,
    target: SchemaVersion,
    counts: StepCounts,
    state: RunState,
}
