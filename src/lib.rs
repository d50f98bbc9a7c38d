// ============================================================================
// Phone Range Nexus: schema migration, backup and restore
// ============================================================================

pub mod backup;
pub mod cli;
pub mod config;
pub mod core;
pub mod journal;
pub mod ledger;
pub mod migration;
pub mod storage;
pub mod verify;

pub use backup::{BackupEngine, RestoreResult, Snapshot, SnapshotStore};
pub use config::NexusConfig;
pub use crate::core::{NexusError, Result, Row, SchemaVersion, TableName};
pub use ledger::VersionLedger;
pub use migration::{
    LATEST_SCHEMA_VERSION, MigrationPlan, MigrationResult, MigrationRunner, MigrationStep,
    RunState, StepHandler, StepOutcome, default_plan,
};
pub use storage::{FileStorage, InMemoryStorage, StorageEngine, TableTransaction};
pub use verify::{VerifyReport, Verifier};
