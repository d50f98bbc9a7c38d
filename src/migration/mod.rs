//! Versioned schema migration: steps, plans and the runner that applies them.

pub mod builtin;
pub mod plan;
pub mod runner;
pub mod step;

pub use builtin::{LATEST_SCHEMA_VERSION, default_plan};
pub use plan::MigrationPlan;
pub use runner::{MigrationResult, MigrationRunner, RunState};
pub use step::{MigrationStep, StepHandler, StepOutcome, step_key};
