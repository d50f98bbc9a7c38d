use crate::core::{Result, SchemaVersion};
use crate::storage::StorageEngine;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Body of a migration step.
///
/// Handlers must be safe to run more than once against the same store: if a
/// run fails after a handler did part of its work, the next run starts from
/// the same version and calls it again. Create-if-missing and
/// insert-if-absent are the expected building blocks.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// `from_version` is the version the store is being migrated from.
    async fn apply(&self, store: &dyn StorageEngine, from_version: SchemaVersion)
    -> Result<StepOutcome>;
}

/// What a successful step has to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub warnings: Vec<String>,
}

impl StepOutcome {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// A named transformation from one schema version to the next.
#[derive(Clone)]
pub struct MigrationStep {
    pub from_version: SchemaVersion,
    pub to_version: SchemaVersion,
    pub name: String,
    pub description: String,
    pub(crate) handler: Arc<dyn StepHandler>,
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

impl MigrationStep {
    /// Step from `from_version` to `from_version + 1`.
    pub fn new<H>(from_version: SchemaVersion, name: impl Into<String>, handler: H) -> Self
    where
        H: StepHandler + 'static,
    {
        Self {
            from_version,
            to_version: from_version + 1,
            name: name.into(),
            description: String::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Lookup key, `"{from}-to-{to}"`.
    pub fn key(&self) -> String {
        step_key(self.from_version, self.to_version)
    }

    pub async fn apply(&self, store: &dyn StorageEngine) -> Result<StepOutcome> {
        self.handler.apply(store, self.from_version).await
    }
}

pub fn step_key(from: SchemaVersion, to: SchemaVersion) -> String {
    format!("{}-to-{}", from, to)
}
