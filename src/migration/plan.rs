use super::step::{MigrationStep, step_key};
use crate::core::{NexusError, Result, SchemaVersion};
use std::collections::BTreeMap;

/// The ordered set of steps that can bring a store up to `latest_version`.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    latest_version: SchemaVersion,
    steps: BTreeMap<String, MigrationStep>,
}

impl MigrationPlan {
    /// Creates an empty plan whose newest schema version is `latest_version`.
    pub fn new(latest_version: SchemaVersion) -> Self {
        Self {
            latest_version,
            steps: BTreeMap::new(),
        }
    }

    pub fn latest_version(&self) -> SchemaVersion {
        self.latest_version
    }

    /// Registered steps, ordered by starting version.
    pub fn steps(&self) -> impl Iterator<Item = &MigrationStep> {
        let mut steps: Vec<&MigrationStep> = self.steps.values().collect();
        steps.sort_by_key(|step| step.from_version);
        steps.into_iter()
    }

    pub fn step(&self, key: &str) -> Option<&MigrationStep> {
        self.steps.get(key)
    }

    /// Adds a step, validating it immediately.
    ///
    /// Rejects steps that do not advance exactly one version, steps past
    /// `latest_version` and duplicate keys.
    pub fn add_step(&mut self, step: MigrationStep) -> Result<()> {
        let key = step.key();
        if step.to_version != step.from_version + 1 {
            return Err(NexusError::InvalidPlan(format!(
                "Migration step {} must advance exactly one version",
                key
            )));
        }
        if step.to_version > self.latest_version {
            return Err(NexusError::InvalidPlan(format!(
                "Migration step {} exceeds latest schema version {}",
                key, self.latest_version
            )));
        }
        if self.steps.contains_key(&key) {
            return Err(NexusError::InvalidPlan(format!(
                "Duplicate migration step {}",
                key
            )));
        }
        self.steps.insert(key, step);
        Ok(())
    }

    /// Fluent builder method to add a step.
    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Resolves the ordered steps from `from_version` up to `target`.
    ///
    /// Every intermediate key must be present; an empty chain is returned
    /// when `from_version >= target`.
    pub fn resolve_chain(
        &self,
        from_version: SchemaVersion,
        target: SchemaVersion,
    ) -> Result<Vec<&MigrationStep>> {
        if target > self.latest_version {
            return Err(NexusError::InvalidPlan(format!(
                "Target version {} is newer than latest schema version {}",
                target, self.latest_version
            )));
        }

        (from_version..target)
            .map(|version| {
                let key = step_key(version, version + 1);
                self.steps
                    .get(&key)
                    .ok_or(NexusError::MissingStep(key))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::step::{StepHandler, StepOutcome};
    use crate::storage::StorageEngine;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl StepHandler for Noop {
        async fn apply(&self, _: &dyn StorageEngine, _: SchemaVersion) -> Result<StepOutcome> {
            Ok(StepOutcome::clean())
        }
    }

    fn plan() -> MigrationPlan {
        MigrationPlan::new(3)
            .with_step(MigrationStep::new(1, "one", Noop))
            .unwrap()
            .with_step(MigrationStep::new(2, "two", Noop))
            .unwrap()
    }

    #[test]
    fn rejects_invalid_steps() {
        let mut plan = plan();
        assert!(plan.add_step(MigrationStep::new(3, "past latest", Noop)).is_err());
        assert!(plan.add_step(MigrationStep::new(2, "duplicate", Noop)).is_err());

        let mut jump = MigrationStep::new(0, "jump", Noop);
        jump.to_version = 2;
        assert!(matches!(plan.add_step(jump), Err(NexusError::InvalidPlan(_))));
    }

    #[test]
    fn resolves_ordered_chain() {
        let plan = plan();
        let keys: Vec<String> = plan
            .resolve_chain(1, 3)
            .unwrap()
            .iter()
            .map(|step| step.key())
            .collect();
        assert_eq!(keys, vec!["1-to-2", "2-to-3"]);
        assert!(plan.resolve_chain(3, 3).unwrap().is_empty());
        assert!(plan.resolve_chain(4, 3).unwrap().is_empty());
        assert!(plan.step("2-to-3").is_some());
    }

    #[test]
    fn gaps_and_overshoot_are_errors() {
        let plan = plan();
        assert!(matches!(
            plan.resolve_chain(0, 3),
            Err(NexusError::MissingStep(key)) if key == "0-to-1"
        ));
        assert!(matches!(
            plan.resolve_chain(1, 5),
            Err(NexusError::InvalidPlan(_))
        ));
    }
}
