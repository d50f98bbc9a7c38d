//! Built-in schema history of the Phone Range Nexus store.
//!
//! | step     | effect                                            |
//! |----------|---------------------------------------------------|
//! | `0-to-1` | core inventory tables                             |
//! | `1-to-2` | `system_config` table                             |
//! | `2-to-3` | default settings rows                             |
//! | `3-to-4` | UC admin tables and default UC presets            |

use super::plan::MigrationPlan;
use super::step::{MigrationStep, StepHandler, StepOutcome};
use crate::core::{Result, Row, SchemaVersion, TableName};
use crate::storage::StorageEngine;
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

pub const LATEST_SCHEMA_VERSION: SchemaVersion = 4;

/// Plan containing every built-in step, up to [`LATEST_SCHEMA_VERSION`].
pub fn default_plan() -> Result<MigrationPlan> {
    MigrationPlan::new(LATEST_SCHEMA_VERSION)
        .with_step(
            MigrationStep::new(0, "initial schema", CreateTables(&CORE_TABLES))
                .with_description("Create the phone number inventory tables"),
        )?
        .with_step(
            MigrationStep::new(1, "system config", CreateTables(&[TableName::SystemConfig]))
                .with_description("Add the system_config key/value table"),
        )?
        .with_step(
            MigrationStep::new(2, "default settings", SeedRows {
                table: TableName::SystemConfig,
                rows: default_settings,
            })
            .with_description("Insert default application settings"),
        )?
        .with_step(
            MigrationStep::new(3, "uc admin tables", UcAdminTables)
                .with_description("Add UC configuration tables and default presets"),
        )
}

const CORE_TABLES: [TableName; 5] = [
    TableName::PhoneNumbers,
    TableName::NumberRanges,
    TableName::BulkOperations,
    TableName::AuditLog,
    TableName::UserSessions,
];

const UC_TABLES: [TableName; 3] = [
    TableName::UcConfigFiles,
    TableName::UcConfigHistory,
    TableName::UcPresets,
];

fn default_settings() -> Vec<Row> {
    vec![
        json!({"key": "app_name", "value": "Phone Range Nexus"}),
        json!({"key": "default_country_code", "value": "+1"}),
        json!({"key": "number_format", "value": "E.164"}),
        json!({"key": "audit_retention_days", "value": 365}),
        json!({"key": "bulk_operation_batch_size", "value": 500}),
    ]
}

fn default_uc_presets() -> Vec<Row> {
    vec![
        json!({
            "id": "teams-direct-routing",
            "name": "Microsoft Teams Direct Routing",
            "sip_port": 5061,
            "transport": "tls",
        }),
        json!({
            "id": "sip-trunk-basic",
            "name": "Basic SIP Trunk",
            "sip_port": 5060,
            "transport": "udp",
        }),
    ]
}

async fn create_missing(store: &dyn StorageEngine, tables: &[TableName]) -> Result<Vec<TableName>> {
    let mut already_present = Vec::new();
    for table in tables {
        if !store.create_table(*table).await? {
            already_present.push(*table);
        }
    }
    Ok(already_present)
}

async fn seed_missing(store: &dyn StorageEngine, table: TableName, rows: Vec<Row>) -> Result<usize> {
    let mut tx = store.begin(table).await?;
    let mut added = 0;
    for row in rows {
        if tx.insert_if_absent(row)? {
            added += 1;
        }
    }
    if tx.is_changed() {
        store.commit(tx).await?;
    } else {
        tx.rollback();
    }
    Ok(added)
}

struct CreateTables(&'static [TableName]);

#[async_trait]
impl StepHandler for CreateTables {
    async fn apply(&self, store: &dyn StorageEngine, from_version: SchemaVersion) -> Result<StepOutcome> {
        let present = create_missing(store, self.0).await?;
        debug!(from_version, existing = present.len(), "Tables ensured");
        Ok(StepOutcome::clean())
    }
}

struct SeedRows {
    table: TableName,
    rows: fn() -> Vec<Row>,
}

#[async_trait]
impl StepHandler for SeedRows {
    async fn apply(&self, store: &dyn StorageEngine, from_version: SchemaVersion) -> Result<StepOutcome> {
        let rows = (self.rows)();
        let offered = rows.len();
        let added = seed_missing(store, self.table, rows).await?;
        debug!(from_version, table = %self.table, added, "Default rows seeded");

        let mut outcome = StepOutcome::clean();
        if added < offered {
            outcome = outcome.with_warning(format!(
                "{} of {} default {} rows already existed and were kept",
                offered - added,
                offered,
                self.table
            ));
        }
        Ok(outcome)
    }
}

struct UcAdminTables;

#[async_trait]
impl StepHandler for UcAdminTables {
    async fn apply(&self, store: &dyn StorageEngine, from_version: SchemaVersion) -> Result<StepOutcome> {
        create_missing(store, &UC_TABLES).await?;
        let added = seed_missing(store, TableName::UcPresets, default_uc_presets()).await?;
        debug!(from_version, presets = added, "UC admin tables ready");
        Ok(StepOutcome::clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn default_plan_covers_every_version() {
        let plan = default_plan().unwrap();
        let keys: Vec<String> = plan
            .resolve_chain(0, LATEST_SCHEMA_VERSION)
            .unwrap()
            .iter()
            .map(|step| step.key())
            .collect();
        assert_eq!(keys, vec!["0-to-1", "1-to-2", "2-to-3", "3-to-4"]);
    }

    #[test]
    fn registry_matches_plan() {
        for table in TableName::ALL {
            assert!(table.descriptor().introduced_in <= LATEST_SCHEMA_VERSION);
        }
    }

    #[tokio::test]
    async fn steps_can_be_rerun() {
        let store = InMemoryStorage::new();
        let plan = default_plan().unwrap();

        for _ in 0..2 {
            for step in plan.resolve_chain(0, LATEST_SCHEMA_VERSION).unwrap() {
                step.apply(&store).await.unwrap();
            }
        }

        assert_eq!(
            store.row_count(TableName::SystemConfig).await.unwrap(),
            default_settings().len()
        );
        assert_eq!(
            store.row_count(TableName::UcPresets).await.unwrap(),
            default_uc_presets().len()
        );
        for table in TableName::ALL {
            assert!(store.table_exists(table).await.unwrap());
        }
    }

    #[tokio::test]
    async fn existing_settings_are_kept_with_a_warning() {
        let store = InMemoryStorage::new();
        store
            .seed(
                TableName::SystemConfig,
                vec![json!({"key": "app_name", "value": "Acme Numbers"})],
            )
            .await
            .unwrap();

        let plan = default_plan().unwrap();
        let outcome = plan.step("2-to-3").unwrap().apply(&store).await.unwrap();
        assert_eq!(outcome.warnings.len(), 1);

        let rows = store.scan_table(TableName::SystemConfig).await.unwrap();
        assert_eq!(rows[0]["value"], "Acme Numbers");
        assert_eq!(rows.len(), default_settings().len());
    }
}
