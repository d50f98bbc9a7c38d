#![allow(dead_code)]

use async_trait::async_trait;
use phone_range_nexus::core::SchemaVersion;
use phone_range_nexus::{
    InMemoryStorage, NexusError, Result, Row, StepHandler, StepOutcome, StorageEngine, TableName,
    TableTransaction,
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// In-memory store with switchable faults.
pub struct FaultyStorage {
    pub inner: InMemoryStorage,
    pub failing_scans: HashSet<TableName>,
    pub failing_commits: HashSet<TableName>,
    pub fail_metadata_reads: bool,
}

impl FaultyStorage {
    pub fn new(inner: InMemoryStorage) -> Self {
        Self {
            inner,
            failing_scans: HashSet::new(),
            failing_commits: HashSet::new(),
            fail_metadata_reads: false,
        }
    }

    pub fn failing_scan(mut self, table: TableName) -> Self {
        self.failing_scans.insert(table);
        self
    }

    pub fn failing_commit(mut self, table: TableName) -> Self {
        self.failing_commits.insert(table);
        self
    }
}

#[async_trait]
impl StorageEngine for FaultyStorage {
    async fn create_table(&self, table: TableName) -> Result<bool> {
        self.inner.create_table(table).await
    }

    async fn table_exists(&self, table: TableName) -> Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn scan_table(&self, table: TableName) -> Result<Vec<Row>> {
        if self.failing_scans.contains(&table) {
            return Err(NexusError::Storage(format!("{} is unreadable", table)));
        }
        self.inner.scan_table(table).await
    }

    async fn begin(&self, table: TableName) -> Result<TableTransaction> {
        self.inner.begin(table).await
    }

    async fn commit(&self, tx: TableTransaction) -> Result<()> {
        if self.failing_commits.contains(&tx.table()) {
            return Err(NexusError::Storage(format!("{} rejected the commit", tx.table())));
        }
        self.inner.commit(tx).await
    }

    async fn read_metadata(&self, key: &str) -> Result<Option<Value>> {
        if self.fail_metadata_reads {
            return Err(NexusError::Storage("metadata unavailable".to_string()));
        }
        self.inner.read_metadata(key).await
    }

    async fn write_metadata(&self, key: &str, value: Value) -> Result<()> {
        self.inner.write_metadata(key, value).await
    }
}

/// Step handler that records each call and optionally fails or warns.
#[derive(Clone)]
pub struct RecordingStep {
    pub label: &'static str,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
    pub warning: Option<&'static str>,
}

impl RecordingStep {
    pub fn new(label: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            label,
            calls: calls.clone(),
            fail: false,
            warning: None,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn warning(mut self, warning: &'static str) -> Self {
        self.warning = Some(warning);
        self
    }
}

#[async_trait]
impl StepHandler for RecordingStep {
    async fn apply(&self, _store: &dyn StorageEngine, from_version: SchemaVersion) -> Result<StepOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}@{}", self.label, from_version));
        if self.fail {
            return Err(NexusError::StepFailed {
                step: self.label.to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        let mut outcome = StepOutcome::clean();
        if let Some(warning) = self.warning {
            outcome = outcome.with_warning(warning);
        }
        Ok(outcome)
    }
}

/// A small inventory at schema version 2.
pub async fn inventory_at_v2() -> InMemoryStorage {
    let store = InMemoryStorage::new();
    store
        .seed(
            TableName::PhoneNumbers,
            vec![
                json!({"id": "n1", "number": "+15550100", "status": "assigned", "tags": ["sales"]}),
                json!({"id": "n2", "number": "+15550101", "status": "available"}),
            ],
        )
        .await
        .unwrap();
    store
        .seed(
            TableName::NumberRanges,
            vec![json!({"id": "r1", "start": "+15550100", "end": "+15550199"})],
        )
        .await
        .unwrap();
    store
        .seed(
            TableName::AuditLog,
            vec![json!({"id": 1, "action": "assign", "number_id": "n1"})],
        )
        .await
        .unwrap();
    store.create_table(TableName::BulkOperations).await.unwrap();
    store.create_table(TableName::UserSessions).await.unwrap();
    store.create_table(TableName::SystemConfig).await.unwrap();
    store.write_metadata("schema_version", json!(2)).await.unwrap();
    store
}
