use super::engine::StorageEngine;
use super::transaction::TableTransaction;
use crate::core::{NexusError, Result, Row, TableName};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Plain serializable image of a whole store: metadata plus table contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreImage {
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Row>>,
}

pub struct InMemoryStorage {
    /// Each table sits behind its own lock; the outer lock only guards the set of tables
    tables: RwLock<HashMap<TableName, Arc<RwLock<Vec<Row>>>>>,
    metadata: RwLock<BTreeMap<String, Value>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            metadata: RwLock::new(BTreeMap::new()),
        }
    }

    /// Rebuild a store from an image. Unregistered table names are rejected.
    pub fn from_image(image: StoreImage) -> Result<Self> {
        let mut tables = HashMap::new();
        for (name, rows) in image.tables {
            let table: TableName = name.parse()?;
            tables.insert(table, Arc::new(RwLock::new(rows)));
        }
        Ok(Self {
            tables: RwLock::new(tables),
            metadata: RwLock::new(image.metadata),
        })
    }

    pub async fn to_image(&self) -> StoreImage {
        let handles: Vec<(TableName, Arc<RwLock<Vec<Row>>>)> = self
            .tables
            .read()
            .await
            .iter()
            .map(|(name, handle)| (*name, handle.clone()))
            .collect();

        let mut tables = BTreeMap::new();
        for (name, handle) in handles {
            tables.insert(name.as_str().to_string(), handle.read().await.clone());
        }

        StoreImage {
            metadata: self.metadata.read().await.clone(),
            tables,
        }
    }

    /// Convenience for seeding: create the table if needed and append rows
    /// without going through a transaction.
    pub async fn seed(&self, table: TableName, rows: impl IntoIterator<Item = Row>) -> Result<()> {
        self.create_table(table).await?;
        let mut tx = self.begin(table).await?;
        for row in rows {
            tx.insert(row)?;
        }
        self.commit(tx).await
    }

    async fn table_handle(&self, table: TableName) -> Result<Arc<RwLock<Vec<Row>>>> {
        self.tables
            .read()
            .await
            .get(&table)
            .cloned()
            .ok_or_else(|| NexusError::TableNotFound(table.to_string()))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn create_table(&self, table: TableName) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&table) {
            return Ok(false);
        }
        tables.insert(table, Arc::new(RwLock::new(Vec::new())));
        Ok(true)
    }

    async fn table_exists(&self, table: TableName) -> Result<bool> {
        Ok(self.tables.read().await.contains_key(&table))
    }

    async fn scan_table(&self, table: TableName) -> Result<Vec<Row>> {
        let handle = self.table_handle(table).await?;
        let rows = handle.read().await;
        Ok(rows.clone())
    }

    async fn begin(&self, table: TableName) -> Result<TableTransaction> {
        let rows = self.scan_table(table).await?;
        Ok(TableTransaction::new(table, rows))
    }

    async fn commit(&self, tx: TableTransaction) -> Result<()> {
        let (table, rows) = tx.into_parts();
        let handle = self.table_handle(table).await?;
        *handle.write().await = rows;
        Ok(())
    }

    async fn read_metadata(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.metadata.read().await.get(key).cloned())
    }

    async fn write_metadata(&self, key: &str, value: Value) -> Result<()> {
        self.metadata.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn row_count(&self, table: TableName) -> Result<usize> {
        let handle = self.table_handle(table).await?;
        let rows = handle.read().await;
        Ok(rows.len())
    }
}
