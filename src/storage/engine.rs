use super::transaction::TableTransaction;
use crate::core::{Result, Row, TableName};
use async_trait::async_trait;
use serde_json::Value;

/// Storage engine trait - the store the migration tooling runs against.
///
/// Implementations hold every registered table plus a small metadata map
/// (where the version ledger lives). Mutations of table contents go through
/// [`TableTransaction`]: `begin` takes a working copy, `commit` publishes it
/// as one unit, dropping the handle rolls it back.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Create a table. Returns `false` when it already existed.
    async fn create_table(&self, table: TableName) -> Result<bool>;

    /// Check if a table exists
    async fn table_exists(&self, table: TableName) -> Result<bool>;

    /// Scan all rows in a table, in insertion order
    async fn scan_table(&self, table: TableName) -> Result<Vec<Row>>;

    /// Open a scoped transaction over one table
    async fn begin(&self, table: TableName) -> Result<TableTransaction>;

    /// Publish a transaction's working copy as the table's new contents
    async fn commit(&self, tx: TableTransaction) -> Result<()>;

    async fn read_metadata(&self, key: &str) -> Result<Option<Value>>;

    async fn write_metadata(&self, key: &str, value: Value) -> Result<()>;

    /// Row count per existing table
    async fn row_count(&self, table: TableName) -> Result<usize> {
        Ok(self.scan_table(table).await?.len())
    }
}
