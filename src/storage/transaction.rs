use crate::core::{NexusError, Result, Row, TableDescriptor, TableName};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

/// Working copy of a single table, obtained from
/// [`StorageEngine::begin`](super::StorageEngine::begin).
///
/// Nothing is visible to other readers until the transaction is handed back
/// to the engine's `commit`. Dropping it (or calling [`rollback`]) discards
/// every staged change.
///
/// [`rollback`]: TableTransaction::rollback
#[derive(Debug)]
#[must_use = "a table transaction does nothing unless committed"]
pub struct TableTransaction {
    descriptor: TableDescriptor,
    rows: Vec<Row>,
    /// Serialized key of every staged row
    keys: HashSet<String>,
    changed: bool,
}

impl TableTransaction {
    pub(crate) fn new(table: TableName, rows: Vec<Row>) -> Self {
        let descriptor = table.descriptor();
        let keys = rows
            .iter()
            .filter_map(|row| row.get(descriptor.key_field))
            .map(Value::to_string)
            .collect();
        Self {
            descriptor,
            rows,
            keys,
            changed: false,
        }
    }

    pub fn table(&self) -> TableName {
        self.descriptor.name
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Remove every row from the working copy.
    pub fn clear(&mut self) {
        if !self.rows.is_empty() {
            self.changed = true;
        }
        self.rows.clear();
        self.keys.clear();
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.keys.contains(&key.to_string())
    }

    /// Insert a new row. Fails for malformed rows and duplicate keys; the
    /// transaction stays usable afterwards.
    pub fn insert(&mut self, row: Row) -> Result<()> {
        self.descriptor.validate(&row)?;
        let key = self.key_of(&row);
        if !self.keys.insert(key.clone()) {
            return Err(NexusError::invalid_row(
                self.descriptor.name.as_str(),
                format!("duplicate key {}", key),
            ));
        }
        self.rows.push(row);
        self.changed = true;
        Ok(())
    }

    /// Insert `row` only if no row with the same key exists.
    /// Returns whether the row was added.
    pub fn insert_if_absent(&mut self, row: Row) -> Result<bool> {
        self.descriptor.validate(&row)?;
        let key = self.key_of(&row);
        if !self.keys.insert(key) {
            return Ok(false);
        }
        self.rows.push(row);
        self.changed = true;
        Ok(true)
    }

    pub fn rollback(self) {
        debug!(table = %self.descriptor.name, "Rolling back table transaction");
    }

    pub(crate) fn into_parts(self) -> (TableName, Vec<Row>) {
        (self.descriptor.name, self.rows)
    }

    fn key_of(&self, row: &Row) -> String {
        row.get(self.descriptor.key_field)
            .unwrap_or(&Value::Null)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_rejects_duplicates_and_keeps_going() {
        let mut tx = TableTransaction::new(TableName::PhoneNumbers, Vec::new());
        tx.insert(json!({"id": 1, "number": "+15550100"})).unwrap();
        assert!(tx.insert(json!({"id": 1, "number": "+15550101"})).is_err());
        assert!(tx.insert(json!({"number": "+15550102"})).is_err());
        tx.insert(json!({"id": 2, "number": "+15550103"})).unwrap();
        assert_eq!(tx.rows().len(), 2);
        assert!(tx.is_changed());
    }

    #[test]
    fn insert_if_absent_is_idempotent() {
        let mut tx = TableTransaction::new(
            TableName::SystemConfig,
            vec![json!({"key": "app_name", "value": "custom"})],
        );
        assert!(!tx.insert_if_absent(json!({"key": "app_name", "value": "default"})).unwrap());
        assert!(!tx.is_changed());
        assert!(tx.insert_if_absent(json!({"key": "number_format", "value": "E.164"})).unwrap());
        assert_eq!(tx.rows()[0]["value"], "custom");
    }

    #[test]
    fn clear_forgets_keys() {
        let mut tx = TableTransaction::new(
            TableName::PhoneNumbers,
            vec![json!({"id": "n1"}), json!({"id": "n2"})],
        );
        assert!(tx.contains_key(&json!("n1")));
        assert!(!tx.contains_key(&json!("n3")));
        tx.clear();
        assert!(!tx.contains_key(&json!("n1")));
        tx.insert(json!({"id": "n1", "number": "+15550100"})).unwrap();
        assert_eq!(tx.rows().len(), 1);
    }

    #[test]
    fn large_bulk_load_keeps_every_row() {
        let mut tx = TableTransaction::new(TableName::PhoneNumbers, Vec::new());
        for i in 0..50_000 {
            tx.insert(json!({"id": format!("n{}", i), "number": format!("+1555{:07}", i)}))
                .unwrap();
        }
        assert_eq!(tx.rows().len(), 50_000);
        assert!(tx.insert(json!({"id": "n49999"})).is_err());
    }

    #[test]
    fn clear_on_empty_table_is_not_a_change() {
        let mut tx = TableTransaction::new(TableName::AuditLog, Vec::new());
        tx.clear();
        assert!(!tx.is_changed());
    }
}
