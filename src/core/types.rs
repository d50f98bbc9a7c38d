use super::{NexusError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single stored record. Its shape belongs to the owning table; this crate
/// only requires it to be a JSON object carrying the table's key field.
pub type Row = serde_json::Value;

/// Schema version number tracked by the version ledger.
pub type SchemaVersion = u32;

/// Every table the store knows about. The set is closed: export, restore and
/// migration iterate [`TableName::ALL`] instead of discovering tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    PhoneNumbers,
    NumberRanges,
    BulkOperations,
    AuditLog,
    UserSessions,
    SystemConfig,
    UcConfigFiles,
    UcConfigHistory,
    UcPresets,
}

/// Row-shape descriptor for a registered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: TableName,
    /// Field every row must carry; used as the row identity.
    pub key_field: &'static str,
    /// Schema version in which the table first exists.
    pub introduced_in: SchemaVersion,
}

impl TableName {
    pub const ALL: [TableName; 9] = [
        TableName::PhoneNumbers,
        TableName::NumberRanges,
        TableName::BulkOperations,
        TableName::AuditLog,
        TableName::UserSessions,
        TableName::SystemConfig,
        TableName::UcConfigFiles,
        TableName::UcConfigHistory,
        TableName::UcPresets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::PhoneNumbers => "phone_numbers",
            TableName::NumberRanges => "number_ranges",
            TableName::BulkOperations => "bulk_operations",
            TableName::AuditLog => "audit_log",
            TableName::UserSessions => "user_sessions",
            TableName::SystemConfig => "system_config",
            TableName::UcConfigFiles => "uc_config_files",
            TableName::UcConfigHistory => "uc_config_history",
            TableName::UcPresets => "uc_presets",
        }
    }

    pub fn descriptor(&self) -> TableDescriptor {
        let (key_field, introduced_in) = match self {
            TableName::PhoneNumbers
            | TableName::NumberRanges
            | TableName::BulkOperations
            | TableName::AuditLog
            | TableName::UserSessions => ("id", 1),
            TableName::SystemConfig => ("key", 2),
            TableName::UcConfigFiles | TableName::UcConfigHistory | TableName::UcPresets => {
                ("id", 4)
            }
        };
        TableDescriptor {
            name: *self,
            key_field,
            introduced_in,
        }
    }

    /// Tables that must exist once the store reaches `version`.
    pub fn expected_at(version: SchemaVersion) -> impl Iterator<Item = TableName> {
        Self::ALL
            .into_iter()
            .filter(move |table| table.descriptor().introduced_in <= version)
    }
}

impl TableDescriptor {
    /// Checks that `row` is an object with a non-null key field.
    pub fn validate(&self, row: &Row) -> Result<()> {
        let fields = row.as_object().ok_or_else(|| {
            NexusError::invalid_row(self.name.as_str(), "row is not a JSON object")
        })?;

        match fields.get(self.key_field) {
            None | Some(serde_json::Value::Null) => Err(NexusError::invalid_row(
                self.name.as_str(),
                format!("missing key field '{}'", self.key_field),
            )),
            Some(_) => Ok(()),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableName {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| NexusError::UnknownTable(s.to_string()))
    }
}
