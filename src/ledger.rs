//! Version ledger: the single persisted schema version of a store.

use crate::core::{NexusError, Result, SchemaVersion};
use crate::storage::StorageEngine;
use serde_json::json;
use tracing::warn;

/// Metadata key under which the version is stored.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Outcome of reading the ledger.
///
/// `degraded` is set when the store could not be read (or held garbage) and
/// the version was reported as `0`. Such a `0` means "unknown", not
/// "uninitialized".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerReading {
    pub version: SchemaVersion,
    pub degraded: bool,
}

pub struct VersionLedger<'a> {
    store: &'a dyn StorageEngine,
}

impl<'a> VersionLedger<'a> {
    pub fn new(store: &'a dyn StorageEngine) -> Self {
        Self { store }
    }

    /// Read the persisted version. Never fails.
    pub async fn read(&self) -> LedgerReading {
        match self.store.read_metadata(SCHEMA_VERSION_KEY).await {
            Ok(None) => LedgerReading {
                version: 0,
                degraded: false,
            },
            Ok(Some(value)) => match value.as_u64().and_then(|v| SchemaVersion::try_from(v).ok()) {
                Some(version) => LedgerReading {
                    version,
                    degraded: false,
                },
                None => {
                    warn!(value = %value, "Stored schema version is not a valid integer, assuming 0");
                    LedgerReading {
                        version: 0,
                        degraded: true,
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not read schema version, assuming 0");
                LedgerReading {
                    version: 0,
                    degraded: true,
                }
            }
        }
    }

    pub async fn current_version(&self) -> SchemaVersion {
        self.read().await.version
    }

    pub async fn needs_upgrade(&self, target: SchemaVersion) -> bool {
        self.current_version().await < target
    }

    /// Record that the store reached `to`. The ledger never moves backwards here.
    pub async fn advance(&self, to: SchemaVersion) -> Result<()> {
        let current = self.current_version().await;
        if to < current {
            return Err(NexusError::VersionRegression {
                current,
                requested: to,
            });
        }
        self.store.write_metadata(SCHEMA_VERSION_KEY, json!(to)).await
    }

    /// Overwrite the version unconditionally. Only restore uses this, to put
    /// the ledger back in line with the data it reloaded.
    pub(crate) async fn reset(&self, to: SchemaVersion) -> Result<()> {
        self.store.write_metadata(SCHEMA_VERSION_KEY, json!(to)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[tokio::test]
    async fn fresh_store_reports_zero() {
        let store = InMemoryStorage::new();
        let ledger = VersionLedger::new(&store);
        assert_eq!(
            ledger.read().await,
            LedgerReading {
                version: 0,
                degraded: false
            }
        );
        assert!(ledger.needs_upgrade(1).await);
        assert!(!ledger.needs_upgrade(0).await);
    }

    #[tokio::test]
    async fn advance_is_monotonic() {
        let store = InMemoryStorage::new();
        let ledger = VersionLedger::new(&store);
        ledger.advance(2).await.unwrap();
        ledger.advance(2).await.unwrap();
        assert!(matches!(
            ledger.advance(1).await,
            Err(NexusError::VersionRegression {
                current: 2,
                requested: 1
            })
        ));
        assert_eq!(ledger.current_version().await, 2);

        ledger.reset(1).await.unwrap();
        assert_eq!(ledger.current_version().await, 1);
    }

    #[tokio::test]
    async fn garbage_version_degrades_to_zero() {
        let store = InMemoryStorage::new();
        store
            .write_metadata(SCHEMA_VERSION_KEY, json!("three"))
            .await
            .unwrap();
        let reading = VersionLedger::new(&store).read().await;
        assert_eq!(reading.version, 0);
        assert!(reading.degraded);
    }
}
