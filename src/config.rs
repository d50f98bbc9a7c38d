use crate::core::SchemaVersion;
use crate::migration::LATEST_SCHEMA_VERSION;
use std::env;
use std::path::{Path, PathBuf};

pub const DATA_DIR_ENV: &str = "NEXUS_DATA_DIR";
pub const BACKUP_DIR_ENV: &str = "NEXUS_BACKUP_DIR";
pub const LOG_FILE_ENV: &str = "NEXUS_LOG_FILE";

/// Where the tooling finds its store, backups and log file
///
/// Backup directory and log file default to locations under `data_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NexusConfig {
    /// Directory holding the store file
    pub data_dir: PathBuf,

    /// Directory snapshots are written to
    pub backup_dir: Option<PathBuf>,

    /// Append-only operator log
    pub log_file: Option<PathBuf>,

    /// Version `migrate` and `verify` aim for
    pub target_version: SchemaVersion,
}

impl NexusConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            backup_dir: None,
            log_file: None,
            target_version: LATEST_SCHEMA_VERSION,
        }
    }

    /// Build from `NEXUS_DATA_DIR`, `NEXUS_BACKUP_DIR` and `NEXUS_LOG_FILE`.
    /// The data directory falls back to `./data`.
    pub fn from_env() -> Self {
        let data_dir = env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let mut config = Self::new(data_dir);
        config.backup_dir = env::var_os(BACKUP_DIR_ENV).map(PathBuf::from);
        config.log_file = env::var_os(LOG_FILE_ENV).map(PathBuf::from);
        config
    }

    /// Set the data directory
    pub fn data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the backup directory
    pub fn backup_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.backup_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the log file
    pub fn log_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.log_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn target_version(mut self, version: SchemaVersion) -> Self {
        self.target_version = version;
        self
    }

    pub fn resolved_backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backups"))
    }

    pub fn resolved_log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("migration.log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_data_dir() {
        let config = NexusConfig::new("/var/lib/nexus");
        assert_eq!(config.resolved_backup_dir(), PathBuf::from("/var/lib/nexus/backups"));
        assert_eq!(config.resolved_log_file(), PathBuf::from("/var/lib/nexus/migration.log"));
        assert_eq!(config.target_version, LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn builder_overrides() {
        let config = NexusConfig::new("data")
            .data_dir("/srv/nexus")
            .backup_dir("/mnt/backups")
            .log_file("/var/log/nexus.log")
            .target_version(2);
        assert_eq!(config.data_dir, PathBuf::from("/srv/nexus"));
        assert_eq!(config.resolved_backup_dir(), PathBuf::from("/mnt/backups"));
        assert_eq!(config.resolved_log_file(), PathBuf::from("/var/log/nexus.log"));
        assert_eq!(config.target_version, 2);
    }
}
