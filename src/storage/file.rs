//! File-backed store: the local mirror of the application's browser store.
//!
//! The whole store lives in one JSON document. Every committed change
//! rewrites it through a temp file in the same directory followed by a
//! rename, so a crash leaves either the old or the new image on disk.

use super::engine::StorageEngine;
use super::memory::{InMemoryStorage, StoreImage};
use super::transaction::TableTransaction;
use crate::core::{NexusError, Result, Row, TableName};
use async_trait::async_trait;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::debug;

pub const STORE_FILE_NAME: &str = "nexus-store.json";

pub struct FileStorage {
    path: PathBuf,
    inner: InMemoryStorage,
    /// Serializes image writes so two commits never race on the rename
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open (or create) the store under `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| {
            NexusError::Storage(format!(
                "Failed to create data directory '{}': {}",
                data_dir.display(),
                e
            ))
        })?;

        let path = data_dir.join(STORE_FILE_NAME);
        let inner = if path.exists() {
            let file = File::open(&path).map_err(|e| {
                NexusError::Storage(format!("Failed to open store '{}': {}", path.display(), e))
            })?;
            let image: StoreImage = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                NexusError::Storage(format!("Failed to parse store '{}': {}", path.display(), e))
            })?;
            InMemoryStorage::from_image(image)?
        } else {
            InMemoryStorage::new()
        };

        debug!(path = %path.display(), "Opened file store");
        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the current image and release the handle.
    pub async fn close(self) -> Result<()> {
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let image = self.inner.to_image().await;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));

        let temp = NamedTempFile::new_in(dir)
            .map_err(|e| NexusError::Storage(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, &image)?;
            writer
                .flush()
                .map_err(|e| NexusError::Storage(format!("Failed to flush store: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| NexusError::Storage(format!("Failed to sync store: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| NexusError::Storage(format!("Failed to replace store file: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for FileStorage {
    async fn create_table(&self, table: TableName) -> Result<bool> {
        let created = self.inner.create_table(table).await?;
        if created {
            self.persist().await?;
        }
        Ok(created)
    }

    async fn table_exists(&self, table: TableName) -> Result<bool> {
        self.inner.table_exists(table).await
    }

    async fn scan_table(&self, table: TableName) -> Result<Vec<Row>> {
        self.inner.scan_table(table).await
    }

    async fn begin(&self, table: TableName) -> Result<TableTransaction> {
        self.inner.begin(table).await
    }

    async fn commit(&self, tx: TableTransaction) -> Result<()> {
        self.inner.commit(tx).await?;
        self.persist().await
    }

    async fn read_metadata(&self, key: &str) -> Result<Option<Value>> {
        self.inner.read_metadata(key).await
    }

    async fn write_metadata(&self, key: &str, value: Value) -> Result<()> {
        self.inner.write_metadata(key, value).await?;
        self.persist().await
    }

    async fn row_count(&self, table: TableName) -> Result<usize> {
        self.inner.row_count(table).await
    }
}
