use thiserror::Error;

#[derive(Error, Debug)]
pub enum NexusError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Table '{0}' is not a registered table")]
    UnknownTable(String),

    #[error("Invalid row for table '{table}': {reason}")]
    InvalidRow { table: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to write snapshot: {0}")]
    SnapshotWrite(String),

    #[error("Failed to read snapshot: {0}")]
    SnapshotRead(String),

    #[error("Invalid migration plan: {0}")]
    InvalidPlan(String),

    #[error("Missing migration step '{0}'")]
    MissingStep(String),

    #[error("Migration step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Version regression: ledger is at {current}, refusing to write {requested}")]
    VersionRegression { current: u32, requested: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, NexusError>;

impl NexusError {
    pub fn invalid_row(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for NexusError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NexusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for NexusError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
