pub mod error;
pub mod types;

pub use error::{NexusError, Result};
pub use types::{Row, SchemaVersion, TableDescriptor, TableName};
