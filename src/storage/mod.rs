pub mod engine;
pub mod file;
pub mod memory;
pub mod transaction;

pub use engine::StorageEngine;
pub use file::{FileStorage, STORE_FILE_NAME};
pub use memory::{InMemoryStorage, StoreImage};
pub use transaction::TableTransaction;
