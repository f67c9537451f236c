// Store gateway implementations

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::InMemoryStore;
pub use sqlite_store::SqliteStore;
