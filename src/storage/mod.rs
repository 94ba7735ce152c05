// src/storage/mod.rs
pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{MemoryStorage, StorageOp};
pub use postgres::PostgresStorage;
pub use traits::{GeoPoints, HistorySummary, RuleStore, TransactionStore};
