//! SQLite persistence for conversational memory records and learning logs.

pub mod codec;
pub mod connection;
pub mod log_store;
pub mod memory_store;
pub mod migrations;

pub use connection::{DEFAULT_DB_FILE, Database};
pub use log_store::{LogEntry, LogField, LogStore, LogUpdate, NewLogEntry};
pub use memory_store::{
    MemoryRecord, MemoryRecords, MemoryStore, MemorySummary, NewMemoryRecord, parse_id_list,
};
