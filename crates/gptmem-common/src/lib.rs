pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::now_timestamp;

/// File name used when the caller does not choose a store path.
pub const DEFAULT_DB_FILE: &str = "memory.db";
