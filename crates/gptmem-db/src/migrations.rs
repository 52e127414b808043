/// Schema definitions for the store file.
///
/// Tables are created with `IF NOT EXISTS`, so applying a schema to a file
/// that already has it is a no-op. The version is stamped into
/// `PRAGMA user_version`.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const STORE_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "memory_and_log_tables",
    sql: "CREATE TABLE IF NOT EXISTS mem (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT,
            role TEXT,
            ts TEXT,
            categories TEXT,
            labels TEXT,
            embedding BLOB,
            continued INTEGER,
            level1 TEXT,
            level2 TEXT,
            level3 TEXT,
            user_id TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_mem_user_ts
            ON mem(user_id, ts);

        CREATE TABLE IF NOT EXISTS log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ts TEXT,
            decay_weights BLOB,
            feedback TEXT,
            inputs BLOB,
            outputs BLOB
        );",
};

pub const CURRENT_SCHEMA: &Migration = &STORE_SCHEMA_V1;
