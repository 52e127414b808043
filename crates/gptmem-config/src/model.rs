use gptmem_common::DEFAULT_DB_FILE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Level used when neither `RUST_LOG`, a flag, nor the config names one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store file. Relative paths resolve against the working directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// One of `trace`, `debug`, `info`, `warn`, `error`, `off`.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Row cap used by `show` when no limit is given.
    #[serde(default = "default_read_limit")]
    pub read_limit: usize,

    #[serde(default = "default_user_id")]
    pub default_user: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: None,
            read_limit: default_read_limit(),
            default_user: default_user_id(),
        }
    }
}

impl AppConfig {
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
    }

    /// Picks the log level: an explicit flag wins over the config file,
    /// which wins over [`DEFAULT_LOG_LEVEL`].
    pub fn log_level_or(&self, flag: Option<&str>) -> String {
        flag.or(self.log_level.as_deref())
            .unwrap_or(DEFAULT_LOG_LEVEL)
            .to_string()
    }

    /// Rejects values the store and CLI cannot act on.
    pub(crate) fn validate(self) -> Result<Self, String> {
        if self.read_limit == 0 {
            return Err("read_limit must be greater than zero".to_string());
        }
        if let Some(level) = &self.log_level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(format!(
                    "unknown log_level {level:?}, expected one of {}",
                    LOG_LEVELS.join(", ")
                ));
            }
        }
        Ok(self)
    }
}

fn default_read_limit() -> usize {
    100
}

fn default_user_id() -> String {
    "0".to_string()
}
