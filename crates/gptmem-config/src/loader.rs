use std::path::PathBuf;

use gptmem_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Config file formats, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Toml,
}

impl Format {
    const LOOKUP: [Format; 2] = [Format::Yaml, Format::Toml];

    fn file_name(self) -> &'static str {
        match self {
            Format::Yaml => "config.yml",
            Format::Toml => "config.toml",
        }
    }

    fn parse(self, contents: &str) -> std::result::Result<AppConfig, String> {
        match self {
            Format::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

/// Locates and reads `config.yml` or `config.toml` from one directory.
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_dir(Self::default_config_dir())
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// `$XDG_CONFIG_HOME/gptmem`, unless only the legacy `~/.gptmem` exists.
    pub fn default_config_dir() -> PathBuf {
        let xdg = dirs::config_dir().map(|c| c.join("gptmem"));
        let legacy = dirs::home_dir().map(|h| h.join(".gptmem"));

        match (xdg, legacy) {
            (Some(xdg), Some(legacy)) if !xdg.exists() && legacy.exists() => legacy,
            (Some(xdg), _) => xdg,
            (None, Some(legacy)) => legacy,
            (None, None) => PathBuf::from(".gptmem"),
        }
    }

    /// Reads the first config file found and validates it. A missing file
    /// yields [`AppConfig::default`].
    pub fn load(&self) -> Result<AppConfig> {
        let Some((format, path)) = self.locate() else {
            info!(
                "no config file in {}, using defaults",
                self.config_dir.display()
            );
            return Ok(AppConfig::default());
        };

        info!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(&path)?;
        let config = format
            .parse(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;

        let config = config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!(
            "config: db_path={:?} log_level={:?} read_limit={} default_user={}",
            config.db_path, config.log_level, config.read_limit, config.default_user
        );
        Ok(config)
    }

    fn locate(&self) -> Option<(Format, PathBuf)> {
        Format::LOOKUP
            .into_iter()
            .map(|format| (format, self.config_dir.join(format.file_name())))
            .find(|(_, path)| path.is_file())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
