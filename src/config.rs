use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const APP_DIR: &str = "deeboo";
const DB_FILE: &str = "settings.db";

/// Resolved runtime config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the settings database.
    pub data_dir: PathBuf,
    /// Bookmark tree export to load into the in-memory host.
    pub tree_file: Option<PathBuf>,
}

/// On-disk representation. Every field is optional; missing ones use defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_file: Option<PathBuf>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.json")
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl FileConfig {
    pub fn load() -> Result<Option<Self>, String> {
        let path = config_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).map_err(|e| format!("read config: {e}"))?;
        let cfg: FileConfig =
            serde_json::from_str(&data).map_err(|e| format!("parse config: {e}"))?;
        Ok(Some(cfg))
    }
}

impl Config {
    pub fn db_file(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    /// Merge sources: `env` wins over `file`, which wins over defaults.
    pub fn from_sources(env: impl Fn(&str) -> Option<String>, file: Option<FileConfig>) -> Self {
        let file = file.unwrap_or_default();
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        Config {
            data_dir: non_empty("DEEBOO_DATA_DIR")
                .or(file.data_dir)
                .unwrap_or_else(default_data_dir),
            tree_file: non_empty("DEEBOO_TREE").or(file.tree_file),
        }
    }

    /// Resolution order: env vars → config file → defaults. A broken config
    /// file is logged and skipped.
    pub fn resolve() -> Self {
        let file = match FileConfig::load() {
            Ok(Some(fc)) => {
                log::info!("Config loaded from {}", config_path().display());
                Some(fc)
            }
            Ok(None) => {
                log::info!("No config file found, using defaults");
                None
            }
            Err(e) => {
                log::warn!("Config file error: {}", e);
                None
            }
        };
        Self::from_sources(|key| std::env::var(key).ok(), file)
    }
}
