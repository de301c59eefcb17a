use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::stores::DEFAULT_MAX_RECENTS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub database_path: PathBuf,
    pub stores: StoreConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub favorites_path: PathBuf,
    pub recents_path: PathBuf,
    pub station_properties_path: PathBuf,
    pub favicon_cache_dir: PathBuf,
    pub upgrade_state_path: PathBuf,
    pub max_recents: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let database_path = PathBuf::from(env_required("STATION_DB_PATH")?);
        let base_dir = database_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let stores = StoreConfig::from_env(&base_dir)?;
        let backup = BackupConfig::from_env(&base_dir)?;

        Ok(Self {
            database_path,
            stores,
            backup,
        })
    }

    /// Every file lives next to the database.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            database_path: dir.join("stations.json"),
            stores: StoreConfig {
                favorites_path: dir.join("favorites.json"),
                recents_path: dir.join("recents.json"),
                station_properties_path: dir.join("station-properties.json"),
                favicon_cache_dir: dir.join("favicons"),
                upgrade_state_path: dir.join("upgrade-state.json"),
                max_recents: DEFAULT_MAX_RECENTS,
            },
            backup: BackupConfig {
                enabled: true,
                dir: dir.join("backups"),
            },
        }
    }
}

impl StoreConfig {
    fn from_env(base_dir: &Path) -> Result<Self, ConfigError> {
        let max_recents = env_usize("MAX_RECENTS", DEFAULT_MAX_RECENTS)?;
        if max_recents == 0 {
            return Err(ConfigError::Message(
                "MAX_RECENTS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            favorites_path: env_path("FAVORITES_PATH", base_dir, "favorites.json"),
            recents_path: env_path("RECENTS_PATH", base_dir, "recents.json"),
            station_properties_path: env_path(
                "STATION_PROPERTIES_PATH",
                base_dir,
                "station-properties.json",
            ),
            favicon_cache_dir: env_path("FAVICON_CACHE_DIR", base_dir, "favicons"),
            upgrade_state_path: env_path("UPGRADE_STATE_PATH", base_dir, "upgrade-state.json"),
            max_recents,
        })
    }
}

impl BackupConfig {
    fn from_env(base_dir: &Path) -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: env_bool("BACKUP_ENABLED", true)?,
            dir: env_path("BACKUP_DIR", base_dir, "backups"),
        })
    }
}

fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::Message(format!("{key} must be set")))
}

fn env_path(key: &str, base_dir: &Path, default_name: &str) -> PathBuf {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| base_dir.join(default_name))
}

fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => parse_bool(&value)
            .ok_or_else(|| ConfigError::Message(format!("{key} must be true or false"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid usize"))),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
