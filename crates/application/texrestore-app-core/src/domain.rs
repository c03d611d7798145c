use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

const QUALIFIER: &str = "com";
const ORG: &str = "texrestore";
const APP: &str = "engine";

fn default_staleness_secs() -> u64 {
    texrestore_config::DEFAULT_STALENESS_WINDOW.as_secs()
}

fn default_backup_root() -> Utf8PathBuf {
    ProjectDirs::from(QUALIFIER, ORG, APP)
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("backups")).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("backups"))
}

fn default_mods_root() -> Utf8PathBuf {
    Utf8PathBuf::from("mods")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_backup_root")]
    pub backup_root: Utf8PathBuf,
    #[serde(default = "default_mods_root")]
    pub mods_root: Utf8PathBuf,
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            backup_root: default_backup_root(),
            mods_root: default_mods_root(),
            staleness_secs: default_staleness_secs(),
        }
    }
}

impl EngineSettings {
    pub fn new(backup_root: impl Into<Utf8PathBuf>, mods_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
            mods_root: mods_root.into(),
            ..Self::default()
        }
    }

    /// Settings from a JSON file; absent fields take their defaults.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {path}"))?;
        let settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {path}"))?;
        Ok(settings)
    }

    pub fn staleness(&self) -> Duration {
        texrestore_config::staleness_from_secs(self.staleness_secs)
    }
}
