pub mod commands;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use std::sync::Arc;
use texrestore_app_core::EngineSettings;
use texrestore_core::TextureInventorySnapshot;

/// Where backups and mods live. Flags override the settings file.
#[derive(Args, Clone, Debug, Default)]
pub struct EngineArgs {
    /// Settings JSON (`backup_root`, `mods_root`, `staleness_secs`)
    #[arg(long, env = "TEXRESTORE_CONFIG")]
    pub config: Option<Utf8PathBuf>,
    /// Backup root containing `textures/` and `sessions/`
    #[arg(long, env = "TEXRESTORE_BACKUPS")]
    pub backups: Option<Utf8PathBuf>,
    /// Root of the mod library
    #[arg(long, env = "TEXRESTORE_MODS")]
    pub mods: Option<Utf8PathBuf>,
}

impl EngineArgs {
    pub fn settings(&self) -> Result<EngineSettings> {
        let mut settings = match &self.config {
            Some(path) => EngineSettings::load(path)?,
            None => EngineSettings::default(),
        };
        if let Some(backups) = &self.backups {
            settings.backup_root = backups.clone();
        }
        if let Some(mods) = &self.mods {
            settings.mods_root = mods.clone();
        }
        Ok(settings)
    }
}

/// Texture inventory exported by the host as JSON (object kind -> hash -> usage).
pub fn load_inventory(path: &Utf8PathBuf) -> Result<Arc<TextureInventorySnapshot>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {}", path))?;
    let snapshot = TextureInventorySnapshot::from_json(&raw)
        .with_context(|| format!("Invalid inventory {}", path))?;
    Ok(Arc::new(snapshot))
}
