mod io_utils;
pub mod coalesce;
pub mod detect;
pub mod per_file;
pub mod resolve;
pub mod sources;
pub mod validate;

use camino::Utf8PathBuf;
use std::collections::BTreeSet;

pub use coalesce::CoalescingCache;
pub use detect::{DetectionCache, DetectionSlot};
pub use per_file::{map_backups_to_targets, restore_pairs, RestorePair};
pub use resolve::{owning_mod_folders, ModPathResolver, ModRootResolver};
pub use sources::{
    FsPerFileSource, FsSessionSource, PerFileSource, ProgressSink, SessionSource,
};

// Re-export scanner types often needed by consumers
pub use texrestore_scanner::{ScanError, ScanStats};

/// Progress tuple reported between file operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreProgress {
    pub current_file: String,
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub restored_mods: BTreeSet<String>,
    pub written: Vec<Utf8PathBuf>,
}

impl RestoreSummary {
    pub fn any_restored(&self) -> bool {
        self.restored > 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("unsafe path in backup manifest: {0}")]
    UnsafePath(String),
    #[error("no backup session found for {0}")]
    SessionNotFound(String),
    #[error("restore cancelled after {restored} file(s)")]
    Cancelled { restored: usize },
    #[error("restore worker failed: {0}")]
    Join(String),
}

impl RestoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RestoreError::Cancelled { .. })
    }
}
