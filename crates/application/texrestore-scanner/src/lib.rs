use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::fs;
use std::time::UNIX_EPOCH;

pub mod cache;
pub mod per_file;
pub mod session;

pub use per_file::{PerFileScan, PerFileScanner};
pub use session::{SessionManifest, SessionScanner};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("backup root does not exist: {0}")]
    MissingRoot(Utf8PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("non-UTF-8 path: {0}")]
    NonUtf8Path(String),
    #[error("session manifest {path} is invalid: {source}")]
    Manifest {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session archive {path} is unreadable: {source}")]
    Archive {
        path: Utf8PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ScanError {
    /// Nothing has ever been backed up here; not a failure worth escalating.
    pub fn is_absent(&self) -> bool {
        matches!(self, ScanError::MissingRoot(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanStats {
    pub names: u64,
    pub names_skipped: u64,
    pub copies: u64,
    pub sessions: u64,
    pub sessions_skipped: u64,
    pub bytes: u64,
}

/// Modification time in nanoseconds since the epoch, 0 when unknown.
pub fn mtime(meta: &fs::Metadata) -> u128 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

pub fn modified_at(meta: &fs::Metadata) -> DateTime<Utc> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn utf8(path: std::path::PathBuf) -> Result<Utf8PathBuf, ScanError> {
    Utf8PathBuf::from_path_buf(path).map_err(|p| ScanError::NonUtf8Path(p.display().to_string()))
}
