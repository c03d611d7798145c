use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use texrestore_core::path_utils::TexturePath;
use texrestore_core::score::latest_session;
use texrestore_core::{BackupIndex, BackupSessionInfo, SessionEntry};
use texrestore_scanner::session::{read_dir_session, read_zip_session};
use texrestore_scanner::{PerFileScanner, ScanError, SessionScanner};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::io_utils::{atomic_copy, atomic_write_from};
use crate::resolve::{ModPathResolver, ModRootResolver};
use crate::{RestoreError, RestoreProgress, RestoreSummary};

pub type ProgressSink = Arc<dyn Fn(RestoreProgress) + Send + Sync>;

pub(crate) fn report(
    progress: Option<&ProgressSink>,
    current: &str,
    processed: usize,
    total: usize,
) {
    if let Some(sink) = progress {
        sink(RestoreProgress {
            current_file: current.to_string(),
            processed,
            total,
        });
    }
}

pub trait PerFileSource: Send + Sync {
    fn try_scan(&self) -> Result<BackupIndex, ScanError>;

    fn scan(&self) -> BackupIndex {
        match self.try_scan() {
            Ok(index) => index,
            Err(e) => {
                warn!("Per-file backup scan failed, treating as empty: {e}");
                BackupIndex::new()
            }
        }
    }
}

#[async_trait::async_trait]
pub trait SessionSource: Send + Sync {
    fn try_list_sessions(&self) -> Result<Vec<BackupSessionInfo>, ScanError>;

    fn list_sessions(&self) -> Vec<BackupSessionInfo> {
        match self.try_list_sessions() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Backup session scan failed, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    fn try_mods_with_backups(&self) -> Result<BTreeSet<String>, ScanError> {
        Ok(self
            .try_list_sessions()?
            .iter()
            .flat_map(|s| s.mod_folders())
            .collect())
    }

    fn has_backup_for_mod(&self, mod_folder: &str) -> bool {
        self.list_sessions().iter().any(|s| s.contains_mod(mod_folder))
    }

    /// Restore only `mod_folder`'s entries from the newest session that has any.
    async fn restore_latest_for_mod(
        &self,
        mod_folder: &str,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError>;

    async fn restore_from_session(
        &self,
        session_dir: &Utf8Path,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError>;

    async fn restore_from_zip(
        &self,
        archive: &Utf8Path,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError>;

    async fn restore_latest(
        &self,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError>;
}

pub struct FsPerFileSource {
    scanner: PerFileScanner,
}

impl FsPerFileSource {
    pub fn new(backup_root: &Utf8Path) -> Self {
        Self {
            scanner: PerFileScanner::new(backup_root),
        }
    }
}

impl PerFileSource for FsPerFileSource {
    fn try_scan(&self) -> Result<BackupIndex, ScanError> {
        self.scanner.try_scan().map(|scan| scan.index)
    }
}

/// Session backups on disk, restored into `<mods_root>/<mod folder>/<relative path>`.
pub struct FsSessionSource {
    scanner: Arc<SessionScanner>,
    mods: Arc<ModRootResolver>,
}

impl FsSessionSource {
    pub fn new(backup_root: &Utf8Path, mods_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            scanner: Arc::new(SessionScanner::new(backup_root)),
            mods: Arc::new(ModRootResolver::new(mods_root)),
        }
    }

    pub fn mods_root(&self) -> &Utf8Path {
        self.mods.mods_root()
    }

    async fn run_blocking<F>(f: F) -> Result<RestoreSummary, RestoreError>
    where
        F: FnOnce() -> Result<RestoreSummary, RestoreError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| RestoreError::Join(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl SessionSource for FsSessionSource {
    fn try_list_sessions(&self) -> Result<Vec<BackupSessionInfo>, ScanError> {
        self.scanner.try_list_sessions().map(|(sessions, _)| sessions)
    }

    async fn restore_latest_for_mod(
        &self,
        mod_folder: &str,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError> {
        let scanner = self.scanner.clone();
        let mods = self.mods.clone();
        let mod_folder = mod_folder.to_string();
        Self::run_blocking(move || {
            let (sessions, _) = scanner.try_list_sessions()?;
            let session = sessions
                .into_iter()
                .filter(|s| s.contains_mod(&mod_folder))
                .max_by_key(|s| s.created_at)
                .ok_or_else(|| RestoreError::SessionNotFound(format!("mod '{mod_folder}'")))?;
            restore_session_blocking(
                &session,
                Some(&mod_folder),
                &mods,
                progress.as_ref(),
                &cancel,
            )
        })
        .await
    }

    async fn restore_from_session(
        &self,
        session_dir: &Utf8Path,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError> {
        let dir = session_dir.to_owned();
        let mods = self.mods.clone();
        Self::run_blocking(move || {
            let session = read_dir_session(&dir)?;
            restore_session_blocking(&session, None, &mods, progress.as_ref(), &cancel)
        })
        .await
    }

    async fn restore_from_zip(
        &self,
        archive: &Utf8Path,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError> {
        let archive = archive.to_owned();
        let mods = self.mods.clone();
        Self::run_blocking(move || {
            let session = read_zip_session(&archive)?;
            restore_session_blocking(&session, None, &mods, progress.as_ref(), &cancel)
        })
        .await
    }

    async fn restore_latest(
        &self,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<RestoreSummary, RestoreError> {
        let scanner = self.scanner.clone();
        let mods = self.mods.clone();
        Self::run_blocking(move || {
            let (sessions, _) = scanner.try_list_sessions()?;
            let session = latest_session(&sessions)
                .ok_or_else(|| RestoreError::SessionNotFound("latest session".into()))?;
            restore_session_blocking(session, None, &mods, progress.as_ref(), &cancel)
        })
        .await
    }
}

/// `(mod folder, relative path)` of an entry, with forward slashes.
fn stored_path(entry: &SessionEntry) -> Result<(&str, String), RestoreError> {
    let rel = entry.mod_relative_path.replace('\\', "/");
    let folder = &entry.mod_folder_name;
    if folder.is_empty() || folder.contains(['/', '\\']) || !TexturePath::verify_safe(folder) {
        return Err(RestoreError::UnsafePath(folder.clone()));
    }
    if rel.is_empty() || !TexturePath::verify_safe(&rel) {
        return Err(RestoreError::UnsafePath(entry.mod_relative_path.clone()));
    }
    Ok((folder, rel.trim_start_matches('/').to_string()))
}

fn restore_session_blocking(
    session: &BackupSessionInfo,
    only_mod: Option<&str>,
    mods: &ModRootResolver,
    progress: Option<&ProgressSink>,
    cancel: &CancellationToken,
) -> Result<RestoreSummary, RestoreError> {
    let entries: Vec<&SessionEntry> = session
        .entries
        .iter()
        .filter(|e| only_mod.map_or(true, |m| e.mod_folder_name.eq_ignore_ascii_case(m)))
        .collect();
    let total = entries.len();
    info!(
        "Restoring {} file(s) from session '{}' ({})",
        total, session.display_name, session.source_path
    );

    let mut archive = if session.is_archive {
        Some(zip::ZipArchive::new(fs::File::open(&session.source_path)?)?)
    } else {
        None
    };

    let mut summary = RestoreSummary::default();
    for (i, entry) in entries.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Restore cancelled after {} file(s)", summary.restored);
            return Err(RestoreError::Cancelled {
                restored: summary.restored,
            });
        }
        report(progress, &entry.mod_relative_path, i, total);

        let result = stored_path(entry).and_then(|(folder, rel)| {
            let stored = format!("{folder}/{rel}");
            let mod_dir = mods
                .mod_directory(folder)
                .unwrap_or_else(|| mods.mods_root().join(folder));
            let target = mod_dir.join(&rel);
            let written = match archive.as_mut() {
                Some(archive) => match archive.by_name(&stored) {
                    Ok(mut file) => Some(atomic_write_from(&mut file, &target)?),
                    Err(zip::result::ZipError::FileNotFound) => None,
                    Err(e) => return Err(e.into()),
                },
                None => {
                    let source = session.source_path.join(&stored);
                    if source.is_file() {
                        Some(atomic_copy(&source, &target)?)
                    } else {
                        None
                    }
                }
            };
            let live_name = mod_dir.file_name().unwrap_or(folder).to_string();
            Ok(written.map(|bytes| (target, bytes, live_name)))
        });

        match result {
            Ok(Some((target, bytes, live_name))) => {
                debug!("Restored {} ({} bytes)", target, bytes);
                summary.restored += 1;
                summary.restored_mods.insert(live_name);
                summary.written.push(target);
            }
            Ok(None) => {
                warn!(
                    "Session '{}' has no payload for {}/{}",
                    session.display_name, entry.mod_folder_name, entry.mod_relative_path
                );
                summary.skipped += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to restore {}/{}: {}",
                    entry.mod_folder_name, entry.mod_relative_path, e
                );
                summary.failed += 1;
            }
        }
    }

    report(progress, "", total, total);
    Ok(summary)
}
