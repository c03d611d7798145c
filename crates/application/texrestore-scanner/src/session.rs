use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::sync::Mutex;
use texrestore_config::{SESSIONS_DIR, SESSION_ARCHIVE_EXT, SESSION_MANIFEST};
use texrestore_core::{BackupSessionInfo, SessionEntry};
use tracing::{debug, info, warn};

use crate::cache::ManifestCache;
use crate::{modified_at, mtime, utf8, ScanError, ScanStats};

/// On-disk `session.json`, written by the backup side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionManifest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<SessionEntry>,
}

impl SessionManifest {
    fn into_session(
        self,
        source_path: Utf8PathBuf,
        is_archive: bool,
        fallback_time: DateTime<Utc>,
    ) -> BackupSessionInfo {
        let display_name = self.display_name.unwrap_or_else(|| {
            source_path
                .file_stem()
                .unwrap_or(source_path.as_str())
                .to_string()
        });
        BackupSessionInfo {
            display_name,
            source_path,
            is_archive,
            created_at: self.created_at.unwrap_or(fallback_time),
            entries: self.entries,
        }
    }
}

/// Read-only view over `<backup_root>/sessions/`, where each session is a directory or
/// a zip archive carrying a `session.json` manifest.
#[derive(Debug)]
pub struct SessionScanner {
    root: Utf8PathBuf,
    cache: Mutex<ManifestCache>,
}

impl SessionScanner {
    pub fn new(backup_root: &Utf8Path) -> Self {
        Self::at(backup_root.join(SESSIONS_DIR))
    }

    pub fn at(root: Utf8PathBuf) -> Self {
        Self {
            root,
            cache: Mutex::new(ManifestCache::default()),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Sessions in directory order; callers sort.
    pub fn try_list_sessions(&self) -> Result<(Vec<BackupSessionInfo>, ScanStats), ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::MissingRoot(self.root.clone()));
        }

        let mut stats = ScanStats::default();
        let mut sessions = Vec::new();
        let mut seen = HashSet::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = utf8(entry.path())?;
            let is_archive = path.is_file()
                && path
                    .extension()
                    .map(|e| e.eq_ignore_ascii_case(SESSION_ARCHIVE_EXT))
                    .unwrap_or(false);
            if !(is_archive || path.join(SESSION_MANIFEST).is_file()) {
                continue;
            }

            seen.insert(path.clone());
            match self.cached_session(&path, is_archive) {
                Ok(session) => {
                    stats.sessions += 1;
                    sessions.push(session);
                }
                Err(e) => {
                    stats.sessions_skipped += 1;
                    warn!("Skipping unreadable backup session {}: {}", path, e);
                }
            }
        }

        if let Ok(mut cache) = self.cache.lock() {
            cache.prune_ghosts(&seen);
        }

        info!(
            "Session scan of {}: {} sessions ({} skipped)",
            self.root, stats.sessions, stats.sessions_skipped
        );
        Ok((sessions, stats))
    }

    /// Boundary form: failures become an empty listing.
    pub fn list_sessions(&self) -> Vec<BackupSessionInfo> {
        match self.try_list_sessions() {
            Ok((sessions, _)) => sessions,
            Err(e) if e.is_absent() => {
                debug!("No backup sessions: {e}");
                Vec::new()
            }
            Err(e) => {
                warn!("Backup session scan failed, treating as empty: {e}");
                Vec::new()
            }
        }
    }

    /// Every mod folder that appears in at least one session.
    pub fn try_mods_with_backups(&self) -> Result<BTreeSet<String>, ScanError> {
        let (sessions, _) = self.try_list_sessions()?;
        Ok(sessions.iter().flat_map(|s| s.mod_folders()).collect())
    }

    pub fn has_backup_for_mod(&self, mod_folder: &str) -> bool {
        self.list_sessions().iter().any(|s| s.contains_mod(mod_folder))
    }

    fn cached_session(
        &self,
        path: &Utf8Path,
        is_archive: bool,
    ) -> Result<BackupSessionInfo, ScanError> {
        let stamp_path = if is_archive {
            path.to_owned()
        } else {
            path.join(SESSION_MANIFEST)
        };
        let meta = fs::metadata(&stamp_path)?;
        let (stamp, len) = (mtime(&meta), meta.len());

        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(path, stamp, len) {
                return Ok(hit.clone());
            }
        }

        let session = read_session(path)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.update(path, stamp, len, session.clone());
        }
        Ok(session)
    }
}

/// Load a single session from a directory or an archive.
pub fn read_session(path: &Utf8Path) -> Result<BackupSessionInfo, ScanError> {
    if path.is_dir() {
        read_dir_session(path)
    } else {
        read_zip_session(path)
    }
}

pub fn read_dir_session(dir: &Utf8Path) -> Result<BackupSessionInfo, ScanError> {
    let manifest_path = dir.join(SESSION_MANIFEST);
    let raw = fs::read_to_string(&manifest_path)?;
    let manifest: SessionManifest =
        serde_json::from_str(&raw).map_err(|source| ScanError::Manifest {
            path: manifest_path.clone(),
            source,
        })?;
    let fallback = modified_at(&fs::metadata(dir)?);
    Ok(manifest.into_session(dir.to_owned(), false, fallback))
}

pub fn read_zip_session(archive_path: &Utf8Path) -> Result<BackupSessionInfo, ScanError> {
    let file = fs::File::open(archive_path)?;
    let fallback = modified_at(&file.metadata()?);
    let archive_err = |source: zip::result::ZipError| ScanError::Archive {
        path: archive_path.to_owned(),
        source,
    };

    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;
    let manifest_file = archive.by_name(SESSION_MANIFEST).map_err(archive_err)?;
    let manifest: SessionManifest =
        serde_json::from_reader(manifest_file).map_err(|source| ScanError::Manifest {
            path: archive_path.join(SESSION_MANIFEST),
            source,
        })?;
    Ok(manifest.into_session(archive_path.to_owned(), true, fallback))
}
