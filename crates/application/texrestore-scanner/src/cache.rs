use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{HashMap, HashSet};
use texrestore_core::BackupSessionInfo;

#[derive(Debug, Clone)]
pub struct SessionCacheEntry {
    pub mtime: u128,
    pub len: u64,
    pub session: BackupSessionInfo,
}

/// Parsed session manifests keyed by session path. An entry is reused only while the
/// manifest (or archive) keeps the same mtime and length.
#[derive(Debug, Default)]
pub struct ManifestCache {
    pub entries: HashMap<Utf8PathBuf, SessionCacheEntry>,
}

impl ManifestCache {
    pub fn get(&self, path: &Utf8Path, mtime: u128, len: u64) -> Option<&BackupSessionInfo> {
        self.entries
            .get(path)
            .filter(|e| e.mtime == mtime && e.len == len)
            .map(|e| &e.session)
    }

    pub fn update(&mut self, path: &Utf8Path, mtime: u128, len: u64, session: BackupSessionInfo) {
        self.entries.insert(
            path.to_owned(),
            SessionCacheEntry {
                mtime,
                len,
                session,
            },
        );
    }

    /// Forget sessions that were not seen in the latest listing.
    pub fn prune_ghosts(&mut self, seen: &HashSet<Utf8PathBuf>) {
        self.entries.retain(|path, _| seen.contains(path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
