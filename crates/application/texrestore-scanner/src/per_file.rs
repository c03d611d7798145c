use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use std::fs;
use texrestore_config::{PER_FILE_DIR, RESTORE_TMP_SUFFIX};
use texrestore_core::BackupIndex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{mtime, utf8, ScanError, ScanStats};

#[derive(Debug, Clone, Default)]
pub struct PerFileScan {
    pub index: BackupIndex,
    pub stats: ScanStats,
}

/// Read-only view over `<backup_root>/textures/<original name>/<stamp>_<original name>`.
#[derive(Debug, Clone)]
pub struct PerFileScanner {
    root: Utf8PathBuf,
}

struct BackupCopy {
    path: Utf8PathBuf,
    mtime: u128,
    len: u64,
}

impl PerFileScanner {
    pub fn new(backup_root: &Utf8Path) -> Self {
        Self::at(backup_root.join(PER_FILE_DIR))
    }

    pub fn at(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn try_scan(&self) -> Result<PerFileScan, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::MissingRoot(self.root.clone()));
        }
        debug!("Scanning per-file backups in {}", self.root);

        let mut name_dirs = Vec::new();
        let mut skipped = 0u64;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = match utf8(entry.path()) {
                Ok(dir) => dir,
                Err(e) => {
                    warn!("Skipping per-file backup directory: {e}");
                    skipped += 1;
                    continue;
                }
            };
            if let Some(name) = dir.file_name() {
                name_dirs.push((name.to_string(), dir.clone()));
            }
        }

        let results: Vec<(String, Result<Vec<BackupCopy>, ScanError>)> = name_dirs
            .par_iter()
            .map(|(name, dir)| (name.clone(), Self::copies(dir)))
            .collect();

        let mut scan = PerFileScan::default();
        scan.stats.names_skipped = skipped;
        for (name, res) in results {
            let copies = match res {
                Ok(copies) => copies,
                Err(e) => {
                    warn!("Skipping unreadable per-file backups for {}: {}", name, e);
                    scan.stats.names_skipped += 1;
                    continue;
                }
            };
            if copies.is_empty() {
                continue;
            }
            scan.stats.names += 1;
            scan.stats.copies += copies.len() as u64;
            scan.stats.bytes += copies.iter().map(|c| c.len).sum::<u64>();
            scan.index
                .insert(name, copies.into_iter().map(|c| c.path).collect());
        }

        info!(
            "Per-file scan of {}: {} names, {} copies ({} skipped)",
            self.root, scan.stats.names, scan.stats.copies, scan.stats.names_skipped
        );
        Ok(scan)
    }

    /// Boundary form: failures become an empty index.
    pub fn scan(&self) -> BackupIndex {
        match self.try_scan() {
            Ok(scan) => scan.index,
            Err(e) if e.is_absent() => {
                debug!("No per-file backups: {e}");
                BackupIndex::new()
            }
            Err(e) => {
                warn!("Per-file backup scan failed, treating as empty: {e}");
                BackupIndex::new()
            }
        }
    }

    /// Copies inside one name directory, newest first.
    fn copies(dir: &Utf8Path) -> Result<Vec<BackupCopy>, ScanError> {
        let mut copies = Vec::new();
        for walk in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let walk = walk?;
            if !walk.file_type().is_file() {
                continue;
            }
            let path = utf8(walk.into_path())?;
            if path.as_str().ends_with(RESTORE_TMP_SUFFIX) {
                continue;
            }
            let meta = fs::metadata(&path)?;
            copies.push(BackupCopy {
                mtime: mtime(&meta),
                len: meta.len(),
                path,
            });
        }
        copies.sort_by(|a, b| {
            b.mtime
                .cmp(&a.mtime)
                .then_with(|| b.path.file_name().cmp(&a.path.file_name()))
        });
        Ok(copies)
    }
}
