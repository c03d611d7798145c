use camino::Utf8PathBuf;
use std::collections::HashSet;
use std::fs;
use texrestore_core::path_utils::TexturePath;
use texrestore_core::{BackupIndex, TextureInventorySnapshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::io_utils::atomic_copy;
use crate::sources::{report, ProgressSink};
use crate::{RestoreError, RestoreSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorePair {
    pub name: String,
    pub backup: Utf8PathBuf,
    /// Older copies of the same original, retired together with `backup`.
    pub superseded: Vec<Utf8PathBuf>,
    pub target: Utf8PathBuf,
}

/// Pair the newest copy of every backup with the file currently in use that it belongs
/// to. Lookup order: exact base name, DX-normalized base name, then path suffix. Returns
/// the pairs and the names nothing could be found for.
pub fn map_backups_to_targets(
    available: &BackupIndex,
    snapshot: &TextureInventorySnapshot,
) -> (Vec<RestorePair>, Vec<String>) {
    let used: Vec<&Utf8PathBuf> = snapshot.file_paths().collect();
    let mut pairs = Vec::new();
    let mut unmapped = Vec::new();
    let mut claimed: HashSet<&Utf8PathBuf> = HashSet::new();

    for (name, copies) in available {
        let Some(backup) = copies.first() else {
            unmapped.push(name.clone());
            continue;
        };

        let base = TexturePath::file_name(name);
        let lowered = base.to_lowercase();
        let canonical = TexturePath::canonicalize(base);

        let target = used
            .iter()
            .find(|p| TexturePath::file_name(p.as_str()).to_lowercase() == lowered)
            .or_else(|| {
                used.iter()
                    .find(|p| TexturePath::canonical_file_name(p.as_str()) == canonical)
            })
            .or_else(|| used.iter().find(|p| TexturePath::has_suffix(p.as_str(), name)));

        match target {
            Some(target) if claimed.insert(*target) => pairs.push(RestorePair {
                name: name.clone(),
                backup: backup.clone(),
                superseded: copies[1..].to_vec(),
                target: (*target).clone(),
            }),
            Some(target) => {
                debug!("{} already claimed by another backup, skipping {}", target, name);
                unmapped.push(name.clone());
            }
            None => unmapped.push(name.clone()),
        }
    }

    (pairs, unmapped)
}

/// Copy every backup over its target, then delete the consumed copy and every older copy of
/// it once the written size matches, so the name is not offered again. A failed pair is
/// counted and skipped.
pub fn restore_pairs(
    pairs: &[RestorePair],
    progress: Option<&ProgressSink>,
    cancel: &CancellationToken,
) -> Result<RestoreSummary, RestoreError> {
    let total = pairs.len();
    let mut summary = RestoreSummary::default();
    info!("Restoring {} per-file backup(s)", total);

    for (i, pair) in pairs.iter().enumerate() {
        if cancel.is_cancelled() {
            info!("Per-file restore cancelled after {} file(s)", summary.restored);
            return Err(RestoreError::Cancelled {
                restored: summary.restored,
            });
        }
        report(progress, &pair.name, i, total);

        let verified = atomic_copy(&pair.backup, &pair.target).and_then(|written| {
            let expected = fs::metadata(&pair.backup)?.len();
            let on_disk = fs::metadata(&pair.target)?.len();
            Ok(written == expected && on_disk == expected)
        });

        match verified {
            Ok(true) => {
                if let Err(e) = fs::remove_file(&pair.backup) {
                    warn!(
                        "Restored {} but could not remove backup {}: {}",
                        pair.target, pair.backup, e
                    );
                }
                for stale in &pair.superseded {
                    if let Err(e) = fs::remove_file(stale) {
                        warn!("Could not retire older backup {}: {}", stale, e);
                    }
                }
                if let Some(dir) = pair.backup.parent() {
                    // Only succeeds once the name directory is empty.
                    let _ = fs::remove_dir(dir);
                }
                summary.restored += 1;
                summary.written.push(pair.target.clone());
            }
            Ok(false) => {
                warn!("Size mismatch after restoring {}, keeping backup", pair.target);
                summary.failed += 1;
            }
            Err(e) => {
                warn!("Failed to restore {} from {}: {}", pair.target, pair.backup, e);
                summary.failed += 1;
            }
        }
    }

    report(progress, "", total, total);
    Ok(summary)
}
