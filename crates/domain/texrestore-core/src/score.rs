use crate::path_utils::TexturePath;
use crate::{BackupSessionInfo, TextureInventorySnapshot};
use std::collections::HashSet;

/// Evidence extracted from the textures in use. Every set holds canonical keys.
#[derive(Debug, Clone, Default)]
pub struct MatchSignals {
    pub used_file_names: HashSet<String>,
    pub used_dir_segments: HashSet<String>,
    pub owning_mod_folders: HashSet<String>,
}

impl MatchSignals {
    pub fn new<N, D, M>(names: N, dirs: D, owning: M) -> Self
    where
        N: IntoIterator,
        N::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            used_file_names: names
                .into_iter()
                .map(|n| TexturePath::canonicalize(n.as_ref()))
                .collect(),
            used_dir_segments: dirs
                .into_iter()
                .map(|d| d.as_ref().to_lowercase())
                .collect(),
            owning_mod_folders: owning
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Signals from a snapshot plus the owning mod folders resolved for it.
    pub fn from_snapshot<M>(snapshot: &TextureInventorySnapshot, owning: M) -> Self
    where
        M: IntoIterator,
        M::Item: AsRef<str>,
    {
        Self {
            used_file_names: snapshot.canonical_file_names(),
            used_dir_segments: snapshot.canonical_dir_segments(),
            owning_mod_folders: owning
                .into_iter()
                .map(|m| m.as_ref().to_lowercase())
                .collect(),
        }
    }
}

pub const NAME_WEIGHT: u32 = 1;
pub const DIR_SEGMENT_WEIGHT: u32 = 1;
/// Confirmed ownership outranks coincidental name or folder matches.
pub const OWNING_MOD_WEIGHT: u32 = 2;
pub const RELATIVE_NAME_WEIGHT: u32 = 1;

pub fn score(session: &BackupSessionInfo, signals: &MatchSignals) -> u32 {
    session
        .entries
        .iter()
        .map(|entry| {
            let mut points = 0;
            if signals
                .used_file_names
                .contains(&TexturePath::canonicalize(&entry.original_file_name))
            {
                points += NAME_WEIGHT;
            }
            let folder = entry.mod_folder_name.to_lowercase();
            if signals.used_dir_segments.contains(&folder) {
                points += DIR_SEGMENT_WEIGHT;
            }
            if signals.owning_mod_folders.contains(&folder) {
                points += OWNING_MOD_WEIGHT;
            }
            if signals
                .used_file_names
                .contains(&TexturePath::canonical_file_name(&entry.mod_relative_path))
            {
                points += RELATIVE_NAME_WEIGHT;
            }
            points
        })
        .sum()
}

/// Highest score wins; equal scores go to the most recent session.
pub fn select_best_session<'a>(
    sessions: &'a [BackupSessionInfo],
    signals: &MatchSignals,
) -> Option<(&'a BackupSessionInfo, u32)> {
    sessions
        .iter()
        .map(|s| (s, score(s, signals)))
        .max_by(|(a, sa), (b, sb)| sa.cmp(sb).then(a.created_at.cmp(&b.created_at)))
}

/// Newest session regardless of score.
pub fn latest_session(sessions: &[BackupSessionInfo]) -> Option<&BackupSessionInfo> {
    sessions.iter().max_by_key(|s| s.created_at)
}
