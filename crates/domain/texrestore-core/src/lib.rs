use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

pub mod path_utils;
pub mod score;

use path_utils::TexturePath;

/// Opaque key grouping textures by the kind of object that uses them.
pub type ObjectKind = String;
/// Content hash identifying a texture.
pub type ContentHash = String;

/// Original file name -> backup copies, newest first.
pub type BackupIndex = BTreeMap<String, Vec<Utf8PathBuf>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextureUsageEntry {
    pub format: String,
    pub original_size_bytes: u64,
    /// First path is the primary location, the rest are duplicates.
    pub file_paths: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct TextureInventorySnapshot {
    pub objects: BTreeMap<ObjectKind, BTreeMap<ContentHash, TextureUsageEntry>>,
}

impl TextureInventorySnapshot {
    pub fn new(objects: BTreeMap<ObjectKind, BTreeMap<ContentHash, TextureUsageEntry>>) -> Self {
        Self { objects }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TextureUsageEntry> {
        self.objects.values().flat_map(|by_hash| by_hash.values())
    }

    /// Every local path that resolves to a texture in use, duplicates included.
    pub fn file_paths(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.entries().flat_map(|e| e.file_paths.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths().next().is_none()
    }

    pub fn total_original_bytes(&self) -> u64 {
        self.entries().map(|e| e.original_size_bytes).sum()
    }

    /// Canonical base names of every used file.
    pub fn canonical_file_names(&self) -> HashSet<String> {
        self.file_paths()
            .map(|p| TexturePath::canonical_file_name(p.as_str()))
            .collect()
    }

    /// Canonical directory segments of every used file.
    pub fn canonical_dir_segments(&self) -> HashSet<String> {
        self.file_paths()
            .flat_map(|p| TexturePath::canonical_dir_segments(p.as_str()).collect::<Vec<_>>())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntry {
    pub original_file_name: String,
    pub mod_folder_name: String,
    pub mod_relative_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupSessionInfo {
    pub display_name: String,
    /// Session directory or archive file.
    pub source_path: Utf8PathBuf,
    pub is_archive: bool,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<SessionEntry>,
}

impl BackupSessionInfo {
    pub fn contains_mod(&self, mod_folder: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.mod_folder_name.eq_ignore_ascii_case(mod_folder))
    }

    pub fn mod_folders(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .map(|e| e.mod_folder_name.clone())
            .collect()
    }
}

/// One thing the UI can offer to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupCandidate {
    PerFile {
        name: String,
        paths: Vec<Utf8PathBuf>,
    },
    ModScoped {
        mod_folder: String,
    },
}

impl BackupCandidate {
    pub fn display_key(&self) -> String {
        match self {
            BackupCandidate::PerFile { name, .. } => name.clone(),
            BackupCandidate::ModScoped { mod_folder } => {
                format!("{}{}]", texrestore_config::MOD_SCOPE_PREFIX, mod_folder)
            }
        }
    }
}

impl fmt::Display for BackupCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_key())
    }
}

/// Backups relevant to the snapshot they were computed against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionResult {
    pub per_file: BackupIndex,
    pub mod_scoped: BTreeSet<String>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.per_file.is_empty() && self.mod_scoped.is_empty()
    }

    pub fn len(&self) -> usize {
        self.per_file.len() + self.mod_scoped.len()
    }

    /// Union of two partial results. The two kinds live in separate maps, so a mod-scoped
    /// entry can never shadow a file name; on a repeated key `other` wins.
    pub fn merge(mut self, other: DetectionResult) -> DetectionResult {
        self.per_file.extend(other.per_file);
        self.mod_scoped.extend(other.mod_scoped);
        self
    }

    pub fn candidates(&self) -> impl Iterator<Item = BackupCandidate> + '_ {
        let files = self
            .per_file
            .iter()
            .map(|(name, paths)| BackupCandidate::PerFile {
                name: name.clone(),
                paths: paths.clone(),
            });
        let mods = self
            .mod_scoped
            .iter()
            .map(|m| BackupCandidate::ModScoped {
                mod_folder: m.clone(),
            });
        files.chain(mods)
    }
}
