use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;
use std::fs;
use texrestore_core::TextureInventorySnapshot;

/// Maps a texture file in use to the mod folder it lives in.
pub trait ModPathResolver: Send + Sync {
    fn owning_mod_folder(&self, file_path: &Utf8Path) -> Option<String>;
    fn mod_directory(&self, mod_folder: &str) -> Option<Utf8PathBuf>;
}

/// Resolver for a flat mod library: `<mods_root>/<mod folder>/...`.
#[derive(Debug, Clone)]
pub struct ModRootResolver {
    mods_root: Utf8PathBuf,
}

impl ModRootResolver {
    pub fn new(mods_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            mods_root: mods_root.into(),
        }
    }

    pub fn mods_root(&self) -> &Utf8Path {
        &self.mods_root
    }
}

impl ModPathResolver for ModRootResolver {
    fn owning_mod_folder(&self, file_path: &Utf8Path) -> Option<String> {
        if let Ok(rel) = file_path.strip_prefix(&self.mods_root) {
            return rel.components().next().map(|c| c.as_str().to_string());
        }

        // Windows paths reach us with mixed case and separators.
        let root = self.mods_root.as_str().replace('\\', "/").to_ascii_lowercase();
        let root = root.trim_end_matches('/');
        let path = file_path.as_str().replace('\\', "/");
        if path.len() <= root.len() + 1
            || !path.to_ascii_lowercase().starts_with(&format!("{root}/"))
        {
            return None;
        }
        path[root.len() + 1..]
            .split('/')
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// The folder as it is spelled on disk; manifests and the host may disagree on case.
    fn mod_directory(&self, mod_folder: &str) -> Option<Utf8PathBuf> {
        let exact = self.mods_root.join(mod_folder);
        if exact.is_dir() {
            return Some(exact);
        }
        fs::read_dir(&self.mods_root)
            .ok()?
            .filter_map(Result::ok)
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
            .find(|dir| {
                dir.file_name()
                    .map_or(false, |name| name.eq_ignore_ascii_case(mod_folder))
            })
    }
}

/// Mod folders that own at least one file of the snapshot.
pub fn owning_mod_folders(
    resolver: &dyn ModPathResolver,
    snapshot: &TextureInventorySnapshot,
) -> BTreeSet<String> {
    snapshot
        .file_paths()
        .filter_map(|p| resolver.owning_mod_folder(p))
        .collect()
}
