use camino::Utf8Path;
use texrestore_config::TEXTURE_EXTENSIONS;
use walkdir::WalkDir;

fn is_texture(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXTURE_EXTENSIONS.iter().any(|t| e.eq_ignore_ascii_case(t)))
        .unwrap_or(false)
}

/// Texture-like files present under `dir`. A sanity check, not proof of a good restore.
pub fn count_texture_files(dir: &Utf8Path) -> usize {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_texture(e.path()))
        .count()
}
