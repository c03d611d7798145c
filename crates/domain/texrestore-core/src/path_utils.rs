use texrestore_config::COSMETIC_NAME_TOKENS;

pub struct TexturePath;

impl TexturePath {
    /// Strip every cosmetic graphics-API token (case-insensitive), leaving the rest of the
    /// name untouched. Removal repeats until no token is left, so the result is a fixpoint.
    pub fn normalize(name: &str) -> String {
        let mut current = name.to_string();
        loop {
            let lowered = current.to_ascii_lowercase();
            let hit = COSMETIC_NAME_TOKENS
                .iter()
                .filter_map(|token| lowered.find(token).map(|at| (at, token.len())))
                .min_by_key(|(at, _)| *at);

            match hit {
                Some((at, len)) => current.replace_range(at..at + len, ""),
                None => return current,
            }
        }
    }

    /// Comparison key: normalized, forward slashes, lowercase.
    pub fn canonicalize(name: &str) -> String {
        Self::normalize(&name.replace('\\', "/")).to_lowercase()
    }

    /// Last path segment, accepting both separator styles.
    pub fn file_name(path: &str) -> &str {
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    /// Canonical key of a path's last segment.
    pub fn canonical_file_name(path: &str) -> String {
        Self::canonicalize(Self::file_name(path))
    }

    /// Directory segments of a path (everything but the file name), canonicalized.
    pub fn canonical_dir_segments(path: &str) -> impl Iterator<Item = String> + '_ {
        let mut parts: Vec<&str> = path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
        parts.pop();
        parts.into_iter().map(|s| s.to_lowercase())
    }

    /// Reject absolute paths and parent traversal in manifest-provided relative paths.
    pub fn verify_safe(rel_path: &str) -> bool {
        let normalized = rel_path.replace('\\', "/");
        let p = std::path::Path::new(&normalized);
        !normalized.starts_with('/')
            && !(normalized.len() > 1 && normalized.as_bytes()[1] == b':')
            && !p.is_absolute()
            && !p
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
    }

    /// Does `path` end with `suffix` on a segment boundary (case-insensitive)?
    pub fn has_suffix(path: &str, suffix: &str) -> bool {
        let path = path.replace('\\', "/").to_lowercase();
        let suffix = suffix.replace('\\', "/").to_lowercase();
        let suffix = suffix.trim_start_matches('/');
        if suffix.is_empty() {
            return false;
        }
        path == suffix || path.ends_with(&format!("/{suffix}"))
    }
}
