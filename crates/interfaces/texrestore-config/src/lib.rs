//! Central configuration constants for detection, matching and restore.

use std::time::Duration;

/// How long a filled detection slot counts as fresh.
pub const DEFAULT_STALENESS_WINDOW: Duration = Duration::from_secs(5);

/// Consecutive scan failures after which a slot logs at error level.
pub const SCAN_FAILURE_ESCALATION: u32 = 3;

/// Cosmetic graphics-API markers stripped from texture file names before comparison.
pub const COSMETIC_NAME_TOKENS: &[&str] = &["_dx11", "-dx11", "_dx9", "-dx9"];

/// Extensions counted by the post-restore validation pass.
pub const TEXTURE_EXTENSIONS: &[&str] = &["tex", "dds", "atex", "png"];

/// Display prefix for mod-scoped backup candidates.
pub const MOD_SCOPE_PREFIX: &str = "[Mod: ";

/// Sub-directory of the backup root holding per-file copies.
pub const PER_FILE_DIR: &str = "textures";

/// Sub-directory of the backup root holding session backups.
pub const SESSIONS_DIR: &str = "sessions";

/// Manifest file inside a session directory or archive.
pub const SESSION_MANIFEST: &str = "session.json";

/// Archive extension recognised as a compressed session.
pub const SESSION_ARCHIVE_EXT: &str = "zip";

/// Suffix of the sibling file a restore writes before renaming into place.
pub const RESTORE_TMP_SUFFIX: &str = "texrestore-tmp";

/// Rename attempts before an atomic restore write gives up.
pub const RENAME_MAX_ATTEMPTS: u32 = 8;

/// Initial backoff between rename attempts (milliseconds), doubled up to the cap.
pub const RENAME_BACKOFF_MS: u64 = 50;

/// Upper bound on the rename backoff (milliseconds).
pub const RENAME_BACKOFF_CAP_MS: u64 = 2000;

/// Convenience function to turn a user supplied staleness (seconds) into a window,
/// never shorter than one second.
pub fn staleness_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
