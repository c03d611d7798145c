use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use texrestore_config::SCAN_FAILURE_ESCALATION;
use texrestore_core::path_utils::TexturePath;
use texrestore_core::{DetectionResult, TextureInventorySnapshot};
use tracing::{debug, error, warn};

use crate::coalesce::CoalescingCache;
use crate::resolve::{owning_mod_folders, ModPathResolver};
use crate::sources::{PerFileSource, SessionSource};
use crate::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionSlot {
    PerFile,
    Session,
}

/// Consecutive scan failures of one source. Every failure is logged; from the escalation
/// threshold on, at error level.
#[derive(Debug)]
struct FailureTracker {
    source: &'static str,
    consecutive: AtomicU32,
}

impl FailureTracker {
    fn new(source: &'static str) -> Self {
        Self {
            source,
            consecutive: AtomicU32::new(0),
        }
    }

    fn record(&self, err: &ScanError) {
        if err.is_absent() {
            debug!("{} backups absent: {}", self.source, err);
            self.consecutive.store(0, Ordering::Relaxed);
            return;
        }
        let n = self.consecutive.fetch_add(1, Ordering::Relaxed) + 1;
        if n >= SCAN_FAILURE_ESCALATION {
            error!(
                "{} backup scan failed {} times in a row, offering nothing: {}",
                self.source, n, err
            );
        } else {
            warn!("{} backup scan failed, offering nothing: {}", self.source, err);
        }
    }

    fn reset(&self) {
        self.consecutive.store(0, Ordering::Relaxed);
    }

    fn count(&self) -> u32 {
        self.consecutive.load(Ordering::Relaxed)
    }
}

/// Backups relevant to the textures in use, refreshed in the background.
pub struct DetectionCache {
    cache: CoalescingCache<DetectionSlot, DetectionResult>,
    per_file: Arc<dyn PerFileSource>,
    sessions: Option<Arc<dyn SessionSource>>,
    resolver: Arc<dyn ModPathResolver>,
    last_snapshot: Mutex<Option<Arc<TextureInventorySnapshot>>>,
    per_file_failures: Arc<FailureTracker>,
    session_failures: Arc<FailureTracker>,
}

impl DetectionCache {
    pub fn new(
        per_file: Arc<dyn PerFileSource>,
        sessions: Option<Arc<dyn SessionSource>>,
        resolver: Arc<dyn ModPathResolver>,
        staleness: Duration,
    ) -> Self {
        Self {
            cache: CoalescingCache::new("detection", staleness),
            per_file,
            sessions,
            resolver,
            last_snapshot: Mutex::new(None),
            per_file_failures: Arc::new(FailureTracker::new("Per-file")),
            session_failures: Arc::new(FailureTracker::new("Session")),
        }
    }

    /// Never blocks on a scan. Returns the freshest union of both sources; stale slots are
    /// refreshed in the background.
    pub fn get_relevant_backups(
        &self,
        snapshot: &Arc<TextureInventorySnapshot>,
    ) -> Arc<DetectionResult> {
        if let Ok(mut last) = self.last_snapshot.lock() {
            *last = Some(snapshot.clone());
        }

        let per_file = {
            let source = self.per_file.clone();
            let failures = self.per_file_failures.clone();
            let snapshot = snapshot.clone();
            self.cache.get_or_refresh(DetectionSlot::PerFile, move || {
                fill_per_file(source.as_ref(), &failures, &snapshot)
            })
        };

        let Some(sessions) = self.sessions.clone() else {
            return per_file;
        };
        let session = {
            let resolver = self.resolver.clone();
            let failures = self.session_failures.clone();
            let snapshot = snapshot.clone();
            self.cache.get_or_refresh(DetectionSlot::Session, move || {
                fill_session(sessions.as_ref(), resolver.as_ref(), &failures, &snapshot)
            })
        };

        if session.is_empty() {
            return per_file;
        }
        Arc::new((*per_file).clone().merge((*session).clone()))
    }

    /// Forget everything and pre-warm with the last snapshot seen.
    pub fn invalidate(&self) {
        self.cache.invalidate();
        let last = self.last_snapshot.lock().ok().and_then(|s| s.clone());
        if let Some(snapshot) = last {
            debug!("Pre-warming detection cache after invalidation");
            let _ = self.get_relevant_backups(&snapshot);
        }
    }

    pub fn is_in_flight(&self, slot: DetectionSlot) -> bool {
        self.cache.is_in_flight(&slot)
    }

    pub fn consecutive_failures(&self, slot: DetectionSlot) -> u32 {
        match slot {
            DetectionSlot::PerFile => self.per_file_failures.count(),
            DetectionSlot::Session => self.session_failures.count(),
        }
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.cache.wait_idle(timeout)
    }
}

fn fill_per_file(
    source: &dyn PerFileSource,
    failures: &FailureTracker,
    snapshot: &TextureInventorySnapshot,
) -> DetectionResult {
    let used = snapshot.canonical_file_names();
    match source.try_scan() {
        Ok(index) => {
            failures.reset();
            let per_file = index
                .into_iter()
                .filter(|(name, _)| used.contains(&TexturePath::canonicalize(name)))
                .collect();
            DetectionResult {
                per_file,
                ..Default::default()
            }
        }
        Err(e) => {
            failures.record(&e);
            DetectionResult::default()
        }
    }
}

fn fill_session(
    source: &dyn SessionSource,
    resolver: &dyn ModPathResolver,
    failures: &FailureTracker,
    snapshot: &TextureInventorySnapshot,
) -> DetectionResult {
    let owning = owning_mod_folders(resolver, snapshot);
    if owning.is_empty() {
        return DetectionResult::default();
    }
    match source.try_mods_with_backups() {
        Ok(with_backups) => {
            failures.reset();
            let with_backups: HashSet<String> =
                with_backups.iter().map(|m| m.to_lowercase()).collect();
            DetectionResult {
                mod_scoped: owning
                    .into_iter()
                    .filter(|m| with_backups.contains(&m.to_lowercase()))
                    .collect(),
                ..Default::default()
            }
        }
        Err(e) => {
            failures.record(&e);
            DetectionResult::default()
        }
    }
}
