use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use texrestore_core::score::{select_best_session, MatchSignals};
use texrestore_core::{BackupIndex, BackupSessionInfo, TextureInventorySnapshot};
use texrestore_pipeline::validate::count_texture_files;
use texrestore_pipeline::{
    map_backups_to_targets, owning_mod_folders, restore_pairs, DetectionCache, ModPathResolver,
    ProgressSink, RestoreError, RestoreProgress, RestoreSummary, SessionSource,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ports::VisualReloader;
use crate::state::{RestoreRunEvent, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RestoreStage {
    TargetedModRestore,
    SessionRestore,
    LatestSessionFallback,
    PerFileFallback,
}

impl RestoreStage {
    pub const ALL: [RestoreStage; 4] = [
        RestoreStage::TargetedModRestore,
        RestoreStage::SessionRestore,
        RestoreStage::LatestSessionFallback,
        RestoreStage::PerFileFallback,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            RestoreStage::TargetedModRestore => "targeted mod restore",
            RestoreStage::SessionRestore => "session restore",
            RestoreStage::LatestSessionFallback => "latest session fallback",
            RestoreStage::PerFileFallback => "per-file fallback",
        }
    }
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One user-initiated restore. Consumed by a single run.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub snapshot: Arc<TextureInventorySnapshot>,
    /// Per-file backups the caller offered, usually from the detection cache.
    pub available_backups: BackupIndex,
}

impl RestoreRequest {
    pub fn new(snapshot: Arc<TextureInventorySnapshot>, available_backups: BackupIndex) -> Self {
        Self {
            snapshot,
            available_backups,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreWarning {
    MissingTextures {
        mod_folder: String,
        expected: usize,
        found: usize,
    },
    ModDirectoryMissing {
        mod_folder: String,
    },
    Unmapped {
        name: String,
    },
}

impl fmt::Display for RestoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreWarning::MissingTextures {
                mod_folder,
                expected,
                found,
            } => write!(
                f,
                "{mod_folder}: expected at least {expected} texture file(s), found {found}"
            ),
            RestoreWarning::ModDirectoryMissing { mod_folder } => {
                write!(f, "{mod_folder}: mod directory not found after restore")
            }
            RestoreWarning::Unmapped { name } => {
                write!(f, "{name}: no texture in use matches this backup")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStatus {
    Success,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub stage: RestoreStage,
    pub restored_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub restored_mods: BTreeSet<String>,
    pub written: Vec<Utf8PathBuf>,
    pub warnings: Vec<RestoreWarning>,
}

impl RestoreReport {
    fn new(stage: RestoreStage) -> Self {
        Self {
            stage,
            restored_files: 0,
            skipped_files: 0,
            failed_files: 0,
            restored_mods: BTreeSet::new(),
            written: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn absorb(&mut self, summary: RestoreSummary) {
        self.restored_files += summary.restored;
        self.skipped_files += summary.skipped;
        self.failed_files += summary.failed;
        self.restored_mods.extend(summary.restored_mods);
        self.written.extend(summary.written);
    }

    /// Validation warnings never downgrade a restore; failed files do.
    pub fn status(&self) -> RestoreStatus {
        if self.failed_files == 0 {
            RestoreStatus::Success
        } else {
            RestoreStatus::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NothingRestoredReason {
    /// No session matched and no per-file backup was offered.
    NoBackups,
    /// Per-file backups were offered but none maps to a texture in use.
    Unmapped,
    /// Every step that had something to try failed.
    AllStepsFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Completed(RestoreReport),
    NothingRestored { reason: NothingRestoredReason },
    Cancelled,
}

impl RestoreOutcome {
    pub fn report(&self) -> Option<&RestoreReport> {
        match self {
            RestoreOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RestoreOutcome::Completed(_))
    }
}

pub type RestoreObserver = Arc<dyn Fn(RestoreRunEvent) + Send + Sync>;

enum Step {
    Done(RestoreReport),
    Skipped,
    Failed,
    Cancelled,
    Nothing(NothingRestoredReason),
}

fn emit(observer: Option<&RestoreObserver>, ev: RestoreRunEvent) {
    if let Some(observer) = observer {
        observer(ev);
    }
}

fn stage_changed(
    observer: Option<&RestoreObserver>,
    stage: RestoreStage,
    status: StepStatus,
    detail: impl Into<String>,
) {
    emit(
        observer,
        RestoreRunEvent::StageChanged {
            stage,
            status,
            detail: detail.into(),
        },
    );
}

fn stage_sink(observer: Option<&RestoreObserver>, stage: RestoreStage) -> Option<ProgressSink> {
    let observer = observer?.clone();
    let sink: ProgressSink = Arc::new(move |progress: RestoreProgress| {
        observer(RestoreRunEvent::Progress { stage, progress })
    });
    Some(sink)
}

/// Runs the restore fallback chain for one request:
/// targeted mod restore, best-scoring session, latest session, then per-file backups.
pub struct RestorePipeline {
    sessions: Option<Arc<dyn SessionSource>>,
    resolver: Arc<dyn ModPathResolver>,
    reloader: Arc<dyn VisualReloader>,
    detection: Option<Arc<DetectionCache>>,
}

impl RestorePipeline {
    pub fn new(
        sessions: Option<Arc<dyn SessionSource>>,
        resolver: Arc<dyn ModPathResolver>,
        reloader: Arc<dyn VisualReloader>,
    ) -> Self {
        Self {
            sessions,
            resolver,
            reloader,
            detection: None,
        }
    }

    /// Invalidate `detection` whenever files on disk change.
    pub fn with_detection(mut self, detection: Arc<DetectionCache>) -> Self {
        self.detection = Some(detection);
        self
    }

    pub async fn run(
        &self,
        request: &RestoreRequest,
        cancel: &CancellationToken,
        observer: Option<RestoreObserver>,
    ) -> RestoreOutcome {
        let outcome = self.run_stages(request, cancel, observer.as_ref()).await;
        match &outcome {
            RestoreOutcome::Completed(report) => {
                info!(
                    "Restore finished via {}: {} restored, {} failed, {} warning(s)",
                    report.stage,
                    report.restored_files,
                    report.failed_files,
                    report.warnings.len()
                );
                self.after_success();
            }
            RestoreOutcome::Cancelled => {
                info!("Restore cancelled");
                // Files already processed stay restored.
                if let Some(detection) = &self.detection {
                    detection.invalidate();
                }
            }
            RestoreOutcome::NothingRestored { reason } => {
                info!("Nothing restored: {:?}", reason);
            }
        }
        outcome
    }

    async fn run_stages(
        &self,
        request: &RestoreRequest,
        cancel: &CancellationToken,
        observer: Option<&RestoreObserver>,
    ) -> RestoreOutcome {
        let mut any_failed = false;

        if let Some(sessions) = self.sessions.as_deref() {
            for stage in [
                RestoreStage::TargetedModRestore,
                RestoreStage::SessionRestore,
                RestoreStage::LatestSessionFallback,
            ] {
                if cancel.is_cancelled() {
                    return RestoreOutcome::Cancelled;
                }
                stage_changed(observer, stage, StepStatus::Running, format!("Running {stage}"));
                let step = match stage {
                    RestoreStage::TargetedModRestore => {
                        self.targeted(sessions, request, cancel, observer).await
                    }
                    RestoreStage::SessionRestore => {
                        self.best_session(sessions, request, cancel, observer).await
                    }
                    _ => self.latest_session(sessions, cancel, observer).await,
                };
                match step {
                    Step::Done(report) => {
                        stage_changed(
                            observer,
                            stage,
                            StepStatus::Succeeded,
                            format!("{} file(s) restored", report.restored_files),
                        );
                        return RestoreOutcome::Completed(report);
                    }
                    Step::Cancelled => {
                        stage_changed(observer, stage, StepStatus::Failed, "Cancelled");
                        return RestoreOutcome::Cancelled;
                    }
                    Step::Failed => {
                        any_failed = true;
                        stage_changed(observer, stage, StepStatus::Failed, "Failed, falling back");
                    }
                    Step::Skipped | Step::Nothing(_) => {
                        stage_changed(observer, stage, StepStatus::Skipped, "Nothing to restore");
                    }
                }
            }

            if request.available_backups.is_empty() {
                let reason = if any_failed {
                    NothingRestoredReason::AllStepsFailed
                } else {
                    NothingRestoredReason::NoBackups
                };
                return RestoreOutcome::NothingRestored { reason };
            }
        }

        if cancel.is_cancelled() {
            return RestoreOutcome::Cancelled;
        }
        let stage = RestoreStage::PerFileFallback;
        stage_changed(observer, stage, StepStatus::Running, "Restoring per-file backups");
        match self.per_file(request, cancel, observer).await {
            Step::Done(report) => {
                stage_changed(
                    observer,
                    stage,
                    StepStatus::Succeeded,
                    format!("{} file(s) restored", report.restored_files),
                );
                RestoreOutcome::Completed(report)
            }
            Step::Cancelled => {
                stage_changed(observer, stage, StepStatus::Failed, "Cancelled");
                RestoreOutcome::Cancelled
            }
            Step::Nothing(reason) => {
                stage_changed(observer, stage, StepStatus::Skipped, "Nothing to restore");
                RestoreOutcome::NothingRestored { reason }
            }
            Step::Failed | Step::Skipped => {
                stage_changed(observer, stage, StepStatus::Failed, "No file restored");
                RestoreOutcome::NothingRestored {
                    reason: NothingRestoredReason::AllStepsFailed,
                }
            }
        }
    }

    async fn targeted(
        &self,
        sessions: &dyn SessionSource,
        request: &RestoreRequest,
        cancel: &CancellationToken,
        observer: Option<&RestoreObserver>,
    ) -> Step {
        let stage = RestoreStage::TargetedModRestore;
        let owning = owning_mod_folders(self.resolver.as_ref(), &request.snapshot);
        if owning.is_empty() {
            debug!("No texture in use resolves to a mod folder");
            return Step::Skipped;
        }
        let with_backups: HashSet<String> = match sessions.try_mods_with_backups() {
            Ok(mods) => mods.iter().map(|m| m.to_lowercase()).collect(),
            Err(e) if e.is_absent() => return Step::Skipped,
            Err(e) => {
                warn!("Could not list session backups: {}", e);
                return Step::Failed;
            }
        };

        let mut report = RestoreReport::new(stage);
        let mut errored = false;
        for folder in owning
            .iter()
            .filter(|m| with_backups.contains(&m.to_lowercase()))
        {
            let result = sessions
                .restore_latest_for_mod(folder, stage_sink(observer, stage), cancel.clone())
                .await;
            match result {
                Ok(summary) => {
                    info!("Restored {} file(s) of mod {}", summary.restored, folder);
                    report.absorb(summary);
                }
                Err(e) if e.is_cancelled() => return Step::Cancelled,
                Err(e) => {
                    warn!("Restoring mod {} failed: {}", folder, e);
                    errored = true;
                }
            }
        }

        if report.restored_files == 0 {
            return if errored || report.failed_files > 0 {
                Step::Failed
            } else {
                Step::Skipped
            };
        }
        self.validate(&mut report);
        Step::Done(report)
    }

    async fn best_session(
        &self,
        sessions: &dyn SessionSource,
        request: &RestoreRequest,
        cancel: &CancellationToken,
        observer: Option<&RestoreObserver>,
    ) -> Step {
        let listed = match sessions.try_list_sessions() {
            Ok(listed) => listed,
            Err(e) if e.is_absent() => return Step::Skipped,
            Err(e) => {
                warn!("Could not list session backups: {}", e);
                return Step::Failed;
            }
        };
        let owning = owning_mod_folders(self.resolver.as_ref(), &request.snapshot);
        let signals = MatchSignals::from_snapshot(&request.snapshot, &owning);
        let Some((best, score)) = select_best_session(&listed, &signals) else {
            return Step::Skipped;
        };
        if score == 0 {
            debug!("No session matches the textures in use");
            return Step::Skipped;
        }
        info!("Restoring session '{}' (score {})", best.display_name, score);
        self.restore_whole(sessions, best, RestoreStage::SessionRestore, cancel, observer)
            .await
    }

    async fn latest_session(
        &self,
        sessions: &dyn SessionSource,
        cancel: &CancellationToken,
        observer: Option<&RestoreObserver>,
    ) -> Step {
        let stage = RestoreStage::LatestSessionFallback;
        match sessions
            .restore_latest(stage_sink(observer, stage), cancel.clone())
            .await
        {
            Err(RestoreError::SessionNotFound(_)) => Step::Skipped,
            Err(RestoreError::Scan(e)) if e.is_absent() => Step::Skipped,
            result => finish_step(stage, result),
        }
    }

    async fn restore_whole(
        &self,
        sessions: &dyn SessionSource,
        session: &BackupSessionInfo,
        stage: RestoreStage,
        cancel: &CancellationToken,
        observer: Option<&RestoreObserver>,
    ) -> Step {
        let sink = stage_sink(observer, stage);
        let result = if session.is_archive {
            sessions
                .restore_from_zip(&session.source_path, sink, cancel.clone())
                .await
        } else {
            sessions
                .restore_from_session(&session.source_path, sink, cancel.clone())
                .await
        };
        finish_step(stage, result)
    }

    async fn per_file(
        &self,
        request: &RestoreRequest,
        cancel: &CancellationToken,
        observer: Option<&RestoreObserver>,
    ) -> Step {
        let stage = RestoreStage::PerFileFallback;
        if request.available_backups.is_empty() {
            return Step::Nothing(NothingRestoredReason::NoBackups);
        }
        let (pairs, unmapped) =
            map_backups_to_targets(&request.available_backups, &request.snapshot);
        if pairs.is_empty() {
            warn!(
                "None of {} per-file backup(s) maps to a texture in use",
                unmapped.len()
            );
            return Step::Nothing(NothingRestoredReason::Unmapped);
        }

        let sink = stage_sink(observer, stage);
        let token = cancel.clone();
        let joined =
            tokio::task::spawn_blocking(move || restore_pairs(&pairs, sink.as_ref(), &token)).await;
        let summary = match joined {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) if e.is_cancelled() => return Step::Cancelled,
            Ok(Err(e)) => {
                warn!("Per-file restore failed: {}", e);
                return Step::Failed;
            }
            Err(e) => {
                warn!("Per-file restore worker failed: {}", e);
                return Step::Failed;
            }
        };

        let mut report = RestoreReport::new(stage);
        report.absorb(summary);
        if report.restored_files == 0 {
            return Step::Failed;
        }
        let owners: Vec<String> = report
            .written
            .iter()
            .filter_map(|p| self.resolver.owning_mod_folder(p))
            .collect();
        report.restored_mods.extend(owners);
        report
            .warnings
            .extend(unmapped.into_iter().map(|name| RestoreWarning::Unmapped { name }));
        Step::Done(report)
    }

    /// Counts texture files under every restored mod directory. A sanity check only: a
    /// shortfall is recorded, never treated as failure.
    fn validate(&self, report: &mut RestoreReport) {
        let mut expected: BTreeMap<String, usize> = BTreeMap::new();
        for path in &report.written {
            if let Some(folder) = self.resolver.owning_mod_folder(path) {
                *expected.entry(folder.to_lowercase()).or_default() += 1;
            }
        }

        for mod_folder in &report.restored_mods {
            let Some(dir) = self.resolver.mod_directory(mod_folder) else {
                warn!("Restored mod {} has no directory on disk", mod_folder);
                report.warnings.push(RestoreWarning::ModDirectoryMissing {
                    mod_folder: mod_folder.clone(),
                });
                continue;
            };
            let found = count_texture_files(&dir);
            let want = expected
                .get(&mod_folder.to_lowercase())
                .copied()
                .unwrap_or(0);
            if found < want {
                let warning = RestoreWarning::MissingTextures {
                    mod_folder: mod_folder.clone(),
                    expected: want,
                    found,
                };
                warn!("Post-restore check: {}", warning);
                report.warnings.push(warning);
            }
        }
    }

    fn after_success(&self) {
        if let Some(detection) = &self.detection {
            detection.invalidate();
        }
        if let Err(e) = self.reloader.reload() {
            warn!("Visual reload after restore failed: {:#}", e);
        }
    }
}

fn finish_step(stage: RestoreStage, result: Result<RestoreSummary, RestoreError>) -> Step {
    match result {
        Ok(summary) if summary.any_restored() => {
            let mut report = RestoreReport::new(stage);
            report.absorb(summary);
            Step::Done(report)
        }
        Ok(summary) => {
            warn!(
                "{} restored nothing ({} skipped, {} failed)",
                stage, summary.skipped, summary.failed
            );
            if summary.failed > 0 {
                Step::Failed
            } else {
                Step::Skipped
            }
        }
        Err(e) if e.is_cancelled() => Step::Cancelled,
        Err(e) => {
            warn!("{} failed: {}", stage, e);
            Step::Failed
        }
    }
}
