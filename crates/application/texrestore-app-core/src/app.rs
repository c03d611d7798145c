use std::sync::Arc;
use tokio::sync::mpsc;

use texrestore_core::{DetectionResult, TextureInventorySnapshot};
use texrestore_pipeline::{
    DetectionCache, FsPerFileSource, FsSessionSource, ModPathResolver, ModRootResolver,
    PerFileSource, SessionSource,
};

use crate::domain::EngineSettings;
use crate::orchestrator::RestoreOrchestrator;
use crate::ports::VisualReloader;
use crate::restore::{RestorePipeline, RestoreRequest};
use crate::state::{RestoreEvent, RestoreRunId};

/// Filesystem-backed engine: detection and restore over one backup root and mods root.
pub struct RestoreApplication {
    settings: EngineSettings,
    sessions: Arc<FsSessionSource>,
    detection: Arc<DetectionCache>,
    orchestrator: RestoreOrchestrator,
    msg_rx: mpsc::Receiver<RestoreEvent>,
}

impl RestoreApplication {
    pub fn new(settings: EngineSettings, reloader: Arc<dyn VisualReloader>) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(100);
        let resolver: Arc<dyn ModPathResolver> =
            Arc::new(ModRootResolver::new(settings.mods_root.clone()));
        let per_file: Arc<dyn PerFileSource> =
            Arc::new(FsPerFileSource::new(&settings.backup_root));
        let sessions = Arc::new(FsSessionSource::new(
            &settings.backup_root,
            settings.mods_root.clone(),
        ));
        let session_source: Arc<dyn SessionSource> = sessions.clone();

        let detection = Arc::new(DetectionCache::new(
            per_file,
            Some(session_source.clone()),
            resolver.clone(),
            settings.staleness(),
        ));
        let pipeline = RestorePipeline::new(Some(session_source), resolver, reloader)
            .with_detection(detection.clone());

        Self {
            settings,
            sessions,
            detection,
            orchestrator: RestoreOrchestrator::new(Arc::new(pipeline), msg_tx),
            msg_rx,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &FsSessionSource {
        &self.sessions
    }

    pub fn detection(&self) -> &Arc<DetectionCache> {
        &self.detection
    }

    pub fn get_relevant_backups(
        &self,
        snapshot: &Arc<TextureInventorySnapshot>,
    ) -> Arc<DetectionResult> {
        self.detection.get_relevant_backups(snapshot)
    }

    pub fn start_restore(&mut self, request: RestoreRequest) -> anyhow::Result<RestoreRunId> {
        self.orchestrator.start_restore(request)
    }

    pub fn cancel_restore(&mut self) {
        self.orchestrator.cancel_restore();
    }

    pub fn invalidate(&self) {
        self.detection.invalidate();
    }

    /// Next run event. None once every sender is gone.
    pub async fn next_event(&mut self) -> Option<RestoreEvent> {
        self.msg_rx.recv().await
    }

    /// Blocking variant of [`Self::next_event`] for callers without a runtime.
    pub fn next_event_blocking(&mut self) -> Option<RestoreEvent> {
        self.msg_rx.blocking_recv()
    }

    pub fn try_next_event(&mut self) -> Option<RestoreEvent> {
        self.msg_rx.try_recv().ok()
    }
}
