use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::restore::{RestoreObserver, RestorePipeline, RestoreRequest};
use crate::state::{RestoreEvent, RestoreRunEvent, RestoreRunId};

/// Single active restore. Starting a new run cancels the previous one, which stops before
/// its next file; the new run begins once the old one has let go.
pub struct RestoreOrchestrator {
    pipeline: Arc<RestorePipeline>,
    tx: mpsc::Sender<RestoreEvent>,
    cancel: Option<CancellationToken>,
    active: Arc<Mutex<()>>,
}

impl RestoreOrchestrator {
    pub fn new(pipeline: Arc<RestorePipeline>, tx: mpsc::Sender<RestoreEvent>) -> Self {
        Self {
            pipeline,
            tx,
            cancel: None,
            active: Arc::new(Mutex::new(())),
        }
    }

    pub fn cancel_restore(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    pub fn start_restore(&mut self, request: RestoreRequest) -> anyhow::Result<RestoreRunId> {
        self.cancel_restore();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());

        let run_id: RestoreRunId = Uuid::new_v4();
        let tx = self.tx.clone();
        let pipeline = self.pipeline.clone();
        let active = self.active.clone();

        std::thread::Builder::new()
            .name("texrestore-restore".into())
            .spawn(move || {
                let rt = match crate::async_runtime::runtime() {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = tx.blocking_send(RestoreEvent {
                            run_id,
                            ev: RestoreRunEvent::Failed {
                                message: format!("Failed to start async runtime: {e}"),
                            },
                        });
                        return;
                    }
                };

                rt.block_on(async move {
                    let _guard = active.lock().await;
                    debug!("Restore run {} started", run_id);
                    let _ = tx
                        .send(RestoreEvent {
                            run_id,
                            ev: RestoreRunEvent::Started,
                        })
                        .await;

                    let tx_progress = tx.clone();
                    let observer: RestoreObserver = Arc::new(move |ev: RestoreRunEvent| {
                        let _ = tx_progress.try_send(RestoreEvent { run_id, ev });
                    });

                    let outcome = pipeline.run(&request, &token, Some(observer)).await;
                    let _ = tx
                        .send(RestoreEvent {
                            run_id,
                            ev: RestoreRunEvent::Finished { outcome },
                        })
                        .await;
                });
            })
            .context("Failed to spawn restore worker thread")?;

        Ok(run_id)
    }
}

impl Drop for RestoreOrchestrator {
    fn drop(&mut self) {
        self.cancel_restore();
    }
}
