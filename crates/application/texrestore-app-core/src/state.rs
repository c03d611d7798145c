use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use texrestore_pipeline::RestoreProgress;
use uuid::Uuid;

use crate::restore::{RestoreOutcome, RestoreStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

pub type RestoreRunId = Uuid;

#[derive(Debug, Clone)]
pub enum RestoreRunEvent {
    Started,
    StageChanged {
        stage: RestoreStage,
        status: StepStatus,
        detail: String,
    },
    Progress {
        stage: RestoreStage,
        progress: RestoreProgress,
    },
    Finished {
        outcome: RestoreOutcome,
    },
    Failed {
        message: String,
    },
}

/// A run event tagged with the run that produced it.
#[derive(Debug, Clone)]
pub struct RestoreEvent {
    pub run_id: RestoreRunId,
    pub ev: RestoreRunEvent,
}

#[derive(Debug, Clone)]
pub struct RestoreState {
    pub run_id: Option<RestoreRunId>,
    pub stages: HashMap<RestoreStage, StepStatus>,
    pub details: HashMap<RestoreStage, String>,
    pub progress: Option<(RestoreStage, RestoreProgress)>,
    pub outcome: Option<RestoreOutcome>,
    pub error: Option<String>,
}

impl Default for RestoreState {
    fn default() -> Self {
        Self::idle()
    }
}

impl RestoreState {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            stages: RestoreStage::ALL
                .iter()
                .map(|s| (*s, StepStatus::Pending))
                .collect(),
            details: HashMap::new(),
            progress: None,
            outcome: None,
            error: None,
        }
    }

    /// Fresh state for `run_id`; events of any earlier run are ignored from now on.
    pub fn starting(run_id: RestoreRunId) -> Self {
        Self {
            run_id: Some(run_id),
            ..Self::idle()
        }
    }

    pub fn step_status(&self, stage: RestoreStage) -> StepStatus {
        self.stages
            .get(&stage)
            .copied()
            .unwrap_or(StepStatus::Pending)
    }

    pub fn is_running(&self) -> bool {
        self.outcome.is_none()
            && self.error.is_none()
            && self.stages.values().any(|s| *s == StepStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some() || self.error.is_some()
    }

    /// Folds one event into the state. Returns false when the event belongs to another run.
    pub fn apply(&mut self, event: &RestoreEvent) -> bool {
        if self.run_id != Some(event.run_id) {
            return false;
        }
        match &event.ev {
            RestoreRunEvent::Started => {
                *self = Self::starting(event.run_id);
            }
            RestoreRunEvent::StageChanged {
                stage,
                status,
                detail,
            } => {
                self.stages.insert(*stage, *status);
                self.details.insert(*stage, detail.clone());
            }
            RestoreRunEvent::Progress { stage, progress } => {
                self.progress = Some((*stage, progress.clone()));
            }
            RestoreRunEvent::Finished { outcome } => {
                self.outcome = Some(outcome.clone());
            }
            RestoreRunEvent::Failed { message } => {
                self.error = Some(message.clone());
            }
        }
        true
    }
}
