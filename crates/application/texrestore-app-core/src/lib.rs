pub mod app;
mod async_runtime;
pub mod domain;
pub mod orchestrator;
pub mod ports;
pub mod restore;
pub mod state;

pub use app::RestoreApplication;
pub use domain::EngineSettings;
pub use orchestrator::RestoreOrchestrator;
pub use ports::*;
pub use restore::{
    NothingRestoredReason, RestoreObserver, RestoreOutcome, RestorePipeline, RestoreReport,
    RestoreRequest, RestoreStage, RestoreStatus, RestoreWarning,
};
pub use state::{RestoreEvent, RestoreRunEvent, RestoreRunId, RestoreState, StepStatus};
