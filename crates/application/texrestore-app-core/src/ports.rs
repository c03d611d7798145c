pub use texrestore_pipeline::{ModPathResolver, ModRootResolver};

/// Re-applies the character's textures after files on disk changed.
pub trait VisualReloader: Send + Sync + 'static {
    fn reload(&self) -> anyhow::Result<()>;
}

/// For hosts without a live renderer to refresh (CLI, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReloader;

impl VisualReloader for NoopReloader {
    fn reload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
