mod process_runner;
mod runner;
mod workspace;

pub use process_runner::ProcessRunner;
pub use runner::SandboxRunner;
pub use workspace::Workspace;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default wall-clock budget of the run step
pub const DEFAULT_RUN_TIME_LIMIT: Duration = Duration::from_secs(5);
/// Default wall-clock budget of the compile step
pub const DEFAULT_COMPILE_TIME_LIMIT: Duration = Duration::from_secs(30);
/// Default cap on each of stdout and stderr
pub const DEFAULT_OUTPUT_LIMIT: usize = 16 * 1024 * 1024;

/// Limits shared by every invocation of one runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub run_time: Duration,
    pub compile_time: Duration,
    /// Bytes kept per output stream; the remainder is drained and dropped
    pub output_bytes: usize,
    /// Address-space limit of the run step (RLIMIT_AS)
    pub memory_bytes: Option<u64>,
    /// CPU-time limit of the run step (RLIMIT_CPU)
    pub cpu_seconds: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            run_time: DEFAULT_RUN_TIME_LIMIT,
            compile_time: DEFAULT_COMPILE_TIME_LIMIT,
            output_bytes: DEFAULT_OUTPUT_LIMIT,
            memory_bytes: None,
            cpu_seconds: None,
        }
    }
}

/// Creates the sandbox runner used by the workers
///
/// Every invocation gets a fresh directory below `workspace_root`, which is
/// created here so a misconfigured path fails at startup instead of on the
/// first submission.
pub fn create_sandbox_runner(
    workspace_root: PathBuf,
    limits: ResourceLimits,
) -> Result<Arc<dyn SandboxRunner>> {
    std::fs::create_dir_all(&workspace_root).with_context(|| {
        format!(
            "Failed to create workspace root {}",
            workspace_root.display()
        )
    })?;

    log::info!(
        "Creating ProcessRunner in {} (run limit {:?}, compile limit {:?})",
        workspace_root.display(),
        limits.run_time,
        limits.compile_time
    );
    log::warn!("ProcessRunner relies on per-process limits only and provides no OS-level isolation");

    Ok(Arc::new(ProcessRunner::new(workspace_root, limits)))
}
