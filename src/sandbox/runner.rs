use std::time::Duration;

use crate::model::ExecutionResult;
use crate::toolchain::ToolchainDescriptor;

/// Trait for the different ways of executing untrusted code
///
/// Implementations own no state across calls: every `run` gets its own
/// workspace, so calls may execute concurrently.
pub trait SandboxRunner: Send + Sync {
    /// Compiles (when the toolchain has a compile step) and runs
    /// `source_code` once, feeding `stdin` to the run step.
    ///
    /// This blocks until the program exits or `time_limit` elapses and must
    /// not be called from an async task; use `spawn_blocking`.
    fn run(
        &self,
        toolchain: &ToolchainDescriptor,
        source_code: &str,
        stdin: &str,
        time_limit: Duration,
    ) -> ExecutionResult;
}
