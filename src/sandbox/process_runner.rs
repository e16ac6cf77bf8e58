use std::future::Future;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::time::timeout;

use crate::model::ExecutionResult;
use crate::toolchain::ToolchainDescriptor;

use super::{ResourceLimits, SandboxRunner, Workspace};

const READ_CHUNK: usize = 8192;
const FALLBACK_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Runs code as plain child processes in throwaway workspaces
///
/// Each step runs in its own process group with a cleared environment and a
/// wall-clock limit. The whole group is killed when a step finishes or times
/// out. Memory and CPU limits are applied with `setrlimit` when configured.
/// No filesystem or network isolation is provided.
pub struct ProcessRunner {
    /// Directory under which per-invocation workspaces are created
    workspace_root: PathBuf,
    limits: ResourceLimits,
}

/// rlimits applied to the run step in the child before exec
#[derive(Debug, Clone, Copy, Default)]
struct ChildLimits {
    memory_bytes: Option<u64>,
    cpu_seconds: Option<u64>,
}

/// One subprocess invocation
struct Step<'a> {
    argv: Vec<String>,
    stdin: Option<&'a str>,
    time_limit: Duration,
    child_limits: Option<ChildLimits>,
}

/// Captured output of one step
#[derive(Debug, Default)]
struct StepOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    truncated: bool,
}

enum StepStatus {
    Exited(i32),
    TimedOut,
}

impl StepOutput {
    fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl SandboxRunner for ProcessRunner {
    fn run(
        &self,
        toolchain: &ToolchainDescriptor,
        source_code: &str,
        stdin: &str,
        time_limit: Duration,
    ) -> ExecutionResult {
        let workspace = match Workspace::create(&self.workspace_root, toolchain, source_code) {
            Ok(workspace) => workspace,
            Err(e) => {
                log::error!("Failed to prepare workspace for {}: {e}", toolchain.name);
                return ExecutionResult::internal_error(format!("Failed to prepare workspace: {e}"));
            }
        };

        let result = block_on(self.compile_and_run(&workspace, toolchain, stdin, time_limit));

        if let Err(e) = workspace.close() {
            log::warn!("Failed to remove workspace: {e}");
        }
        result
    }
}

impl ProcessRunner {
    pub fn new(workspace_root: impl Into<PathBuf>, limits: ResourceLimits) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            limits,
        }
    }

    async fn compile_and_run(
        &self,
        workspace: &Workspace,
        toolchain: &ToolchainDescriptor,
        stdin: &str,
        time_limit: Duration,
    ) -> ExecutionResult {
        // Step 1: Compile, when the toolchain has a compile step
        if let Some(template) = &toolchain.compile {
            let step = Step {
                argv: workspace.render(template),
                stdin: None,
                time_limit: self.limits.compile_time,
                child_limits: None,
            };
            let program = step.argv.first().cloned().unwrap_or_default();

            match self.execute_step(workspace, step).await {
                Ok((StepStatus::Exited(0), _)) => {}
                Ok((StepStatus::Exited(code), output)) => {
                    log::info!("Compilation failed for {} with code {code}", toolchain.name);
                    return ExecutionResult::compile_error(output.stdout(), output.stderr(), code)
                        .with_truncation(output.truncated);
                }
                Ok((StepStatus::TimedOut, output)) => {
                    log::info!("Compilation timed out for {}", toolchain.name);
                    return ExecutionResult::timed_out(
                        output.stdout(),
                        format!(
                            "Compilation timed out after {:.1}s",
                            self.limits.compile_time.as_secs_f64()
                        ),
                    );
                }
                Err(e) => {
                    log::warn!("Failed to launch compiler `{program}`: {e}");
                    return ExecutionResult::internal_error(format!(
                        "Failed to launch compiler `{program}`: {e}"
                    ));
                }
            }
        }

        // Step 2: Run with the caller's input
        let child_limits = ChildLimits {
            memory_bytes: self.limits.memory_bytes.filter(|_| toolchain.memory_limit),
            cpu_seconds: self.limits.cpu_seconds,
        };
        let step = Step {
            argv: workspace.render(&toolchain.run),
            stdin: Some(stdin),
            time_limit,
            child_limits: Some(child_limits),
        };
        let program = step.argv.first().cloned().unwrap_or_default();

        match self.execute_step(workspace, step).await {
            Ok((StepStatus::Exited(code), output)) => {
                ExecutionResult::completed(output.stdout(), output.stderr(), code)
                    .with_truncation(output.truncated)
            }
            Ok((StepStatus::TimedOut, output)) => {
                log::info!("Program timed out for {}", toolchain.name);
                ExecutionResult::timed_out(
                    output.stdout(),
                    format!(
                        "{} code execution timed out after {:.1}s",
                        toolchain.name,
                        time_limit.as_secs_f64()
                    ),
                )
                .with_truncation(output.truncated)
            }
            Err(e) => {
                log::warn!("Failed to launch `{program}`: {e}");
                ExecutionResult::internal_error(format!("Failed to launch `{program}`: {e}"))
            }
        }
    }

    /// Spawns one step, feeds its input and collects its output
    ///
    /// The process group is always killed before returning, so neither a
    /// timed-out program nor anything it left running in the background
    /// outlives the call.
    async fn execute_step(
        &self,
        workspace: &Workspace,
        step: Step<'_>,
    ) -> io::Result<(StepStatus, StepOutput)> {
        let Some((program, args)) = step.argv.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        };

        let path = std::env::var("PATH").unwrap_or_else(|_| FALLBACK_PATH.to_string());
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(workspace.path())
            .env_clear()
            .env("PATH", path)
            .env("HOME", workspace.path())
            .stdin(if step.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        if let Some(limits) = step.child_limits {
            // SAFETY: the closure only calls setrlimit, which is
            // async-signal-safe, and allocates nothing.
            unsafe {
                cmd.pre_exec(move || apply_child_limits(limits));
            }
        }

        let mut child = cmd.spawn()?;
        let pgid = child.id();

        let stdin_pipe = child.stdin.take();
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let input = step.stdin.unwrap_or_default();
        let cap = self.limits.output_bytes;

        let mut output = StepOutput::default();
        let waited = timeout(step.time_limit, async {
            let (_, stdout_truncated, stderr_truncated, status) = tokio::join!(
                feed_stdin(stdin_pipe, input),
                drain_capped(stdout_pipe.as_mut(), &mut output.stdout, cap),
                drain_capped(stderr_pipe.as_mut(), &mut output.stderr, cap),
                child.wait(),
            );
            Ok::<_, io::Error>((stdout_truncated? || stderr_truncated?, status?))
        })
        .await;

        if let Some(pgid) = pgid {
            kill_process_group(pgid);
        }

        match waited {
            Ok(Ok((truncated, status))) => {
                output.truncated = truncated;
                Ok((StepStatus::Exited(exit_code_of(status)), output))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                // Reap the direct child; the group was killed above
                let _ = child.kill().await;
                Ok((StepStatus::TimedOut, output))
            }
        }
    }
}

/// Writes the whole input and closes the pipe
///
/// A program that exits without reading its input is not an error.
async fn feed_stdin(stdin: Option<ChildStdin>, input: &str) {
    let Some(mut stdin) = stdin else {
        return;
    };
    if let Err(e) = stdin.write_all(input.as_bytes()).await {
        if e.kind() != io::ErrorKind::BrokenPipe {
            log::debug!("Failed to write program input: {e}");
        }
        return;
    }
    let _ = stdin.shutdown().await;
}

/// Reads `pipe` to the end, keeping at most `cap` bytes in `buf`
///
/// Returns whether anything was discarded.
async fn drain_capped<R: AsyncRead + Unpin>(
    pipe: Option<&mut R>,
    buf: &mut Vec<u8>,
    cap: usize,
) -> io::Result<bool> {
    let Some(pipe) = pipe else {
        return Ok(false);
    };

    let mut chunk = [0u8; READ_CHUNK];
    let mut truncated = false;
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(truncated);
        }
        let room = cap.saturating_sub(buf.len());
        if n > room {
            truncated = true;
        }
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}

/// Exit code of a finished process, `128 + signal` when it was killed
fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

fn kill_process_group(pgid: u32) {
    // SAFETY: killpg has no memory-safety preconditions. The group was
    // created for this child, so only its descendants receive the signal.
    let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            log::warn!("Failed to kill process group {pgid}: {err}");
        }
    }
}

fn apply_child_limits(limits: ChildLimits) -> io::Result<()> {
    set_rlimit(libc::RLIMIT_CORE, 0)?;
    if let Some(bytes) = limits.memory_bytes {
        set_rlimit(libc::RLIMIT_AS, bytes)?;
    }
    if let Some(secs) = limits.cpu_seconds {
        set_rlimit(libc::RLIMIT_CPU, secs)?;
    }
    Ok(())
}

#[cfg(target_env = "gnu")]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(target_env = "gnu"))]
type RlimitResource = libc::c_int;

fn set_rlimit(resource: RlimitResource, value: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid rlimit that outlives the call.
    if unsafe { libc::setrlimit(resource, &limit) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Drives `future` to completion from synchronous code
///
/// Inside `spawn_blocking` the surrounding runtime is reused; on a plain
/// thread a current-thread runtime is built for the call.
fn block_on<F>(future: F) -> ExecutionResult
where
    F: Future<Output = ExecutionResult>,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(future),
        Err(_) => match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(future),
            Err(e) => {
                log::error!("Failed to build sandbox runtime: {e}");
                ExecutionResult::internal_error(format!("Failed to start sandbox runtime: {e}"))
            }
        },
    }
}
