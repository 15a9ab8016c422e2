//! Shell command and file-write execution.
//!
//! Every operation here returns an [`ExecutionResult`] value instead of an
//! error: a failed command, a missing directory, or an I/O problem is data for
//! the feedback loop, not a reason to unwind. The only state an execution run
//! carries is the [`ExecutionContext`], which owns the working directory that
//! `cd` commands mutate and all later commands and relative file writes
//! resolve against.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Default bound on a single command's execution time.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of executing a single plan item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the item completed successfully.
    pub success: bool,
    /// Captured output or failure description.
    pub message: String,
}

impl ExecutionResult {
    /// Creates a successful result.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Working-directory state for one plan run.
///
/// `cd` commands mutate the context; everything else reads it. One context
/// belongs to exactly one run, which is what makes directory changes safe
/// without touching process-global state.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    cwd: PathBuf,
    command_timeout: Duration,
}

impl ExecutionContext {
    /// Creates a context rooted at the given directory.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Returns the current working directory.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolves a possibly relative path against the current directory.
    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.cwd.join(p)
        }
    }
}

/// Executes a single command line.
///
/// Empty input is a no-op success. `cd` mutates the context instead of
/// spawning a subprocess, since a child-scoped directory change would not
/// persist for the rest of the plan. Everything else runs through the host
/// shell with captured output, bounded by the context's timeout.
pub async fn run_command(command: &str, ctx: &mut ExecutionContext) -> ExecutionResult {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return ExecutionResult::ok("Empty command skipped");
    }

    if let Some(target) = parse_cd(trimmed) {
        return change_directory(target, ctx);
    }

    debug!(command = trimmed, cwd = %ctx.cwd.display(), "running shell command");
    match run_shell(trimmed, ctx).await {
        Ok(result) => result,
        Err(e) => ExecutionResult::failed(format!("Command failed with error:\n{e}")),
    }
}

/// Writes a file, creating intermediate directories as needed.
///
/// Relative paths resolve against the context's current directory. Existing
/// content is overwritten.
pub async fn write_file(path: &str, content: &str, ctx: &ExecutionContext) -> ExecutionResult {
    let resolved = ctx.resolve(path);

    if let Some(parent) = resolved.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        return ExecutionResult::failed(format!("Error creating file {path}: {e}"));
    }

    match tokio::fs::write(&resolved, content).await {
        Ok(()) => ExecutionResult::ok(format!("File created: {path}")),
        Err(e) => ExecutionResult::failed(format!("Error creating file {path}: {e}")),
    }
}

/// Recognizes a `cd` command and returns its target, if any.
///
/// Returns `None` if the line is not a directory change, `Some(None)` for a
/// bare `cd` (home directory), and `Some(Some(target))` otherwise. The token
/// matches case-insensitively; plans written for Windows shells emit `CD`.
fn parse_cd(command: &str) -> Option<Option<&str>> {
    let (token, rest) = command.split_at_checked(2)?;
    if !token.eq_ignore_ascii_case("cd") {
        return None;
    }
    if rest.is_empty() {
        return Some(None);
    }
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim();
    if target.is_empty() {
        Some(None)
    } else {
        Some(Some(target))
    }
}

/// Strips one pair of matching surrounding quotes from a `cd` target.
fn unquote(target: &str) -> &str {
    let bytes = target.as_bytes();
    if target.len() >= 2 {
        let first = bytes[0];
        let last = bytes[target.len() - 1];
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &target[1..target.len() - 1];
        }
    }
    target
}

/// Applies a directory change to the context.
fn change_directory(target: Option<&str>, ctx: &mut ExecutionContext) -> ExecutionResult {
    let requested = match target {
        Some(dir) => ctx.resolve(unquote(dir)),
        None => match dirs::home_dir() {
            Some(home) => home,
            None => {
                return ExecutionResult::failed(
                    "Command failed with error:\ncd: could not determine home directory",
                );
            }
        },
    };

    // Canonicalize so `..` segments collapse and the reported path is real.
    match std::fs::canonicalize(&requested) {
        Ok(resolved) if resolved.is_dir() => {
            debug!(dir = %resolved.display(), "changed directory");
            ctx.cwd = resolved.clone();
            ExecutionResult::ok(format!("Changed directory to {}", resolved.display()))
        }
        Ok(resolved) => ExecutionResult::failed(format!(
            "Command failed with error:\ncd: not a directory: {}",
            resolved.display()
        )),
        Err(e) => ExecutionResult::failed(format!("Command failed with error:\n{e}")),
    }
}

/// Builds the host-shell invocation for a command line.
fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    }
}

/// Runs a command through the shell with captured output and a timeout.
///
/// The child's stdout and stderr are consumed by spawned reader tasks while
/// waiting, so a chatty command cannot deadlock on a full pipe. On timeout the
/// child is killed and a failure result is returned.
async fn run_shell(command: &str, ctx: &ExecutionContext) -> std::io::Result<ExecutionResult> {
    let mut cmd = shell_command(command);
    cmd.current_dir(&ctx.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Children must not outlive the tool: kill them if the parent dies.
    #[cfg(target_os = "linux")]
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn()?;
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

    let status = tokio::select! {
        result = child.wait() => result?,
        () = tokio::time::sleep(ctx.command_timeout) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            return Ok(ExecutionResult::failed(format!(
                "Command failed with error:\ncommand timed out after {} seconds",
                ctx.command_timeout.as_secs()
            )));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(ExecutionResult::ok(stdout))
    } else {
        Ok(ExecutionResult::failed(format!(
            "Command failed with error:\n{stderr}"
        )))
    }
}

/// Reads an output stream to completion, lossily decoding as UTF-8.
async fn read_stream<R>(stream: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
