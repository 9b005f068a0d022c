//! External tool invocation.
//!
//! Commands are spawned directly (no shell), with an explicit working directory
//! and optional stdin/stdout file redirection.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, error, info, warn};
use zerosync_program_input::temporary_sibling;

use crate::error::StepError;

/// Number of trailing stderr lines kept in error reports
const STDERR_TAIL_LINES: usize = 20;

/// An external tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    /// Program name (looked up in PATH) or path
    pub program: String,
    pub args: Vec<String>,
    /// Working directory of the child process
    pub cwd: PathBuf,
    /// File connected to the child's stdin
    pub stdin: Option<PathBuf>,
    /// File receiving the child's stdout, replaced only if the command succeeds
    pub stdout: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            stdin: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Append `--name=<path>`
    pub fn path_flag(self, name: &str, path: &Path) -> Self {
        self.arg(format!("--{}={}", name, path.display()))
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    fn program_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(stdin) = &self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

/// How external commands are run
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Kill the command if it runs longer than this
    pub timeout: Option<Duration>,
    /// Wrap the command in `/usr/bin/time` and report peak memory
    pub measure_resources: bool,
}

/// Resource usage of a successful command
#[derive(Debug, Clone, Copy)]
pub struct CommandReport {
    pub elapsed: Duration,
    /// Peak resident set size in KB, if measured
    pub max_rss_kb: Option<u64>,
}

/// Run an external command to completion
///
/// Stdout of commands without redirection is forwarded to the log, stderr is
/// captured and attached to the error on failure.
pub async fn run_command(
    cmd: &ExternalCommand,
    options: &CommandOptions,
) -> Result<CommandReport, StepError> {
    let mut process = if options.measure_resources {
        // Use -l on macOS, -v on Linux for /usr/bin/time
        let time_flag = if cfg!(target_os = "macos") {
            "-l"
        } else {
            "-v"
        };
        let mut process = Command::new("/usr/bin/time");
        process.arg(time_flag).arg(&cmd.program);
        process
    } else {
        Command::new(&cmd.program)
    };
    process
        .args(&cmd.args)
        .current_dir(&cmd.cwd)
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    match &cmd.stdin {
        Some(path) => {
            let file = fs::File::open(path).map_err(|e| StepError::io(path, e))?;
            process.stdin(Stdio::from(file));
        }
        None => {
            process.stdin(Stdio::null());
        }
    }

    let stdout_tmp = cmd.stdout.as_deref().map(temporary_sibling);
    match &stdout_tmp {
        Some(tmp) => {
            let file = fs::File::create(tmp).map_err(|e| StepError::io(tmp, e))?;
            process.stdout(Stdio::from(file));
        }
        None => {
            process.stdout(Stdio::piped());
        }
    }

    debug!("Running command: {}", cmd);
    let start_time = Instant::now();

    let result = wait_for(cmd, process, options.timeout).await;
    let elapsed = start_time.elapsed();

    let output = match result {
        Ok(output) => output,
        Err(err) => {
            discard(stdout_tmp.as_deref());
            return Err(err);
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        discard(stdout_tmp.as_deref());
        error!("{} failed with {}", cmd.program_name(), output.status);
        if !output.stdout.is_empty() {
            error!("STDOUT: {}", String::from_utf8_lossy(&output.stdout));
        }
        error!("STDERR: {}", stderr);
        return Err(StepError::CommandFailed {
            command: cmd.to_string(),
            status: output.status,
            stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
        });
    }

    if let (Some(tmp), Some(target)) = (&stdout_tmp, &cmd.stdout) {
        fs::rename(tmp, target).map_err(|e| StepError::io(target, e))?;
    }

    let program_name = cmd.program_name();
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        info!("[{}] {}", program_name, line);
    }
    if !stderr.is_empty() {
        debug!("[{}] stderr: {}", program_name, stderr);
    }

    let max_rss_kb = if options.measure_resources {
        parse_memory_usage(&stderr)
    } else {
        None
    };

    match max_rss_kb {
        Some(mem) => info!(
            "{} succeeded in {:.2}s, max RSS: {:.1} MB",
            program_name,
            elapsed.as_secs_f64(),
            mem as f64 / 1024.0
        ),
        None => info!(
            "{} succeeded in {:.2}s",
            program_name,
            elapsed.as_secs_f64()
        ),
    }

    Ok(CommandReport {
        elapsed,
        max_rss_kb,
    })
}

async fn wait_for(
    cmd: &ExternalCommand,
    mut process: Command,
    timeout: Option<Duration>,
) -> Result<std::process::Output, StepError> {
    let child = process.spawn().map_err(|source| StepError::Spawn {
        program: cmd.program.clone(),
        source,
    })?;
    // Wrappers such as /usr/bin/time fork the actual tool, which kill_on_drop
    // does not reach. The guard kills the whole group unless the wait completes.
    let mut group = ProcessGroupGuard::new(child.id());

    let output = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| StepError::Timeout {
                command: cmd.to_string(),
                timeout,
            })?,
        None => child.wait_with_output().await,
    };
    group.disarm();
    output.map_err(|e| StepError::io(&cmd.cwd, e))
}

/// Process group of a spawned command, killed on drop while armed
struct ProcessGroupGuard {
    pgid: Option<Pid>,
}

impl ProcessGroupGuard {
    fn new(child_id: Option<u32>) -> Self {
        let pgid = child_id
            .and_then(|id| i32::try_from(id).ok())
            .map(Pid::from_raw);
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            debug!("Killing process group {}", pgid);
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => warn!("Failed to kill process group {}: {}", pgid, err),
            }
        }
    }
}

fn discard(tmp: Option<&Path>) {
    if let Some(tmp) = tmp {
        let _ = fs::remove_file(tmp);
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Parse memory usage from /usr/bin/time output, in KB
pub fn parse_memory_usage(stderr: &str) -> Option<u64> {
    stderr.lines().find_map(|line| {
        let trimmed = line.trim();
        if trimmed.ends_with("maximum resident set size") {
            // macOS: "  12345  maximum resident set size", in bytes
            trimmed
                .split_whitespace()
                .next()
                .and_then(|bytes| bytes.parse::<u64>().ok())
                .map(|bytes| bytes / 1024)
        } else if trimmed.starts_with("Maximum resident set size (kbytes):") {
            // Linux: "Maximum resident set size (kbytes): 12345"
            trimmed
                .split(':')
                .nth(1)
                .and_then(|kb| kb.trim().parse::<u64>().ok())
        } else {
            None
        }
    })
}
