//! Sequential execution of an approved command list.
//!
//! Commands run one after another, because later commands may depend on
//! what earlier ones did. A failing command is recorded and the next one
//! still runs. The overall [`ExecutionOutcome`] is:
//!
//! - `Executed` - every command succeeded
//! - `Failed` - every command failed
//! - `Partial` - anything in between
//!
//! Each command is bounded by a timeout. On Unix the command gets its own
//! process group so a timeout kills everything it started, not just the
//! shell.

use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::WardenConfig;
use crate::persistence::types::ExecutionOutcome;
use crate::shell::{augment_path, build_shell_command};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long to wait for a pipe to close after the process group is gone.
/// A descendant that left the group can still hold the pipe open.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Separator between per-command blocks in the joined result/error text.
const BLOCK_SEPARATOR: &str = "\n\n";

/// Outcome of a single command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
    /// Set when the command couldn't be started or waited on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl CommandResult {
    fn not_started(command: &str, reason: String) -> Self {
        Self {
            command: command.to_string(),
            success: false,
            exit_code: None,
            timed_out: false,
            stdout: String::new(),
            stderr: String::new(),
            failure: Some(reason),
        }
    }

    /// Human-readable reason for a failed command.
    pub fn failure_message(&self, timeout: Duration) -> String {
        if self.timed_out {
            return format!("command timed out after {}", format_timeout(timeout));
        }
        if let Some(reason) = &self.failure {
            return reason.clone();
        }
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("command exited with code {code}"),
            None => "command terminated by signal".to_string(),
        }
    }

    /// `$ <command>` followed by trimmed output or `ERROR: <reason>`.
    fn block(&self, timeout: Duration) -> String {
        if self.success {
            format!("$ {}\n{}", self.command, self.stdout.trim())
        } else {
            format!("$ {}\nERROR: {}", self.command, self.failure_message(timeout))
        }
    }
}

/// Aggregated outcome of a command list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub outcome: ExecutionOutcome,
    pub commands: Vec<CommandResult>,
    /// Joined blocks of successful commands, `None` if there were none.
    pub result: Option<String>,
    /// Joined blocks of failed commands, `None` if there were none.
    pub error: Option<String>,
}

impl RunReport {
    fn from_results(commands: Vec<CommandResult>, timeout: Duration) -> Self {
        let mut results = Vec::new();
        let mut errors = Vec::new();
        for command in &commands {
            if command.success {
                results.push(command.block(timeout));
            } else {
                errors.push(command.block(timeout));
            }
        }

        let outcome = if errors.is_empty() {
            ExecutionOutcome::Executed
        } else if results.is_empty() {
            ExecutionOutcome::Failed
        } else {
            ExecutionOutcome::Partial
        };

        Self {
            outcome,
            commands,
            result: join_blocks(results),
            error: join_blocks(errors),
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error.is_some()
    }
}

fn join_blocks(blocks: Vec<String>) -> Option<String> {
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join(BLOCK_SEPARATOR))
    }
}

fn format_timeout(timeout: Duration) -> String {
    if timeout.as_secs() > 0 && timeout.subsec_millis() == 0 {
        format!("{}s", timeout.as_secs())
    } else {
        format!("{}ms", timeout.as_millis())
    }
}

/// Runs command lists under a shell with a per-command timeout.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    shell_prefix: Option<String>,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            shell_prefix: None,
        }
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        Self {
            timeout: config.command_timeout(),
            shell_prefix: config.shell_prefix.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run every command in order and classify the result.
    pub fn run_all(&self, commands: &[String], env: &BTreeMap<String, String>) -> RunReport {
        let results = commands
            .iter()
            .map(|command| self.run_one(command, env))
            .collect();
        RunReport::from_results(results, self.timeout)
    }

    /// Run a single command, blocking until it exits or times out.
    pub fn run_one(&self, command: &str, env: &BTreeMap<String, String>) -> CommandResult {
        let mut cmd = match build_shell_command(command, self.shell_prefix.as_deref()) {
            Ok(cmd) => cmd,
            Err(e) => return CommandResult::not_started(command, e),
        };

        let base_path = env
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_default();
        cmd.envs(env)
            .env("PATH", augment_path(&base_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        log::debug!("Running command: {}", command);
        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandResult::not_started(command, format!("failed to start shell: {e}"))
            }
        };

        let stdout_pipe = PipeCollector::spawn(child.stdout.take());
        let stderr_pipe = PipeCollector::spawn(child.stderr.take());

        let mut timed_out = false;
        let waited = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => {
                    kill_process_tree(&mut child);
                    break Err(format!("failed to wait for command: {e}"));
                }
            }
            if start.elapsed() >= self.timeout {
                timed_out = true;
                log::warn!(
                    "Command timed out after {:?}, killing: {}",
                    self.timeout,
                    command
                );
                kill_process_tree(&mut child);
                break child
                    .wait()
                    .map_err(|e| format!("failed to reap command: {e}"));
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Background jobs the shell left behind would keep the pipes open
        if !timed_out {
            kill_process_group(&child);
        }

        let stdout = stdout_pipe.finish(OUTPUT_GRACE);
        let stderr = stderr_pipe.finish(OUTPUT_GRACE);

        let (status, failure): (Option<ExitStatus>, Option<String>) = match waited {
            Ok(status) => (Some(status), None),
            Err(reason) => (None, Some(reason)),
        };
        let success = !timed_out && status.is_some_and(|s| s.success());

        log::debug!(
            "Command finished in {:?} (success={}): {}",
            start.elapsed(),
            success,
            command
        );

        CommandResult {
            command: command.to_string(),
            success,
            exit_code: status.and_then(|s| s.code()),
            timed_out,
            stdout,
            stderr,
            failure,
        }
    }
}

/// Reads a pipe on a background thread into a shared buffer.
///
/// Whatever was read is kept even if the pipe never closes.
struct PipeCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl PipeCollector {
    fn spawn<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();

        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => sink
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            }
            let _ = tx.send(());
        });

        Self { buffer, done }
    }

    /// Wait up to `grace` for end of stream, then take what was read.
    fn finish(self, grace: Duration) -> String {
        if self.done.recv_timeout(grace).is_err() {
            log::debug!("Output pipe still open after {:?}, keeping partial output", grace);
        }
        let bytes = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}

/// Kill everything left in the command's process group.
fn kill_process_group(child: &Child) {
    #[cfg(unix)]
    {
        // The child leads its own group (process_group(0)), so -pid targets the group
        let pgid = child.id() as i32;
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Kill the command and everything in its process group.
fn kill_process_tree(child: &mut Child) {
    kill_process_group(child);
    let _ = child.kill();
}

// ============================================================================
// TESTS
// ============================================================================
