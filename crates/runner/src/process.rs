use std::sync::Arc;

use buildbridge_core::{BuildClientNotifier, Error, ExitStatus, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// Collected outcome of one tool process
#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub exit: ExitStatus,
    pub exit_code: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ProcessResult {
    /// All captured output, stdout first
    #[must_use]
    pub fn captured_output(&self) -> Vec<String> {
        let mut lines = self.stdout_lines.clone();
        lines.extend(self.stderr_lines.iter().cloned());
        lines
    }
}

/// A spawned tool process whose output is mirrored to the client while it runs
pub struct ToolProcess {
    child: Child,
    command_line: String,
    stdout_task: JoinHandle<Vec<String>>,
    stderr_task: JoinHandle<Vec<String>>,
}

enum MirrorChannel {
    Stdout,
    Stderr,
}

fn mirror_lines<R>(
    reader: R,
    notifier: Option<Arc<dyn BuildClientNotifier>>,
    channel: MirrorChannel,
) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = Vec::new();
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(notifier) = &notifier {
                match channel {
                    MirrorChannel::Stdout => notifier.on_print_stdout(&line).await,
                    MirrorChannel::Stderr => notifier.on_print_stderr(&line).await,
                }
            }
            collected.push(line);
        }
        collected
    })
}

impl ToolProcess {
    /// Spawn `command` with piped stdio and start mirroring its output.
    /// `command` must already carry args, env, and working directory.
    pub fn spawn(
        mut command: Command,
        notifier: Option<Arc<dyn BuildClientNotifier>>,
    ) -> Result<Self> {
        let command_line = format!("{:?}", command.as_std());
        command
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::command_execution(
                command_line.clone(),
                Vec::new(),
                format!("failed to spawn build tool: {e}"),
                None,
            )
        })?;

        // Stdio handles exist because both were requested piped above
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::command_execution(
                command_line.clone(),
                Vec::new(),
                "child stdout was not captured",
                None,
            )
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::command_execution(
                command_line.clone(),
                Vec::new(),
                "child stderr was not captured",
                None,
            )
        })?;

        let stdout_task = mirror_lines(stdout, notifier.clone(), MirrorChannel::Stdout);
        let stderr_task = mirror_lines(stderr, notifier, MirrorChannel::Stderr);

        Ok(Self {
            child,
            command_line,
            stdout_task,
            stderr_task,
        })
    }

    /// Ask the OS to kill the process; exit is still observed through `wait`
    pub fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "kill requested for a process that already exited");
        }
    }

    /// Wait for exit, killing the process if the cancel signal fires first.
    /// Returns the result plus whether cancellation initiated the exit.
    ///
    /// On the cancelled path only the direct child is awaited: orphaned
    /// grandchildren may keep the stdio pipes open long after the kill, so
    /// the mirror tasks are aborted rather than drained and the captured
    /// output is dropped.
    pub async fn wait_cancellable(
        mut self,
        cancel: &mut tokio::sync::watch::Receiver<bool>,
    ) -> Result<(ProcessResult, bool)> {
        let mut cancelled = *cancel.borrow();
        if !cancelled {
            tokio::select! {
                biased;
                changed = cancel.changed() => {
                    // A dropped sender means nobody can cancel anymore
                    cancelled = changed.is_ok() && *cancel.borrow();
                }
                _ = self.child.wait() => {}
            }
        }
        if !cancelled {
            // Child::wait caches the exit status, so waiting again is safe
            let result = self.wait().await?;
            return Ok((result, false));
        }

        self.start_kill();
        let status = self.child.wait().await.map_err(|e| {
            Error::command_execution(
                self.command_line.clone(),
                Vec::new(),
                format!("failed waiting for build tool: {e}"),
                None,
            )
        })?;
        self.stdout_task.abort();
        self.stderr_task.abort();

        let exit_code = status.code();
        let exit = exit_code.map_or(ExitStatus::Error, ExitStatus::from_exit_code);
        debug!(?exit_code, "build tool killed");
        Ok((
            ProcessResult {
                exit,
                exit_code,
                stdout_lines: Vec::new(),
                stderr_lines: Vec::new(),
            },
            true,
        ))
    }

    /// Wait for process exit and the output mirrors to drain
    pub async fn wait(mut self) -> Result<ProcessResult> {
        let status = self.child.wait().await.map_err(|e| {
            Error::command_execution(
                self.command_line.clone(),
                Vec::new(),
                format!("failed waiting for build tool: {e}"),
                None,
            )
        })?;

        let stdout_lines = self.stdout_task.await.unwrap_or_default();
        let stderr_lines = self.stderr_task.await.unwrap_or_default();

        let exit_code = status.code();
        // Killed by signal: no code, classified as a plain failure
        let exit = exit_code.map_or(ExitStatus::Error, ExitStatus::from_exit_code);
        debug!(?exit_code, "build tool exited");

        Ok(ProcessResult {
            exit,
            exit_code,
            stdout_lines,
            stderr_lines,
        })
    }
}
