// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process spawning with runner-owned stdio pipes.
//!
//! The runner creates the stdout/stderr pipes itself and keeps the read
//! ends independent of the child's lifetime. Grandchildren that inherit
//! the write fds keep being captured after the immediate child exits;
//! readers see EOF only once every inheritor has closed its copy. This is
//! what lets final log lines emitted during graceful shutdown arrive.
//!
//! The child leads a fresh session (`setsid`), which also makes it a
//! process-group leader, so the whole tree can be signalled with one
//! `killpg`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use prox_core::{LogEntry, LogStream};

use crate::logbuf::LogBuffer;

/// Initial line buffer size.
const LINE_BUF_INITIAL: usize = 64 * 1024;
/// Hard cap on a single line; longer output is split at this boundary.
const LINE_BUF_MAX: usize = 1024 * 1024;

/// Runner errors
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to create stdio pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for child: {0}")]
    Wait(#[source] std::io::Error),
}

/// A spawned child plus its reader tasks.
#[derive(Debug)]
pub struct RunningChild {
    /// Child pid; also the process group id (fresh group at spawn)
    pub pid: u32,
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

impl RunningChild {
    /// Wait for the child to exit, then for both readers to drain EOF.
    ///
    /// Every line the process tree wrote before closing its stdio fds is
    /// in the log buffer by the time this returns.
    pub async fn wait(mut self) -> Result<std::process::ExitStatus, RunnerError> {
        let status = self.child.wait().await.map_err(RunnerError::Wait)?;
        for reader in self.readers {
            let _ = reader.await;
        }
        Ok(status)
    }
}

/// Send a signal to the child's whole process group.
pub fn signal_group(pid: u32, signal: Signal) -> std::io::Result<()> {
    killpg(Pid::from_raw(pid as i32), signal).map_err(std::io::Error::from)
}

/// Spawn `command` via `sh -c` in a new session, stdio connected to
/// runner-owned pipes, lines published to `logbuf` under `name`.
#[allow(unsafe_code)]
pub fn spawn(
    name: &str,
    command: &str,
    env: &BTreeMap<String, String>,
    cwd: Option<&PathBuf>,
    logbuf: Arc<LogBuffer>,
) -> Result<RunningChild, RunnerError> {
    let (stdout_rx, stdout_tx) = stdio_pipe()?;
    let (stderr_rx, stderr_tx) = stdio_pipe()?;

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(stdout_tx)
        .stderr(stderr_tx)
        .kill_on_drop(false);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    // setsid makes the child a session and process-group leader; pid ==
    // pgid, and killpg reaches every descendant.
    // SAFETY: setsid is async-signal-safe and allocates nothing.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }

    // The parent's write ends are consumed by spawn; only the children of
    // this process group hold them afterwards.
    let child = cmd
        .spawn()
        .map_err(|source| RunnerError::Spawn { command: command.to_string(), source })?;

    let pid = child.id().unwrap_or(0);
    debug!(process = name, pid, "spawned child");

    let readers = vec![
        spawn_reader(stdout_rx, name.to_string(), LogStream::Stdout, Arc::clone(&logbuf)),
        spawn_reader(stderr_rx, name.to_string(), LogStream::Stderr, logbuf),
    ];

    Ok(RunningChild { pid, child, readers })
}

/// A pipe whose read end is an async receiver and whose write end is ready
/// to hand to a child as stdio.
fn stdio_pipe() -> Result<(pipe::Receiver, Stdio), RunnerError> {
    let (tx, rx) = pipe::pipe().map_err(RunnerError::Pipe)?;
    // Children expect ordinary blocking stdio.
    let write_fd = tx.into_blocking_fd().map_err(RunnerError::Pipe)?;
    Ok((rx, Stdio::from(write_fd)))
}

/// Drain one stream line-by-line into the log buffer.
///
/// Lines are split at `\n`; a line growing past [`LINE_BUF_MAX`] is flushed
/// in segments so a runaway writer cannot balloon memory. Trailing `\r` is
/// stripped; bytes are decoded lossily.
fn spawn_reader(
    rx: pipe::Receiver,
    name: String,
    stream: LogStream,
    logbuf: Arc<LogBuffer>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = tokio::io::BufReader::with_capacity(LINE_BUF_INITIAL, rx);
        let mut line: Vec<u8> = Vec::new();

        loop {
            let chunk = match reader.fill_buf().await {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(process = %name, %stream, "stdio read error: {}", e);
                    break;
                }
            };
            if chunk.is_empty() {
                // EOF: every holder of the write end has closed it.
                break;
            }

            let mut consumed = 0;
            while consumed < chunk.len() {
                let rest = &chunk[consumed..];
                match rest.iter().position(|&b| b == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&rest[..pos]);
                        consumed += pos + 1;
                        publish(&logbuf, &name, stream, &mut line);
                    }
                    None => {
                        let take = rest.len().min(LINE_BUF_MAX - line.len());
                        line.extend_from_slice(&rest[..take]);
                        consumed += take;
                        if line.len() >= LINE_BUF_MAX {
                            publish(&logbuf, &name, stream, &mut line);
                        }
                    }
                }
            }
            let len = chunk.len();
            reader.consume(len);
        }

        if !line.is_empty() {
            publish(&logbuf, &name, stream, &mut line);
        }
    })
}

fn publish(logbuf: &LogBuffer, name: &str, stream: LogStream, line: &mut Vec<u8>) {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    let text = String::from_utf8_lossy(line).into_owned();
    logbuf.write(LogEntry::new(name, stream, text));
    line.clear();
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
