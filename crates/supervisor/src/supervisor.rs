// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: owns every process record and serializes control
//! operations per process name.
//!
//! Each entry carries a `tokio::sync::Mutex` held across the whole
//! start/stop/restart critical section, so no observer ever sees two
//! instances of one name running. Operations on different names proceed
//! in parallel. Monitor tasks watch for child exit and drive the
//! restart/backoff path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use prox_core::{
    redact_env, Config, ConfigError, LogEntry, LogStream, ProcessDefinition, ProcessDetail,
    ProcessSummary,
};

use crate::logbuf::LogBuffer;
use crate::record::{ProcessRecord, ProcessState};
use crate::runner::{self, RunnerError, RunningChild};

/// Process name used for the supervisor's own synthetic log lines.
const SYSTEM_PROCESS: &str = "prox";

/// Backoff ceiling between unexpected exits.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("process `{0}` not found")]
    ProcessNotFound(String),

    #[error("process `{0}` is already running")]
    AlreadyRunning(String),

    #[error("process `{0}` is not running")]
    NotRunning(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// Outcome of starting every configured process.
#[derive(Debug, Default)]
pub struct StartReport {
    /// Name -> error message for processes that failed to launch
    pub failed: BTreeMap<String, String>,
}

impl StartReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Live handle to a spawned instance. The monitor task clears it on exit.
struct Instance {
    pid: u32,
    /// Flips to true after the child exited and the readers drained
    exited: watch::Receiver<bool>,
    health: Option<JoinHandle<()>>,
}

struct ProcessEntry {
    def: ProcessDefinition,
    /// Held across the whole start/stop/restart critical section
    op_lock: tokio::sync::Mutex<()>,
    record: Arc<Mutex<ProcessRecord>>,
    instance: Mutex<Option<Instance>>,
}

/// Owns all process entries and the shared log buffer.
pub struct Supervisor {
    config: Config,
    entries: BTreeMap<String, Arc<ProcessEntry>>,
    logbuf: Arc<LogBuffer>,
    grace: Duration,
    max_restarts: u32,
    shutting_down: AtomicBool,
}

impl Supervisor {
    pub fn new(config: Config, logbuf: Arc<LogBuffer>) -> Self {
        let entries = config
            .processes
            .values()
            .map(|def| {
                let entry = ProcessEntry {
                    def: def.clone(),
                    op_lock: tokio::sync::Mutex::new(()),
                    record: Arc::new(Mutex::new(ProcessRecord::new(&def.name))),
                    instance: Mutex::new(None),
                };
                (def.name.clone(), Arc::new(entry))
            })
            .collect();

        let grace = Duration::from_secs(config.settings.grace_seconds);
        let max_restarts = config.settings.max_restarts;
        Self { config, entries, logbuf, grace, max_restarts, shutting_down: AtomicBool::new(false) }
    }

    pub fn logbuf(&self) -> &Arc<LogBuffer> {
        &self.logbuf
    }

    /// Write a synthetic `system`-stream log line.
    pub fn system_log(&self, line: impl Into<String>) {
        self.logbuf.write(LogEntry::new(SYSTEM_PROCESS, LogStream::System, line));
    }

    /// Launch every configured process in parallel. Individual failures do
    /// not abort the others.
    pub async fn start(self: &Arc<Self>) -> StartReport {
        let names: Vec<String> = self.entries.keys().cloned().collect();
        let mut report = StartReport::default();

        let launches = names.into_iter().map(|name| {
            let sup = Arc::clone(self);
            async move {
                let result = sup.start_process(&name).await;
                (name, result)
            }
        });

        for (name, result) in join_all(launches).await {
            if let Err(e) = result {
                report.failed.insert(name, e.to_string());
            }
        }
        report
    }

    /// Stop every process concurrently, `grace` bounding the SIGTERM to
    /// SIGKILL escalation. Respawns are suppressed for good.
    pub async fn stop(self: &Arc<Self>, grace: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let stops = self.entries.keys().cloned().map(|name| {
            let sup = Arc::clone(self);
            async move {
                if let Err(e) = sup.stop_process_with_grace(&name, grace).await {
                    // Not-running conflicts are expected during shutdown.
                    if !matches!(e, SupervisorError::NotRunning(_)) {
                        warn!(process = %name, "stop failed during shutdown: {}", e);
                    }
                }
            }
        });
        join_all(stops).await;
    }

    pub async fn start_process(self: &Arc<Self>, name: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        let _guard = entry.op_lock.lock().await;

        {
            let mut record = entry.record.lock();
            if !record.state.can_start() {
                return Err(SupervisorError::AlreadyRunning(name.to_string()));
            }
            record.state = ProcessState::Starting;
            record.restart_count = 0;
        }

        self.spawn_locked(&entry)
    }

    pub async fn stop_process(self: &Arc<Self>, name: &str) -> Result<(), SupervisorError> {
        self.stop_process_with_grace(name, self.grace).await
    }

    async fn stop_process_with_grace(
        self: &Arc<Self>,
        name: &str,
        grace: Duration,
    ) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        let _guard = entry.op_lock.lock().await;
        self.stop_locked(&entry, grace).await
    }

    /// Stop followed by start under one per-name critical section; no other
    /// controller observes the intermediate state.
    pub async fn restart_process(self: &Arc<Self>, name: &str) -> Result<(), SupervisorError> {
        let entry = self.entry(name)?;
        let _guard = entry.op_lock.lock().await;

        if entry.record.lock().state.can_stop() {
            self.stop_locked(&entry, self.grace).await?;
        }

        {
            let mut record = entry.record.lock();
            record.state = ProcessState::Starting;
            record.restart_count = 0;
        }
        self.spawn_locked(&entry)
    }

    pub fn process(&self, name: &str) -> Result<ProcessDetail, SupervisorError> {
        let entry = self.entry(name)?;
        let record = entry.record.lock();

        // Env-file problems must not fail a read-only query; fall back to
        // the inline env.
        let env = self.config.merged_env(&entry.def).unwrap_or_else(|_| entry.def.env.clone());

        Ok(ProcessDetail {
            summary: record.summary(),
            command: entry.def.command.clone(),
            cwd: entry.def.cwd.as_ref().map(|p| p.display().to_string()),
            env: redact_env(&env),
            last_exit: record.last_exit.clone(),
            health_output: record.health_output.clone(),
        })
    }

    pub fn processes(&self) -> Vec<ProcessSummary> {
        self.entries.values().map(|e| e.record.lock().summary()).collect()
    }

    fn entry(&self, name: &str) -> Result<Arc<ProcessEntry>, SupervisorError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| SupervisorError::ProcessNotFound(name.to_string()))
    }

    /// Spawn the child for an entry whose op_lock is held and whose record
    /// is in `Starting`.
    fn spawn_locked(self: &Arc<Self>, entry: &Arc<ProcessEntry>) -> Result<(), SupervisorError> {
        let name = entry.def.name.clone();

        let env = match self.config.merged_env(&entry.def) {
            Ok(env) => env,
            Err(e) => {
                self.fail_entry(entry, &format!("failed to build environment: {e}"));
                return Err(e.into());
            }
        };

        let child = match runner::spawn(
            &name,
            &entry.def.command,
            &env,
            entry.def.cwd.as_ref(),
            Arc::clone(&self.logbuf),
        ) {
            Ok(child) => child,
            Err(e) => {
                self.fail_entry(entry, &format!("failed to start: {e}"));
                return Err(e.into());
            }
        };

        let pid = child.pid;
        entry.record.lock().mark_running(pid);
        info!(process = %name, pid, "process started");
        self.system_log(format!("started {name} (pid {pid})"));

        let health = entry.def.health.clone().map(|spec| {
            crate::health::spawn_checker(spec, env, Arc::clone(&entry.record))
        });

        let (exit_tx, exit_rx) = watch::channel(false);
        *entry.instance.lock() = Some(Instance { pid, exited: exit_rx, health });

        tokio::spawn(Self::monitor(Arc::clone(self), Arc::clone(entry), child, exit_tx));
        Ok(())
    }

    fn fail_entry(&self, entry: &ProcessEntry, message: &str) {
        let name = &entry.def.name;
        warn!(process = %name, "{message}");
        self.system_log(format!("{name}: {message}"));
        let mut record = entry.record.lock();
        record.state = ProcessState::Failed;
        record.pid = 0;
    }

    /// Wait for the child, update the record, and respawn when the exit was
    /// unexpected and the restart budget allows.
    async fn monitor(
        sup: Arc<Self>,
        entry: Arc<ProcessEntry>,
        child: RunningChild,
        exit_tx: watch::Sender<bool>,
    ) {
        let name = entry.def.name.clone();

        let (code, signal) = match child.wait().await {
            Ok(status) => {
                use std::os::unix::process::ExitStatusExt;
                (status.code(), status.signal())
            }
            Err(e) => {
                warn!(process = %name, "wait failed: {}", e);
                sup.system_log(format!("{name}: {e}"));
                (None, None)
            }
        };

        // Clear the instance and stop the health checker before the exit is
        // announced, so stop() observers see a settled record.
        let instance = entry.instance.lock().take();
        if let Some(health) = instance.and_then(|i| i.health) {
            health.abort();
        }

        let was_stopping = {
            let record = entry.record.lock();
            record.state == ProcessState::Stopping
        };
        let expected = was_stopping || sup.shutting_down.load(Ordering::SeqCst);

        let restart_count = {
            let mut record = entry.record.lock();
            if expected {
                record.mark_exited(ProcessState::Stopped, code, signal);
                None
            } else if code == Some(0) {
                sup.system_log(format!("{name} exited normally"));
                record.mark_exited(ProcessState::Stopped, code, signal);
                None
            } else {
                record.restart_count += 1;
                let n = record.restart_count;
                if n > sup.max_restarts {
                    record.mark_exited(ProcessState::Failed, code, signal);
                    None
                } else {
                    record.mark_exited(ProcessState::Restarting, code, signal);
                    Some(n)
                }
            }
        };

        let _ = exit_tx.send(true);

        let Some(n) = restart_count else {
            if !expected && code != Some(0) {
                let reason = describe_exit(code, signal);
                warn!(process = %name, "restart budget exhausted ({reason})");
                sup.system_log(format!(
                    "{name} {reason}; restart budget exhausted, marking failed"
                ));
            }
            info!(process = %name, "process exited");
            return;
        };

        let reason = describe_exit(code, signal);
        let backoff = backoff_for(n);
        warn!(process = %name, restart = n, "{reason}, restarting in {:?}", backoff);
        sup.system_log(format!("{name} {reason}; restarting in {}s", backoff.as_secs()));
        tokio::time::sleep(backoff).await;

        let _guard = entry.op_lock.lock().await;
        let still_restarting = entry.record.lock().state == ProcessState::Restarting;
        if !still_restarting || sup.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        entry.record.lock().state = ProcessState::Starting;
        if let Err(e) = sup.spawn_locked(&entry) {
            warn!(process = %name, "respawn failed: {}", e);
        }
    }

    /// Stop the live instance of an entry whose op_lock is held.
    async fn stop_locked(
        &self,
        entry: &Arc<ProcessEntry>,
        grace: Duration,
    ) -> Result<(), SupervisorError> {
        let name = entry.def.name.clone();

        {
            let mut record = entry.record.lock();
            if !record.state.can_stop() {
                return Err(SupervisorError::NotRunning(name));
            }
            record.state = ProcessState::Stopping;
        }

        let (pid, mut exited) = {
            let instance = entry.instance.lock();
            match instance.as_ref() {
                Some(inst) => (inst.pid, inst.exited.clone()),
                None => {
                    // Backoff window between exits: nothing to signal.
                    let mut record = entry.record.lock();
                    record.state = ProcessState::Stopped;
                    record.pid = 0;
                    return Ok(());
                }
            }
        };

        info!(process = %name, pid, "stopping process");
        self.system_log(format!("stopping {name}"));

        // ESRCH means the group is already gone; the monitor will settle
        // the record either way.
        let _ = runner::signal_group(pid, nix::sys::signal::Signal::SIGTERM);

        let graceful = tokio::time::timeout(grace, wait_exited(&mut exited)).await.is_ok();
        if !graceful {
            warn!(process = %name, pid, "grace period expired, sending SIGKILL");
            self.system_log(format!("{name} did not exit in time, killing"));
            let _ = runner::signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            wait_exited(&mut exited).await;
        }

        // The monitor may have raced an unexpected exit into `Restarting`
        // just before the stop; settle the record so no respawn follows.
        {
            let mut record = entry.record.lock();
            if matches!(record.state, ProcessState::Stopping | ProcessState::Restarting) {
                record.state = ProcessState::Stopped;
                record.pid = 0;
            }
        }

        self.system_log(format!("stopped {name}"));
        Ok(())
    }
}

async fn wait_exited(exited: &mut watch::Receiver<bool>) {
    while !*exited.borrow() {
        if exited.changed().await.is_err() {
            return;
        }
    }
}

fn backoff_for(restart: u32) -> Duration {
    let exp = restart.saturating_sub(1).min(5);
    MAX_BACKOFF.min(Duration::from_secs(1u64 << exp))
}

fn describe_exit(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("exited with code {code}"),
        (None, Some(signal)) => format!("killed by signal {signal}"),
        (None, None) => "exited".to_string(),
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
