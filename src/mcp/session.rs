//! Process supervisor for one module session.
//!
//! A [`ProcessSession`] owns a spawned module from launch to reap. Its
//! [`run`](ProcessSession::run) method drives, on the current task:
//!
//! - the stdout pump ([`pump_stdout`]) feeding the correlation table,
//! - stderr capture ([`drain_stderr`]),
//! - the session timer,
//! - the initialize / tools/call exchange ([`run_invocation`]).
//!
//! Whatever branch finishes the session (result, protocol error, closed
//! output, timeout), teardown always follows: the timer is dropped, stdin is
//! closed, the process group is killed and the child reaped.

use std::collections::HashMap;
use std::future::Future;
use std::hash::BuildHasher;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::mcp::pending::{lock_table, CorrelationTable};
use crate::mcp::protocol::{run_invocation, RpcChannel};
use crate::mcp::reader::{drain_stderr, pump_stdout, StderrTail};
use crate::mcp::spawner::spawn_module;
use crate::{AppError, Result};

/// Upper bound on waiting for a killed process to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a transport failure waits for the rest of stderr.
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// One live module process and its stdio.
#[derive(Debug)]
pub struct ProcessSession {
    module: String,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: ChildStderr,
    started: Instant,
    debug_wire: bool,
}

impl ProcessSession {
    /// Spawn `module` with exactly `env` and start the session clock.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process cannot be started.
    pub fn start<S: BuildHasher>(
        runner: &RunnerConfig,
        module: &str,
        env: &HashMap<String, String, S>,
    ) -> Result<Self> {
        let spawned = spawn_module(runner, module, env)?;
        Ok(Self {
            module: module.to_owned(),
            child: spawned.child,
            stdin: spawned.stdin,
            stdout: spawned.stdout,
            stderr: spawned.stderr,
            started: Instant::now(),
            debug_wire: runner.debug_wire,
        })
    }

    /// OS process id, if the process has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Run the invocation to completion and tear the process down.
    ///
    /// `timeout` of `None` disables the timer.
    ///
    /// # Errors
    ///
    /// - `AppError::Timeout` when the timer fires first.
    /// - `AppError::Protocol` when the module answers with an error.
    /// - `AppError::Transport` when the module's output ends or stdin
    ///   cannot be written; the message carries the stderr tail.
    pub async fn run(
        self,
        tool: &str,
        arguments: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let Self {
            module,
            mut child,
            stdin,
            stdout,
            stderr,
            started,
            debug_wire,
        } = self;

        let table = Mutex::new(CorrelationTable::new());
        let tail = Mutex::new(StderrTail::new());
        let mut channel = RpcChannel::new(&module, stdin, &table, debug_wire);

        let outcome = {
            let protocol = run_invocation(&mut channel, tool, arguments);
            let io = async {
                tokio::join!(
                    pump_stdout(&module, stdout, &table, debug_wire),
                    drain_stderr(&module, stderr, &tail),
                );
            };
            let expiry = expire_after(timeout);
            tokio::pin!(protocol, io, expiry);

            let mut io_done = false;
            let outcome = loop {
                tokio::select! {
                    result = &mut protocol => break result,
                    () = &mut expiry => {
                        let err = AppError::Timeout {
                            module: module.clone(),
                            elapsed: started.elapsed(),
                        };
                        let drained = lock_table(&table).close(err.clone());
                        warn!(module = module.as_str(), drained, "module session timed out");
                        break Err(err);
                    }
                    () = &mut io, if !io_done => {
                        // Output is closed; the protocol branch now sees the
                        // closure error on its pending request.
                        io_done = true;
                    }
                }
            };

            // A dying module usually flushes stderr after stdout closes.
            if !io_done && matches!(outcome, Err(AppError::Transport(_))) {
                let _ = tokio::time::timeout(STDERR_GRACE, &mut io).await;
            }
            outcome
        };

        teardown(&module, &mut child, channel.into_writer()).await;

        let tail = tail
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        outcome.map_err(|err| with_stderr(err, tail.as_str()))
    }
}

/// Resolve after `timeout`, or never when it is `None`.
fn expire_after(timeout: Option<Duration>) -> impl Future<Output = ()> {
    async move {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    }
}

/// Close stdin, kill the process group and reap the child. Never fails.
async fn teardown(module: &str, child: &mut Child, stdin: ChildStdin) {
    drop(stdin);

    #[cfg(unix)]
    kill_process_group(module, child.id());
    if let Err(err) = child.start_kill() {
        debug!(module, error = %err, "module kill failed (already exited?)");
    }

    match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => info!(module, %status, "module process terminated"),
        Ok(Err(err)) => debug!(module, error = %err, "failed to reap module process"),
        Err(_elapsed) => warn!(module, "module process not reaped within {REAP_TIMEOUT:?}"),
    }
}

/// SIGKILL the group led by `pid`, reaching runner descendants.
#[cfg(unix)]
fn kill_process_group(module: &str, pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        debug!(module, error = %err, "module process group kill failed");
    }
}

/// Append the stderr tail to transport failures.
fn with_stderr(err: AppError, stderr: &str) -> AppError {
    match err {
        AppError::Transport(msg) if !stderr.is_empty() => {
            AppError::Transport(format!("{msg} | stderr: {stderr}"))
        }
        other => other,
    }
}
