//! MCP module process spawner.
//!
//! Launches `runner.command runner.args… <module>` (by default
//! `npx -y <module>`) with:
//! - `kill_on_drop(true)` so a session dropped mid-flight never leaks a
//!   process.
//! - `env_clear()` followed by the merged environment from
//!   [`merged_environment`], so the child sees exactly the computed map.
//! - All three stdio streams piped.
//! - On unix, its own process group, so teardown can signal every process
//!   the runner starts (`npx` forks the real server).

use std::collections::HashMap;
use std::ffi::OsString;
use std::hash::BuildHasher;
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::{AppError, Result};

/// Environment variable that carries the caller's access token.
pub const ACCESS_TOKEN_VAR: &str = "ACCESS_TOKEN";

/// The bridge's own environment as UTF-8 pairs.
#[must_use]
pub fn host_environment() -> Vec<(String, String)> {
    utf8_environment(std::env::vars_os())
}

/// Keep the entries of `vars` whose key and value are valid UTF-8.
///
/// Other entries are skipped with a warning; the child never sees them.
#[must_use]
pub fn utf8_environment<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let lossy = key.to_string_lossy().into_owned();
            match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                _ => {
                    warn!(key = lossy.as_str(), "skipping non-UTF-8 environment entry");
                    None
                }
            }
        })
        .collect()
}

/// Compute the child environment.
///
/// Later sources win on key collision:
/// 1. `base` (normally the bridge's own environment),
/// 2. [`ACCESS_TOKEN_VAR`] when `access_token` is present and non-empty,
/// 3. the caller-supplied `overrides`.
#[must_use]
pub fn merged_environment<I, S>(
    base: I,
    access_token: Option<&str>,
    overrides: &HashMap<String, String, S>,
) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
    S: BuildHasher,
{
    let mut env: HashMap<String, String> = base.into_iter().collect();
    if let Some(token) = access_token.filter(|t| !t.is_empty()) {
        env.insert(ACCESS_TOKEN_VAR.to_owned(), token.to_owned());
    }
    env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

/// Stdio handles of a freshly spawned module.
#[derive(Debug)]
pub struct SpawnedModule {
    /// Child process handle; kept alive so `kill_on_drop` applies.
    pub child: Child,
    /// Module stdin for outbound requests.
    pub stdin: ChildStdin,
    /// Module stdout carrying responses.
    pub stdout: ChildStdout,
    /// Module stderr, captured for diagnostics.
    pub stderr: ChildStderr,
}

/// Spawn `module` through the configured runner with exactly `env`.
///
/// # Errors
///
/// - `AppError::Spawn("failed to spawn …")`: OS spawn failure (e.g. the
///   runner binary does not exist).
/// - `AppError::Spawn("failed to capture …")`: a stdio pipe is missing.
pub fn spawn_module<S: BuildHasher>(
    runner: &RunnerConfig,
    module: &str,
    env: &HashMap<String, String, S>,
) -> Result<SpawnedModule> {
    let mut std_cmd = std::process::Command::new(&runner.command);
    std_cmd.args(&runner.args).arg(module);
    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut std_cmd, 0);

    let mut cmd = Command::from(std_cmd);
    cmd.env_clear();
    cmd.envs(env);

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Spawn(format!(
            "failed to spawn module '{module}' via '{}': {err}",
            runner.command
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture module stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture module stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture module stderr".into()))?;

    info!(module, pid = child.id(), "module process spawned");

    Ok(SpawnedModule {
        child,
        stdin,
        stdout,
        stderr,
    })
}
