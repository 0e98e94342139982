//! MCP client facade.
//!
//! [`McpClient::invoke`] is the single entry point used by the HTTP layer
//! and the CLI: one call spawns one module process, performs the handshake
//! and the tool call, and always terminates the process before returning.
//! The client holds only runner configuration; nothing is reused between
//! calls.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{info, warn, Instrument};

use crate::config::RunnerConfig;
use crate::mcp::session::ProcessSession;
use crate::mcp::spawner::{host_environment, merged_environment};
use crate::Result;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Token exported to the module as `ACCESS_TOKEN` when non-empty.
    pub access_token: Option<String>,
    /// Extra environment; wins over the base environment and the token.
    pub environment: HashMap<String, String>,
    /// Timeout in milliseconds. `None` uses the runner default; `Some(0)`
    /// disables the timer.
    pub timeout_ms: Option<u64>,
}

/// A fully resolved, immutable invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Module identifier handed to the runner (e.g. an npm package name).
    pub module: String,
    /// Tool to call.
    pub tool: String,
    /// Tool arguments.
    pub arguments: Map<String, Value>,
    /// Optional access token.
    pub access_token: Option<String>,
    /// Caller-supplied environment.
    pub environment: HashMap<String, String>,
    /// Session timeout; `None` means no timeout.
    pub timeout: Option<Duration>,
}

impl InvocationRequest {
    /// Build a request, resolving `options.timeout_ms` against
    /// `default_timeout_ms`.
    #[must_use]
    pub fn new(
        module: &str,
        tool: &str,
        arguments: Map<String, Value>,
        options: InvokeOptions,
        default_timeout_ms: u64,
    ) -> Self {
        let timeout_ms = options.timeout_ms.unwrap_or(default_timeout_ms);
        Self {
            module: module.to_owned(),
            tool: tool.to_owned(),
            arguments,
            access_token: options.access_token,
            environment: options.environment,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }
}

/// Stateless client that runs one module session per call.
#[derive(Debug, Clone)]
pub struct McpClient {
    runner: RunnerConfig,
}

impl McpClient {
    /// Create a client using `runner` to launch modules.
    #[must_use]
    pub fn new(runner: RunnerConfig) -> Self {
        Self { runner }
    }

    /// Runner configuration in use.
    #[must_use]
    pub fn runner(&self) -> &RunnerConfig {
        &self.runner
    }

    /// Invoke `tool` on `module` with `arguments`.
    ///
    /// # Errors
    ///
    /// - `AppError::Spawn`: the module process could not be started.
    /// - `AppError::Protocol`: `initialize` or `tools/call` returned an
    ///   error payload.
    /// - `AppError::Timeout`: no terminal response within the timeout.
    /// - `AppError::Transport`: the module's stdio failed or closed early.
    pub async fn invoke(
        &self,
        module: &str,
        tool: &str,
        arguments: Map<String, Value>,
        options: InvokeOptions,
    ) -> Result<Value> {
        let request =
            InvocationRequest::new(module, tool, arguments, options, self.runner.default_timeout_ms);
        self.execute(request).await
    }

    /// Execute a prepared [`InvocationRequest`].
    ///
    /// # Errors
    ///
    /// Same as [`invoke`](Self::invoke).
    pub async fn execute(&self, request: InvocationRequest) -> Result<Value> {
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "mcp_invoke",
            invocation_id = %invocation_id,
            module = %request.module,
            tool = %request.tool,
        );

        async move {
            info!(timeout = ?request.timeout, "spawning module");

            let env = merged_environment(
                host_environment(),
                request.access_token.as_deref(),
                &request.environment,
            );
            let session = ProcessSession::start(&self.runner, &request.module, &env)?;

            let result = session
                .run(&request.tool, request.arguments, request.timeout)
                .await;
            match &result {
                Ok(_) => info!("tool call completed"),
                Err(err) => warn!(error = %err, "tool call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
