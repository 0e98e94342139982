//! MCP initialize / tools/call exchange.
//!
//! Every invocation performs exactly two requests over one session:
//!
//! 1. **`initialize`**: announces the protocol version and client identity.
//!    An error response here ends the invocation; no tool call is sent.
//! 2. **`tools/call`**: invokes the named tool with the caller's arguments.
//!
//! Requests are strictly sequential: [`RpcChannel::send_request`] writes one
//! line and suspends until the response for that id is dispatched by the
//! output pump, or until the session is closed.

use serde_json::{json, Map, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::mcp::pending::{lock_table, SharedTable};
use crate::mcp::wire::{encode_request, RequestIds};
use crate::{AppError, Result};

/// Protocol version sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2024-06-01";

/// Client name sent in `initialize.params.clientInfo`.
pub const CLIENT_NAME: &str = "mcp-bridge";

/// Method name of the handshake request.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Method name of the tool invocation request.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Request side of one module session.
///
/// Owns the module's stdin (any [`AsyncWrite`]) and the id allocator, and
/// registers each request in the session's correlation table before
/// writing it.
pub struct RpcChannel<'a, W> {
    module: &'a str,
    writer: W,
    table: &'a SharedTable,
    ids: RequestIds,
    debug_wire: bool,
}

impl<'a, W> RpcChannel<'a, W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a channel writing to `writer` and correlating through `table`.
    #[must_use]
    pub fn new(module: &'a str, writer: W, table: &'a SharedTable, debug_wire: bool) -> Self {
        Self {
            module,
            writer,
            table,
            ids: RequestIds::new(),
            debug_wire,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// - `AppError::Transport` if the id cannot be registered, the write
    ///   fails, or the session closes first.
    /// - `AppError::Protocol` if the module answers with an `error` payload.
    /// - Whatever error the session was closed with (e.g. `Timeout`).
    pub async fn send_request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.ids.allocate();
        let completion = lock_table(self.table).register(id.clone())?;
        let line = encode_request(&id, method, &params)?;

        if self.debug_wire {
            debug!(module = self.module, line = line.trim_end(), "-> module");
        }

        if let Err(err) = self.write_line(&line).await {
            lock_table(self.table).cancel(&id);
            return Err(AppError::Transport(format!(
                "failed to write {method} to module '{}': {err}",
                self.module
            )));
        }

        completion.await.map_err(|_| {
            AppError::Transport(format!(
                "session for module '{}' ended before {method} completed",
                self.module
            ))
        })?
    }

    /// Give back the writer so the caller can close it.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }
}

/// Parameters of the `initialize` request.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Run the handshake and the tool call on `channel`.
///
/// Returns the `tools/call` result (or the whole response when it carries
/// no `result`).
///
/// # Errors
///
/// Propagates any [`RpcChannel::send_request`] failure; an `initialize`
/// failure short-circuits before `tools/call` is sent.
pub async fn run_invocation<W>(
    channel: &mut RpcChannel<'_, W>,
    tool: &str,
    arguments: Map<String, Value>,
) -> Result<Value>
where
    W: AsyncWrite + Unpin,
{
    let init = channel
        .send_request(METHOD_INITIALIZE, initialize_params())
        .await?;
    let server = init
        .pointer("/serverInfo/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!(module = channel.module, server, "module initialized");

    channel
        .send_request(
            METHOD_TOOLS_CALL,
            json!({ "name": tool, "arguments": arguments }),
        )
        .await
}
