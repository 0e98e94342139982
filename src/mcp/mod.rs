//! Model Context Protocol client layer.
//!
//! Drives one external MCP module per invocation over newline-delimited
//! JSON-RPC on stdio. Leaves first:
//!
//! - [`codec`]: line framing of the module's stdout.
//! - [`wire`]: request encoding and inbound message classification.
//! - [`pending`]: correlation of request ids to completions.
//! - [`reader`]: stdout dispatch and stderr capture.
//! - [`protocol`]: the `initialize` / `tools/call` exchange.
//! - [`spawner`]: process launch and environment merge.
//! - [`session`]: supervision, timeout and teardown of one process.
//! - [`client`]: the [`McpClient`] facade.

pub mod client;
pub mod codec;
pub mod pending;
pub mod protocol;
pub mod reader;
pub mod session;
pub mod spawner;
pub mod wire;

pub use client::{InvocationRequest, InvokeOptions, McpClient};
