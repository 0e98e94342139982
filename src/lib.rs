#![forbid(unsafe_code)]

//! On-demand bridge to MCP tool modules.
//!
//! Each invocation launches one module process, speaks newline-delimited
//! JSON-RPC with it over stdio (`initialize`, then `tools/call`), and tears
//! it down. Credentials are resolved per user and provider, and an HTTP
//! surface maps `POST /{provider}/{action}` onto module tools.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod http;
pub mod mcp;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
