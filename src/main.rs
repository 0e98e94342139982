#![forbid(unsafe_code)]

//! `mcp-bridge`: runs MCP tool modules on demand behind a small HTTP API.
//!
//! `serve` (the default) starts the HTTP bridge; `call` invokes one module
//! directly and prints its result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_bridge::config::{debug_flag_enabled, GlobalConfig};
use mcp_bridge::credentials::CredentialResolver;
use mcp_bridge::http::{self, AppState};
use mcp_bridge::mcp::{InvokeOptions, McpClient};
use mcp_bridge::persistence::connection_repo::ConnectionRepo;
use mcp_bridge::persistence::db;
use mcp_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "mcp-bridge", about = "On-demand MCP module bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP bridge.
    Serve {
        /// Override the listen port.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Invoke one tool on one module and print the result.
    Call {
        /// Module identifier passed to the runner.
        #[arg(long)]
        module: String,
        /// Tool name.
        #[arg(long)]
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Extra environment for the module (repeatable).
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Exported to the module as `ACCESS_TOKEN`.
        #[arg(long)]
        access_token: Option<String>,
        /// Session timeout in milliseconds; 0 disables it.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env_overrides()?;

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.http_port = port;
            }
            serve(config).await
        }
        Command::Call {
            module,
            tool,
            args,
            env,
            access_token,
            timeout_ms,
        } => {
            let arguments = parse_arguments(&args)?;
            let options = InvokeOptions {
                access_token,
                environment: env.into_iter().collect::<HashMap<_, _>>(),
                timeout_ms,
            };
            let client = McpClient::new(config.runner);
            let result = client.invoke(&module, &tool, arguments, options).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
            );
            Ok(())
        }
    }
}

async fn serve(config: GlobalConfig) -> Result<()> {
    info!(providers = config.providers.len(), "mcp-bridge server bootstrap");

    let store = match &config.credentials.db_path {
        Some(path) => {
            let pool = db::connect(path).await?;
            info!(path = %path.display(), "connection store ready");
            Some(ConnectionRepo::new(Arc::new(pool)))
        }
        None => {
            info!("no connection store configured; using keychain and environment only");
            None
        }
    };
    let resolver = CredentialResolver::new(store, &config.credentials);
    let state = Arc::new(AppState::new(config, resolver));

    let ct = CancellationToken::new();
    let mut server = tokio::spawn(http::serve(state, ct.clone()));

    tokio::select! {
        joined = &mut server => {
            return match joined {
                Ok(result) => result,
                Err(err) => Err(AppError::Io(format!("server task failed: {err}"))),
            };
        }
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
        }
    }

    match server.await {
        Ok(Err(err)) => error!(%err, "server stopped with error"),
        Err(err) => error!(%err, "server task failed"),
        Ok(Ok(())) => {}
    }
    info!("mcp-bridge shut down");
    Ok(())
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest("--args must be a JSON object".into())),
        Err(err) => Err(AppError::BadRequest(format!("--args is not valid JSON: {err}"))),
    }
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let wire_debug = std::env::var("DEBUG_MCP").is_ok_and(|v| debug_flag_enabled(&v));
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if wire_debug {
            EnvFilter::new("info,mcp_bridge::mcp=debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
