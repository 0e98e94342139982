#![forbid(unsafe_code)]

//! `mcp-bridge-ctl`: command-line client for a running `mcp-bridge`.
//!
//! Posts `{"userId", "args"}` to `/{provider}/{action}` and pretty-prints
//! the JSON answer.

use clap::Parser;
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(
    name = "mcp-bridge-ctl",
    about = "Call a provider action on a running mcp-bridge",
    version,
    long_about = None
)]
struct Cli {
    /// Base URL of the bridge.
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    url: String,

    /// User whose credentials the bridge should resolve.
    #[arg(long, default_value = "local")]
    user: String,

    /// Provider name (e.g. `gmail`, `brave`).
    provider: String,

    /// Action name (e.g. `read`, `search`).
    action: String,

    /// Tool arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    args: String,
}

fn main() {
    let cli = Cli::parse();

    let args: Value = match serde_json::from_str(&cli.args) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => {
            eprintln!("Error: --args must be a JSON object");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("Error: --args is not valid JSON: {err}");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    let url = format!(
        "{}/{}/{}",
        cli.url.trim_end_matches('/'),
        cli.provider,
        cli.action
    );
    let body = serde_json::json!({ "userId": cli.user, "args": args });

    match runtime.block_on(post_json(&url, &body)) {
        Ok((status, response)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_default()
            );
            if !status.is_success() {
                eprintln!("Error: bridge answered {status}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("Failed to reach bridge at {url}: {err}");
            eprintln!("Is mcp-bridge running?");
            std::process::exit(1);
        }
    }
}

/// POST `body` and decode the JSON response.
async fn post_json(
    url: &str,
    body: &Value,
) -> std::result::Result<(reqwest::StatusCode, Value), reqwest::Error> {
    let response = reqwest::Client::new().post(url).json(body).send().await?;
    let status = response.status();
    let value = response.json::<Value>().await?;
    Ok((status, value))
}
