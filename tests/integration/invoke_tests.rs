//! End-to-end invocation tests against stub modules.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use mcp_bridge::config::RunnerConfig;
use mcp_bridge::mcp::{InvokeOptions, McpClient};
use mcp_bridge::AppError;

use super::test_helpers::{recorded_pid, request_log, responding_module, StubModule, READ_ID};

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

fn logging_options(stub: &StubModule) -> (InvokeOptions, std::path::PathBuf) {
    let log = stub.path("requests.log");
    let options = InvokeOptions {
        environment: HashMap::from([(
            "REQUEST_LOG".to_owned(),
            log.to_string_lossy().into_owned(),
        )]),
        ..InvokeOptions::default()
    };
    (options, log)
}

#[tokio::test]
async fn invoke_returns_tool_result() {
    let stub = responding_module(r#"{"ok":true}"#);
    let client = McpClient::new(stub.runner());
    let (options, log) = logging_options(&stub);

    let result = client
        .invoke("@stub/echo", "echo", args(json!({"text": "hi"})), options)
        .await
        .expect("invoke succeeds");
    assert_eq!(result, json!({"ok": true}));

    let requests = request_log(&log);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0]["method"], "initialize");
    assert_eq!(requests[1]["method"], "tools/call");
    assert_eq!(requests[1]["params"]["arguments"]["text"], "hi");
}

#[tokio::test]
async fn initialize_error_skips_tool_call() {
    let stub = StubModule::new(&format!(
        r#"while IFS= read -r line; do
  printf '%s\n' "$line" >> "$REQUEST_LOG"
  {READ_ID}
  printf '{{"jsonrpc":"2.0","id":%s,"error":{{"code":-32603,"message":"init failed"}}}}\n' "$id"
done"#
    ));
    let client = McpClient::new(stub.runner());
    let (options, log) = logging_options(&stub);

    let err = client
        .invoke("@stub/broken", "echo", Map::new(), options)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AppError::Protocol(json!({"code": -32603, "message": "init failed"}))
    );

    let requests = request_log(&log);
    assert_eq!(requests.len(), 1, "no tools/call after failed initialize");
    assert_eq!(requests[0]["method"], "initialize");
}

#[tokio::test]
async fn tool_error_is_surfaced_as_protocol_error() {
    let stub = StubModule::new(&format!(
        r#"while IFS= read -r line; do
  {READ_ID}
  case "$line" in
    *'"method":"initialize"'*) printf '{{"jsonrpc":"2.0","id":%s,"result":{{}}}}\n' "$id" ;;
    *) printf '{{"jsonrpc":"2.0","id":%s,"error":{{"code":-32602,"message":"unknown tool"}}}}\n' "$id" ;;
  esac
done"#
    ));
    let client = McpClient::new(stub.runner());

    let err = client
        .invoke("@stub/x", "missing", Map::new(), InvokeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(&err, AppError::Protocol(p) if p["message"] == "unknown tool"));
    assert_eq!(err.to_string(), "protocol: unknown tool");
}

#[tokio::test]
async fn silent_module_times_out_and_is_killed() {
    let stub = StubModule::new(r#"echo $$ > "$PID_FILE"
exec sleep 30"#);
    let pid_file = stub.path("pid");
    let client = McpClient::new(stub.runner());
    let options = InvokeOptions {
        environment: HashMap::from([(
            "PID_FILE".to_owned(),
            pid_file.to_string_lossy().into_owned(),
        )]),
        timeout_ms: Some(300),
        ..InvokeOptions::default()
    };

    let started = Instant::now();
    let err = client
        .invoke("@stub/silent", "echo", Map::new(), options)
        .await
        .unwrap_err();
    let waited = started.elapsed();

    match &err {
        AppError::Timeout { module, elapsed } => {
            assert_eq!(module, "@stub/silent");
            assert!(*elapsed >= Duration::from_millis(300));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(err.to_string().contains("timed out after"));
    assert!(waited < Duration::from_secs(5), "took {waited:?}");

    #[cfg(unix)]
    {
        let pid = recorded_pid(&pid_file);
        assert!(super::test_helpers::process_gone(pid), "module process {pid} still running");
    }
}

fn pid_file_options(stub: &StubModule, timeout_ms: Option<u64>) -> (InvokeOptions, std::path::PathBuf) {
    let pid_file = stub.path("pid");
    let options = InvokeOptions {
        environment: HashMap::from([(
            "PID_FILE".to_owned(),
            pid_file.to_string_lossy().into_owned(),
        )]),
        timeout_ms,
        ..InvokeOptions::default()
    };
    (options, pid_file)
}

#[tokio::test]
async fn short_timeout_fires_promptly() {
    let stub = StubModule::new(r#"echo $$ > "$PID_FILE"
exec sleep 30"#);
    let client = McpClient::new(stub.runner());
    let (options, pid_file) = pid_file_options(&stub, Some(50));

    let started = Instant::now();
    let err = client
        .invoke("@stub/silent", "echo", Map::new(), options)
        .await
        .unwrap_err();
    let waited = started.elapsed();

    assert!(matches!(err, AppError::Timeout { .. }), "got {err:?}");
    assert!(waited >= Duration::from_millis(50), "took {waited:?}");
    assert!(waited < Duration::from_millis(150), "took {waited:?}");

    // The shell may not have reached its first line within 50ms.
    #[cfg(unix)]
    if let Some(pid) = std::fs::read_to_string(&pid_file)
        .ok()
        .and_then(|raw| raw.trim().parse::<i32>().ok())
    {
        assert!(super::test_helpers::process_gone(pid), "module process {pid} still running");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn successful_invoke_leaves_no_process_behind() {
    let stub = responding_module(r#"{"ok":true}"#);
    let client = McpClient::new(stub.runner());
    let (options, pid_file) = pid_file_options(&stub, None);

    let result = client
        .invoke("@stub/echo", "echo", Map::new(), options)
        .await
        .expect("invoke succeeds");
    assert_eq!(result, json!({"ok": true}));

    let pid = recorded_pid(&pid_file);
    assert!(super::test_helpers::process_gone(pid), "module process {pid} still running");
}

#[cfg(unix)]
#[tokio::test]
async fn runner_descendants_are_killed_on_teardown() {
    let stub = StubModule::new(&format!(
        r#"sleep 30 </dev/null >/dev/null 2>&1 &
echo $! > "$PID_FILE"
while IFS= read -r line; do
  {READ_ID}
  printf '{{"jsonrpc":"2.0","id":%s,"result":{{"ok":true}}}}\n' "$id"
done"#
    ));
    let client = McpClient::new(stub.runner());
    let (options, pid_file) = pid_file_options(&stub, None);

    client
        .invoke("@stub/forking", "echo", Map::new(), options)
        .await
        .expect("invoke succeeds");

    let grandchild = recorded_pid(&pid_file);
    assert!(
        super::test_helpers::wait_until_gone(grandchild).await,
        "descendant {grandchild} survived teardown"
    );
}

#[tokio::test]
async fn missing_runner_is_a_spawn_error() {
    let client = McpClient::new(RunnerConfig {
        command: "/nonexistent/mcp-runner".into(),
        ..RunnerConfig::default()
    });

    let err = client
        .invoke("@stub/none", "echo", Map::new(), InvokeOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Spawn(msg) if msg.contains("/nonexistent/mcp-runner")));
}

#[tokio::test]
async fn early_exit_is_a_transport_error_with_stderr() {
    let stub = StubModule::new("echo 'fatal: missing API key' >&2\nexit 3");
    let client = McpClient::new(stub.runner());

    let started = Instant::now();
    let err = client
        .invoke(
            "@stub/crash",
            "echo",
            Map::new(),
            InvokeOptions {
                timeout_ms: Some(10_000),
                ..InvokeOptions::default()
            },
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5), "failed promptly");
    match err {
        AppError::Transport(msg) => {
            assert!(msg.contains("stderr: fatal: missing API key"), "{msg}");
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn noise_on_stdout_does_not_disturb_session() {
    let stub = StubModule::new(&format!(
        r#"while IFS= read -r line; do
  {READ_ID}
  echo 'starting up...'
  printf '{{"jsonrpc":"2.0","method":"notifications/message","params":{{"level":"info"}}}}\n'
  printf '{{"jsonrpc":"2.0","id":99,"result":{{"stale":true}}}}\n'
  printf '\n'
  printf '{{"jsonrpc":"2.0","id":"srv","method":"roots/list"}}\n'
  printf '{{"jsonrpc":"2.0","id":%s,"result":{{"seen":%s}}}}\n' "$id" "$id"
done"#
    ));
    let client = McpClient::new(stub.runner());

    let result = client
        .invoke("@stub/noisy", "echo", Map::new(), InvokeOptions::default())
        .await
        .expect("noise is tolerated");
    assert_eq!(result, json!({"seen": 2}));
}

#[tokio::test]
async fn environment_precedence_reaches_module() {
    let stub = StubModule::new(&format!(
        r#"while IFS= read -r line; do
  {READ_ID}
  printf '{{"jsonrpc":"2.0","id":%s,"result":{{"token":"%s","mode":"%s"}}}}\n' "$id" "$ACCESS_TOKEN" "$MODE"
done"#
    ));
    let client = McpClient::new(stub.runner());

    let token_only = client
        .invoke(
            "@stub/env",
            "echo",
            Map::new(),
            InvokeOptions {
                access_token: Some("tok-123".into()),
                environment: HashMap::from([("MODE".to_owned(), "a".to_owned())]),
                ..InvokeOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(token_only, json!({"token": "tok-123", "mode": "a"}));

    let overridden = client
        .invoke(
            "@stub/env",
            "echo",
            Map::new(),
            InvokeOptions {
                access_token: Some("tok-123".into()),
                environment: HashMap::from([("ACCESS_TOKEN".to_owned(), "explicit".to_owned())]),
                ..InvokeOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(overridden["token"], "explicit");
}

#[tokio::test]
async fn result_less_response_is_returned_whole() {
    let stub = StubModule::new(&format!(
        r#"while IFS= read -r line; do
  {READ_ID}
  printf '{{"jsonrpc":"2.0","id":%s,"result":null}}\n' "$id"
done"#
    ));
    let client = McpClient::new(stub.runner());

    let result = client
        .invoke("@stub/null", "echo", Map::new(), InvokeOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!({"jsonrpc": "2.0", "id": 2, "result": null}));
}

#[tokio::test]
async fn concurrent_invocations_are_isolated() {
    let stub = responding_module(r#"{"ok":true}"#);
    let client = McpClient::new(stub.runner());

    let mut set = tokio::task::JoinSet::new();
    for n in 0..4 {
        let client = client.clone();
        set.spawn(async move {
            client
                .invoke(&format!("@stub/echo-{n}"), "echo", Map::new(), InvokeOptions::default())
                .await
        });
    }
    while let Some(joined) = set.join_next().await {
        assert_eq!(joined.expect("task").unwrap(), json!({"ok": true}));
    }
}

#[cfg(unix)]
#[tokio::test]
#[serial_test::serial]
async fn non_utf8_host_variable_does_not_break_invoke() {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    let stub = responding_module(r#"{"ok":true}"#);
    let client = McpClient::new(stub.runner());

    std::env::set_var("MCP_BRIDGE_NON_UTF8", OsString::from_vec(vec![0xff, 0xfe]));
    let result = client
        .invoke("@stub/echo", "echo", Map::new(), InvokeOptions::default())
        .await;
    std::env::remove_var("MCP_BRIDGE_NON_UTF8");

    assert_eq!(result.expect("invoke succeeds"), json!({"ok": true}));
}
