//! Unit tests for the correlation table and line dispatch.

use std::sync::Mutex;

use serde_json::json;

use mcp_bridge::mcp::pending::{lock_table, CorrelationTable};
use mcp_bridge::mcp::reader::{dispatch_line, Dispatch};
use mcp_bridge::mcp::wire::RequestId;
use mcp_bridge::AppError;

#[tokio::test]
async fn resolve_delivers_value_exactly_once() {
    let mut table = CorrelationTable::new();
    let id = RequestId::Number(1);
    let rx = table.register(id.clone()).unwrap();

    assert!(table.resolve(&id, json!({"ok": true})));
    assert!(!table.resolve(&id, json!("again")));
    assert!(table.is_empty());
    assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
}

#[tokio::test]
async fn reject_delivers_error() {
    let mut table = CorrelationTable::new();
    let id = RequestId::Text("abc".into());
    let rx = table.register(id.clone()).unwrap();

    assert!(table.reject(&id, AppError::Protocol(json!({"code": 1}))));
    assert_eq!(
        rx.await.unwrap().unwrap_err(),
        AppError::Protocol(json!({"code": 1}))
    );
}

#[test]
fn duplicate_registration_is_refused() {
    let mut table = CorrelationTable::new();
    let _rx = table.register(RequestId::Number(1)).unwrap();
    let err = table.register(RequestId::Number(1)).unwrap_err();
    assert!(matches!(err, AppError::Transport(msg) if msg.contains("duplicate request id 1")));
    assert_eq!(table.len(), 1);
}

#[test]
fn unknown_ids_are_reported_not_settled() {
    let mut table = CorrelationTable::new();
    assert!(!table.resolve(&RequestId::Number(9), json!(null)));
    assert!(!table.reject(&RequestId::Number(9), AppError::Transport("x".into())));
    assert!(!table.cancel(&RequestId::Number(9)));
}

#[tokio::test]
async fn close_rejects_pending_and_blocks_new_entries() {
    let mut table = CorrelationTable::new();
    let rx1 = table.register(RequestId::Number(1)).unwrap();
    let rx2 = table.register(RequestId::Number(2)).unwrap();

    let closed = AppError::Transport("module exited".into());
    assert_eq!(table.close(closed.clone()), 2);
    assert!(table.is_closed());
    assert_eq!(rx1.await.unwrap().unwrap_err(), closed);
    assert_eq!(rx2.await.unwrap().unwrap_err(), closed);

    // The first close reason wins.
    table.close(AppError::Transport("later".into()));
    assert_eq!(table.register(RequestId::Number(3)).unwrap_err(), closed);
}

#[tokio::test]
async fn drain_all_keeps_table_open() {
    let mut table = CorrelationTable::new();
    let rx = table.register(RequestId::Number(1)).unwrap();
    assert_eq!(table.drain_all(&AppError::Transport("reset".into())), 1);
    assert!(rx.await.unwrap().is_err());
    assert!(!table.is_closed());
    assert!(table.register(RequestId::Number(2)).is_ok());
}

#[tokio::test]
async fn cancelled_entry_drops_its_completion() {
    let mut table = CorrelationTable::new();
    let id = RequestId::Number(1);
    let rx = table.register(id.clone()).unwrap();
    assert!(table.cancel(&id));
    assert!(rx.await.is_err(), "sender dropped without a value");
}

#[tokio::test]
async fn dispatch_routes_results_errors_and_noise() {
    let table = Mutex::new(CorrelationTable::new());
    let rx1 = lock_table(&table).register(RequestId::Number(1)).unwrap();
    let rx2 = lock_table(&table).register(RequestId::Number(2)).unwrap();

    let cases = [
        ("not json", Dispatch::Malformed),
        (r#"{"jsonrpc":"2.0","method":"notifications/message"}"#, Dispatch::Ignored),
        (r#"{"jsonrpc":"2.0","id":"srv-1","method":"roots/list"}"#, Dispatch::Ignored),
        (r#"[1,2,3]"#, Dispatch::Ignored),
        (r#"{"jsonrpc":"2.0","id":42,"result":{}}"#, Dispatch::Unmatched),
        (r#"{"jsonrpc":"2.0","id":1,"result":{"serverInfo":{"name":"stub"}}}"#, Dispatch::Resolved),
        (r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32601,"message":"nope"}}"#, Dispatch::Rejected),
    ];
    for (line, expected) in cases {
        assert_eq!(dispatch_line("stub", line, &table, false), expected, "{line}");
    }

    assert_eq!(
        rx1.await.unwrap().unwrap(),
        json!({"serverInfo": {"name": "stub"}})
    );
    let err = rx2.await.unwrap().unwrap_err();
    assert_eq!(err, AppError::Protocol(json!({"code": -32601, "message": "nope"})));
    assert!(lock_table(&table).is_empty());
}
