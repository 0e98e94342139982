//! Unit tests for JSON-RPC message encoding and classification.

use serde_json::{json, Value};

use mcp_bridge::mcp::wire::{encode_request, parse_inbound, InboundMessage, RequestId};

fn response(line: &str) -> (RequestId, Result<Value, Value>) {
    match parse_inbound(line).unwrap() {
        InboundMessage::Response { id, outcome } => (id, outcome),
        other => panic!("expected response, got {other:?}"),
    }
}

#[test]
fn result_value_is_unwrapped() {
    let (id, outcome) = response(r#"{"jsonrpc":"2.0","id":2,"result":{"content":[]}}"#);
    assert_eq!(id, RequestId::Number(2));
    assert_eq!(outcome, Ok(json!({"content": []})));
}

#[test]
fn null_result_yields_whole_message() {
    let line = r#"{"jsonrpc":"2.0","id":2,"result":null}"#;
    let (_, outcome) = response(line);
    assert_eq!(outcome, Ok(serde_json::from_str::<Value>(line).unwrap()));
}

#[test]
fn error_wins_over_result() {
    let (_, outcome) =
        response(r#"{"jsonrpc":"2.0","id":1,"result":{"x":1},"error":{"code":-1}}"#);
    assert_eq!(outcome, Err(json!({"code": -1})));
}

#[test]
fn null_error_is_not_an_error() {
    let (_, outcome) = response(r#"{"jsonrpc":"2.0","id":1,"result":"ok","error":null}"#);
    assert_eq!(outcome, Ok(json!("ok")));
}

#[test]
fn integral_float_id_is_matched_as_integer() {
    let (id, outcome) = response(r#"{"jsonrpc":"2.0","id":1.0,"result":"ok"}"#);
    assert_eq!(id, RequestId::Number(1));
    assert_eq!(outcome, Ok(json!("ok")));
}

#[test]
fn string_ids_are_preserved() {
    let (id, _) = response(r#"{"jsonrpc":"2.0","id":"req-7","result":{}}"#);
    assert_eq!(id, RequestId::Text("req-7".into()));
    assert_eq!(id.to_string(), "\"req-7\"");
}

#[test]
fn notifications_and_server_requests_are_distinguished() {
    assert_eq!(
        parse_inbound(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{}}"#)
            .unwrap(),
        InboundMessage::Notification {
            method: "notifications/progress".into()
        }
    );
    assert_eq!(
        parse_inbound(r#"{"jsonrpc":"2.0","id":5,"method":"sampling/createMessage"}"#).unwrap(),
        InboundMessage::Request {
            id: json!(5),
            method: "sampling/createMessage".into()
        }
    );
}

#[test]
fn non_objects_and_idless_replies_are_unrecognized() {
    assert_eq!(parse_inbound("42").unwrap(), InboundMessage::Unrecognized);
    assert_eq!(
        parse_inbound(r#"{"jsonrpc":"2.0","result":{}}"#).unwrap(),
        InboundMessage::Unrecognized
    );
    assert!(parse_inbound("{oops").is_err());
}

#[test]
fn encoded_request_round_trips_ids_and_params() {
    let params = json!({"name": "search", "arguments": {"q": "rust\nlines"}});
    let line = encode_request(&RequestId::Text("x".into()), "tools/call", &params).unwrap();

    assert_eq!(line.matches('\n').count(), 1, "embedded newlines stay escaped");
    let value: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["id"], "x");
    assert_eq!(value["params"], params);
}
