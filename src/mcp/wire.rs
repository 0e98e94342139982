//! JSON-RPC 2.0 message shapes exchanged with MCP modules.
//!
//! Outbound requests are built with [`encode_request`]; inbound lines are
//! classified by [`parse_inbound`]. Inbound parsing goes through
//! [`serde_json::Value`] rather than a typed envelope so that a response
//! whose `result` is absent can still be surfaced whole.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{AppError, Result};

/// JSON-RPC protocol version tag written on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id linking a request to its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id (the bridge always allocates these).
    Number(i64),
    /// String id, accepted from modules that echo ids as strings.
    Text(String),
}

impl RequestId {
    /// Extract an id from a JSON value. Integral floats (`1.0`) count as
    /// their integer; `null`, fractional numbers and other shapes are not
    /// ids.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral))
                .map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

/// `f` as an `i64` when it has no fractional part and fits.
#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
fn integral(f: f64) -> Option<i64> {
    let in_range = (-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&f);
    (in_range && f.trunc() == f).then_some(f as i64)
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Per-session monotonic id allocator starting at 1.
#[derive(Debug)]
pub struct RequestIds {
    next: i64,
}

impl RequestIds {
    /// Create an allocator whose first id is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next id.
    pub fn allocate(&mut self) -> RequestId {
        let id = self.next;
        self.next += 1;
        RequestId::Number(id)
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A classified inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A response to one of our requests.
    Response {
        /// Correlation id echoed by the module.
        id: RequestId,
        /// `Ok(result)` (or the whole message when `result` is absent or
        /// `null`), `Err(payload)` when `error` is present and non-null.
        outcome: std::result::Result<Value, Value>,
    },
    /// A message carrying `method` and no id.
    Notification {
        /// Notification method name.
        method: String,
    },
    /// A module-initiated request (carries both `method` and `id`).
    Request {
        /// Module-chosen id.
        id: Value,
        /// Requested method.
        method: String,
    },
    /// Valid JSON that is not a recognisable JSON-RPC message.
    Unrecognized,
}

/// Serialise a request as one `\n`-terminated compact JSON line.
///
/// # Errors
///
/// Returns `AppError::Transport` if serialisation fails.
pub fn encode_request(id: &RequestId, method: &str, params: &Value) -> Result<String> {
    let msg = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    });
    let mut line = serde_json::to_string(&msg)
        .map_err(|e| AppError::Transport(format!("failed to serialise {method} request: {e}")))?;
    line.push('\n');
    Ok(line)
}

/// Parse and classify one framed line.
///
/// # Errors
///
/// Returns the underlying [`serde_json::Error`] if the line is not JSON.
pub fn parse_inbound(line: &str) -> std::result::Result<InboundMessage, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    Ok(classify(value))
}

fn classify(value: Value) -> InboundMessage {
    let Some(obj) = value.as_object() else {
        return InboundMessage::Unrecognized;
    };

    let method = obj.get("method").and_then(Value::as_str).map(str::to_owned);
    let raw_id = obj.get("id").filter(|v| !v.is_null());

    match (method, raw_id) {
        (Some(method), Some(id)) => InboundMessage::Request {
            id: id.clone(),
            method,
        },
        (Some(method), None) => InboundMessage::Notification { method },
        (None, Some(id)) => {
            let Some(id) = RequestId::from_value(id) else {
                return InboundMessage::Unrecognized;
            };
            let outcome = match obj.get("error").filter(|e| !e.is_null()) {
                Some(error) => Err(error.clone()),
                None => match obj.get("result").filter(|r| !r.is_null()) {
                    Some(result) => Ok(result.clone()),
                    None => Ok(value.clone()),
                },
            };
            InboundMessage::Response { id, outcome }
        }
        (None, None) => InboundMessage::Unrecognized,
    }
}
