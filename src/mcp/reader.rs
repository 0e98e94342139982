//! Module output handling.
//!
//! [`pump_stdout`] reads raw chunks from a module's stdout, frames them with
//! [`LineFramer`], and hands each line to [`dispatch_line`], which settles
//! the matching entry in the session's
//! [`CorrelationTable`](crate::mcp::pending::CorrelationTable). [`drain_stderr`]
//! logs the module's stderr and keeps a bounded tail for error reports.
//!
//! Nothing here is fatal to a session except the end of stdout: malformed
//! lines, framing errors, notifications and unmatched ids are logged and
//! skipped.

use std::sync::Mutex;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::mcp::codec::LineFramer;
use crate::mcp::pending::{lock_table, SharedTable};
use crate::mcp::wire::{parse_inbound, InboundMessage};
use crate::AppError;

/// Size of a single stdout/stderr read.
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Maximum number of stderr bytes retained for error reports.
pub const STDERR_TAIL_BYTES: usize = 2000;

/// What [`dispatch_line`] did with a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A pending request was completed with a result.
    Resolved,
    /// A pending request was completed with a protocol error.
    Rejected,
    /// A response arrived for an id that is not pending.
    Unmatched,
    /// A notification, module-initiated request, or non-RPC JSON value.
    Ignored,
    /// The line is not JSON.
    Malformed,
}

/// Parse `line` and route it to `table`.
pub fn dispatch_line(module: &str, line: &str, table: &SharedTable, debug_wire: bool) -> Dispatch {
    if debug_wire {
        debug!(module, line = line.trim(), "<- module");
    }

    let message = match parse_inbound(line) {
        Ok(message) => message,
        Err(err) => {
            warn!(module, error = %err, raw = line.trim(), "non-JSON line from module, skipping");
            return Dispatch::Malformed;
        }
    };

    match message {
        InboundMessage::Response { id, outcome } => {
            let mut table = lock_table(table);
            let (settled, dispatched) = match outcome {
                Ok(value) => (table.resolve(&id, value), Dispatch::Resolved),
                Err(payload) => (
                    table.reject(&id, AppError::Protocol(payload)),
                    Dispatch::Rejected,
                ),
            };
            if settled {
                dispatched
            } else {
                warn!(module, %id, "response for unknown request id, ignoring");
                Dispatch::Unmatched
            }
        }
        InboundMessage::Notification { method } => {
            debug!(module, method = method.as_str(), "module notification ignored");
            Dispatch::Ignored
        }
        InboundMessage::Request { id, method } => {
            debug!(module, method = method.as_str(), %id, "module-initiated request ignored");
            Dispatch::Ignored
        }
        InboundMessage::Unrecognized => {
            debug!(module, raw = line.trim(), "unrecognised JSON message ignored");
            Dispatch::Ignored
        }
    }
}

/// Read `stdout` to the end, dispatching every complete line.
///
/// When the stream ends (EOF or read error) the table is closed with
/// `AppError::Transport`, so any pending or later request fails at once
/// instead of waiting for the timer.
pub async fn pump_stdout<R>(module: &str, mut stdout: R, table: &SharedTable, debug_wire: bool)
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    let reason = loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break format!("module '{module}' closed its output before responding"),
            Ok(n) => n,
            Err(err) => break format!("failed to read from module '{module}': {err}"),
        };

        for frame in framer.feed(&chunk[..n]) {
            match frame {
                Ok(line) => {
                    dispatch_line(module, &line, table, debug_wire);
                }
                Err(err) => warn!(module, error = %err, "framing error on module stdout, skipping"),
            }
        }
    };

    if framer.buffered_len() > 0 {
        debug!(
            module,
            bytes = framer.buffered_len(),
            "discarding unterminated trailing output"
        );
    }

    let drained = lock_table(table).close(AppError::Transport(reason));
    debug!(module, drained, "module stdout ended");
}

/// Bounded tail of a module's stderr output.
#[derive(Debug, Default)]
pub struct StderrTail {
    buf: String,
}

impl StderrTail {
    /// Create an empty tail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text`, dropping the oldest content beyond
    /// [`STDERR_TAIL_BYTES`].
    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        if self.buf.len() > STDERR_TAIL_BYTES {
            let mut cut = self.buf.len() - STDERR_TAIL_BYTES;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    /// Retained text with surrounding whitespace removed.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.buf.trim()
    }
}

/// Read `stderr` to the end, logging each chunk and recording it in `tail`.
pub async fn drain_stderr<R>(module: &str, mut stderr: R, tail: &Mutex<StderrTail>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&chunk[..n]);
                warn!(module, stderr = text.trim_end(), "module stderr");
                tail.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(&text);
            }
            Err(err) => {
                debug!(module, error = %err, "failed to read module stderr");
                break;
            }
        }
    }
}
