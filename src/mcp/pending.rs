//! Correlation table for in-flight JSON-RPC requests.
//!
//! Maps each outstanding [`RequestId`] to the `oneshot` sender that
//! completes the caller's [`Completion`]. Settling an entry consumes its
//! sender, so an entry can be settled at most once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::mcp::wire::RequestId;
use crate::{AppError, Result};

/// Receiving half handed to the caller of [`CorrelationTable::register`].
pub type Completion = oneshot::Receiver<Result<Value>>;

/// Table shared between the output pump and the protocol driver of one
/// session. The lock is never held across an `.await`.
pub type SharedTable = Mutex<CorrelationTable>;

/// Lock a [`SharedTable`], recovering the guard if a holder panicked.
pub fn lock_table(table: &SharedTable) -> MutexGuard<'_, CorrelationTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Id-keyed table of pending completion handles for one session.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: HashMap<RequestId, oneshot::Sender<Result<Value>>>,
    /// Set once the session can no longer deliver responses.
    closed: Option<AppError>,
}

impl CorrelationTable {
    /// Create an empty, open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending entry for `id`.
    ///
    /// # Errors
    ///
    /// - `AppError::Transport("duplicate request id …")` if `id` is already
    ///   pending.
    /// - The error the table was closed with, if [`close`](Self::close) ran.
    pub fn register(&mut self, id: RequestId) -> Result<Completion> {
        if let Some(err) = &self.closed {
            return Err(err.clone());
        }
        if self.entries.contains_key(&id) {
            return Err(AppError::Transport(format!("duplicate request id {id}")));
        }
        let (tx, rx) = oneshot::channel();
        self.entries.insert(id, tx);
        Ok(rx)
    }

    /// Complete the entry for `id` successfully.
    ///
    /// Returns `false` when no entry is pending under `id`.
    pub fn resolve(&mut self, id: &RequestId, value: Value) -> bool {
        self.settle(id, Ok(value))
    }

    /// Complete the entry for `id` with `error`.
    ///
    /// Returns `false` when no entry is pending under `id`.
    pub fn reject(&mut self, id: &RequestId, error: AppError) -> bool {
        self.settle(id, Err(error))
    }

    /// Remove the entry for `id` without settling it.
    pub fn cancel(&mut self, id: &RequestId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Reject every pending entry with a clone of `error`.
    ///
    /// Returns the number of entries rejected.
    pub fn drain_all(&mut self, error: &AppError) -> usize {
        let drained = self.entries.len();
        for (_, tx) in self.entries.drain() {
            // A dropped receiver means the caller already gave up.
            let _ = tx.send(Err(error.clone()));
        }
        drained
    }

    /// Drain all entries and refuse further registrations with `error`.
    ///
    /// Only the first close is recorded; later calls still drain.
    pub fn close(&mut self, error: AppError) -> usize {
        let drained = self.drain_all(&error);
        if self.closed.is_none() {
            self.closed = Some(error);
        }
        drained
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Whether `id` is currently pending.
    #[must_use]
    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn settle(&mut self, id: &RequestId, outcome: Result<Value>) -> bool {
        match self.entries.remove(id) {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}
