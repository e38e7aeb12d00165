//! Request/response correlation for outbound requests.
//!
//! Every request that expects a terminal frame is tracked by id until its
//! `done`, `error`, or `cancel` arrives (or a synthetic one is produced on
//! timeout or disconnect). Optimistic creates additionally carry the
//! temporary object id inserted into the store, so the confirming frame can
//! rename it in place.

#[cfg(test)]
#[path = "correlation_test.rs"]
mod correlation_test;

use std::collections::HashMap;

use frames::{Exchange, TransitionError};
use serde_json::json;

use super::syscall::Syscall;
use super::types::{Frame, FrameStatus};

/// Error code on synthetic errors for requests that never got an answer.
pub const CODE_TIMEOUT: &str = "E_TIMEOUT";
/// Error code on synthetic errors for requests abandoned by a disconnect.
pub const CODE_DISCONNECTED: &str = "E_DISCONNECTED";

/// Lifecycle of one optimistic mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationState {
    /// Applied locally, awaiting the authority.
    Optimistic,
    /// The authority accepted it; local state now mirrors the server row.
    Confirmed,
    /// The authority rejected it (or never answered); local effect undone.
    RolledBack,
}

impl MutationState {
    /// Resolve with a terminal status. `done` confirms; anything else rolls back.
    #[must_use]
    pub fn resolve(self, status: FrameStatus) -> Self {
        match (self, status) {
            (Self::Optimistic, FrameStatus::Done) => Self::Confirmed,
            (Self::Optimistic, FrameStatus::Error | FrameStatus::Cancel) => Self::RolledBack,
            (state, _) => state,
        }
    }
}

/// An outbound request awaiting its terminal frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingRequest {
    pub request_id: String,
    /// Issue order, used to resolve synthetic failures deterministically.
    pub seq: u64,
    pub syscall: Syscall,
    /// Temporary store id for optimistic creates.
    pub temp_id: Option<String>,
    pub state: MutationState,
    pub exchange: Exchange,
    /// Wall-clock deadline in ms; `None` means unbounded.
    pub deadline_ms: Option<i64>,
}

/// What a response frame meant for its request.
#[derive(Clone, Debug, PartialEq)]
pub enum Correlation {
    /// No pending request has this parent id: treat as a broadcast.
    Unsolicited,
    /// Non-terminal item; the request stays pending.
    Item(PendingRequest),
    /// Terminal frame; the request is no longer pending.
    Finished(PendingRequest),
    /// The frame broke the exchange's status order and was ignored.
    Invalid(TransitionError),
}

/// Map of outstanding requests keyed by request id.
#[derive(Clone, Debug, Default)]
pub struct Correlator {
    pending: HashMap<String, PendingRequest>,
    timeout_ms: Option<i64>,
    next_seq: u64,
}

impl Correlator {
    /// Create a correlator whose requests time out after `timeout_ms` (if set).
    #[must_use]
    pub fn new(timeout_ms: Option<i64>) -> Self {
        Self { pending: HashMap::new(), timeout_ms, next_seq: 0 }
    }

    /// Start tracking `request` under the default timeout. `temp_id` marks an
    /// optimistic create.
    pub fn track(&mut self, request: &Frame, temp_id: Option<String>) {
        self.track_with_timeout(request, temp_id, self.timeout_ms);
    }

    /// Start tracking `request` with its own timeout (`None` = unbounded).
    pub fn track_with_timeout(&mut self, request: &Frame, temp_id: Option<String>, timeout_ms: Option<i64>) {
        let deadline_ms = timeout_ms.map(|t| request.ts.saturating_add(t));
        self.next_seq += 1;
        self.pending.insert(
            request.id.clone(),
            PendingRequest {
                request_id: request.id.clone(),
                seq: self.next_seq,
                syscall: Syscall::parse(&request.syscall),
                temp_id,
                state: MutationState::Optimistic,
                exchange: Exchange::new(),
                deadline_ms,
            },
        );
    }

    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<&PendingRequest> {
        self.pending.get(request_id)
    }

    #[must_use]
    pub fn is_pending(&self, request_id: &str) -> bool {
        self.pending.contains_key(request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True if any pending request is for `syscall`.
    #[must_use]
    pub fn has_pending(&self, syscall: &Syscall) -> bool {
        self.pending.values().any(|p| &p.syscall == syscall)
    }

    /// True if `temp_id` belongs to an unresolved optimistic create.
    #[must_use]
    pub fn is_pending_temp(&self, temp_id: &str) -> bool {
        self.pending
            .values()
            .any(|p| p.temp_id.as_deref() == Some(temp_id))
    }

    /// Feed a response frame through its request's exchange.
    pub fn correlate(&mut self, frame: &Frame) -> Correlation {
        let Some(parent_id) = frame.parent_id.as_deref() else {
            return Correlation::Unsolicited;
        };
        let Some(pending) = self.pending.get_mut(parent_id) else {
            return Correlation::Unsolicited;
        };
        if let Err(err) = pending.exchange.advance(frame.status) {
            return Correlation::Invalid(err);
        }
        if !frame.status.is_terminal() {
            return Correlation::Item(pending.clone());
        }
        match self.pending.remove(parent_id) {
            Some(mut finished) => {
                finished.state = finished.state.resolve(frame.status);
                Correlation::Finished(finished)
            }
            None => Correlation::Unsolicited,
        }
    }

    /// Synthetic error frames for every request past its deadline.
    ///
    /// The requests stay tracked; dispatching the returned frames resolves them.
    #[must_use]
    pub fn expired(&self, now_ms: i64) -> Vec<Frame> {
        let mut expired = self
            .pending
            .values()
            .filter(|p| p.deadline_ms.is_some_and(|d| now_ms >= d))
            .collect::<Vec<_>>();
        expired.sort_by_key(|p| p.seq);
        expired
            .into_iter()
            .map(|p| synthetic_error(p, CODE_TIMEOUT, "request timed out"))
            .collect()
    }

    /// Synthetic error frames abandoning every pending request.
    #[must_use]
    pub fn abandon_all(&self) -> Vec<Frame> {
        let mut pending = self.pending.values().collect::<Vec<_>>();
        pending.sort_by_key(|p| p.seq);
        pending
            .into_iter()
            .map(|p| synthetic_error(p, CODE_DISCONNECTED, "connection lost before the server answered"))
            .collect()
    }

    /// Forget every pending request without resolving it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn synthetic_error(pending: &PendingRequest, code: &str, message: &str) -> Frame {
    let mut frame = Frame::local(
        pending.syscall.as_str(),
        FrameStatus::Error,
        json!({ "message": message, "code": code, "synthetic": true }),
    );
    frame.parent_id = Some(pending.request_id.clone());
    frame
}
