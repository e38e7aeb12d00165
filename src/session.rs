//! The sync session: owned board state, the dispatch table, and an outbound sink.
//!
//! Everything that mutates the local projection goes through a
//! [`SyncSession`]: inbound frames via [`SyncSession::dispatch`] and local
//! edits via the action methods. Each call runs to completion, then flushes
//! the frames it produced to the sink, so reads afterwards always reflect the
//! most recently dispatched frame.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use frames::now_ms;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::grammar::{Changes, GrammarError, Snapshot, parse_changes};
use crate::net::connection::ConnectionStatus;
use crate::net::dispatch::{Dispatcher, HandlerId};
use crate::net::handlers::{prepare, register_builtin};
use crate::net::syscall::Syscall;
use crate::net::transport::FrameSink;
use crate::net::types::{Frame, FrameStatus, Point};
use crate::state::board::{BoardState, SessionEvent};
use crate::state::presence::PresenceTracker;
use crate::state::store::{ObjectPatch, ObjectStore};
use crate::state::viewport::ViewportGrid;

/// Error code on synthetic errors for requests the sink refused.
pub const CODE_SEND_FAILED: &str = "E_SEND";

/// Owned session over an outbound [`FrameSink`].
pub struct SyncSession<S> {
    state: BoardState,
    dispatcher: Dispatcher<BoardState>,
    sink: S,
}

impl<S: FrameSink> SyncSession<S> {
    #[must_use]
    pub fn new(sink: S, config: &SessionConfig) -> Self {
        let mut state = BoardState::new(config.request_timeout_ms);
        state.ai_timeout_ms = config.ai_timeout_ms;
        state.user = config.user.clone();
        let mut dispatcher = Dispatcher::new();
        register_builtin(&mut dispatcher);
        Self { state, dispatcher, sink }
    }

    // =========================================================================
    // reads
    // =========================================================================

    #[must_use]
    pub fn state(&self) -> &BoardState {
        &self.state
    }

    #[must_use]
    pub fn objects(&self) -> &ObjectStore {
        &self.state.objects
    }

    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.state.presence
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.connection_status
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Snapshot document of the cached objects, ordered by z then id.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_objects(self.state.objects.sorted())
    }

    /// Events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.state.drain_events()
    }

    // =========================================================================
    // handlers
    // =========================================================================

    /// Register a caller handler. It runs after the built-in state update.
    pub fn subscribe<F>(&mut self, syscall: impl Into<Syscall>, handler: F) -> HandlerId
    where
        F: FnMut(&mut BoardState, &Frame) + Send + 'static,
    {
        self.dispatcher.subscribe(syscall, handler)
    }

    pub fn unsubscribe(&mut self, syscall: impl Into<Syscall>, id: HandlerId) -> bool {
        self.dispatcher.unsubscribe(syscall, id)
    }

    /// Process one inbound frame, then anything it caused.
    pub fn dispatch(&mut self, frame: &Frame) {
        let syscall = Syscall::parse(&frame.syscall);
        if syscall.is_board_scoped() || syscall == Syscall::BoardJoin {
            self.state.presence.observe_server_time(frame.ts, now_ms());
        }
        self.route(frame);
        self.settle();
    }

    fn route(&mut self, frame: &Frame) {
        if !prepare(&mut self.state, frame) {
            return;
        }
        if !self.dispatcher.dispatch(&mut self.state, frame) {
            debug!(syscall = %frame.syscall, status = frame.status.as_str(), "no handler for syscall; dropping");
        }
    }

    /// Drain synthetic frames and the outbox until both are empty.
    fn settle(&mut self) {
        loop {
            while let Some(frame) = self.state.pop_synthetic() {
                self.route(&frame);
            }
            let outbox = self.state.take_outbox();
            if outbox.is_empty() {
                return;
            }
            for frame in outbox {
                let request_id = frame.id.clone();
                let syscall = frame.syscall.clone();
                if let Err(err) = self.sink.send_frame(frame) {
                    warn!(%syscall, %request_id, error = %err, "send failed");
                    if self.state.correlator.is_pending(&request_id) {
                        let data = json!({ "message": err.to_string(), "code": CODE_SEND_FAILED, "synthetic": true });
                        let mut failed = Frame::local(syscall, FrameStatus::Error, data);
                        failed.parent_id = Some(request_id);
                        self.state.push_synthetic(failed);
                    }
                }
            }
        }
    }

    // =========================================================================
    // actions
    // =========================================================================

    /// Join `board_id`. Returns the `board:join` request id.
    pub fn join_board(&mut self, board_id: &str) -> String {
        let id = self.state.join_board(board_id);
        self.settle();
        id
    }

    pub fn leave_board(&mut self) {
        self.state.leave_board();
        self.settle();
    }

    /// Optimistic create. Returns the temporary id, or `None` if `payload`
    /// lacks `kind`, `x` or `y`.
    pub fn create_object(&mut self, payload: Value) -> Option<String> {
        let temp_id = self.state.create_object(payload);
        self.settle();
        temp_id
    }

    pub fn update_object(&mut self, id: &str, patch: &ObjectPatch) -> String {
        let request_id = self.state.update_object(id, patch);
        self.settle();
        request_id
    }

    pub fn delete_object(&mut self, id: &str) -> String {
        let request_id = self.state.delete_object(id);
        self.settle();
        request_id
    }

    pub fn move_cursor(&mut self, at: Point) {
        self.state.move_cursor(at);
        self.settle();
    }

    pub fn clear_cursor(&mut self) {
        self.state.clear_cursor();
        self.settle();
    }

    /// Replace the viewport used for grid context.
    pub fn set_viewport(&mut self, viewport: ViewportGrid) {
        self.state.viewport = viewport;
    }

    pub fn prompt_ai(&mut self, prompt: &str) -> String {
        let request_id = self.state.prompt_ai(prompt);
        self.settle();
        request_id
    }

    /// Issue a parsed changes document: creates, then updates, then deletes.
    pub fn apply_changes(&mut self, changes: &Changes) -> usize {
        let issued = self.state.apply_changes(changes);
        self.settle();
        issued
    }

    /// Parse and issue a changes document. Nothing is sent if parsing fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`GrammarError`] in `document`.
    pub fn apply_changes_text(&mut self, document: &str) -> Result<usize, GrammarError> {
        let changes = parse_changes(document)?;
        Ok(self.apply_changes(&changes))
    }

    /// Fail requests past their deadline and hide idle cursors.
    pub fn expire_requests(&mut self, now_ms: i64) {
        self.state.expire(now_ms);
        self.settle();
    }
}
