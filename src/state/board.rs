//! Board-session state for the active board.
//!
//! SYSTEM CONTEXT
//! ==============
//! `BoardState` is the single owned container the frame handlers mutate. It
//! holds the local projection of one joined board (objects and peers), the
//! requests still awaiting the server, and three queues the session drains
//! after every dispatch: frames to send, synthetic frames to dispatch, and
//! events for the caller.

#[cfg(test)]
#[path = "board_test.rs"]
mod board_test;

use std::collections::VecDeque;

use serde_json::{Value, json};
use uuid::Uuid;

use crate::grammar::{Changes, GrammarError};
use crate::net::connection::ConnectionStatus;
use crate::net::correlation::{Correlation, Correlator};
use crate::net::syscall::Syscall;
use crate::net::types::{BoardObject, Frame, Point};
use crate::state::presence::PresenceTracker;
use crate::state::store::{ObjectPatch, ObjectStore};
use crate::state::viewport::ViewportGrid;

/// Prefix of ids assigned to optimistic creates before the server answers.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Something the caller may want to react to, drained after each dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The server finished the handshake.
    Connected { client_id: Option<String> },
    /// The channel was lost; pending requests were abandoned.
    Disconnected,
    /// An optimistic create was accepted and renamed to its server id.
    CreateConfirmed { temp_id: String, id: String },
    /// A request ended in `error` (server-sent or synthetic).
    RequestFailed { request_id: String, syscall: String, message: String, code: Option<String> },
    /// A request ended in `cancel`.
    RequestCancelled { request_id: String, syscall: String },
    /// Assistant text from an `ai:prompt` reply.
    AiReply { text: String },
    /// The assistant produced a changes document that did not parse.
    AiMutationsRejected { error: GrammarError },
}

/// Local identity attached to outbound cursor frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalUser {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Owned session state: which board is joined, connection status, objects,
/// presence, and outstanding requests.
#[derive(Debug)]
pub struct BoardState {
    /// Currently joined board.
    pub board_id: Option<String>,
    /// Client id the server assigned in `session:connected`.
    pub self_client_id: Option<String>,
    pub connection_status: ConnectionStatus,
    pub objects: ObjectStore,
    pub presence: PresenceTracker,
    pub correlator: Correlator,
    /// Viewport used to build grid context for AI prompts.
    pub viewport: ViewportGrid,
    pub user: LocalUser,
    /// Timeout for `ai:prompt` requests; `None` is unbounded.
    pub ai_timeout_ms: Option<i64>,
    /// Outbound `board:join` awaiting its snapshot.
    pub pending_join_id: Option<String>,
    join_buffer: Vec<BoardObject>,
    correlation: Correlation,
    outbox: Vec<Frame>,
    synthetic: VecDeque<Frame>,
    events: Vec<SessionEvent>,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BoardState {
    /// Empty state with the given default request timeout.
    #[must_use]
    pub fn new(request_timeout_ms: Option<i64>) -> Self {
        Self {
            board_id: None,
            self_client_id: None,
            connection_status: ConnectionStatus::Disconnected,
            objects: ObjectStore::new(),
            presence: PresenceTracker::new(),
            correlator: Correlator::new(request_timeout_ms),
            viewport: ViewportGrid::default(),
            user: LocalUser::default(),
            ai_timeout_ms: None,
            pending_join_id: None,
            join_buffer: Vec::new(),
            correlation: Correlation::Unsolicited,
            outbox: Vec::new(),
            synthetic: VecDeque::new(),
            events: Vec::new(),
        }
    }

    // =========================================================================
    // actions
    // =========================================================================

    /// Join `board_id`, discarding whatever was cached for the previous board.
    pub fn join_board(&mut self, board_id: &str) -> String {
        if self.board_id.as_deref().is_some_and(|current| current != board_id) {
            self.leave_board();
        }
        self.board_id = Some(board_id.to_owned());
        self.objects.clear();
        self.presence.clear();
        self.send_join()
    }

    /// Re-send `board:join` for the current board, e.g. after a reconnect.
    pub fn rejoin(&mut self) -> Option<String> {
        self.board_id.is_some().then(|| self.send_join())
    }

    fn send_join(&mut self) -> String {
        self.join_buffer.clear();
        let frame = self.board_frame(Frame::request(Syscall::BoardJoin.as_str(), json!({})));
        let id = frame.id.clone();
        self.pending_join_id = Some(id.clone());
        self.track_and_send(frame, None);
        id
    }

    /// Leave the current board and forget its objects and peers.
    pub fn leave_board(&mut self) {
        let Some(board_id) = self.board_id.take() else {
            return;
        };
        let frame = Frame::request(Syscall::BoardPart.as_str(), json!({})).with_board_id(board_id);
        self.outbox.push(frame);
        self.pending_join_id = None;
        self.join_buffer.clear();
        self.objects.clear();
        self.presence.clear();
    }

    /// Optimistically insert an object and request its creation.
    ///
    /// Returns the temporary id, or `None` if `payload` lacks `kind`, `x` or `y`.
    pub fn create_object(&mut self, payload: Value) -> Option<String> {
        let temp_id = format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4());
        let mut obj = ObjectPatch::from_payload(&payload).materialize(&temp_id)?;
        if let Some(board_id) = &self.board_id {
            obj.board_id.clone_from(board_id);
        }
        self.objects.upsert(obj);
        let frame = self.board_frame(Frame::request(Syscall::ObjectCreate.as_str(), payload));
        self.track_and_send(frame, Some(temp_id.clone()));
        Some(temp_id)
    }

    /// Request a field-wise update. Local state follows the server's `done`.
    pub fn update_object(&mut self, id: &str, patch: &ObjectPatch) -> String {
        let frame = self.board_frame(Frame::request(Syscall::ObjectUpdate.as_str(), patch.to_payload(id)));
        let request_id = frame.id.clone();
        self.track_and_send(frame, None);
        request_id
    }

    /// Request a delete. Local state follows the server's `done`.
    pub fn delete_object(&mut self, id: &str) -> String {
        let frame = self.board_frame(Frame::request(Syscall::ObjectDelete.as_str(), json!({ "id": id })));
        let request_id = frame.id.clone();
        self.track_and_send(frame, None);
        request_id
    }

    /// Broadcast the local cursor. Fire-and-forget.
    pub fn move_cursor(&mut self, at: Point) {
        let mut data = json!({ "x": at.x, "y": at.y });
        if let Some(name) = &self.user.name {
            data["name"] = Value::from(name.as_str());
        }
        if let Some(color) = &self.user.color {
            data["color"] = Value::from(color.as_str());
        }
        let frame = self.board_frame(Frame::request(Syscall::CursorMoved.as_str(), data));
        self.outbox.push(frame);
    }

    /// Tell peers the local cursor left the canvas.
    pub fn clear_cursor(&mut self) {
        let frame = self.board_frame(Frame::request(Syscall::CursorClear.as_str(), json!({})));
        self.outbox.push(frame);
    }

    /// Send a prompt with the current viewport's grid context attached.
    pub fn prompt_ai(&mut self, prompt: &str) -> String {
        let data = json!({ "prompt": prompt, "grid_context": self.viewport.build_grid_context() });
        let frame = self.board_frame(Frame::request(Syscall::AiPrompt.as_str(), data));
        let request_id = frame.id.clone();
        let timeout = self.ai_timeout_ms;
        self.correlator.track_with_timeout(&frame, None, timeout);
        self.outbox.push(frame);
        request_id
    }

    /// Issue every operation in `changes`: creates, then updates, then deletes.
    ///
    /// Returns how many requests were queued.
    pub fn apply_changes(&mut self, changes: &Changes) -> usize {
        let mut issued = 0;
        for op in &changes.create {
            if self.create_object(op.to_payload()).is_some() {
                issued += 1;
            }
        }
        for op in &changes.update {
            self.update_object(&op.id, &op.to_patch());
            issued += 1;
        }
        for op in &changes.delete {
            self.delete_object(&op.id);
            issued += 1;
        }
        issued
    }

    /// Queue synthetic timeout errors and hide idle cursors. `now_ms` is the
    /// local clock; cursor ages are judged on the extrapolated server clock.
    pub fn expire(&mut self, now_ms: i64) {
        let expired = self.correlator.expired(now_ms);
        self.synthetic.extend(expired);
        self.presence.expire_cursors_at_local(now_ms);
    }

    fn board_frame(&self, frame: Frame) -> Frame {
        match &self.board_id {
            Some(board_id) => frame.with_board_id(board_id.clone()),
            None => frame,
        }
    }

    fn track_and_send(&mut self, frame: Frame, temp_id: Option<String>) {
        self.correlator.track(&frame, temp_id);
        self.outbox.push(frame);
    }

    // =========================================================================
    // handler plumbing
    // =========================================================================

    /// How the frame being dispatched relates to an outbound request.
    #[must_use]
    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    pub(crate) fn set_correlation(&mut self, correlation: Correlation) {
        self.correlation = correlation;
    }

    /// True if `frame` answers the pending `board:join`.
    #[must_use]
    pub fn is_join_reply(&self, frame: &Frame) -> bool {
        frame.parent_id.is_some() && frame.parent_id == self.pending_join_id
    }

    pub(crate) fn buffer_join_item(&mut self, obj: BoardObject) {
        self.join_buffer.push(obj);
    }

    pub(crate) fn take_join_buffer(&mut self) -> Vec<BoardObject> {
        std::mem::take(&mut self.join_buffer)
    }

    pub(crate) fn push_synthetic(&mut self, frame: Frame) {
        self.synthetic.push_back(frame);
    }

    pub(crate) fn pop_synthetic(&mut self) -> Option<Frame> {
        self.synthetic.pop_front()
    }

    pub(crate) fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Frames waiting to be written to the transport.
    pub fn take_outbox(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.outbox)
    }

    /// Events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }
}
