//! Built-in frame handlers that keep `BoardState` in sync with the server.
//!
//! Every inbound frame first passes through [`prepare`], which correlates it
//! with its request, drops frames for other boards, and resolves failed
//! requests. Syscall handlers registered by [`register_builtin`] then apply
//! the frame's effect to the object store and presence tracker.

#[cfg(test)]
#[path = "handlers_test.rs"]
mod handlers_test;

use serde_json::Value;
use tracing::{debug, warn};

use super::connection::ConnectionStatus;
use super::correlation::{Correlation, MutationState, PendingRequest};
use super::dispatch::Dispatcher;
use super::syscall::Syscall;
use super::types::{BoardObject, Frame, FrameStatus, Point};
use crate::grammar::parse_changes;
use crate::state::board::{BoardState, SessionEvent};
use crate::state::store::ObjectPatch;

/// Register the handlers that maintain local state. Call before any caller
/// handlers so those observe the updated state.
pub fn register_builtin(dispatcher: &mut Dispatcher<BoardState>) {
    dispatcher.subscribe(Syscall::SessionConnected, on_session_connected);
    dispatcher.subscribe(Syscall::SessionDisconnected, on_session_disconnected);
    dispatcher.subscribe(Syscall::BoardJoin, on_board_join);
    dispatcher.subscribe(Syscall::BoardPart, on_board_part);
    dispatcher.subscribe(Syscall::ObjectCreate, on_object_create);
    dispatcher.subscribe(Syscall::ObjectUpdate, on_object_update);
    dispatcher.subscribe(Syscall::ObjectDelete, on_object_delete);
    dispatcher.subscribe(Syscall::CursorMoved, on_cursor_moved);
    dispatcher.subscribe(Syscall::CursorClear, on_cursor_clear);
    dispatcher.subscribe(Syscall::AiPrompt, on_ai_prompt);
}

/// Correlate `frame` and resolve failed requests. Returns `false` when the
/// frame must not reach the syscall handlers.
///
/// Correlation runs before board scoping, so a late reply for a board that
/// was left still resolves its request. Its effect is then discarded.
pub fn prepare(state: &mut BoardState, frame: &Frame) -> bool {
    let correlation = state.correlator.correlate(frame);
    match &correlation {
        Correlation::Invalid(err) => {
            warn!(syscall = %frame.syscall, parent_id = ?frame.parent_id, %err, "out-of-order reply; dropping");
            return false;
        }
        Correlation::Finished(pending) if frame.status == FrameStatus::Error => fail(state, pending, frame),
        Correlation::Finished(pending) if frame.status == FrameStatus::Cancel => cancel(state, pending),
        _ => {}
    }

    if Syscall::parse(&frame.syscall).is_board_scoped() && !on_current_board(state, frame) {
        debug!(syscall = %frame.syscall, board_id = ?frame.board_id, "frame outside the joined board; dropping");
        if let Correlation::Finished(pending) = &correlation
            && let Some(temp_id) = &pending.temp_id
        {
            state.objects.remove(temp_id);
        }
        return false;
    }
    state.set_correlation(correlation);
    true
}

/// True if a board is joined and `frame` is not addressed to another one.
fn on_current_board(state: &BoardState, frame: &Frame) -> bool {
    match (frame.board_id.as_deref(), state.board_id.as_deref()) {
        (_, None) => false,
        (Some(frame_board), Some(joined)) => frame_board == joined,
        (None, Some(_)) => true,
    }
}

fn fail(state: &mut BoardState, pending: &PendingRequest, frame: &Frame) {
    rollback(state, pending);
    if state.pending_join_id.as_deref() == Some(pending.request_id.as_str()) {
        state.pending_join_id = None;
        state.take_join_buffer();
    }
    let message = frame.error_message().unwrap_or("request failed").to_owned();
    let code = frame.data.get("code").and_then(Value::as_str).map(str::to_owned);
    warn!(syscall = %frame.syscall, request_id = %pending.request_id, %message, code = ?code, "request failed");
    state.emit(SessionEvent::RequestFailed {
        request_id: pending.request_id.clone(),
        syscall: frame.syscall.clone(),
        message,
        code,
    });
}

fn cancel(state: &mut BoardState, pending: &PendingRequest) {
    rollback(state, pending);
    state.emit(SessionEvent::RequestCancelled {
        request_id: pending.request_id.clone(),
        syscall: pending.syscall.as_str().to_owned(),
    });
}

fn rollback(state: &mut BoardState, pending: &PendingRequest) {
    if pending.state != MutationState::RolledBack {
        return;
    }
    if let Some(temp_id) = &pending.temp_id {
        state.objects.remove(temp_id);
    }
}

// =============================================================================
// session
// =============================================================================

fn on_session_connected(state: &mut BoardState, frame: &Frame) {
    state.connection_status = ConnectionStatus::Connected;
    let client_id = str_field(&frame.data, "client_id").map(str::to_owned);
    state.self_client_id.clone_from(&client_id);
    state.emit(SessionEvent::Connected { client_id });
    state.rejoin();
}

fn on_session_disconnected(state: &mut BoardState, _frame: &Frame) {
    for abandoned in state.correlator.abandon_all() {
        state.push_synthetic(abandoned);
    }
    state.connection_status = ConnectionStatus::Disconnected;
    state.presence.clear();
    state.emit(SessionEvent::Disconnected);
}

// =============================================================================
// board
// =============================================================================

fn on_board_join(state: &mut BoardState, frame: &Frame) {
    match state.correlation().clone() {
        Correlation::Item(_) if state.is_join_reply(frame) => {
            if let Some(obj) = BoardObject::from_payload(&frame.data) {
                let obj = on_joined_board(state, obj);
                state.buffer_join_item(obj);
            }
        }
        Correlation::Finished(_) if state.is_join_reply(frame) => {
            state.pending_join_id = None;
            let mut snapshot = state.take_join_buffer();
            if frame.status != FrameStatus::Done {
                return;
            }
            if let Some(rows) = frame.data.get("objects").and_then(Value::as_array) {
                snapshot.extend(rows.iter().filter_map(BoardObject::from_payload));
            }
            let snapshot: Vec<_> = snapshot.into_iter().map(|obj| on_joined_board(state, obj)).collect();
            let correlator = &state.correlator;
            state.objects.replace_all(snapshot, |id| correlator.is_pending_temp(id));
        }
        Correlation::Unsolicited => {
            if frame.data.get("objects").is_some() {
                return;
            }
            let Some(client_id) = str_field(&frame.data, "client_id") else {
                return;
            };
            if is_self(state, client_id) {
                return;
            }
            let name = pick_str(&frame.data, &["user_name", "name"]);
            let color = pick_str(&frame.data, &["user_color", "color"]);
            state.presence.join_placeholder(client_id, name, color);
        }
        _ => {}
    }
}

fn on_board_part(state: &mut BoardState, frame: &Frame) {
    if !matches!(state.correlation(), Correlation::Unsolicited) {
        return;
    }
    if let Some(client_id) = str_field(&frame.data, "client_id")
        && !is_self(state, client_id)
    {
        state.presence.remove(client_id);
    }
}

// =============================================================================
// objects
// =============================================================================

fn on_object_create(state: &mut BoardState, frame: &Frame) {
    if frame.status != FrameStatus::Done {
        return;
    }
    let pending = match state.correlation() {
        Correlation::Finished(pending) => Some(pending.clone()),
        Correlation::Unsolicited => None,
        _ => return,
    };
    let confirmed = BoardObject::from_payload(&frame.data).map(|obj| on_joined_board(state, obj));

    let Some(temp_id) = pending.and_then(|p| p.temp_id) else {
        if let Some(obj) = confirmed {
            state.objects.upsert(obj);
        }
        return;
    };

    match confirmed {
        Some(obj) => {
            let id = obj.id.clone();
            state.objects.rename_id(&temp_id, &id);
            state.objects.upsert(obj);
            state.emit(SessionEvent::CreateConfirmed { temp_id, id });
        }
        None => {
            warn!(%temp_id, "create confirmed without an object row; rolling back");
            state.objects.remove(&temp_id);
            state.emit(SessionEvent::RequestFailed {
                request_id: frame.parent_id.clone().unwrap_or_default(),
                syscall: frame.syscall.clone(),
                message: "server reply carried no object".to_owned(),
                code: None,
            });
        }
    }
}

fn on_object_update(state: &mut BoardState, frame: &Frame) {
    if frame.status != FrameStatus::Done {
        return;
    }
    if let Some(id) = str_field(&frame.data, "id") {
        state.objects.update(id, &ObjectPatch::from_payload(&frame.data));
    }
}

fn on_object_delete(state: &mut BoardState, frame: &Frame) {
    if frame.status != FrameStatus::Done {
        return;
    }
    if let Some(id) = str_field(&frame.data, "id") {
        state.objects.remove(id);
    }
}

// =============================================================================
// cursors
// =============================================================================

fn on_cursor_moved(state: &mut BoardState, frame: &Frame) {
    let Some(peer) = peer_id(frame) else {
        return;
    };
    if is_self(state, peer) {
        return;
    }
    let data = &frame.data;
    let cursor = match (num_field(data, "x"), num_field(data, "y")) {
        (Some(x), Some(y)) => Some(Point::new(x, y)),
        _ => None,
    };
    let name = pick_str(data, &["name", "user_name"]);
    let color = pick_str(data, &["color", "user_color"]);
    state.presence.apply_cursor(peer, name, color, cursor, frame.ts);
}

fn on_cursor_clear(state: &mut BoardState, frame: &Frame) {
    if let Some(peer) = peer_id(frame)
        && !is_self(state, peer)
    {
        state.presence.clear_cursor(peer);
    }
}

// =============================================================================
// ai
// =============================================================================

fn on_ai_prompt(state: &mut BoardState, frame: &Frame) {
    if !matches!(frame.status, FrameStatus::Item | FrameStatus::Done) {
        return;
    }
    if !matches!(state.correlation(), Correlation::Item(_) | Correlation::Finished(_)) {
        return;
    }
    if let Some(text) = str_field(&frame.data, "text").filter(|t| !t.trim().is_empty()) {
        state.emit(SessionEvent::AiReply { text: text.to_owned() });
    }
    let Some(document) = str_field(&frame.data, "mutations").filter(|m| !m.trim().is_empty()) else {
        return;
    };
    match parse_changes(document) {
        Ok(changes) => {
            let issued = state.apply_changes(&changes);
            debug!(issued, "applied assistant mutations");
        }
        Err(error) => {
            warn!(%error, "assistant mutations rejected");
            state.emit(SessionEvent::AiMutationsRejected { error });
        }
    }
}

// =============================================================================
// helpers
// =============================================================================

/// Rows without a board id belong to the joined board.
fn on_joined_board(state: &BoardState, mut obj: BoardObject) -> BoardObject {
    if obj.board_id.is_empty()
        && let Some(board_id) = &state.board_id
    {
        obj.board_id.clone_from(board_id);
    }
    obj
}

fn is_self(state: &BoardState, client_id: &str) -> bool {
    state.self_client_id.as_deref() == Some(client_id)
}

fn peer_id(frame: &Frame) -> Option<&str> {
    str_field(&frame.data, "client_id").or(frame.from.as_deref())
}

fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn num_field(data: &Value, key: &str) -> Option<f64> {
    data.get(key).and_then(Value::as_f64)
}

fn pick_str<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| str_field(data, key))
}
