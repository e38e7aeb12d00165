use serde_json::json;

use super::*;
use crate::net::correlation::{CODE_DISCONNECTED, CODE_TIMEOUT};

fn dispatcher() -> Dispatcher<BoardState> {
    let mut dispatcher = Dispatcher::new();
    register_builtin(&mut dispatcher);
    dispatcher
}

/// Feed `frame` plus any synthetic frames it produced, like the session does.
fn run(state: &mut BoardState, dispatcher: &mut Dispatcher<BoardState>, frame: &Frame) {
    if prepare(state, frame) {
        dispatcher.dispatch(state, frame);
    }
    while let Some(next) = state.pop_synthetic() {
        if prepare(state, &next) {
            dispatcher.dispatch(state, &next);
        }
    }
}

fn joined(board_id: &str) -> BoardState {
    let mut state = BoardState::new(None);
    state.board_id = Some(board_id.to_owned());
    state.self_client_id = Some("me".to_owned());
    state
}

fn row(id: &str, x: f64) -> serde_json::Value {
    json!({ "id": id, "board_id": "b1", "kind": "rectangle", "x": x, "y": 0.0, "version": 1 })
}

fn seed(state: &mut BoardState, id: &str) {
    if let Some(obj) = BoardObject::from_payload(&row(id, 0.0)) {
        state.objects.upsert(obj);
    }
}

// =============================================================================
// session
// =============================================================================

#[test]
fn session_connected_records_client_and_rejoins() {
    let mut dispatcher = dispatcher();
    let mut state = BoardState::new(None);
    state.join_board("b1");
    state.take_outbox();

    let welcome = Frame::local("session:connected", FrameStatus::Request, json!({ "client_id": "c1" }));
    run(&mut state, &mut dispatcher, &welcome);

    assert_eq!(state.connection_status, ConnectionStatus::Connected);
    assert_eq!(state.self_client_id.as_deref(), Some("c1"));
    let outbox = state.take_outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].syscall, "board:join");
    assert_eq!(outbox[0].board_id.as_deref(), Some("b1"));
    assert_eq!(state.drain_events(), vec![SessionEvent::Connected { client_id: Some("c1".into()) }]);
}

#[test]
fn disconnect_rolls_back_pending_creates() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    let Some(temp_id) = state.create_object(json!({ "kind": "rectangle", "x": 1.0, "y": 2.0 })) else {
        panic!("create rejected");
    };
    assert!(state.objects.contains(&temp_id));

    let lost = Frame::local("session:disconnected", FrameStatus::Done, json!({}));
    run(&mut state, &mut dispatcher, &lost);

    assert!(!state.objects.contains(&temp_id));
    assert!(state.correlator.is_empty());
    assert_eq!(state.connection_status, ConnectionStatus::Disconnected);
    let events = state.drain_events();
    assert_eq!(events[0], SessionEvent::Disconnected);
    assert!(matches!(
        &events[1],
        SessionEvent::RequestFailed { syscall, code: Some(code), .. }
            if syscall == "object:create" && code == CODE_DISCONNECTED
    ));
}

#[test]
fn timeout_rolls_back_through_normal_path() {
    let mut dispatcher = dispatcher();
    let mut state = BoardState::new(Some(1000));
    state.board_id = Some("b1".into());
    let Some(temp_id) = state.create_object(json!({ "kind": "ellipse", "x": 0.0, "y": 0.0 })) else {
        panic!("create rejected");
    };
    let request = state.take_outbox().remove(0);

    state.expire(request.ts + 999);
    assert!(state.pop_synthetic().is_none());

    state.expire(request.ts + 1000);
    let tick = Frame::local("chat:noop", FrameStatus::Done, json!({}));
    run(&mut state, &mut dispatcher, &tick);

    assert!(!state.objects.contains(&temp_id));
    assert!(matches!(
        state.drain_events().as_slice(),
        [SessionEvent::RequestFailed { code: Some(code), .. }] if code == CODE_TIMEOUT
    ));
}

// =============================================================================
// board
// =============================================================================

#[test]
fn inline_join_snapshot_replaces_store_but_keeps_pending_creates() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    state.join_board("b1");
    seed(&mut state, "stale");
    let Some(temp_id) = state.create_object(json!({ "kind": "text", "x": 5.0, "y": 5.0 })) else {
        panic!("create rejected");
    };
    let join = state.take_outbox().remove(0);
    assert_eq!(join.syscall, "board:join");

    run(&mut state, &mut dispatcher, &join.done(json!({ "objects": [row("a", 1.0), row("b", 2.0)] })));

    assert!(state.objects.contains("a"));
    assert!(state.objects.contains("b"));
    assert!(state.objects.contains(&temp_id));
    assert!(!state.objects.contains("stale"));
    assert!(state.pending_join_id.is_none());
}

#[test]
fn streamed_join_snapshot_applies_on_done() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    state.join_board("b1");
    let join = state.take_outbox().remove(0);

    run(&mut state, &mut dispatcher, &join.item(row("a", 1.0)));
    run(&mut state, &mut dispatcher, &join.item(json!({ "id": "a2" })));
    assert!(state.objects.is_empty());

    run(&mut state, &mut dispatcher, &join.done(json!({})));
    assert_eq!(state.objects.len(), 1);
    assert!(state.objects.contains("a"));
}

#[test]
fn peer_join_and_part_track_presence() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");

    let join = Frame::local(
        "board:join",
        FrameStatus::Request,
        json!({ "client_id": "peer", "user_name": "Ann", "user_color": "#112233" }),
    );
    run(&mut state, &mut dispatcher, &join);
    let echo = Frame::local("board:join", FrameStatus::Request, json!({ "client_id": "me" }));
    run(&mut state, &mut dispatcher, &echo);

    assert_eq!(state.presence.len(), 1);
    let Some(peer) = state.presence.get("peer") else {
        panic!("peer missing");
    };
    assert_eq!(peer.name, "Ann");
    assert_eq!(peer.color, "#112233");

    let part = Frame::local("board:part", FrameStatus::Request, json!({ "client_id": "peer" }));
    run(&mut state, &mut dispatcher, &part);
    assert!(state.presence.is_empty());
}

#[test]
fn frames_for_other_boards_are_ignored() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    seed(&mut state, "a");

    let foreign = Frame::local("object:delete", FrameStatus::Done, json!({ "id": "a" })).with_board_id("b2");
    run(&mut state, &mut dispatcher, &foreign);
    assert!(state.objects.contains("a"));

    let local = Frame::local("object:delete", FrameStatus::Done, json!({ "id": "a" })).with_board_id("b1");
    run(&mut state, &mut dispatcher, &local);
    assert!(!state.objects.contains("a"));
}

#[test]
fn board_scoped_frames_need_a_joined_board() {
    let mut dispatcher = dispatcher();
    let mut state = BoardState::new(None);
    run(&mut state, &mut dispatcher, &Frame::local("object:create", FrameStatus::Done, row("p1", 0.0)));
    assert!(state.objects.is_empty());

    let moved = Frame::local("cursor:moved", FrameStatus::Request, json!({ "x": 1.0, "y": 1.0 })).with_from("peer");
    run(&mut state, &mut dispatcher, &moved);
    assert!(state.presence.is_empty());
}

#[test]
fn reply_for_a_left_board_resolves_its_request() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    state.delete_object("a");
    let request = state.take_outbox().remove(0);
    state.board_id = Some("b2".into());
    seed(&mut state, "a");

    run(&mut state, &mut dispatcher, &request.done(json!({ "id": "a" })));
    assert!(state.correlator.is_empty());
    assert!(state.objects.contains("a"));
}

// =============================================================================
// objects
// =============================================================================

#[test]
fn create_done_renames_temp_object() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    let Some(temp_id) = state.create_object(json!({ "kind": "rectangle", "x": 10.0, "y": 10.0 })) else {
        panic!("create rejected");
    };
    state.objects.select(&temp_id);
    let request = state.take_outbox().remove(0);
    assert_eq!(request.syscall, "object:create");
    assert_eq!(request.board_id.as_deref(), Some("b1"));

    let reply = request.done(json!({ "id": "srv-1", "kind": "rectangle", "x": 10.0, "y": 10.0, "version": 1 }));
    run(&mut state, &mut dispatcher, &reply);

    assert!(!state.objects.contains(&temp_id));
    let Some(obj) = state.objects.get("srv-1") else {
        panic!("confirmed object missing");
    };
    assert_eq!(obj.version, 1);
    assert_eq!(obj.board_id, "b1");
    assert!(state.objects.is_selected("srv-1"));
    assert_eq!(state.drain_events(), vec![SessionEvent::CreateConfirmed { temp_id, id: "srv-1".into() }]);
}

#[test]
fn create_error_and_cancel_roll_back() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    let Some(denied) = state.create_object(json!({ "kind": "rectangle", "x": 0.0, "y": 0.0 })) else {
        panic!("create rejected");
    };
    let Some(cancelled) = state.create_object(json!({ "kind": "rectangle", "x": 1.0, "y": 1.0 })) else {
        panic!("create rejected");
    };
    let outbox = state.take_outbox();

    run(&mut state, &mut dispatcher, &outbox[0].error("denied"));
    run(&mut state, &mut dispatcher, &outbox[1].reply(FrameStatus::Cancel, json!({})));

    assert!(!state.objects.contains(&denied));
    assert!(!state.objects.contains(&cancelled));
    let events = state.drain_events();
    assert!(matches!(&events[0], SessionEvent::RequestFailed { message, code: None, .. } if message == "denied"));
    assert!(matches!(&events[1], SessionEvent::RequestCancelled { syscall, .. } if syscall == "object:create"));
}

#[test]
fn create_without_object_row_rolls_back() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    let Some(temp_id) = state.create_object(json!({ "kind": "rectangle", "x": 0.0, "y": 0.0 })) else {
        panic!("create rejected");
    };
    let request = state.take_outbox().remove(0);

    run(&mut state, &mut dispatcher, &request.done(json!({ "ok": true })));
    assert!(!state.objects.contains(&temp_id));
    assert!(matches!(state.drain_events().as_slice(), [SessionEvent::RequestFailed { .. }]));
}

#[test]
fn create_needs_kind_and_position() {
    let mut state = joined("b1");
    assert!(state.create_object(json!({ "kind": "rectangle", "x": 0.0 })).is_none());
    assert!(state.take_outbox().is_empty());
    assert!(state.objects.is_empty());
}

#[test]
fn peer_broadcasts_mutate_store() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");

    run(&mut state, &mut dispatcher, &Frame::local("object:create", FrameStatus::Done, row("p1", 3.0)));
    assert!(state.objects.contains("p1"));

    let update = Frame::local("object:update", FrameStatus::Done, json!({ "id": "p1", "x": 50.0, "version": 2 }));
    run(&mut state, &mut dispatcher, &update);
    run(&mut state, &mut dispatcher, &update);
    let Some(obj) = state.objects.get("p1") else {
        panic!("object missing");
    };
    assert_eq!((obj.x, obj.version), (50.0, 2));

    run(&mut state, &mut dispatcher, &Frame::local("object:delete", FrameStatus::Done, json!({ "id": "p1" })));
    assert!(state.objects.is_empty());
}

#[test]
fn update_request_only_applies_on_done() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    seed(&mut state, "a");
    let patch = ObjectPatch { x: Some(99.0), ..ObjectPatch::default() };
    state.update_object("a", &patch);
    let request = state.take_outbox().remove(0);
    assert_eq!(request.data["x"], 99.0);
    assert_eq!(state.objects.get("a").map(|o| o.x), Some(0.0));

    run(&mut state, &mut dispatcher, &request.done(json!({ "id": "a", "x": 99.0 })));
    assert_eq!(state.objects.get("a").map(|o| o.x), Some(99.0));
}

#[test]
fn out_of_order_reply_is_dropped() {
    let mut state = joined("b1");
    state.delete_object("a");
    let request = state.take_outbox().remove(0);
    let bogus = request.reply(FrameStatus::Request, json!({}));
    assert!(!prepare(&mut state, &bogus));
    assert!(state.correlator.is_pending(&request.id));
}

// =============================================================================
// cursors
// =============================================================================

#[test]
fn cursor_frames_update_peer_presence() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");

    let moved = Frame::local(
        "cursor:moved",
        FrameStatus::Request,
        json!({ "client_id": "peer", "name": "Ann", "color": "#ff0000", "x": 5.0, "y": 7.0 }),
    );
    run(&mut state, &mut dispatcher, &moved);
    let Some(peer) = state.presence.get("peer") else {
        panic!("peer missing");
    };
    assert_eq!(peer.name, "Ann");
    assert_eq!(peer.cursor, Some(Point::new(5.0, 7.0)));

    let own = Frame::local("cursor:moved", FrameStatus::Request, json!({ "client_id": "me", "x": 1.0, "y": 1.0 }));
    run(&mut state, &mut dispatcher, &own);
    assert!(state.presence.get("me").is_none());

    let clear = Frame::local("cursor:clear", FrameStatus::Request, json!({})).with_from("peer");
    run(&mut state, &mut dispatcher, &clear);
    assert_eq!(state.presence.get("peer").and_then(|p| p.cursor), None);
    assert!(state.presence.get("peer").is_some());
}

// =============================================================================
// ai
// =============================================================================

#[test]
fn ai_item_reply_applies_mutations_in_order() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    let prompt_id = state.prompt_ai("add a box");
    let request = state.take_outbox().remove(0);
    assert_eq!(request.id, prompt_id);
    assert!(request.data["grid_context"].as_str().is_some_and(|g| g.contains("A1=(")));

    let mutations = "create:\n  - kind: \"rectangle\"\n    x: \"1\"\n    y: \"2\"\ndelete:\n  - id: \"old\"\n";
    run(&mut state, &mut dispatcher, &request.item(json!({ "text": "Added a box.", "mutations": mutations })));

    assert_eq!(state.drain_events(), vec![SessionEvent::AiReply { text: "Added a box.".into() }]);
    let sent = state.take_outbox();
    let syscalls = sent.iter().map(|f| f.syscall.as_str()).collect::<Vec<_>>();
    assert_eq!(syscalls, vec!["object:create", "object:delete"]);
    assert_eq!(state.objects.len(), 1);
    assert!(state.correlator.is_pending(&prompt_id));
}

#[test]
fn ai_malformed_mutations_apply_nothing() {
    let mut dispatcher = dispatcher();
    let mut state = joined("b1");
    state.prompt_ai("add a box");
    let request = state.take_outbox().remove(0);

    let mutations = "create:\n  - kind: \"rectangle\"\n    x: \"1\"\n    y: \"2\"\n  - x: \"1\"\n";
    run(&mut state, &mut dispatcher, &request.done(json!({ "mutations": mutations })));

    assert!(state.take_outbox().is_empty());
    assert!(state.objects.is_empty());
    assert!(matches!(state.drain_events().as_slice(), [SessionEvent::AiMutationsRejected { error }] if error.line == 5));
}
