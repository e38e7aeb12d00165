use super::*;

fn sample_frame() -> Frame {
    Frame {
        id: "id-1".to_owned(),
        parent_id: Some("parent-1".to_owned()),
        ts: 42,
        board_id: Some("board-1".to_owned()),
        from: Some("client-1".to_owned()),
        syscall: "object:update".to_owned(),
        status: Status::Done,
        data: serde_json::json!({
            "x": 1.25,
            "ok": true,
            "tags": ["a", "b"],
            "nested": {"k": "v"},
            "nil": null
        }),
    }
}

// =============================================================
// Status
// =============================================================

#[test]
fn status_numeric_mapping_matches_wire_enum() {
    assert_eq!(Status::Request.as_i32(), 0);
    assert_eq!(Status::Done.as_i32(), 1);
    assert_eq!(Status::Error.as_i32(), 2);
    assert_eq!(Status::Cancel.as_i32(), 3);
    assert_eq!(Status::Item.as_i32(), 4);
}

#[test]
fn status_from_wire_rejects_out_of_range_value() {
    let err = Status::from_i32(5).expect_err("bulk is not part of this protocol");
    assert!(matches!(err, CodecError::InvalidStatus(5)));
}

#[test]
fn terminal_statuses() {
    assert!(!Status::Request.is_terminal());
    assert!(!Status::Item.is_terminal());
    assert!(Status::Done.is_terminal());
    assert!(Status::Error.is_terminal());
    assert!(Status::Cancel.is_terminal());
}

#[test]
fn status_serializes_as_lowercase_json() {
    assert_eq!(serde_json::to_string(&Status::Cancel).expect("serialize"), "\"cancel\"");
    assert_eq!(Status::Item.as_str(), "item");
}

#[test]
fn status_rejects_non_lowercase_json() {
    assert!(serde_json::from_str::<Status>("\"Error\"").is_err());
}

// =============================================================
// Exchange
// =============================================================

#[test]
fn exchange_accepts_items_then_one_terminal() {
    let mut ex = Exchange::new();
    ex.advance(Status::Item).expect("item");
    ex.advance(Status::Item).expect("item");
    ex.advance(Status::Done).expect("done");
    assert_eq!(ex.items(), 2);
    assert!(ex.is_finished());
}

#[test]
fn exchange_rejects_anything_after_terminal() {
    let mut ex = Exchange::new();
    ex.advance(Status::Cancel).expect("cancel");
    let err = ex.advance(Status::Item).expect_err("item after cancel");
    assert_eq!(err, TransitionError { from: Status::Cancel, to: Status::Item });
    assert!(ex.advance(Status::Done).is_err());
    assert_eq!(ex.current(), Status::Cancel);
}

#[test]
fn exchange_rejects_second_request() {
    let mut ex = Exchange::new();
    assert!(ex.advance(Status::Request).is_err());
    ex.advance(Status::Item).expect("item");
    assert!(ex.advance(Status::Request).is_err());
    assert_eq!(ex.current(), Status::Item);
}

// =============================================================
// Constructors
// =============================================================

#[test]
fn request_frames_get_fresh_ids() {
    let a = Frame::request("board:join", serde_json::json!({}));
    let b = Frame::request("board:join", serde_json::json!({}));
    assert_ne!(a.id, b.id);
    assert!(a.parent_id.is_none());
    assert_eq!(a.status, Status::Request);
    assert!(a.ts > 0);
}

#[test]
fn reply_links_back_to_request() {
    let req = Frame::request("object:create", serde_json::json!({})).with_board_id("b1");
    let done = req.done(serde_json::json!({"id": "srv-1"}));
    assert_eq!(done.parent_id.as_deref(), Some(req.id.as_str()));
    assert_eq!(done.syscall, "object:create");
    assert_eq!(done.board_id.as_deref(), Some("b1"));
    assert_ne!(done.id, req.id);

    let err = req.error("nope");
    assert_eq!(err.status, Status::Error);
    assert_eq!(err.error_message(), Some("nope"));
}

// =============================================================
// Codecs
// =============================================================

#[test]
fn encode_decode_round_trip_preserves_frame() {
    let frame = sample_frame();
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode should succeed");
    assert_eq!(decoded, frame);
}

#[test]
fn decode_frame_rejects_malformed_bytes() {
    let err = decode_frame(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn decode_frame_rejects_invalid_wire_status() {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        parent_id: None,
        ts: 1,
        board_id: None,
        from: None,
        syscall: "board:join".to_owned(),
        status: 77,
        data: Some(json_to_proto_value(&serde_json::json!({}))),
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let err = decode_frame(&bytes).expect_err("status should fail");
    assert!(matches!(err, CodecError::InvalidStatus(77)));
}

#[test]
fn decode_frame_defaults_missing_data_to_empty_object() {
    let wire = WireFrame {
        id: "id-1".to_owned(),
        parent_id: None,
        ts: 1,
        board_id: None,
        from: None,
        syscall: "board:join".to_owned(),
        status: Status::Request.as_i32(),
        data: None,
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let frame = decode_frame(&bytes).expect("decode");
    assert_eq!(frame.data, serde_json::json!({}));
}

#[test]
fn integer_json_numbers_are_normalized_to_float_numbers() {
    let mut frame = sample_frame();
    frame.data = serde_json::json!({"version": 2});
    let decoded = decode_frame(&encode_frame(&frame)).expect("decode");
    assert_eq!(decoded.data.get("version"), Some(&serde_json::json!(2.0)));
}

#[test]
fn json_codec_round_trips() {
    let frame = sample_frame();
    let text = encode_json(&frame).expect("encode");
    assert!(text.contains("\"status\":\"done\""));
    assert_eq!(decode_json(&text).expect("decode"), frame);
}

#[test]
fn json_decode_fills_optional_envelope_fields() {
    let frame = decode_json(r#"{"id":"f1","syscall":"board:part","status":"done"}"#).expect("decode");
    assert!(frame.parent_id.is_none());
    assert!(frame.board_id.is_none());
    assert_eq!(frame.ts, 0);
    assert_eq!(frame.data, serde_json::json!({}));
}

#[test]
fn json_decode_rejects_unknown_status() {
    let err = decode_json(r#"{"id":"f1","syscall":"x","status":"bulk"}"#).expect_err("unknown status");
    assert!(matches!(err, CodecError::Json(_)));
}
