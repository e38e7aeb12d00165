//! Tests for the mutation grammar parser and serializer.

use serde_json::json;

use super::*;
use crate::net::types::BoardObject;

fn object(id: &str, kind: &str, x: f64, y: f64) -> BoardObject {
    BoardObject {
        id: id.to_owned(),
        board_id: "b1".to_owned(),
        kind: kind.to_owned(),
        x,
        y,
        width: None,
        height: None,
        rotation: 0.0,
        z_index: 0,
        props: json!({}),
        created_by: None,
        version: 1,
    }
}

fn kind_of(input: &str) -> GrammarErrorKind {
    parse_changes(input).unwrap_err().kind
}

// =============================================================================
// SNAPSHOT
// =============================================================================

#[test]
fn parse_snapshot_with_all_fields() {
    let input = r##"objects:
  - id: "srv-1"
    kind: "rectangle"
    x: "10"
    y: "-20.5"
    width: "50"
    height: "40"
    rotation: "90"
    z: "3"
    props: {fill: "#ff0000", "label text": "a, b: c"}
"##;
    let snapshot = parse_snapshot(input).unwrap();
    assert_eq!(snapshot.objects.len(), 1);
    let obj = &snapshot.objects[0];
    assert_eq!(obj.id, "srv-1");
    assert_eq!(obj.kind, "rectangle");
    assert_eq!((obj.x, obj.y), (10.0, -20.5));
    assert_eq!((obj.width, obj.height), (Some(50.0), Some(40.0)));
    assert_eq!(obj.rotation, Some(90.0));
    assert_eq!(obj.z, Some(3));
    assert_eq!(obj.props.get("fill").map(String::as_str), Some("#ff0000"));
    assert_eq!(obj.props.get("label text").map(String::as_str), Some("a, b: c"));
}

#[test]
fn empty_snapshot() {
    assert!(parse_snapshot("objects: []\n").unwrap().objects.is_empty());
    assert_eq!(serialize_snapshot(&Snapshot::default()), "objects: []\n");
}

#[test]
fn snapshot_round_trip_preserves_objects() {
    let mut a = object("a", "rectangle", 10.0, 10.0);
    a.width = Some(50.0);
    a.height = Some(50.0);
    a.props = json!({ "fill": "#fff", "text": "say \"hi\"\nthere", "locked": true, "size": 12 });
    let mut b = object("b", "line", -3.25, 1e6);
    b.rotation = 45.5;
    b.z_index = -2;
    let c = object("c", "ellipse", 0.1, 0.2);

    let snapshot = Snapshot::from_objects([&a, &b, &c]);
    let text = serialize_snapshot(&snapshot);
    let parsed = parse_snapshot(&text).unwrap();
    assert_eq!(parsed, snapshot);
    assert_eq!(parsed.objects[0].props.get("locked").map(String::as_str), Some("true"));
    assert_eq!(parsed.objects[0].props.get("size").map(String::as_str), Some("12"));
}

#[test]
fn snapshot_items_start_with_id() {
    let input = "objects:\n  - kind: \"rectangle\"\n    id: \"a\"\n    x: \"1\"\n    y: \"2\"\n";
    let err = parse_snapshot(input).unwrap_err();
    assert_eq!(err.line, 3);
    assert!(matches!(err.kind, GrammarErrorKind::FieldOrder { .. }));
}

#[test]
fn snapshot_rejects_changes_sections() {
    let err = parse_snapshot("create: []\n").unwrap_err();
    assert_eq!(err.kind, GrammarErrorKind::UnexpectedSection("create".into()));
}

// =============================================================================
// CHANGES
// =============================================================================

#[test]
fn parse_changes_in_section_order() {
    let input = r#"create:
  - kind: "sticky_note"
    x: "100"
    y: "200"
    props: {text: "hello"}
  - kind: "rectangle"
    x: "0"
    y: "0"
    width: "10"
update:
  - id: "obj-1"
    x: "300"
    props: {}
delete:
  - id: "obj-2"
"#;
    let changes = parse_changes(input).unwrap();
    assert_eq!(changes.len(), 4);
    assert_eq!(changes.create[0].kind, "sticky_note");
    assert_eq!(changes.create[0].props.get("text").map(String::as_str), Some("hello"));
    assert_eq!(changes.create[1].width, Some(10.0));
    assert_eq!(changes.update[0].id, "obj-1");
    assert_eq!(changes.update[0].x, Some(300.0));
    assert_eq!(changes.update[0].y, None);
    assert_eq!(changes.update[0].props, Some(Props::new()));
    assert_eq!(changes.delete[0].id, "obj-2");
}

#[test]
fn sections_are_optional() {
    let changes = parse_changes("delete:\n  - id: \"x\"\n").unwrap();
    assert!(changes.create.is_empty());
    assert_eq!(changes.delete.len(), 1);

    let changes = parse_changes("create: []\nupdate: []\ndelete: []\n").unwrap();
    assert!(changes.is_empty());
}

#[test]
fn changes_round_trip() {
    let changes = Changes {
        create: vec![CreateOp {
            kind: "text".into(),
            x: 1.5,
            y: 2.0,
            width: None,
            height: Some(20.0),
            rotation: None,
            z: Some(4),
            props: [("text".to_owned(), "x".to_owned())].into_iter().collect(),
        }],
        update: vec![UpdateOp { id: "u1".into(), rotation: Some(30.0), ..UpdateOp::default() }],
        delete: vec![],
    };
    let text = serialize_changes(&changes);
    assert!(text.ends_with("delete: []\n"));
    assert_eq!(parse_changes(&text).unwrap(), changes);
}

#[test]
fn unquoted_number_is_rejected_but_quoted_is_accepted() {
    let bad = "create:\n  - kind: \"rectangle\"\n    x: 120\n    y: \"5\"\n";
    let err = parse_changes(bad).unwrap_err();
    assert_eq!(err.line, 3);
    assert_eq!(err.kind, GrammarErrorKind::UnquotedScalar { field: "x".into(), value: "120".into() });

    let good = "create:\n  - kind: \"rectangle\"\n    x: \"120\"\n    y: \"5\"\n";
    assert_eq!(parse_changes(good).unwrap().create[0].x, 120.0);
}

#[test]
fn unquoted_prop_value_is_rejected() {
    let input = "create:\n  - kind: \"text\"\n    x: \"1\"\n    y: \"1\"\n    props: {size: 12}\n";
    assert!(matches!(kind_of(input), GrammarErrorKind::UnquotedScalar { .. }));
}

// =============================================================================
// ERRORS
// =============================================================================

#[test]
fn indentation_is_strict() {
    let item_off = "update:\n   - id: \"a\"\n    x: \"1\"\n";
    let err = parse_changes(item_off).unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.kind, GrammarErrorKind::Indentation { expected: 2, found: 3 });

    let field_off = "update:\n  - id: \"a\"\n      x: \"1\"\n";
    let err = parse_changes(field_off).unwrap_err();
    assert_eq!(err.line, 3);
    assert_eq!(err.kind, GrammarErrorKind::Indentation { expected: 4, found: 6 });

    let section_off = " delete: []\n";
    assert_eq!(kind_of(section_off), GrammarErrorKind::Indentation { expected: 0, found: 1 });
}

#[test]
fn tabs_are_rejected() {
    let err = parse_changes("delete:\n\t- id: \"a\"\n").unwrap_err();
    assert_eq!(err, GrammarError { line: 2, kind: GrammarErrorKind::Tab });
}

#[test]
fn fields_must_follow_fixed_order() {
    let input = "create:\n  - kind: \"rectangle\"\n    y: \"1\"\n    x: \"2\"\n";
    let err = parse_changes(input).unwrap_err();
    assert_eq!(err.line, 4);
    assert_eq!(err.kind, GrammarErrorKind::FieldOrder { field: "x".into(), after: "y".into() });
}

#[test]
fn unknown_and_duplicate_fields() {
    let unknown = "create:\n  - kind: \"rectangle\"\n    x: \"1\"\n    y: \"1\"\n    color: \"red\"\n";
    assert_eq!(kind_of(unknown), GrammarErrorKind::UnknownField("color".into()));

    let duplicate = "update:\n  - id: \"a\"\n    x: \"1\"\n    x: \"2\"\n";
    assert_eq!(kind_of(duplicate), GrammarErrorKind::DuplicateField("x".into()));

    let delete_extra = "delete:\n  - id: \"a\"\n    x: \"1\"\n";
    assert_eq!(kind_of(delete_extra), GrammarErrorKind::UnknownField("x".into()));
}

#[test]
fn missing_required_fields_report_item_line() {
    let input = "create: []\nupdate: []\ndelete: []\n";
    assert!(parse_changes(input).is_ok());

    let missing_y = "create:\n  - kind: \"rectangle\"\n    x: \"1\"\n";
    let err = parse_changes(missing_y).unwrap_err();
    assert_eq!(err, GrammarError { line: 2, kind: GrammarErrorKind::MissingField("y".into()) });

    let empty_update = "update:\n  - id: \"a\"\n";
    assert_eq!(kind_of(empty_update), GrammarErrorKind::EmptyUpdate);
}

#[test]
fn update_with_only_an_id_reports_its_item_line() {
    let input = "update:\n  - id: \"a\"\n    x: \"1\"\n  - id: \"b\"\n";
    let err = parse_changes(input).unwrap_err();
    assert_eq!(err, GrammarError { line: 4, kind: GrammarErrorKind::EmptyUpdate });
}

#[test]
fn numbers_must_parse() {
    let input = "create:\n  - kind: \"rectangle\"\n    x: \"ten\"\n    y: \"1\"\n";
    assert_eq!(kind_of(input), GrammarErrorKind::InvalidNumber { field: "x".into(), value: "ten".into() });

    let fractional_z = "update:\n  - id: \"a\"\n    z: \"1.5\"\n";
    assert!(matches!(kind_of(fractional_z), GrammarErrorKind::InvalidNumber { .. }));
}

#[test]
fn sections_must_be_in_order_and_unique() {
    let reversed = "delete: []\ncreate: []\n";
    assert_eq!(kind_of(reversed), GrammarErrorKind::UnexpectedSection("create".into()));

    let repeated = "create: []\ncreate: []\n";
    assert_eq!(kind_of(repeated), GrammarErrorKind::UnexpectedSection("create".into()));

    let bare = "create:\nupdate: []\n";
    assert_eq!(kind_of(bare), GrammarErrorKind::EmptySection("create".into()));
}

#[test]
fn strings_must_terminate() {
    let input = "delete:\n  - id: \"abc\n";
    assert_eq!(kind_of(input), GrammarErrorKind::UnterminatedString);

    let trailing = "delete:\n  - id: \"abc\" extra\n";
    assert!(matches!(kind_of(trailing), GrammarErrorKind::UnexpectedLine(_)));
}

#[test]
fn malformed_props_are_rejected() {
    let base = "create:\n  - kind: \"text\"\n    x: \"1\"\n    y: \"1\"\n";
    for props in ["props: text: \"a\"", "props: {text: \"a\"", "props: {text \"a\"}", "props: {a: \"1\", a: \"2\"}"] {
        let input = format!("{base}    {props}\n");
        assert!(matches!(kind_of(&input), GrammarErrorKind::InvalidProps(_)), "{props}");
    }
}

#[test]
fn empty_document_is_rejected() {
    assert_eq!(kind_of("   \n\n"), GrammarErrorKind::Empty);
}

#[test]
fn errors_render_with_line_number() {
    let err = parse_changes("create:\n  - kind: \"a\"\n    x: 1\n    y: \"1\"\n").unwrap_err();
    assert_eq!(err.to_string(), "line 3: value for `x` must be double-quoted, found `1`");
}
