use super::*;

#[test]
fn join_creates_placeholder() {
    let mut presence = PresenceTracker::new();
    presence.join_placeholder("peer-1", None, None);
    let peer = presence.get("peer-1").unwrap();
    assert_eq!(peer.name, PLACEHOLDER_NAME);
    assert_eq!(peer.color, DEFAULT_COLOR);
    assert!(peer.cursor.is_none());
}

#[test]
fn join_does_not_clobber_known_peer() {
    let mut presence = PresenceTracker::new();
    presence.apply_cursor("peer-1", Some("Ann"), Some("#ffffff"), Some(Point::new(1.0, 2.0)), 10);
    presence.join_placeholder("peer-1", None, None);
    assert_eq!(presence.get("peer-1").unwrap().name, "Ann");
}

#[test]
fn first_cursor_enriches_placeholder() {
    let mut presence = PresenceTracker::new();
    presence.join_placeholder("peer-1", None, None);
    presence.apply_cursor("peer-1", Some("Ann"), Some("#ffffff"), Some(Point::new(5.0, 7.0)), 100);

    let peer = presence.get("peer-1").unwrap();
    assert_eq!(peer.name, "Ann");
    assert_eq!(peer.color, "#ffffff");
    assert_eq!(peer.cursor, Some(Point::new(5.0, 7.0)));
    assert_eq!(presence.len(), 1);
}

#[test]
fn cursor_without_identity_keeps_name() {
    let mut presence = PresenceTracker::new();
    presence.apply_cursor("peer-1", Some("Ann"), None, None, 100);
    presence.apply_cursor("peer-1", None, None, Some(Point::new(1.0, 1.0)), 200);
    let peer = presence.get("peer-1").unwrap();
    assert_eq!(peer.name, "Ann");
    assert_eq!(peer.color, DEFAULT_COLOR);
    assert_eq!(peer.cursor, Some(Point::new(1.0, 1.0)));
}

#[test]
fn clear_cursor_keeps_peer() {
    let mut presence = PresenceTracker::new();
    presence.apply_cursor("peer-1", None, None, Some(Point::new(1.0, 1.0)), 100);
    presence.clear_cursor("peer-1");
    assert!(presence.get("peer-1").unwrap().cursor.is_none());
}

#[test]
fn stale_cursors_expire() {
    let mut presence = PresenceTracker::new();
    presence.apply_cursor("old", None, None, Some(Point::new(1.0, 1.0)), 1000);
    presence.apply_cursor("fresh", None, None, Some(Point::new(2.0, 2.0)), 3500);

    assert_eq!(presence.expire_cursors(4000), 0);
    assert_eq!(presence.expire_cursors(4001), 1);
    assert!(presence.get("old").unwrap().cursor.is_none());
    assert!(presence.get("fresh").unwrap().cursor.is_some());
}

#[test]
fn server_clock_extrapolates_between_frames() {
    let mut presence = PresenceTracker::new();
    assert_eq!(presence.server_now(50_000), None);
    presence.apply_cursor("peer", None, None, Some(Point::new(1.0, 1.0)), 1_000);

    // Local clock is far ahead of the server; only elapsed local time counts.
    assert_eq!(presence.observe_server_time(1_000, 50_000), 0);
    assert_eq!(presence.server_now(50_250), Some(1_250));
    assert_eq!(presence.expire_cursors_at_local(50_250), 0);
    assert!(presence.get("peer").unwrap().cursor.is_some());

    assert_eq!(presence.expire_cursors_at_local(53_001), 1);
    assert!(presence.get("peer").unwrap().cursor.is_none());
}

#[test]
fn newer_server_frame_hides_stale_cursors() {
    let mut presence = PresenceTracker::new();
    presence.apply_cursor("peer", None, None, Some(Point::new(1.0, 1.0)), 1_000);
    assert_eq!(presence.observe_server_time(3_900, 0), 0);
    assert_eq!(presence.observe_server_time(4_500, 0), 1);
    assert_eq!(presence.observe_server_time(0, 0), 0);
}

#[test]
fn remove_and_clear() {
    let mut presence = PresenceTracker::new();
    presence.join_placeholder("a", None, None);
    presence.join_placeholder("b", Some("Bo"), Some("#000000"));
    assert_eq!(presence.get("b").unwrap().name, "Bo");

    assert!(presence.remove("a").is_some());
    assert!(presence.remove("a").is_none());
    presence.clear();
    assert!(presence.is_empty());
}
