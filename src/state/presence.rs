//! Ephemeral peer presence for the joined board.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashMap;

use crate::net::types::{Point, Presence};

/// Display name for a peer that joined but has not sent a cursor yet.
pub const PLACEHOLDER_NAME: &str = "Joining…";
/// Presence colour used until a peer reports its own.
pub const DEFAULT_COLOR: &str = "#8a8178";
/// Cursors not refreshed within this window are hidden.
pub const CURSOR_STALE_MS: i64 = 3000;

/// Server timestamp of the most recent inbound frame and the local time it arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ServerClock {
    server_ms: i64,
    local_ms: i64,
}

/// Peer presence keyed by peer id. Board-scoped: cleared on leave.
///
/// Cursor ages are measured on the server's clock only. Inbound frames
/// advance it through [`PresenceTracker::observe_server_time`]; between
/// frames it is extrapolated from local elapsed time.
#[derive(Clone, Debug, Default)]
pub struct PresenceTracker {
    peers: HashMap<String, Presence>,
    cursor_updated_at: HashMap<String, i64>,
    clock: Option<ServerClock>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, presence: Presence) {
        self.peers.insert(presence.user_id.clone(), presence);
    }

    pub fn remove(&mut self, user_id: &str) -> Option<Presence> {
        self.cursor_updated_at.remove(user_id);
        self.peers.remove(user_id)
    }

    pub fn clear(&mut self) {
        self.peers.clear();
        self.cursor_updated_at.clear();
    }

    /// Record a peer join. An existing entry is left untouched.
    pub fn join_placeholder(&mut self, user_id: &str, name: Option<&str>, color: Option<&str>) {
        self.peers.entry(user_id.to_owned()).or_insert_with(|| Presence {
            user_id: user_id.to_owned(),
            name: name.unwrap_or(PLACEHOLDER_NAME).to_owned(),
            color: color.unwrap_or(DEFAULT_COLOR).to_owned(),
            cursor: None,
        });
    }

    /// Apply a cursor frame from `user_id`, creating the entry if needed.
    ///
    /// Name and colour overwrite when present; the cursor moves only when a
    /// position is given.
    pub fn apply_cursor(
        &mut self,
        user_id: &str,
        name: Option<&str>,
        color: Option<&str>,
        cursor: Option<Point>,
        ts: i64,
    ) {
        self.join_placeholder(user_id, None, None);
        let Some(peer) = self.peers.get_mut(user_id) else {
            return;
        };
        if let Some(name) = name {
            peer.name = name.to_owned();
        }
        if let Some(color) = color {
            peer.color = color.to_owned();
        }
        if let Some(cursor) = cursor {
            peer.cursor = Some(cursor);
            self.cursor_updated_at.insert(user_id.to_owned(), ts);
        }
    }

    /// Hide a peer's cursor without forgetting the peer.
    pub fn clear_cursor(&mut self, user_id: &str) {
        self.cursor_updated_at.remove(user_id);
        if let Some(peer) = self.peers.get_mut(user_id) {
            peer.cursor = None;
        }
    }

    /// Record a server timestamp received at local time `local_ms`, then hide
    /// cursors that are stale at that server time. Returns how many.
    pub fn observe_server_time(&mut self, server_ms: i64, local_ms: i64) -> usize {
        if server_ms <= 0 {
            return 0;
        }
        self.clock = Some(ServerClock { server_ms, local_ms });
        self.expire_cursors(server_ms)
    }

    /// Estimated server time at local time `local_ms`, if a server frame has
    /// been seen.
    #[must_use]
    pub fn server_now(&self, local_ms: i64) -> Option<i64> {
        self.clock.map(|clock| {
            let elapsed = local_ms.saturating_sub(clock.local_ms).max(0);
            clock.server_ms.saturating_add(elapsed)
        })
    }

    /// Hide cursors that are stale at estimated server time for `local_ms`.
    /// Does nothing before the first server frame.
    pub fn expire_cursors_at_local(&mut self, local_ms: i64) -> usize {
        match self.server_now(local_ms) {
            Some(server_ms) => self.expire_cursors(server_ms),
            None => 0,
        }
    }

    /// Hide cursors idle for longer than [`CURSOR_STALE_MS`] at server time
    /// `now_ms`. Returns how many.
    pub fn expire_cursors(&mut self, now_ms: i64) -> usize {
        if now_ms <= 0 {
            return 0;
        }
        let stale = self
            .cursor_updated_at
            .iter()
            .filter_map(|(id, ts)| (now_ms - *ts > CURSOR_STALE_MS).then_some(id.clone()))
            .collect::<Vec<_>>();
        for id in &stale {
            self.clear_cursor(id);
        }
        stale.len()
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&Presence> {
        self.peers.get(user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Presence> {
        self.peers.values()
    }
}
