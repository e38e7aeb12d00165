//! Async driver: a transport task feeding a [`SyncSession`].
//!
//! The client processes inbound frames one at a time, in arrival order, and
//! ticks request timeouts on a fixed interval. All state lives in the session;
//! this type only decides when to call into it.

#[cfg(test)]
#[path = "client_test.rs"]
mod client_test;

use std::time::Duration;

use frames::now_ms;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::info;

use crate::config::SyncConfig;
use crate::net::transport::{TransportHandle, spawn_transport};
use crate::net::types::Frame;
use crate::session::SyncSession;
use crate::state::board::SessionEvent;

/// How often pending requests are checked against their deadlines.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Error type for waiting on the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The condition was not met in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The transport task ended.
    #[error("transport closed")]
    Closed,
}

pub struct SyncClient {
    session: SyncSession<TransportHandle>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    ticker: Interval,
}

impl SyncClient {
    /// Spawn the transport and start connecting. Must be called inside a
    /// tokio runtime.
    #[must_use]
    pub fn connect(config: SyncConfig) -> Self {
        info!(base_url = %config.transport.base_url, "sync client starting");
        let (handle, inbound) = spawn_transport(config.transport);
        let session = SyncSession::new(handle, &config.session);
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { session, inbound, ticker }
    }

    #[must_use]
    pub fn session(&self) -> &SyncSession<TransportHandle> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SyncSession<TransportHandle> {
        &mut self.session
    }

    /// Stop reconnecting and close the socket.
    pub fn close(&self) {
        self.session.sink().close();
    }

    /// Wait for one inbound frame or timer tick and process it.
    ///
    /// Returns the events it produced, or `None` once the transport has ended.
    pub async fn step(&mut self) -> Option<Vec<SessionEvent>> {
        tokio::select! {
            frame = self.inbound.recv() => {
                let frame = frame?;
                self.session.dispatch(&frame);
            }
            _ = self.ticker.tick() => {
                self.session.expire_requests(now_ms());
            }
        }
        Some(self.session.drain_events())
    }

    /// Step until `done` returns true, collecting every event seen on the way.
    ///
    /// `done` is checked once before the first step.
    ///
    /// # Errors
    ///
    /// [`ClientError::Timeout`] if `limit` elapses first, [`ClientError::Closed`]
    /// if the transport ends.
    pub async fn run_until(
        &mut self,
        limit: Duration,
        mut done: impl FnMut(&SyncSession<TransportHandle>, &[SessionEvent]) -> bool,
    ) -> Result<Vec<SessionEvent>, ClientError> {
        let deadline = Instant::now() + limit;
        let mut seen = self.session.drain_events();
        while !done(&self.session, &seen) {
            match tokio::time::timeout_at(deadline, self.step()).await {
                Ok(Some(events)) => seen.extend(events),
                Ok(None) => return Err(ClientError::Closed),
                Err(_) => return Err(ClientError::Timeout(limit)),
            }
        }
        Ok(seen)
    }
}
