//! Connection lifecycle state machine and reconnect backoff.
//!
//! The async transport loop drives a [`ConnectionMachine`]; keeping the
//! transitions here, free of I/O, makes the reconnect policy testable.
//!
//! ```text
//! Idle ──start──▶ Connecting ──handshake──▶ Connected
//!                    ▲   │                      │
//!                    │   └─────── lost ─────────┤
//!                    │                          ▼
//!                    └──── backoff elapsed ── Backoff(n)
//! any ──close──▶ Closed
//! ```

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::time::Duration;

use rand::Rng;

pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 1000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 10_000;
/// Floor for any reconnect delay, so a zero policy cannot spin.
pub const MIN_BACKOFF_MS: u64 = 10;

/// Internal lifecycle state of the single multiplexed channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    /// Waiting before reconnect attempt `n` (1-based).
    Backoff(u32),
    Closed,
}

/// Caller-visible connection signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected; socket is closed or not yet opened.
    #[default]
    Disconnected,
    /// Handshake is in progress.
    Connecting,
    /// Socket is open and the server sent `session:connected`.
    Connected,
}

impl ConnectionState {
    /// Collapse the internal state into the status callers see.
    #[must_use]
    pub fn status(self) -> ConnectionStatus {
        match self {
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Connected => ConnectionStatus::Connected,
            Self::Idle | Self::Backoff(_) | Self::Closed => ConnectionStatus::Disconnected,
        }
    }
}

/// Side effect the owner must perform after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionAction {
    None,
    /// Entered `Connected`: re-issue join-class requests.
    Rejoin,
    /// Entered `Backoff`: sleep this long before reconnecting.
    Sleep(Duration),
}

/// Exponential backoff with a bounded maximum interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    /// Fraction of the delay randomized in either direction, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_BACKOFF_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            multiplier: 2,
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Un-jittered delay before reconnect attempt `attempt` (1-based).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let floor = Duration::from_millis(MIN_BACKOFF_MS);
        let max = self.max.max(floor);
        let mut delay = self.initial.max(floor);
        for _ in 1..attempt {
            delay = delay.saturating_mul(self.multiplier.max(1));
            if delay >= max {
                return max;
            }
        }
        delay.min(max)
    }

    /// Delay for `attempt` with jitter applied, never above `max`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return base;
        }
        let jitter = self.jitter.min(1.0);
        let factor = rand::rng().random_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor).clamp(Duration::from_millis(MIN_BACKOFF_MS), self.max.max(base))
    }
}

/// Pure connection state machine.
#[derive(Clone, Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempt: u32,
    policy: BackoffPolicy,
}

impl ConnectionMachine {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { state: ConnectionState::Idle, attempt: 0, policy }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful handshake.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Begin (or resume) connecting. No-op once closed.
    pub fn start(&mut self) -> TransitionAction {
        if matches!(self.state, ConnectionState::Idle | ConnectionState::Backoff(_)) {
            self.state = ConnectionState::Connecting;
        }
        TransitionAction::None
    }

    /// The server confirmed the session.
    pub fn on_handshake(&mut self) -> TransitionAction {
        if self.state != ConnectionState::Connecting {
            return TransitionAction::None;
        }
        self.state = ConnectionState::Connected;
        self.attempt = 0;
        TransitionAction::Rejoin
    }

    /// The channel failed to open or dropped unexpectedly.
    pub fn on_lost(&mut self) -> TransitionAction {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
            return TransitionAction::None;
        }
        self.attempt = self.attempt.saturating_add(1);
        self.state = ConnectionState::Backoff(self.attempt);
        TransitionAction::Sleep(self.policy.delay(self.attempt))
    }

    /// Terminal: no further reconnects.
    pub fn close(&mut self) -> TransitionAction {
        self.state = ConnectionState::Closed;
        TransitionAction::None
    }
}
