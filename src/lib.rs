//! Real-time sync core for a collaborative canvas.
//!
//! Keeps a client-local cache of board objects consistent with a
//! server-authoritative board over one multiplexed websocket channel.
//!
//! - [`net`]: transport, dispatch, request correlation, and frame handlers.
//! - [`state`]: object store, presence tracker, viewport math, board state.
//! - [`grammar`]: the textual snapshot and changes documents.
//! - [`session`]: owned state plus dispatch table behind one API.
//! - [`client`]: async driver coupling the transport with a session.

pub mod client;
pub mod config;
pub mod grammar;
pub mod net;
pub mod session;
pub mod state;

pub use client::{ClientError, SyncClient};
pub use config::{ConfigError, SessionConfig, SyncConfig};
pub use session::SyncSession;
pub use state::board::{BoardState, SessionEvent};
