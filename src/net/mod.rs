//! Networking modules for the websocket frame protocol.
//!
//! SYSTEM CONTEXT
//! ==============
//! `transport` owns the socket and its reconnect loop (driven by the pure
//! state machine in `connection`), `dispatch` routes inbound frames by
//! `syscall`, `correlation` matches replies to outbound requests, and
//! `handlers` applies frames to the board state. `types` defines the shared
//! wire schema.

pub mod connection;
pub mod correlation;
pub mod dispatch;
pub mod handlers;
pub mod syscall;
pub mod transport;
pub mod types;
