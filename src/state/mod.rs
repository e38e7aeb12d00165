//! Client-local state: the object cache, peer presence, the viewport, and
//! the board session container that owns them.

pub mod board;
pub mod presence;
pub mod store;
pub mod viewport;
