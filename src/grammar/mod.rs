//! Mutation grammar: textual snapshot and changes documents.
//!
//! A snapshot lists every object on a board; a changes document lists
//! creates, updates and deletes to apply as three ordered batches. External
//! producers (the AI assistant) emit changes documents. Parsing is
//! all-or-nothing, so a rejected document never mutates anything.
//!
//! ```text
//! create:
//!   - kind: "sticky_note"
//!     x: "120"
//!     y: "80"
//!     props: {text: "hello", fill: "#ffd966"}
//! update:
//!   - id: "4b1e..."
//!     rotation: "15"
//! delete: []
//! ```
//!
//! Updates and deletes name objects by their final server id. A batch cannot
//! refer to an object it creates itself.

pub mod ast;
pub mod parse;
pub mod serialize;

pub use ast::{Changes, CreateOp, DeleteOp, Props, Snapshot, SnapshotObject, UpdateOp};
pub use parse::{GrammarError, GrammarErrorKind, parse_changes, parse_snapshot};
pub use serialize::{serialize_changes, serialize_snapshot};

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
