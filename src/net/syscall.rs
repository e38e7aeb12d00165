//! Syscall names consumed and produced by the sync core.

#[cfg(test)]
#[path = "syscall_test.rs"]
mod syscall_test;

use std::fmt;

/// Namespaced operation identifier carried in [`frames::Frame::syscall`].
///
/// Known exchanges get their own variant so dispatch tables can be keyed on
/// a closed set; anything else is preserved verbatim in [`Syscall::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Syscall {
    /// Handshake complete (inbound).
    SessionConnected,
    /// Channel lost (local synthetic).
    SessionDisconnected,
    BoardJoin,
    BoardPart,
    ObjectCreate,
    ObjectUpdate,
    ObjectDelete,
    CursorMoved,
    CursorClear,
    AiPrompt,
    Other(String),
}

impl Syscall {
    /// Parse a wire syscall name.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "session:connected" => Self::SessionConnected,
            "session:disconnected" => Self::SessionDisconnected,
            "board:join" => Self::BoardJoin,
            "board:part" => Self::BoardPart,
            "object:create" => Self::ObjectCreate,
            "object:update" => Self::ObjectUpdate,
            "object:delete" => Self::ObjectDelete,
            "cursor:moved" => Self::CursorMoved,
            "cursor:clear" => Self::CursorClear,
            "ai:prompt" => Self::AiPrompt,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Wire name, e.g. `"object:create"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionConnected => "session:connected",
            Self::SessionDisconnected => "session:disconnected",
            Self::BoardJoin => "board:join",
            Self::BoardPart => "board:part",
            Self::ObjectCreate => "object:create",
            Self::ObjectUpdate => "object:update",
            Self::ObjectDelete => "object:delete",
            Self::CursorMoved => "cursor:moved",
            Self::CursorClear => "cursor:clear",
            Self::AiPrompt => "ai:prompt",
            Self::Other(name) => name,
        }
    }

    /// Syscalls whose frames only make sense for the currently joined board.
    #[must_use]
    pub fn is_board_scoped(&self) -> bool {
        matches!(
            self,
            Self::BoardPart
                | Self::ObjectCreate
                | Self::ObjectUpdate
                | Self::ObjectDelete
                | Self::CursorMoved
                | Self::CursorClear
        )
    }
}

impl From<&str> for Syscall {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl fmt::Display for Syscall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
