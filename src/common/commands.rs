use super::types::{RoomId, UserId};

/// Commands the presentation layer sends to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Join an existing room as `user`.
    Join { user: UserId, room: RoomId },
    /// Create `room` on the history service, then join it.
    CreateRoom { user: UserId, room: RoomId },
    /// Leave the current room and tear the connection down.
    Leave,
    /// Publish a message into the current room.
    SendMessage(String),
}
