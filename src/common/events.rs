use std::time::Duration;

use super::types::{ChatMessage, ConnectionState, RoomId, UserId};

/// Render events the session loop sends to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Joining { user: UserId, room: RoomId },
    /// Full log snapshot right after history was loaded.
    HistoryLoaded(Vec<ChatMessage>),
    MessageAppended(ChatMessage),
    ConnectionChanged(ConnectionState),
    /// The live connection was lost; carries the reason.
    Disconnected(String),
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectAbandoned,
    SendRejected(String),
    FrameRejected(String),
    JoinFailed(String),
    RoomCreated(RoomId),
    Left,
}
