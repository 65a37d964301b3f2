use chrono::{DateTime, Utc};

use crate::common::{ChatMessage, ConnectionState, RoomId, SessionEvent, UserId};

const MAX_DEBUG_EVENTS: usize = 100;

#[derive(Debug, Clone)]
pub struct DebugEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: &'static str,
    pub message: String,
}

/// Everything the desktop view renders, reduced from session events.
#[derive(Default)]
pub struct AppState {
    pub messages: Vec<ChatMessage>,
    pub input_text: String,
    pub user_input: String,
    pub room_input: String,
    pub user: Option<UserId>,
    pub room: Option<RoomId>,
    pub connection: ConnectionState,
    /// Set while a join is in flight or a room is open.
    pub joined: bool,
    pub status: Option<String>,
    pub debug_events: Vec<DebugEvent>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefills the join form.
    pub fn with_prefill(user: Option<String>, room: Option<String>) -> Self {
        Self {
            user_input: user.unwrap_or_default(),
            room_input: room.unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn can_send(&self) -> bool {
        self.joined && self.connection.is_connected()
    }

    pub fn is_own(&self, message: &ChatMessage) -> bool {
        self.user.as_ref() == Some(&message.sender)
    }

    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Joining { user, room } => {
                self.add_debug_event("JOINING", format!("{user} joining {room}"));
                self.messages.clear();
                self.user = Some(user);
                self.room = Some(room);
                self.joined = true;
                self.status = Some("Loading history...".to_string());
            }
            SessionEvent::HistoryLoaded(messages) => {
                self.add_debug_event("HISTORY", format!("{} messages loaded", messages.len()));
                self.messages = messages;
                self.status = None;
            }
            SessionEvent::MessageAppended(message) => {
                self.add_debug_event("MESSAGE", format!("from {}", message.sender));
                self.messages.push(message);
            }
            SessionEvent::ConnectionChanged(state) => {
                self.add_debug_event("CONNECTION", state.to_string());
                self.connection = state;
            }
            SessionEvent::Disconnected(reason) => {
                self.add_debug_event("DISCONNECTED", reason.clone());
                self.connection = ConnectionState::Disconnected;
                self.status = Some(format!("Connection lost: {reason}"));
            }
            SessionEvent::Reconnecting { attempt, delay } => {
                let message = format!("Reconnecting in {}s (attempt {attempt})", delay.as_secs());
                self.add_debug_event("RECONNECTING", message.clone());
                self.status = Some(message);
            }
            SessionEvent::ReconnectAbandoned => {
                self.add_debug_event("RECONNECT", "gave up".to_string());
                self.status = Some("Could not reach the chat server. Leave and join again to retry.".to_string());
            }
            SessionEvent::SendRejected(reason) => {
                self.add_debug_event("SEND_REJECTED", reason.clone());
                self.status = Some(format!("Message not sent: {reason}"));
            }
            SessionEvent::FrameRejected(reason) => self.add_debug_event("FRAME_REJECTED", reason),
            SessionEvent::JoinFailed(reason) => {
                self.add_debug_event("JOIN_FAILED", reason.clone());
                self.reset();
                self.status = Some(format!("Could not join: {reason}"));
            }
            SessionEvent::RoomCreated(room) => self.add_debug_event("ROOM_CREATED", room.to_string()),
            SessionEvent::Left => {
                self.add_debug_event("LEFT", String::new());
                self.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.messages.clear();
        self.input_text.clear();
        self.user = None;
        self.room = None;
        self.joined = false;
        self.connection = ConnectionState::Disconnected;
        self.status = None;
    }

    pub fn add_debug_event(&mut self, event_type: &'static str, message: String) {
        self.debug_events.push(DebugEvent {
            timestamp: Utc::now(),
            event_type,
            message,
        });
        if self.debug_events.len() > MAX_DEBUG_EVENTS {
            self.debug_events.remove(0);
        }
    }
}
