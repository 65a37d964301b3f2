use crate::common::{RoomId, UserId};

/// Who is chatting where, and whether the chat view may be active.
///
/// Passed by reference to the synchronizer on join; nothing about it is
/// global, so independent sessions can coexist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    user_id: Option<UserId>,
    room_id: Option<RoomId>,
    connected: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, user_id: UserId, room_id: RoomId) {
        self.user_id = Some(user_id);
        self.room_id = Some(room_id);
        self.connected = true;
    }

    pub fn leave(&mut self) {
        self.user_id = None;
        self.room_id = None;
        self.connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    /// Both ids, only while joined.
    pub fn membership(&self) -> Option<(&UserId, &RoomId)> {
        if !self.connected {
            return None;
        }
        Some((self.user_id.as_ref()?, self.room_id.as_ref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{room, user};

    #[test]
    fn join_then_leave_clears_everything() {
        let mut session = ChatSession::new();
        assert!(session.membership().is_none());

        session.join(user("alice"), room("R1"));
        assert!(session.is_connected());
        assert_eq!(session.membership(), Some((&user("alice"), &room("R1"))));

        session.leave();
        assert_eq!(session, ChatSession::new());
    }
}
