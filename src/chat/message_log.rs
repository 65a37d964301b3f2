use crate::common::ChatMessage;

/// Ordered messages of the joined room: the history snapshot first, then live
/// messages in the order they arrived. Entries are never reordered or removed
/// while the room is joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the log from a history snapshot, keeping the order given.
    pub fn seeded(history: Vec<ChatMessage>) -> Self {
        Self { entries: history }
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.entries.push(message);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }
}
