//! Error types for every layer of the chat client.
//!
//! Each concern gets its own enum so callers can tell user-input problems
//! (`PublishError::Malformed`) from connectivity (`ConnectError`) and from the
//! history service (`HistoryLoadError`). None of them is fatal to the process.

use thiserror::Error;

use crate::common::RoomId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} must not be blank")]
pub struct InvalidId {
    pub kind: &'static str,
}

/// A text frame that is not valid STOMP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
    #[error("invalid content-length `{0}`")]
    ContentLength(String),
}

/// A MESSAGE body that cannot become a `ChatMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is not a JSON object: {0}")]
    Json(String),
    #[error("payload is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("gateway unreachable: {0}")]
    Unreachable(String),
    #[error("gateway rejected the handshake: {0}")]
    HandshakeRejected(String),
    #[error("failed to subscribe: {0}")]
    Subscribe(#[from] SendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("transport is not connected")]
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("not connected to the room")]
    NotConnected,
    #[error("malformed message: {0}")]
    Malformed(&'static str),
    #[error("could not encode message: {0}")]
    Encode(String),
}

impl From<SendError> for PublishError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NotConnected => PublishError::NotConnected,
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryLoadError {
    #[error("room `{0}` not found")]
    RoomNotFound(RoomId),
    #[error("history service returned status {0}")]
    Status(u16),
    #[error("history request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid history response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("room `{0}` already exists")]
    AlreadyExists(RoomId),
    #[error("room service returned status {0}")]
    Status(u16),
    #[error("room request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("no user or room selected")]
    NotJoined,
    #[error(transparent)]
    History(#[from] HistoryLoadError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
}
