//! The message synchronizer: joins a room, keeps its log in order and owns
//! the one live channel to the gateway.
//!
//! ```text
//! Idle --join--> Loading --history ok--> Live --connection lost--> Reconnecting
//!  ^                |                      |                            |
//!  +--history err---+                      +-----------leave------------+--> Closed
//! ```
//!
//! History is always fetched before any subscription exists, so live messages
//! can never show up ahead of an unseen history gap. Messages the local user
//! sends are not appended here; they appear once the gateway echoes them back.

use chrono::Utc;

use crate::common::{ChatMessage, ConnectionState, RoomId, UserId};
use crate::error::{ConnectError, JoinError, PayloadError, PublishError};
use crate::network::channel::{ChannelEvent, RoomChannel};
use crate::network::history::HistoryService;
use crate::network::transport::{Gateway, Transport};

use super::message_log::MessageLog;
use super::session::ChatSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Loading,
    Live,
    Reconnecting,
    Closed,
}

/// Outcome of feeding one channel event into the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    Appended(ChatMessage),
    Rejected(PayloadError),
    Disconnected(String),
    /// Nothing to do, e.g. a frame that raced a teardown.
    Ignored,
}

pub struct Synchronizer<G: Gateway, H: HistoryService> {
    gateway: G,
    history: H,
    phase: SyncPhase,
    connection: ConnectionState,
    membership: Option<(UserId, RoomId)>,
    log: MessageLog,
    channel: Option<RoomChannel<G::Transport>>,
}

impl<G: Gateway, H: HistoryService> Synchronizer<G, H> {
    pub fn new(gateway: G, history: H) -> Self {
        Self {
            gateway,
            history,
            phase: SyncPhase::Idle,
            connection: ConnectionState::Disconnected,
            membership: None,
            log: MessageLog::new(),
            channel: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.log.snapshot()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.membership.as_ref().map(|(user, _)| user)
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        self.membership.as_ref().map(|(_, room)| room)
    }

    /// Loads history for the session's room, then goes live on it.
    ///
    /// A history failure leaves the synchronizer `Idle` with nothing retained.
    /// A connect failure keeps the loaded history and leaves it
    /// `Reconnecting` with the connection `Failed`.
    pub async fn join(&mut self, session: &ChatSession) -> Result<(), JoinError> {
        let (user, room) = session.membership().ok_or(JoinError::NotJoined)?;
        let (user, room) = (user.clone(), room.clone());

        self.release_channel().await;
        self.log = MessageLog::new();
        self.membership = Some((user.clone(), room.clone()));
        self.phase = SyncPhase::Loading;
        log::info!("Joining room {room} as {user}");

        let history = match self.history.fetch_history(&room).await {
            Ok(history) => history,
            Err(err) => {
                log::warn!("History load for {room} failed: {err}");
                self.membership = None;
                self.phase = SyncPhase::Idle;
                return Err(err.into());
            }
        };

        self.log = MessageLog::seeded(history);
        self.phase = SyncPhase::Live;
        log::info!("Room {room} live with {} history messages", self.log.len());

        if let Err(err) = self.open_channel().await {
            self.phase = SyncPhase::Reconnecting;
            return Err(err.into());
        }
        Ok(())
    }

    /// Opens a fresh transport and subscription after a connection loss.
    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        if self.phase != SyncPhase::Reconnecting {
            return Ok(());
        }
        self.open_channel().await?;
        self.phase = SyncPhase::Live;
        Ok(())
    }

    /// Publishes `content` as the joined user. The local log is left alone.
    pub async fn send(&mut self, content: &str) -> Result<(), PublishError> {
        if content.trim().is_empty() {
            return Err(PublishError::Malformed("content is empty"));
        }
        if self.phase != SyncPhase::Live || !self.connection.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let (Some((user, room)), Some(channel)) = (&self.membership, self.channel.as_mut()) else {
            return Err(PublishError::NotConnected);
        };

        let message = ChatMessage {
            sender: user.clone(),
            content: content.to_string(),
            room_id: room.clone(),
            timestamp: Utc::now(),
        };
        let result = channel.publish(room, &message).await;
        if let Err(PublishError::NotConnected) = &result {
            log::error!("Channel refused a publish while the room was live");
        }
        result
    }

    /// Next event from the live channel; pending forever when there is none.
    ///
    /// Cancel safe, so it can sit in a `select!` next to user commands.
    pub async fn next_channel_event(&mut self) -> ChannelEvent {
        match self.channel.as_mut() {
            Some(channel) => channel.next_event().await,
            None => std::future::pending().await,
        }
    }

    pub async fn apply(&mut self, event: ChannelEvent) -> SyncUpdate {
        if self.phase != SyncPhase::Live {
            return SyncUpdate::Ignored;
        }
        match event {
            ChannelEvent::Message(message) => {
                self.log.append(message.clone());
                SyncUpdate::Appended(message)
            }
            ChannelEvent::Rejected(err) => {
                log::warn!("Rejected frame: {err}");
                SyncUpdate::Rejected(err)
            }
            ChannelEvent::GatewayError(reason) => self.connection_lost(reason).await,
            ChannelEvent::Closed => self.connection_lost("connection closed".to_string()).await,
        }
    }

    /// Unsubscribes, disconnects and drops the log. Safe to call repeatedly.
    pub async fn leave(&mut self) {
        if matches!(self.phase, SyncPhase::Idle | SyncPhase::Closed) && self.channel.is_none() {
            return;
        }
        self.release_channel().await;
        self.membership = None;
        self.log = MessageLog::new();
        self.phase = SyncPhase::Closed;
        log::info!("Left room");
    }

    async fn connection_lost(&mut self, reason: String) -> SyncUpdate {
        log::warn!("Connection to room lost: {reason}");
        self.release_channel().await;
        self.phase = SyncPhase::Reconnecting;
        SyncUpdate::Disconnected(reason)
    }

    /// `Connecting -> Connected -> Subscribed`, releasing everything on failure.
    async fn open_channel(&mut self) -> Result<(), ConnectError> {
        self.release_channel().await;
        let Some((_, room)) = self.membership.clone() else {
            return Err(ConnectError::HandshakeRejected("no room joined".to_string()));
        };

        self.connection = ConnectionState::Connecting;
        let mut transport = self.gateway.open();
        let inbound = match transport.connect().await {
            Ok(inbound) => inbound,
            Err(err) => {
                log::warn!("Connect to gateway failed: {err}");
                transport.disconnect().await;
                self.connection = ConnectionState::Failed;
                return Err(err);
            }
        };

        let channel = self.channel.insert(RoomChannel::new(transport, inbound));
        if let Err(err) = channel.subscribe(&room).await {
            log::warn!("Subscribe to {room} failed: {err}");
            self.release_channel().await;
            self.connection = ConnectionState::Failed;
            return Err(err.into());
        }

        self.connection = ConnectionState::Connected;
        Ok(())
    }

    async fn release_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
        self.connection = ConnectionState::Disconnected;
    }
}
