use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::chat::{ChatSession, ReconnectPolicy, SyncUpdate, Synchronizer};
use crate::common::{ConnectionState, RoomId, SessionCommand, SessionEvent, UserId};
use crate::error::{JoinError, PublishError};

use super::channel::ChannelEvent;
use super::history::{HistoryService, RoomDirectory};
use super::transport::Gateway;

/// Session loop between the presentation layer and the network.
///
/// Commands come in on `command_receiver`, render events go out on
/// `event_sender`. The loop ends once the command side is dropped.
pub struct ChatClient<G: Gateway, H: HistoryService, D: RoomDirectory> {
    event_sender: mpsc::Sender<SessionEvent>,
    command_receiver: mpsc::Receiver<SessionCommand>,
    session: ChatSession,
    synchronizer: Synchronizer<G, H>,
    directory: D,
    policy: ReconnectPolicy,
    retry: Option<PendingReconnect>,
    deferred: Option<SessionCommand>,
    shutting_down: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingReconnect {
    attempt: u32,
    deadline: Instant,
}

/// Why a long-running step stopped before finishing.
enum Interruption {
    Leave,
    Replace(SessionCommand),
    Shutdown,
}

enum Step {
    Command(Option<SessionCommand>),
    Channel(ChannelEvent),
    Retry,
}

impl<G: Gateway, H: HistoryService, D: RoomDirectory> ChatClient<G, H, D> {
    pub fn new(
        event_sender: mpsc::Sender<SessionEvent>,
        command_receiver: mpsc::Receiver<SessionCommand>,
        gateway: G,
        history: H,
        directory: D,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            event_sender,
            command_receiver,
            session: ChatSession::new(),
            synchronizer: Synchronizer::new(gateway, history),
            directory,
            policy: policy.normalized(),
            retry: None,
            deferred: None,
            shutting_down: false,
        }
    }

    pub async fn run(mut self) {
        log::info!("Session loop started");

        while !self.shutting_down {
            if let Some(command) = self.deferred.take() {
                self.handle_command(command).await;
                continue;
            }

            let deadline = self.retry.map(|pending| pending.deadline);
            let step = tokio::select! {
                command = self.command_receiver.recv() => Step::Command(command),
                event = self.synchronizer.next_channel_event() => Step::Channel(event),
                () = wait_until(deadline) => Step::Retry,
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Command(None) => self.shutting_down = true,
                Step::Channel(event) => self.handle_channel_event(event).await,
                Step::Retry => self.attempt_reconnect().await,
            }
        }

        self.synchronizer.leave().await;
        self.session.leave();
        log::info!("Session loop stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Join { user, room } => self.join(user, room).await,
            SessionCommand::CreateRoom { user, room } => self.create_room(user, room).await,
            SessionCommand::Leave => self.leave().await,
            SessionCommand::SendMessage(content) => {
                publish(&mut self.synchronizer, &self.event_sender, &content).await;
            }
        }
    }

    async fn join(&mut self, user: UserId, room: RoomId) {
        self.retry = None;
        self.synchronizer.leave().await;
        self.session.join(user.clone(), room.clone());
        self.notify(SessionEvent::Joining { user, room }).await;

        let outcome = interruptible(
            &mut self.command_receiver,
            &self.event_sender,
            self.synchronizer.join(&self.session),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                self.notify(SessionEvent::HistoryLoaded(self.synchronizer.snapshot())).await;
                self.notify(SessionEvent::ConnectionChanged(ConnectionState::Connected)).await;
            }
            Ok(Err(JoinError::Connect(err))) => {
                log::warn!("Joined without a live connection: {err}");
                self.notify(SessionEvent::HistoryLoaded(self.synchronizer.snapshot())).await;
                self.notify(SessionEvent::ConnectionChanged(ConnectionState::Failed)).await;
                self.schedule_reconnect(1).await;
            }
            Ok(Err(err)) => {
                self.session.leave();
                self.notify(SessionEvent::JoinFailed(err.to_string())).await;
            }
            Err(interruption) => self.interrupted(interruption).await,
        }
    }

    /// Creates `room`, then joins it. The current room stays live meanwhile.
    async fn create_room(&mut self, user: UserId, room: RoomId) {
        let outcome = {
            let creation = self.directory.create_room(&room);
            tokio::pin!(creation);
            loop {
                tokio::select! {
                    created = &mut creation => break Ok(created),
                    command = self.command_receiver.recv() => match command {
                        Some(SessionCommand::SendMessage(content)) => {
                            publish(&mut self.synchronizer, &self.event_sender, &content).await;
                        }
                        Some(SessionCommand::Leave) => break Err(Interruption::Leave),
                        Some(other) => break Err(Interruption::Replace(other)),
                        None => break Err(Interruption::Shutdown),
                    },
                }
            }
        };

        match outcome {
            Ok(Ok(())) => {
                self.notify(SessionEvent::RoomCreated(room.clone())).await;
                self.join(user, room).await;
            }
            Ok(Err(err)) => {
                log::warn!("Room {room} not created: {err}");
                self.notify(SessionEvent::JoinFailed(err.to_string())).await;
            }
            Err(interruption) => self.interrupted(interruption).await,
        }
    }

    async fn leave(&mut self) {
        self.retry = None;
        self.synchronizer.leave().await;
        self.session.leave();
        self.notify(SessionEvent::Left).await;
    }

    async fn interrupted(&mut self, interruption: Interruption) {
        match interruption {
            Interruption::Leave => self.leave().await,
            Interruption::Replace(command) => {
                self.retry = None;
                self.synchronizer.leave().await;
                self.session.leave();
                self.deferred = Some(command);
            }
            Interruption::Shutdown => self.shutting_down = true,
        }
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match self.synchronizer.apply(event).await {
            SyncUpdate::Appended(message) => self.notify(SessionEvent::MessageAppended(message)).await,
            SyncUpdate::Rejected(err) => self.notify(SessionEvent::FrameRejected(err.to_string())).await,
            SyncUpdate::Disconnected(reason) => {
                self.notify(SessionEvent::Disconnected(reason)).await;
                self.notify(SessionEvent::ConnectionChanged(self.synchronizer.connection_state()))
                    .await;
                self.schedule_reconnect(1).await;
            }
            SyncUpdate::Ignored => {}
        }
    }

    async fn schedule_reconnect(&mut self, attempt: u32) {
        match self.policy.delay_for(attempt) {
            Some(delay) => {
                log::info!("Reconnect attempt {attempt} in {}ms", delay.as_millis());
                self.retry = Some(PendingReconnect {
                    attempt,
                    deadline: Instant::now() + delay,
                });
                self.notify(SessionEvent::Reconnecting { attempt, delay }).await;
            }
            None => {
                self.retry = None;
                if self.policy.enabled {
                    log::warn!("Giving up on the gateway after {} attempts", attempt - 1);
                }
                self.notify(SessionEvent::ReconnectAbandoned).await;
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        let Some(pending) = self.retry.take() else {
            return;
        };
        self.notify(SessionEvent::ConnectionChanged(ConnectionState::Connecting)).await;

        let outcome = interruptible(
            &mut self.command_receiver,
            &self.event_sender,
            self.synchronizer.reconnect(),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                if let (Some(user), Some(room)) = (self.synchronizer.user_id(), self.synchronizer.room_id()) {
                    log::info!("Reconnected to {room} as {user} on attempt {}", pending.attempt);
                }
                self.notify(SessionEvent::ConnectionChanged(self.synchronizer.connection_state()))
                    .await;
            }
            Ok(Err(err)) => {
                log::warn!("Reconnect attempt {} failed: {err}", pending.attempt);
                self.notify(SessionEvent::ConnectionChanged(ConnectionState::Failed)).await;
                self.schedule_reconnect(pending.attempt + 1).await;
            }
            Err(interruption) => self.interrupted(interruption).await,
        }
    }

    async fn notify(&self, event: SessionEvent) {
        notify(&self.event_sender, event).await;
    }
}

async fn publish<G: Gateway, H: HistoryService>(
    synchronizer: &mut Synchronizer<G, H>,
    events: &mpsc::Sender<SessionEvent>,
    content: &str,
) {
    if let Err(err) = synchronizer.send(content).await {
        log::warn!("Message not sent: {err}");
        notify(events, SessionEvent::SendRejected(err.to_string())).await;
    }
}

async fn notify(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(err) = events.send(event).await {
        log::warn!("Failed to notify UI: {err:?}");
    }
}

/// Drives a join or reconnect while still answering commands.
///
/// Sends are refused while the operation runs, since the channel is down. `Leave`, a new `Join` or a
/// closed command channel cancel it by dropping the future.
async fn interruptible<F: Future>(
    commands: &mut mpsc::Receiver<SessionCommand>,
    events: &mpsc::Sender<SessionEvent>,
    operation: F,
) -> Result<F::Output, Interruption> {
    tokio::pin!(operation);
    loop {
        tokio::select! {
            output = &mut operation => return Ok(output),
            command = commands.recv() => match command {
                Some(SessionCommand::SendMessage(_)) => {
                    notify(events, SessionEvent::SendRejected(PublishError::NotConnected.to_string())).await;
                }
                Some(SessionCommand::Leave) => return Err(Interruption::Leave),
                Some(other) => return Err(Interruption::Replace(other)),
                None => return Err(Interruption::Shutdown),
            },
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
