//! In-memory doubles for the gateway and the history service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;

use crate::common::{ChatMessage, ConnectionState, RoomId, UserId};
use crate::error::{ConnectError, DirectoryError, HistoryLoadError, SendError};
use crate::network::history::{HistoryService, RoomDirectory};
use crate::network::stomp::{Command, Frame};
use crate::network::transport::{Gateway, Inbound, Transport};

pub fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

pub fn room(id: &str) -> RoomId {
    RoomId::new(id).unwrap()
}

/// A stored message with a deterministic timestamp (`minute` past noon).
pub fn stored(sender: &str, content: &str, room_id: &str, minute: u32) -> ChatMessage {
    ChatMessage {
        sender: user(sender),
        content: content.to_string(),
        room_id: room(room_id),
        timestamp: Utc.with_ymd_and_hms(2024, 3, 3, 12, minute, 0).unwrap(),
    }
}

pub fn message_frame(subscription: &str, destination: &str, body: &str) -> Frame {
    Frame::new(Command::Message)
        .header("subscription", subscription)
        .header("destination", destination)
        .header("message-id", "1")
        .with_body(body)
}

enum ConnectPlan {
    Fail(ConnectError),
    Hang,
}

#[derive(Default)]
struct GatewayState {
    opened: usize,
    disconnects: usize,
    abandoned: usize,
    sent: Vec<Frame>,
    connect_plan: VecDeque<ConnectPlan>,
    live: Option<mpsc::Sender<Frame>>,
    live_id: usize,
    state: ConnectionState,
}

/// Gateway whose transports record every frame and whose inbound queue the
/// test feeds directly.
#[derive(Clone, Default)]
pub struct FakeGateway {
    shared: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connect(&self, err: ConnectError) {
        self.shared.lock().unwrap().connect_plan.push_back(ConnectPlan::Fail(err));
    }

    /// The next connect never completes; only dropping it ends the attempt.
    pub fn hang_next_connect(&self) {
        self.shared.lock().unwrap().connect_plan.push_back(ConnectPlan::Hang);
    }

    /// Transports dropped while their connect was still in flight.
    pub fn abandoned_connects(&self) -> usize {
        self.shared.lock().unwrap().abandoned
    }

    pub fn sent(&self, command: Command) -> Vec<Frame> {
        self.shared
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|frame| frame.command == command)
            .cloned()
            .collect()
    }

    pub fn opened(&self) -> usize {
        self.shared.lock().unwrap().opened
    }

    pub fn disconnects(&self) -> usize {
        self.shared.lock().unwrap().disconnects
    }

    pub fn transport_state(&self) -> ConnectionState {
        self.shared.lock().unwrap().state
    }

    /// Pushes a frame into the live connection; false when there is none.
    pub fn deliver(&self, frame: Frame) -> bool {
        let sender = self.shared.lock().unwrap().live.clone();
        match sender {
            Some(sender) => sender.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Fans a message out on the most recent subscription, like the gateway
    /// does after a publish.
    pub fn echo(&self, sender: &str, content: &str, room_id: &str) -> bool {
        let subscription = {
            let shared = self.shared.lock().unwrap();
            shared
                .sent
                .iter()
                .rev()
                .find(|frame| frame.command == Command::Subscribe)
                .and_then(|frame| Some((frame.get("id")?.to_string(), frame.get("destination")?.to_string())))
        };
        let Some((id, destination)) = subscription else {
            return false;
        };
        let body = serde_json::json!({
            "sender": sender,
            "content": content,
            "roomId": room_id,
            "timestamp": "2024-03-03T12:30:00",
        });
        self.deliver(message_frame(&id, &destination, &body.to_string()))
    }

    /// Simulates the socket dying underneath the live transport.
    pub fn drop_connection(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.live = None;
        shared.state = ConnectionState::Disconnected;
    }
}

impl Gateway for FakeGateway {
    type Transport = FakeTransport;

    fn open(&self) -> FakeTransport {
        let mut shared = self.shared.lock().unwrap();
        shared.opened += 1;
        FakeTransport {
            shared: self.shared.clone(),
            id: shared.opened,
            state: ConnectionState::Disconnected,
        }
    }
}

pub struct FakeTransport {
    shared: Arc<Mutex<GatewayState>>,
    id: usize,
    state: ConnectionState,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<Inbound, ConnectError> {
        let plan = self.shared.lock().unwrap().connect_plan.pop_front();
        match plan {
            Some(ConnectPlan::Hang) => {
                self.state = ConnectionState::Connecting;
                self.shared.lock().unwrap().state = ConnectionState::Connecting;
                return std::future::pending().await;
            }
            Some(ConnectPlan::Fail(err)) => {
                self.state = ConnectionState::Failed;
                self.shared.lock().unwrap().state = ConnectionState::Failed;
                return Err(err);
            }
            None => {}
        }

        let mut shared = self.shared.lock().unwrap();
        let (tx, rx) = mpsc::channel(64);
        shared.live = Some(tx);
        shared.live_id = self.id;
        shared.state = ConnectionState::Connected;
        self.state = ConnectionState::Connected;
        Ok(Inbound::new(rx))
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), SendError> {
        if !self.state().is_connected() {
            return Err(SendError::NotConnected);
        }
        self.shared.lock().unwrap().sent.push(frame);
        Ok(())
    }

    async fn disconnect(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        if self.state != ConnectionState::Disconnected {
            shared.disconnects += 1;
        }
        if shared.live_id == self.id {
            shared.live = None;
            shared.state = ConnectionState::Disconnected;
        }
        self.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        let shared = self.shared.lock().unwrap();
        let still_live = shared.live_id == self.id && shared.live.is_some();
        if self.state.is_connected() && !still_live {
            ConnectionState::Disconnected
        } else {
            self.state
        }
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        if let Ok(mut shared) = self.shared.lock() {
            shared.abandoned += 1;
            shared.state = ConnectionState::Disconnected;
        }
    }
}

#[derive(Clone)]
pub enum HistoryBehavior {
    Messages(Vec<ChatMessage>),
    Status(u16),
    NotFound,
    /// Never answers; only cancellation ends the fetch.
    Hang,
}

#[derive(Clone)]
pub struct FakeHistory {
    behavior: Arc<Mutex<HistoryBehavior>>,
    fetches: Arc<AtomicUsize>,
    created: Arc<Mutex<Vec<RoomId>>>,
    hang_creates: Arc<AtomicBool>,
}

impl FakeHistory {
    pub fn new(behavior: HistoryBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            fetches: Arc::new(AtomicUsize::new(0)),
            created: Arc::new(Mutex::new(Vec::new())),
            hang_creates: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self::new(HistoryBehavior::Messages(messages))
    }

    pub fn set(&self, behavior: HistoryBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Room creation requests stop answering from now on.
    pub fn hang_creates(&self) {
        self.hang_creates.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<RoomId> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryService for FakeHistory {
    async fn fetch_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>, HistoryLoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            HistoryBehavior::Messages(messages) => Ok(messages),
            HistoryBehavior::Status(code) => Err(HistoryLoadError::Status(code)),
            HistoryBehavior::NotFound => Err(HistoryLoadError::RoomNotFound(room.clone())),
            HistoryBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl RoomDirectory for FakeHistory {
    async fn create_room(&self, room: &RoomId) -> Result<(), DirectoryError> {
        if self.hang_creates.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let mut created = self.created.lock().unwrap();
        if created.contains(room) {
            return Err(DirectoryError::AlreadyExists(room.clone()));
        }
        created.push(room.clone());
        Ok(())
    }
}
