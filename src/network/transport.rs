use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::common::ConnectionState;
use crate::error::{ConnectError, SendError};

use super::stomp::{Command, Frame, is_heartbeat};

const INBOUND_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 64;
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Frames received on one connected transport session, in delivery order.
///
/// Handed out once per successful `connect`; yields `None` once the underlying
/// connection is gone and never restarts.
pub struct Inbound {
    frames: mpsc::Receiver<Frame>,
}

impl Inbound {
    pub fn new(frames: mpsc::Receiver<Frame>) -> Self {
        Self { frames }
    }

    /// Cancel safe: a frame is either returned or left in the queue.
    pub async fn next(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

/// One physical connection to the messaging gateway.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<Inbound, ConnectError>;

    async fn send_frame(&mut self, frame: Frame) -> Result<(), SendError>;

    /// Idempotent; always ends in `Disconnected`.
    async fn disconnect(&mut self);

    fn state(&self) -> ConnectionState;

    async fn send(&mut self, destination: &str, payload: String) -> Result<(), SendError> {
        self.send_frame(Frame::send(destination, payload)).await
    }
}

/// Opens fresh transport sessions, one per connect attempt.
pub trait Gateway: Send + Sync {
    type Transport: Transport;

    fn open(&self) -> Self::Transport;
}

#[derive(Debug, Clone)]
pub struct WsGateway {
    url: String,
    connect_timeout: Duration,
}

impl WsGateway {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

impl Gateway for WsGateway {
    type Transport = WsTransport;

    fn open(&self) -> WsTransport {
        WsTransport::new(self.url.clone(), self.connect_timeout)
    }
}

/// STOMP over WebSocket.
///
/// The socket lives in a pump task: outgoing frames go through a bounded
/// channel, incoming frames are pushed into the `Inbound` queue. The pump
/// ends when the socket closes or the outgoing side is dropped.
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
    state: ConnectionState,
    outgoing: Option<mpsc::Sender<String>>,
    alive: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(url: String, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
            state: ConnectionState::Disconnected,
            outgoing: None,
            alive: Arc::new(AtomicBool::new(false)),
            pump: None,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self) -> Result<Inbound, ConnectError> {
        self.disconnect().await;
        self.state = ConnectionState::Connecting;
        log::info!("Connecting to gateway {}", self.url);

        let socket = match tokio::time::timeout(self.connect_timeout, handshake(&self.url)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(err)) => {
                self.state = ConnectionState::Failed;
                return Err(err);
            }
            Err(_) => {
                self.state = ConnectionState::Failed;
                return Err(ConnectError::Unreachable(format!(
                    "no answer within {}ms",
                    self.connect_timeout.as_millis()
                )));
            }
        };

        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));

        self.pump = Some(tokio::spawn(pump(socket, out_rx, in_tx, alive.clone())));
        self.outgoing = Some(out_tx);
        self.alive = alive;
        self.state = ConnectionState::Connected;
        log::info!("Gateway session established");

        Ok(Inbound::new(in_rx))
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), SendError> {
        if !self.state().is_connected() {
            return Err(SendError::NotConnected);
        }
        let Some(outgoing) = &self.outgoing else {
            return Err(SendError::NotConnected);
        };
        log::debug!("-> {}", frame.command);
        outgoing
            .send(frame.encode())
            .await
            .map_err(|_| SendError::NotConnected)
    }

    async fn disconnect(&mut self) {
        if let Some(outgoing) = self.outgoing.take() {
            if self.state().is_connected() {
                let _ = outgoing.try_send(Frame::disconnect().encode());
            }
        }
        if let Some(mut pump) = self.pump.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut pump).await.is_err() {
                log::warn!("Gateway socket did not close in time; aborting");
                pump.abort();
            }
            log::info!("Disconnected from gateway {}", self.url);
        }
        self.alive.store(false, Ordering::Release);
        self.state = ConnectionState::Disconnected;
    }

    fn state(&self) -> ConnectionState {
        if self.state.is_connected() && !self.alive.load(Ordering::Acquire) {
            ConnectionState::Disconnected
        } else {
            self.state
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn handshake(url: &str) -> Result<WsStream, ConnectError> {
    let (mut socket, _response) = connect_async(url)
        .await
        .map_err(|err| ConnectError::Unreachable(err.to_string()))?;

    let host = host_of(url);
    socket
        .send(Message::Text(Frame::connect(&host).encode().into()))
        .await
        .map_err(|err| ConnectError::Unreachable(err.to_string()))?;

    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                if is_heartbeat(&text) {
                    continue;
                }
                let frame = Frame::decode(&text)
                    .map_err(|err| ConnectError::HandshakeRejected(err.to_string()))?;
                return match frame.command {
                    Command::Connected => Ok(socket),
                    Command::Error => Err(ConnectError::HandshakeRejected(
                        frame.get("message").unwrap_or("gateway refused").to_string(),
                    )),
                    other => Err(ConnectError::HandshakeRejected(format!(
                        "unexpected {other} frame"
                    ))),
                };
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ConnectError::HandshakeRejected(
                    "connection closed during handshake".to_string(),
                ));
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(ConnectError::Unreachable(err.to_string())),
        }
    }
}

async fn pump(
    socket: WsStream,
    mut outgoing: mpsc::Receiver<String>,
    inbound: mpsc::Sender<Frame>,
    alive: Arc<AtomicBool>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(text) => {
                    if let Err(err) = write.send(Message::Text(text.into())).await {
                        log::warn!("Gateway write failed: {err}");
                        break;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if is_heartbeat(&text) {
                        continue;
                    }
                    match Frame::decode(&text) {
                        Ok(frame) => {
                            log::debug!("<- {}", frame.command);
                            if inbound.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => log::warn!("Dropping undecodable frame: {err}"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    log::info!("Gateway closed the connection");
                    break;
                }
                Some(Err(err)) => {
                    log::warn!("Gateway read failed: {err}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    alive.store(false, Ordering::Release);
}

/// `host` header value: the authority part of the gateway URL.
fn host_of(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest).to_string()
}
