use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{ChatMessage, RoomId, UserId};
use crate::error::{PayloadError, PublishError, SendError};

use super::stomp::{Command, Frame};
use super::transport::{Inbound, Transport};

pub fn topic_for(room: &RoomId) -> String {
    format!("/topic/room/{room}")
}

pub fn inbound_queue_for(room: &RoomId) -> String {
    format!("/app/sendMessage/{room}")
}

/// Active interest in one room's topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: String,
    room: RoomId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(ChatMessage),
    Rejected(PayloadError),
    /// The gateway sent an ERROR frame; it closes the connection right after.
    GatewayError(String),
    /// The transport session is gone.
    Closed,
}

/// Subscription to one room over one transport session.
///
/// Frames are pulled through [`RoomChannel::next_event`] by a single consumer.
/// After [`RoomChannel::unsubscribe`] returns, frames still queued for the old
/// subscription are dropped instead of delivered.
pub struct RoomChannel<T: Transport> {
    transport: T,
    inbound: Inbound,
    active: Option<SubscriptionHandle>,
}

impl<T: Transport> RoomChannel<T> {
    pub fn new(transport: T, inbound: Inbound) -> Self {
        Self {
            transport,
            inbound,
            active: None,
        }
    }

    pub async fn subscribe(&mut self, room: &RoomId) -> Result<SubscriptionHandle, SendError> {
        if let Some(previous) = self.active.clone() {
            self.unsubscribe(&previous).await;
        }

        let handle = SubscriptionHandle {
            id: format!("sub-{}", Uuid::new_v4()),
            room: room.clone(),
        };
        self.transport
            .send_frame(Frame::subscribe(&handle.id, &topic_for(room)))
            .await?;
        log::info!("Subscribed to {} as {}", topic_for(room), handle.id);

        self.active = Some(handle.clone());
        Ok(handle)
    }

    pub async fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        if self.active.as_ref() != Some(handle) {
            return;
        }
        self.active = None;
        if self.transport.state().is_connected() {
            if let Err(err) = self.transport.send_frame(Frame::unsubscribe(&handle.id)).await {
                log::debug!("Unsubscribe of {} not sent: {err}", handle.id);
            }
        }
    }

    pub async fn publish(&mut self, room: &RoomId, message: &ChatMessage) -> Result<(), PublishError> {
        if message.content.trim().is_empty() {
            return Err(PublishError::Malformed("content is empty"));
        }
        if message.sender.as_str().trim().is_empty() {
            return Err(PublishError::Malformed("sender is empty"));
        }
        if !self.transport.state().is_connected() {
            return Err(PublishError::NotConnected);
        }

        let payload = encode_payload(message)?;
        self.transport.send(&inbound_queue_for(room), payload).await?;
        Ok(())
    }

    /// Waits for the next frame addressed to the active subscription.
    pub async fn next_event(&mut self) -> ChannelEvent {
        loop {
            let Some(frame) = self.inbound.next().await else {
                return ChannelEvent::Closed;
            };

            match frame.command {
                Command::Message => {
                    let Some(active) = &self.active else {
                        continue;
                    };
                    if frame.get("subscription") != Some(active.id.as_str()) {
                        log::debug!("Dropping frame for inactive subscription");
                        continue;
                    }
                    return match decode_payload(&frame.body, &active.room, Utc::now()) {
                        Ok(message) => ChannelEvent::Message(message),
                        Err(err) => ChannelEvent::Rejected(err),
                    };
                }
                Command::Error => {
                    let reason = frame.get("message").unwrap_or(frame.body.as_str());
                    return ChannelEvent::GatewayError(reason.to_string());
                }
                other => log::debug!("Ignoring {other} frame"),
            }
        }
    }

    /// Unsubscribes, then disconnects the transport.
    pub async fn close(mut self) {
        if let Some(active) = self.active.clone() {
            self.unsubscribe(&active).await;
        }
        self.transport.disconnect().await;
    }
}

#[derive(Serialize)]
struct OutgoingPayload<'a> {
    sender: &'a str,
    content: &'a str,
    #[serde(rename = "roomId")]
    room_id: &'a str,
}

#[derive(Deserialize)]
struct IncomingPayload {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "roomId")]
    room_id: Option<String>,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
}

pub fn encode_payload(message: &ChatMessage) -> Result<String, PublishError> {
    serde_json::to_string(&OutgoingPayload {
        sender: message.sender.as_str(),
        content: &message.content,
        room_id: message.room_id.as_str(),
    })
    .map_err(|err| PublishError::Encode(err.to_string()))
}

/// Turns a gateway or history record into a `ChatMessage`.
///
/// The room the record was received for wins over its `roomId` field.
pub fn decode_payload(
    body: &str,
    room: &RoomId,
    received_at: DateTime<Utc>,
) -> Result<ChatMessage, PayloadError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|err| PayloadError::Json(err.to_string()))?;
    decode_record(value, room, received_at)
}

pub fn decode_record(
    value: serde_json::Value,
    room: &RoomId,
    received_at: DateTime<Utc>,
) -> Result<ChatMessage, PayloadError> {
    let payload: IncomingPayload =
        serde_json::from_value(value).map_err(|err| PayloadError::Json(err.to_string()))?;

    let sender = payload
        .sender
        .and_then(|sender| UserId::new(sender).ok())
        .ok_or(PayloadError::MissingField("sender"))?;
    let content = payload.content.ok_or(PayloadError::MissingField("content"))?;

    if let Some(claimed) = payload.room_id.as_deref() {
        if claimed != room.as_str() {
            log::debug!("Record claims room {claimed} but arrived for {room}");
        }
    }

    let timestamp = payload
        .timestamp
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    Ok(ChatMessage {
        sender,
        content,
        room_id: room.clone(),
        timestamp,
    })
}

/// RFC 3339, or a zone-less ISO date-time in the client's local zone.
///
/// The backend stamps messages with its wall clock and no offset.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::common::ConnectionState;
    use crate::network::transport::Gateway;
    use crate::testing::{FakeGateway, FakeTransport, message_frame};
    use crate::ui::components::chat_area::format_timestamp;

    fn room() -> RoomId {
        RoomId::new("R1").unwrap()
    }

    fn outgoing(content: &str) -> ChatMessage {
        ChatMessage {
            sender: UserId::new("alice").unwrap(),
            content: content.to_string(),
            room_id: room(),
            timestamp: Utc::now(),
        }
    }

    async fn connected_channel(gateway: &FakeGateway) -> RoomChannel<FakeTransport> {
        let mut transport = gateway.open();
        let inbound = transport.connect().await.unwrap();
        RoomChannel::new(transport, inbound)
    }

    #[tokio::test]
    async fn subscribe_targets_room_topic() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;

        let handle = channel.subscribe(&room()).await.unwrap();

        let sent = gateway.sent(Command::Subscribe);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("destination"), Some("/topic/room/R1"));
        assert_eq!(sent[0].get("id"), Some(handle.id()));
    }

    #[tokio::test]
    async fn publish_sends_json_to_inbound_queue() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;

        channel.publish(&room(), &outgoing("hello")).await.unwrap();

        let sent = gateway.sent(Command::Send);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("destination"), Some("/app/sendMessage/R1"));
        let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"sender": "alice", "content": "hello", "roomId": "R1"})
        );
    }

    #[tokio::test]
    async fn malformed_message_never_reaches_the_wire() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;

        let err = channel.publish(&room(), &outgoing(" \n ")).await.unwrap_err();

        assert!(matches!(err, PublishError::Malformed(_)));
        assert!(gateway.sent(Command::Send).is_empty());
    }

    #[tokio::test]
    async fn publish_after_connection_loss_is_not_connected() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        gateway.drop_connection();

        assert_eq!(
            channel.publish(&room(), &outgoing("hi")).await,
            Err(PublishError::NotConnected)
        );
    }

    #[tokio::test]
    async fn delivers_messages_for_active_subscription() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        channel.subscribe(&room()).await.unwrap();

        assert!(gateway.echo("bob", "hi", "R1"));

        match channel.next_event().await {
            ChannelEvent::Message(message) => {
                assert_eq!(message.sender.as_str(), "bob");
                assert_eq!(message.content, "hi");
                assert_eq!(message.room_id, room());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn frames_after_unsubscribe_are_dropped() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        let handle = channel.subscribe(&room()).await.unwrap();

        gateway.echo("bob", "late", "R1");
        channel.unsubscribe(&handle).await;
        channel.unsubscribe(&handle).await;
        gateway.drop_connection();

        assert_eq!(channel.next_event().await, ChannelEvent::Closed);
        assert_eq!(gateway.sent(Command::Unsubscribe).len(), 1);
    }

    #[tokio::test]
    async fn stale_subscription_frames_are_skipped() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        channel.subscribe(&room()).await.unwrap();

        gateway.deliver(message_frame("sub-old", "/topic/room/R1", r#"{"sender":"eve","content":"x"}"#));
        gateway.echo("bob", "fresh", "R1");

        match channel.next_event().await {
            ChannelEvent::Message(message) => assert_eq!(message.content, "fresh"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_not_delivered() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        let handle = channel.subscribe(&room()).await.unwrap();

        gateway.deliver(message_frame(handle.id(), "/topic/room/R1", r#"{"sender":"bob"}"#));

        assert_eq!(
            channel.next_event().await,
            ChannelEvent::Rejected(PayloadError::MissingField("content"))
        );
    }

    #[tokio::test]
    async fn error_frame_is_surfaced() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        channel.subscribe(&room()).await.unwrap();

        gateway.deliver(Frame::new(Command::Error).header("message", "room not found"));

        assert_eq!(
            channel.next_event().await,
            ChannelEvent::GatewayError("room not found".into())
        );
    }

    #[tokio::test]
    async fn close_unsubscribes_then_disconnects() {
        let gateway = FakeGateway::new();
        let mut channel = connected_channel(&gateway).await;
        channel.subscribe(&room()).await.unwrap();

        channel.close().await;

        assert_eq!(gateway.sent(Command::Unsubscribe).len(), 1);
        assert_eq!(gateway.disconnects(), 1);
        assert_eq!(gateway.transport_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn payload_ignores_unknown_fields_and_order() {
        let received = Utc::now();
        let message = decode_payload(
            r#"{"extra":1,"content":"hi","roomId":"R1","sender":"bob"}"#,
            &room(),
            received,
        )
        .unwrap();
        assert_eq!(message.content, "hi");
        assert_eq!(message.timestamp, received);
    }

    #[test]
    fn payload_requires_sender_and_content() {
        let now = Utc::now();
        assert_eq!(
            decode_payload(r#"{"content":"hi"}"#, &room(), now),
            Err(PayloadError::MissingField("sender"))
        );
        assert_eq!(
            decode_payload(r#"{"sender":null,"content":"hi"}"#, &room(), now),
            Err(PayloadError::MissingField("sender"))
        );
        assert_eq!(
            decode_payload(r#"{"sender":"bob"}"#, &room(), now),
            Err(PayloadError::MissingField("content"))
        );
        assert!(matches!(
            decode_payload("[1,2]", &room(), now),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn zone_less_backend_timestamps_are_local_wall_clock() {
        let now = Utc::now();
        let local = decode_payload(
            r#"{"sender":"bob","content":"hi","timestamp":"2024-03-03T14:30:00.123"}"#,
            &room(),
            now,
        )
        .unwrap();
        let expected = Local.with_ymd_and_hms(2024, 3, 3, 14, 30, 0).unwrap() + chrono::Duration::milliseconds(123);
        assert_eq!(local.timestamp, expected.with_timezone(&Utc));
        assert_eq!(format_timestamp(&local.timestamp.with_timezone(&Local)), "2:30 PM");

        let zoned = decode_payload(
            r#"{"sender":"bob","content":"hi","timestamp":"2024-03-03T14:30:00Z"}"#,
            &room(),
            now,
        )
        .unwrap();
        assert_eq!(zoned.timestamp, Utc.with_ymd_and_hms(2024, 3, 3, 14, 30, 0).unwrap());

        let array = decode_payload(
            r#"{"sender":"bob","content":"hi","timestamp":[2024,3,3,14,30]}"#,
            &room(),
            now,
        )
        .unwrap();
        assert_eq!(array.timestamp, now);
    }

    #[test]
    fn subscription_room_wins_over_payload_room() {
        let message = decode_payload(
            r#"{"sender":"bob","content":"hi","roomId":"elsewhere"}"#,
            &room(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(message.room_id, room());
    }
}
