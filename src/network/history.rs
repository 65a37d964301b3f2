use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};

use crate::common::{ChatMessage, RoomId};
use crate::error::{DirectoryError, HistoryLoadError};

use super::channel::decode_record;

/// Source of the messages a room already holds.
#[async_trait]
pub trait HistoryService: Send + Sync {
    /// Oldest first.
    async fn fetch_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>, HistoryLoadError>;
}

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn create_room(&self, room: &RoomId) -> Result<(), DirectoryError>;
}

/// REST client for the chat backend's room endpoints.
#[derive(Debug, Clone)]
pub struct HttpRoomService {
    client: Client,
    base_url: Url,
    page_size: usize,
}

impl HttpRoomService {
    pub fn new(base_url: &str, page_size: usize, timeout: Duration) -> Result<Self, Box<dyn std::error::Error>> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(format!("`{base_url}` cannot be used as a base URL").into());
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            page_size,
        })
    }

    fn rooms_url(&self, extra: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "v1", "rooms"]).extend(extra);
        }
        url
    }
}

#[async_trait]
impl HistoryService for HttpRoomService {
    async fn fetch_history(&self, room: &RoomId) -> Result<Vec<ChatMessage>, HistoryLoadError> {
        let url = self.rooms_url(&[room.as_str(), "messages"]);
        log::info!("Fetching history for room {room}");

        let response = self
            .client
            .get(url)
            .query(&[("page", "0".to_string()), ("size", self.page_size.to_string())])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                return Err(HistoryLoadError::RoomNotFound(room.clone()));
            }
            status => return Err(HistoryLoadError::Status(status.as_u16())),
        }

        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|err| HistoryLoadError::Decode(err.to_string()))?;

        let received_at = Utc::now();
        let total = records.len();
        let messages: Vec<ChatMessage> = records
            .into_iter()
            .filter_map(|record| match decode_record(record, room, received_at) {
                Ok(message) => Some(message),
                Err(err) => {
                    log::warn!("Skipping history record in {room}: {err}");
                    None
                }
            })
            .collect();

        log::info!("Loaded {}/{} history messages for {room}", messages.len(), total);
        Ok(messages)
    }
}

#[async_trait]
impl RoomDirectory for HttpRoomService {
    async fn create_room(&self, room: &RoomId) -> Result<(), DirectoryError> {
        let response = self
            .client
            .post(self.rooms_url(&[]))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(room.as_str().to_string())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                log::info!("Created room {room}");
                Ok(())
            }
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => Err(DirectoryError::AlreadyExists(room.clone())),
            status => Err(DirectoryError::Status(status.as_u16())),
        }
    }
}
