pub mod channel;
pub mod client;
pub mod history;
pub mod stomp;
pub mod transport;

pub use client::ChatClient;
pub use history::{HistoryService, HttpRoomService, RoomDirectory};
pub use transport::{Gateway, WsGateway};
