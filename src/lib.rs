//! Client core for single-room realtime chat over a STOMP/WebSocket gateway.

pub mod chat;
pub mod common;
pub mod config;
pub mod console;
pub mod error;
pub mod network;
pub mod ui;

#[cfg(test)]
mod testing;
