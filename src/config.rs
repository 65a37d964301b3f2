use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chat::ReconnectPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
pub const GATEWAY_URL_ENV: &str = "CHAT_GATEWAY_URL";
pub const API_URL_ENV: &str = "CHAT_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway_url: String,
    pub api_base_url: String,
    pub history_page_size: usize,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://localhost:8080/chat/websocket".to_string(),
            api_base_url: "http://localhost:8080".to_string(),
            history_page_size: 50,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1_000,
            max_delay_ms: 32_000,
            max_attempts: 6,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        ReconnectPolicy {
            enabled: config.enabled,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_attempts: config.max_attempts,
        }
        .normalized()
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

/// Lets `CHAT_GATEWAY_URL` and `CHAT_API_URL` win over the file.
pub fn apply_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = non_blank(GATEWAY_URL_ENV) {
        log::info!("Gateway URL overridden by {GATEWAY_URL_ENV}");
        config.gateway_url = url;
    }
    if let Some(url) = non_blank(API_URL_ENV) {
        log::info!("API URL overridden by {API_URL_ENV}");
        config.api_base_url = url;
    }
}
