//! Configuration file support and resolved runtime settings

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{HallChatError, Result};
use crate::stream::DEFAULT_THROTTLE_MS;
use crate::types::HallId;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_CONVERSATION_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MESSAGE_PAGE_SIZE: u32 = 50;
pub const DEFAULT_WELCOME_MESSAGE: &str =
    "Hello! Ask me about bookings, revenue or expenses for your halls.";

/// Contents of ~/.hall-chat/config.toml
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// REST API base url, e.g. https://admin.example.com/api
    pub base_url: Option<String>,

    /// Bearer token sent with every request
    pub api_token: Option<String>,

    /// Active hall
    pub hall_id: Option<HallId>,

    /// Minimum interval between partial renders of a stream
    pub throttle_ms: Option<u64>,

    /// Automatic retries for failed sends (0 disables)
    pub send_retries: Option<u32>,

    pub conversation_page_size: Option<u32>,
    pub message_page_size: Option<u32>,
    pub welcome_message: Option<String>,
}

impl Config {
    /// Load config from ~/.hall-chat/config.toml
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load from an explicit path; missing or unreadable files yield defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Directory holding config, .env and REPL history
pub fn config_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".hall-chat")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Values supplied on the command line (or via env through clap)
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub hall_id: Option<HallId>,
    pub throttle_ms: Option<u64>,
    pub send_retries: Option<u32>,
}

/// Fully resolved settings for a chat session
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub base_url: url::Url,
    pub api_token: Option<String>,
    pub hall_id: Option<HallId>,
    pub throttle: Duration,
    pub send_retries: u32,
    pub conversation_page_size: u32,
    pub message_page_size: u32,
    pub welcome_message: String,
}

impl ChatSettings {
    /// Resolve: overrides > config file > defaults
    pub fn resolve(overrides: Overrides, config: Config) -> Result<Self> {
        let base = overrides
            .base_url
            .or(config.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let conversation_page_size = config
            .conversation_page_size
            .unwrap_or(DEFAULT_CONVERSATION_PAGE_SIZE);
        let message_page_size = config.message_page_size.unwrap_or(DEFAULT_MESSAGE_PAGE_SIZE);
        if conversation_page_size == 0 || message_page_size == 0 {
            return Err(HallChatError::Config("page sizes must be positive".into()));
        }

        Ok(Self {
            base_url: parse_base_url(&base)?,
            api_token: overrides.api_token.or(config.api_token),
            hall_id: overrides.hall_id.or(config.hall_id),
            throttle: Duration::from_millis(
                overrides
                    .throttle_ms
                    .or(config.throttle_ms)
                    .unwrap_or(DEFAULT_THROTTLE_MS),
            ),
            send_retries: overrides.send_retries.or(config.send_retries).unwrap_or(0),
            conversation_page_size,
            message_page_size,
            welcome_message: config
                .welcome_message
                .unwrap_or_else(|| DEFAULT_WELCOME_MESSAGE.to_string()),
        })
    }

    /// Defaults pointed at `base_url`, mostly for tests
    pub fn for_base_url(base_url: &str) -> Result<Self> {
        Self::resolve(
            Overrides {
                base_url: Some(base_url.to_string()),
                ..Default::default()
            },
            Config::default(),
        )
    }
}

/// Parse the base url, forcing a trailing slash so `join` appends segments
fn parse_base_url(raw: &str) -> Result<url::Url> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };
    let url = url::Url::parse(&with_slash)?;
    if url.cannot_be_a_base() {
        return Err(HallChatError::Config(format!("{} cannot be a base url", raw)));
    }
    Ok(url)
}
