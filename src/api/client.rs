//! HTTP implementation of `ChatBackend`
//!
//! Turns every network or HTTP failure into a single `TransportError` at
//! this boundary. Sends are not retried unless a retry budget is configured.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{ChatBackend, ConversationQuery, MessageQuery};
use crate::config::ChatSettings;
use crate::error::{Result, TransportError};
use crate::stream::StreamChannel;
use crate::types::{ChatRequest, ChatResponse, Conversation, MessageRecord, Page};

const MAX_BACKOFF_MS: u64 = 8_000;

/// REST client for the hall admin API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
    send_retries: u32,
}

impl ApiClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_token: None,
            send_retries: 0,
        }
    }

    pub fn from_settings(settings: &ChatSettings) -> Self {
        Self::new(settings.base_url.clone())
            .with_token(settings.api_token.clone())
            .with_send_retries(settings.send_retries)
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.api_token = token;
        self
    }

    pub fn with_send_retries(mut self, retries: u32) -> Self {
        self.send_retries = retries;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::invalid_request(format!("bad endpoint {}: {}", path, e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
    ) -> std::result::Result<T, TransportError> {
        let response = self.authorize(self.http.get(url)).send().await?;
        decode(response).await
    }

    async fn post_chat(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatResponse, TransportError> {
        let url = self.endpoint("chat")?;
        let response = self
            .authorize(self.http.post(url))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }
}

/// Check status, then parse the body as JSON
async fn decode<T: DeserializeOwned>(
    response: reqwest::Response,
) -> std::result::Result<T, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::from_status(status.as_u16(), body));
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(500).collect();
        TransportError::decode(status.as_u16(), format!("{}. Response preview: {}", e, preview))
    })
}

/// Exponential backoff for configured send retries
fn backoff(attempt: u32) -> Duration {
    let ms = 500u64.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

#[async_trait]
impl ChatBackend for ApiClient {
    #[instrument(skip(self), fields(page = query.page, hall_id = ?query.hall_id))]
    async fn list_conversations(
        &self,
        query: ConversationQuery,
    ) -> std::result::Result<Vec<Conversation>, TransportError> {
        let mut url = self.endpoint("conversations")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page", &query.page.to_string());
            pairs.append_pair("limit", &query.limit.to_string());
            if let Some(hall_id) = query.hall_id {
                pairs.append_pair("hallId", &hall_id.to_string());
            }
        }

        let page: Page<Conversation> = self.get_json(url).await?;
        debug!(count = page.data.len(), "Conversations fetched");
        Ok(page.data)
    }

    #[instrument(skip(self), fields(conversation_id = query.conversation_id, page = query.page))]
    async fn list_messages(
        &self,
        query: MessageQuery,
    ) -> std::result::Result<Vec<MessageRecord>, TransportError> {
        let mut url = self.endpoint(&format!("conversations/{}/messages", query.conversation_id))?;
        url.query_pairs_mut()
            .append_pair("page", &query.page.to_string())
            .append_pair("limit", &query.limit.to_string());

        let page: Page<MessageRecord> = self.get_json(url).await?;
        debug!(count = page.data.len(), "Messages fetched");
        Ok(page.data)
    }

    #[instrument(skip(self, request), fields(conversation_id = ?request.conversation_id, hall_count = request.hall_ids.len()))]
    async fn send_chat(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            match self.post_chat(request).await {
                Ok(response) => {
                    info!(
                        streaming = response.stream_url.is_some(),
                        conversation_id = ?response.conversation_id,
                        "Chat request accepted"
                    );
                    return Ok(response);
                }
                Err(e) if e.kind.is_transient() && attempt < self.send_retries => {
                    attempt += 1;
                    let delay = backoff(attempt);
                    warn!(
                        status = e.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Chat request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(status = e.status, kind = ?e.kind, error = %e.detail, "Chat request failed");
                    return Err(e);
                }
            }
        }
    }

    fn open_stream(&self, stream_url: &str) -> Result<StreamChannel> {
        // Absolute urls replace the base; relative ones resolve against it
        let url = self.base_url.join(stream_url)?;
        StreamChannel::open(&self.http, url, self.api_token.as_deref())
    }
}
