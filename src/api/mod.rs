//! Message transport: REST calls and stream opening against the admin backend

pub mod client;

use async_trait::async_trait;

use crate::error::{Result, TransportError};
use crate::stream::StreamChannel;
use crate::types::{
    ChatRequest, ChatResponse, Conversation, ConversationId, HallId, MessageRecord,
};

pub use client::ApiClient;

/// Filters for the conversation list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationQuery {
    pub page: u32,
    pub limit: u32,
    pub hall_id: Option<HallId>,
}

/// Filters for the message list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
    pub conversation_id: ConversationId,
    pub page: u32,
    pub limit: u32,
}

/// Everything the chat subsystem needs from the backend.
///
/// `ApiClient` is the HTTP implementation; tests substitute in-memory fakes.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `GET /conversations?page=&limit=&hallId=`
    async fn list_conversations(
        &self,
        query: ConversationQuery,
    ) -> std::result::Result<Vec<Conversation>, TransportError>;

    /// `GET /conversations/{id}/messages?page=&limit=`
    async fn list_messages(
        &self,
        query: MessageQuery,
    ) -> std::result::Result<Vec<MessageRecord>, TransportError>;

    /// `POST /chat`
    async fn send_chat(
        &self,
        request: &ChatRequest,
    ) -> std::result::Result<ChatResponse, TransportError>;

    /// Open the push channel named by a chat response's `streamUrl`
    fn open_stream(&self, stream_url: &str) -> Result<StreamChannel>;
}
