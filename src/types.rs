//! Shared data types for the chat subsystem
//!
//! Wire shapes for the REST endpoints and the event stream, plus the
//! display-side `ChatMessage` that the controller renders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Backend conversation id
pub type ConversationId = i64;

/// Venue id that scopes chat and analytics context
pub type HallId = i64;

// ═══════════════════════════════════════
// CONVERSATIONS
// ═══════════════════════════════════════

/// A persisted thread of chat exchanges tied to a hall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, alias = "last_message_at")]
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Paged list envelope used by every list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
}

/// One backend exchange: a user prompt paired with the assistant reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub assistant: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Chart attached to the assistant reply
    #[serde(default)]
    pub url: Option<String>,
}

impl MessageRecord {
    /// Split into display messages, skipping sides that are blank
    pub fn into_display_messages(self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(2);

        if let Some(text) = self.user.filter(|t| !t.trim().is_empty()) {
            out.push(ChatMessage {
                id: format!("{}-user", self.id),
                timestamp: self.created_at,
                status: Some(MessageStatus::Delivered),
                ..ChatMessage::new(MessageRole::User, text, Vec::new())
            });
        }

        if let Some(text) = self.assistant.filter(|t| !t.trim().is_empty()) {
            out.push(ChatMessage {
                id: format!("{}-assistant", self.id),
                timestamp: self.updated_at.unwrap_or(self.created_at),
                status: Some(MessageStatus::Delivered),
                chart_url: self.url,
                ..ChatMessage::new(MessageRole::Assistant, text, Vec::new())
            });
        }

        out
    }
}

// ═══════════════════════════════════════
// CHAT REQUEST / RESPONSE
// ═══════════════════════════════════════

/// Body of `POST /chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub hall_ids: Vec<HallId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// Response of `POST /chat`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    #[serde(default)]
    pub explanation: Option<String>,
    /// Chart url for synchronous answers
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
}

// ═══════════════════════════════════════
// DISPLAY MESSAGES
// ═══════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Delivery status of a message. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    /// Legal transitions: sending -> sent -> delivered, sending -> failed
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        use MessageStatus::*;
        matches!(
            (self, next),
            (Sending, Sent) | (Sending, Delivered) | (Sending, Failed) | (Sent, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Delivered | MessageStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Failed => "failed",
        }
    }
}

/// A message as displayed in the chat view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Client-generated id
    pub id: String,
    pub message: String,
    pub hall_ids: Vec<HallId>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_url: Option<String>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, message: impl Into<String>, hall_ids: Vec<HallId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message: message.into(),
            hall_ids,
            timestamp: Utc::now(),
            role,
            status: None,
            is_streaming: false,
            streaming_content: None,
            error: None,
            chart_url: None,
        }
    }

    /// Optimistic user message awaiting server confirmation
    pub fn outgoing(message: impl Into<String>, hall_ids: Vec<HallId>) -> Self {
        Self {
            status: Some(MessageStatus::Sending),
            ..Self::new(MessageRole::User, message, hall_ids)
        }
    }

    /// Assistant placeholder filled in by the stream
    pub fn placeholder(hall_ids: Vec<HallId>) -> Self {
        Self {
            status: Some(MessageStatus::Sending),
            is_streaming: true,
            streaming_content: Some(String::new()),
            ..Self::new(MessageRole::Assistant, String::new(), hall_ids)
        }
    }

    /// Greeting shown at the top of a fresh conversation
    pub fn welcome(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text, Vec::new())
    }

    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    pub fn is_failed(&self) -> bool {
        self.status == Some(MessageStatus::Failed)
    }

    /// Text to render: the partial stream while streaming, the final text otherwise
    pub fn display_text(&self) -> &str {
        if self.is_streaming {
            self.streaming_content.as_deref().unwrap_or("")
        } else {
            &self.message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use MessageStatus::*;
        assert!(Sending.can_transition_to(Sent));
        assert!(Sending.can_transition_to(Delivered));
        assert!(Sending.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Delivered));

        assert!(!Delivered.can_transition_to(Sending));
        assert!(!Sent.can_transition_to(Sending));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Delivered.can_transition_to(Failed));
        assert!(!Sending.can_transition_to(Sending));
    }

    #[test]
    fn test_chat_request_serialize() {
        let req = ChatRequest {
            message: "Show revenue trends".into(),
            hall_ids: vec![3],
            conversation_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message"], "Show revenue trends");
        assert_eq!(json["hallIds"], serde_json::json!([3]));
        assert!(json.get("conversationId").is_none());
    }

    #[test]
    fn test_chat_response_deserialize() {
        let resp: ChatResponse =
            serde_json::from_str(r#"{"streamUrl":"/stream/abc","conversationId":42}"#).unwrap();
        assert_eq!(resp.stream_url.as_deref(), Some("/stream/abc"));
        assert_eq!(resp.conversation_id, Some(42));
        assert!(resp.explanation.is_none());
    }

    #[test]
    fn test_record_split_skips_blank_sides() {
        let record: MessageRecord = serde_json::from_str(
            r#"{"id":7,"user":"  ","assistant":"Revenue is up","created_at":"2024-05-01T10:00:00Z","updated_at":"2024-05-01T10:00:05Z"}"#,
        )
        .unwrap();
        let msgs = record.into_display_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, "7-assistant");
        assert_eq!(msgs[0].role, MessageRole::Assistant);
    }

    #[test]
    fn test_placeholder_shape() {
        let msg = ChatMessage::placeholder(vec![1, 2]);
        assert!(msg.is_streaming);
        assert_eq!(msg.status, Some(MessageStatus::Sending));
        assert_eq!(msg.display_text(), "");
        assert_eq!(msg.hall_ids, vec![1, 2]);
    }

    #[test]
    fn test_conversation_accepts_both_casings() {
        let a: Conversation =
            serde_json::from_str(r#"{"id":1,"lastMessageAt":"2024-05-01T10:00:00Z"}"#).unwrap();
        let b: Conversation =
            serde_json::from_str(r#"{"id":1,"last_message_at":"2024-05-01T10:00:00Z"}"#).unwrap();
        assert_eq!(a, b);
    }
}
