//! Chat view controller
//!
//! Owns the UI-facing state of the chat: the message list, connection
//! status, whether the user may send, and the single active stream. It
//! orchestrates the transport, the stream reducer and the conversation
//! store. All mutation goes through `&mut self`, so there is no
//! interleaving; stream I/O runs on the channel's own task.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::messages::{MessageAction, MessageList, ReduceError};
use crate::api::ChatBackend;
use crate::context::{HallContext, Notifier};
use crate::error::{HallChatError, Result, TransportError, TransportErrorKind};
use crate::store::ConversationStore;
use crate::stream::{Reduction, StreamChannel, StreamReducer};
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ConversationId, HallId, MessageStatus};

pub const EMPTY_RESPONSE_MESSAGE: &str = "The assistant returned an empty response";
pub const CANCELLED_MESSAGE: &str = "Response cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Tunables for the controller
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub throttle: Duration,
    pub welcome_message: String,
}

/// Result of a submit once the transport has answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Synchronous reply, already finalized
    Completed { message_id: String },
    /// A stream is open; drive it with `pump` / `drive_stream`
    Streaming { message_id: String },
    /// The exchange failed; `message_id` carries the error
    Failed { message_id: String, error: String },
}

/// Result of one `pump` step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamProgress {
    /// Nothing is streaming
    Idle,
    /// Text accumulated but not yet rendered
    Buffered,
    /// New text rendered into the placeholder
    Rendered(String),
    /// Stream done; `tail` is the part of `text` never handed out as `Rendered`
    Finished { text: String, tail: String },
    Failed { error: String },
}

impl StreamProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamProgress::Idle | StreamProgress::Finished { .. } | StreamProgress::Failed { .. }
        )
    }
}

/// Status shown above the input box; always derived, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Streaming,
    Waiting,
    Connecting,
    Offline,
    Ready,
    Active { messages: usize, exchanges: usize },
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStatus::Streaming => write!(f, "Assistant is typing..."),
            ChatStatus::Waiting => write!(f, "Waiting for a reply..."),
            ChatStatus::Connecting => write!(f, "Connecting..."),
            ChatStatus::Offline => write!(f, "Offline - check your connection"),
            ChatStatus::Ready => write!(f, "Ready"),
            ChatStatus::Active {
                messages,
                exchanges,
            } => write!(f, "{} messages, {} exchanges", messages, exchanges),
        }
    }
}

struct ActiveStream {
    channel: StreamChannel,
    reducer: StreamReducer,
}

pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    store: ConversationStore,
    hall: Arc<dyn HallContext>,
    notifier: Arc<dyn Notifier>,
    options: ControllerOptions,

    messages: MessageList,
    view_tx: watch::Sender<MessageList>,

    conversation_id: Option<ConversationId>,
    connection: ConnectionStatus,
    can_send: bool,
    draft: String,
    active: Option<ActiveStream>,
}

impl ChatController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: ConversationStore,
        hall: Arc<dyn HallContext>,
        notifier: Arc<dyn Notifier>,
        options: ControllerOptions,
    ) -> Self {
        let messages = MessageList::from_messages(vec![ChatMessage::welcome(
            options.welcome_message.clone(),
        )]);
        let (view_tx, _) = watch::channel(messages.clone());

        Self {
            backend,
            store,
            hall,
            notifier,
            options,
            messages,
            view_tx,
            conversation_id: None,
            connection: ConnectionStatus::Connecting,
            can_send: true,
            draft: String::new(),
            active: None,
        }
    }

    // ═══════════════════════════════════════
    // READ-ONLY VIEW STATE
    // ═══════════════════════════════════════

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    /// Receive a snapshot after every applied message action
    pub fn subscribe(&self) -> watch::Receiver<MessageList> {
        self.view_tx.subscribe()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation_id
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn can_send(&self) -> bool {
        self.can_send && self.active.is_none() && self.connection == ConnectionStatus::Connected
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Derived from streaming presence, connection status and message counts
    pub fn status(&self) -> ChatStatus {
        if self.messages.streaming().is_some() {
            return ChatStatus::Streaming;
        }
        match self.connection {
            ConnectionStatus::Connecting => ChatStatus::Connecting,
            ConnectionStatus::Disconnected => ChatStatus::Offline,
            ConnectionStatus::Connected if !self.can_send => ChatStatus::Waiting,
            ConnectionStatus::Connected => {
                let exchanges = self.messages.as_slice().iter().filter(|m| m.is_user()).count();
                if exchanges == 0 {
                    ChatStatus::Ready
                } else {
                    ChatStatus::Active {
                        messages: self.messages.len(),
                        exchanges,
                    }
                }
            }
        }
    }

    pub fn status_line(&self) -> String {
        self.status().to_string()
    }

    // ═══════════════════════════════════════
    // CONNECTION
    // ═══════════════════════════════════════

    /// Load the conversation list for the active hall; success marks us connected
    pub async fn connect(&mut self) -> Result<()> {
        self.connection = ConnectionStatus::Connecting;
        match self.store.load_conversations(self.hall.active_hall_id()).await {
            Ok(list) => {
                self.connection = ConnectionStatus::Connected;
                info!(conversations = list.len(), "Chat connected");
                Ok(())
            }
            Err(e) => {
                self.note_transport_failure(&e);
                if self.connection == ConnectionStatus::Connecting {
                    // Reachable but refused (auth, server error): still usable
                    self.connection = ConnectionStatus::Connected;
                }
                self.notifier.error(&e.to_user_string());
                Err(e)
            }
        }
    }

    pub async fn reconnect(&mut self) -> Result<()> {
        self.connect().await
    }

    fn note_transport_failure(&mut self, err: &HallChatError) {
        if let HallChatError::Transport(TransportError {
            kind: TransportErrorKind::Connectivity,
            ..
        }) = err
        {
            self.connection = ConnectionStatus::Disconnected;
        }
    }

    // ═══════════════════════════════════════
    // SENDING
    // ═══════════════════════════════════════

    /// Submit text scoped to the active hall
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome> {
        let hall_ids: Vec<HallId> = self.hall.active_hall_id().into_iter().collect();
        self.submit_with_halls(text, hall_ids).await
    }

    pub async fn submit_with_halls(
        &mut self,
        text: &str,
        hall_ids: Vec<HallId>,
    ) -> Result<SubmitOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(HallChatError::InvalidInput("message cannot be empty".into()));
        }
        if self.connection != ConnectionStatus::Connected {
            return Err(HallChatError::NotConnected);
        }
        if !self.can_send || self.active.is_some() || self.messages.streaming().is_some() {
            return Err(HallChatError::Busy);
        }

        let user = ChatMessage::outgoing(text, hall_ids.clone());
        let placeholder = ChatMessage::placeholder(hall_ids.clone());
        let user_id = user.id.clone();
        let placeholder_id = placeholder.id.clone();

        self.dispatch(MessageAction::Append(user))?;
        self.dispatch(MessageAction::Append(placeholder))?;
        self.can_send = false;
        self.draft.clear();

        let request = ChatRequest {
            message: text.to_string(),
            hall_ids,
            conversation_id: self.conversation_id,
        };
        debug!(message_id = %user_id, conversation_id = ?self.conversation_id, "Submitting chat message");

        match self.backend.send_chat(&request).await {
            Ok(response) => self.on_send_success(&user_id, &placeholder_id, response).await,
            Err(e) => self.on_send_failure(&user_id, &placeholder_id, e),
        }
    }

    fn on_send_failure(
        &mut self,
        user_id: &str,
        placeholder_id: &str,
        err: TransportError,
    ) -> Result<SubmitOutcome> {
        let message = err.user_message();
        warn!(message_id = %user_id, status = err.status, "Send failed");

        self.dispatch(MessageAction::Remove {
            id: placeholder_id.to_string(),
        })?;
        self.dispatch(MessageAction::Fail {
            id: user_id.to_string(),
            error: message.clone(),
        })?;

        self.note_transport_failure(&HallChatError::Transport(err));
        self.notifier.error(&message);
        self.can_send = true;

        Ok(SubmitOutcome::Failed {
            message_id: user_id.to_string(),
            error: message,
        })
    }

    async fn on_send_success(
        &mut self,
        user_id: &str,
        placeholder_id: &str,
        response: ChatResponse,
    ) -> Result<SubmitOutcome> {
        self.connection = ConnectionStatus::Connected;
        self.dispatch(MessageAction::UpdateStatus {
            id: user_id.to_string(),
            status: MessageStatus::Sent,
        })?;

        if self.conversation_id.is_none() {
            if let Some(id) = response.conversation_id {
                info!(conversation_id = id, "Conversation created");
                self.conversation_id = Some(id);
                self.store.note_activity(id, Utc::now());
            }
        }

        if let Some(stream_url) = response.stream_url.as_deref() {
            self.close_channel();
            return match self.backend.open_stream(stream_url) {
                Ok(channel) => {
                    debug!(message_id = %placeholder_id, channel = %channel.label(), "Streaming reply");
                    self.active = Some(ActiveStream {
                        channel,
                        reducer: StreamReducer::new(placeholder_id, self.options.throttle),
                    });
                    Ok(SubmitOutcome::Streaming {
                        message_id: placeholder_id.to_string(),
                    })
                }
                Err(e) => {
                    let error = e.to_user_string();
                    warn!(message_id = %placeholder_id, error = %e, "Failed to open stream");
                    let applied = self.dispatch(MessageAction::Fail {
                        id: placeholder_id.to_string(),
                        error: error.clone(),
                    });
                    self.finish_exchange().await;
                    applied?;
                    Ok(SubmitOutcome::Failed {
                        message_id: placeholder_id.to_string(),
                        error,
                    })
                }
            };
        }

        // No stream offered: the synchronous payload is the whole answer
        let action = if response.explanation.is_some() || response.url.is_some() {
            MessageAction::Finalize {
                id: placeholder_id.to_string(),
                text: response.explanation.unwrap_or_default(),
                chart_url: response.url,
            }
        } else {
            MessageAction::Fail {
                id: placeholder_id.to_string(),
                error: EMPTY_RESPONSE_MESSAGE.to_string(),
            }
        };
        let failed = matches!(action, MessageAction::Fail { .. });
        let applied = self.dispatch(action);
        self.finish_exchange().await;
        applied?;

        if failed {
            Ok(SubmitOutcome::Failed {
                message_id: placeholder_id.to_string(),
                error: EMPTY_RESPONSE_MESSAGE.to_string(),
            })
        } else {
            Ok(SubmitOutcome::Completed {
                message_id: placeholder_id.to_string(),
            })
        }
    }

    /// Re-send a failed message: a failed user message is sent again, a
    /// failed assistant reply re-sends the user message before it
    pub async fn retry(&mut self, message_id: &str) -> Result<SubmitOutcome> {
        let slice = self.messages.as_slice();
        let idx = slice
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| HallChatError::InvalidInput(format!("unknown message {}", message_id)))?;

        let failed = &slice[idx];
        if !failed.is_failed() {
            return Err(HallChatError::InvalidInput(
                "only failed messages can be retried".into(),
            ));
        }

        let source = if failed.is_user() {
            failed
        } else {
            slice[..idx]
                .iter()
                .rev()
                .find(|m| m.is_user())
                .ok_or_else(|| {
                    HallChatError::InvalidInput("no user message to resend".into())
                })?
        };

        let text = source.message.clone();
        let hall_ids = source.hall_ids.clone();
        self.submit_with_halls(&text, hall_ids).await
    }

    /// Retry the most recent failed message, if any
    pub async fn retry_last(&mut self) -> Result<Option<SubmitOutcome>> {
        let last_failed = self
            .messages
            .as_slice()
            .iter()
            .rev()
            .find(|m| m.is_failed())
            .map(|m| m.id.clone());

        match last_failed {
            Some(id) => self.retry(&id).await.map(Some),
            None => Ok(None),
        }
    }

    // ═══════════════════════════════════════
    // STREAMING
    // ═══════════════════════════════════════

    /// Wait for the next stream event and apply it
    pub async fn pump(&mut self) -> Result<StreamProgress> {
        let Some(active) = self.active.as_mut() else {
            return Ok(StreamProgress::Idle);
        };

        let shown_before = active.reducer.rendered_len();
        let reduction = if active.reducer.pending().is_empty() {
            match active.channel.recv().await {
                Some(item) => active.reducer.apply(item, Instant::now()),
                None => active.reducer.end_of_channel(),
            }
        } else {
            // Buffered text waits at most one throttle window for a render
            let window = active.reducer.throttle_interval();
            tokio::select! {
                item = active.channel.recv() => match item {
                    Some(item) => active.reducer.apply(item, Instant::now()),
                    None => active.reducer.end_of_channel(),
                },
                _ = tokio::time::sleep(window) => active.reducer.flush(Instant::now()),
            }
        };
        let message_id = active.reducer.message_id().to_string();
        let events = active.reducer.event_count();

        match reduction {
            Reduction::Buffered | Reduction::Ignored => Ok(StreamProgress::Buffered),
            Reduction::Render(chunk) => {
                self.dispatch(MessageAction::AppendStreamChunk {
                    id: message_id,
                    chunk: chunk.clone(),
                })?;
                Ok(StreamProgress::Rendered(chunk))
            }
            Reduction::Finished(text) => {
                info!(message_id = %message_id, events, chars = text.len(), "Stream complete");
                let tail = text.get(shown_before..).unwrap_or_default().to_string();
                let applied = self.dispatch(MessageAction::Finalize {
                    id: message_id,
                    text: text.clone(),
                    chart_url: None,
                });
                self.finish_exchange().await;
                applied?;
                Ok(StreamProgress::Finished { text, tail })
            }
            Reduction::Failed(error) => {
                warn!(message_id = %message_id, events, error = %error, "Stream failed");
                let applied = self.dispatch(MessageAction::Fail {
                    id: message_id,
                    error: error.clone(),
                });
                self.finish_exchange().await;
                applied?;
                Ok(StreamProgress::Failed { error })
            }
        }
    }

    /// Pump until the active stream reaches a terminal state
    pub async fn drive_stream(&mut self) -> Result<StreamProgress> {
        loop {
            let progress = self.pump().await?;
            if progress.is_terminal() {
                return Ok(progress);
            }
        }
    }

    /// Stop the active stream; the placeholder is marked failed
    pub async fn cancel_stream(&mut self) -> Result<bool> {
        if self.active.is_none() {
            return Ok(false);
        }
        self.close_stream();
        self.finish_exchange().await;
        Ok(true)
    }

    fn close_channel(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.channel.close();
        }
    }

    /// Close the channel and fail every message still in flight, so no
    /// placeholder outlives its stream
    fn close_stream(&mut self) {
        self.close_channel();

        let in_flight: Vec<String> = self
            .messages
            .as_slice()
            .iter()
            .filter(|m| m.is_streaming || m.status == Some(MessageStatus::Sending))
            .map(|m| m.id.clone())
            .collect();
        for id in in_flight {
            if let Err(e) = self.dispatch(MessageAction::Fail {
                id: id.clone(),
                error: CANCELLED_MESSAGE.to_string(),
            }) {
                warn!(message_id = %id, error = %e, "Could not fail in-flight message");
            }
        }
        self.can_send = true;
    }

    /// Re-enable sending and bring the conversation list up to date
    async fn finish_exchange(&mut self) {
        self.close_channel();
        self.can_send = true;

        let Some(conversation_id) = self.conversation_id else {
            return;
        };
        if let Err(e) = self.store.refresh_conversations().await {
            warn!(conversation_id, error = %e, "Conversation refresh failed");
            self.store.note_activity(conversation_id, Utc::now());
        }
    }

    // ═══════════════════════════════════════
    // CONVERSATIONS
    // ═══════════════════════════════════════

    /// Discard the current thread and start over with the welcome message
    pub fn new_conversation(&mut self) {
        self.close_channel();
        self.conversation_id = None;
        self.draft.clear();
        self.can_send = true;
        self.replace_messages(vec![ChatMessage::welcome(
            self.options.welcome_message.clone(),
        )]);
        debug!("Started new conversation");
    }

    /// Load an existing conversation into the view
    pub async fn open_conversation(&mut self, conversation_id: ConversationId) -> Result<usize> {
        self.close_stream();

        match self.store.load_messages(conversation_id).await {
            Ok(messages) => {
                self.conversation_id = Some(conversation_id);
                self.replace_messages(messages.as_ref().clone());
                Ok(self.messages.len())
            }
            Err(e) => {
                self.note_transport_failure(&e);
                self.notifier.error(&e.to_user_string());
                Err(e)
            }
        }
    }

    /// Close any open stream and fail its placeholder. Called on navigation
    /// away and logout.
    pub fn teardown(&mut self) {
        self.close_stream();
    }

    // ═══════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════

    fn dispatch(&mut self, action: MessageAction) -> std::result::Result<(), ReduceError> {
        let next = self.messages.apply(action)?;
        self.messages = next;
        self.view_tx.send_replace(self.messages.clone());
        Ok(())
    }

    fn replace_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = MessageList::from_messages(messages);
        self.view_tx.send_replace(self.messages.clone());
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.close_channel();
    }
}
