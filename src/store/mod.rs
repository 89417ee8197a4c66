//! Conversation store
//!
//! Read-through cache of the conversation list and of the messages of the
//! conversation last loaded. Lists are only ever replaced wholesale.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ChatBackend, ConversationQuery, MessageQuery};
use crate::error::Result;
use crate::types::{ChatMessage, Conversation, ConversationId, HallId};

/// Loading indicators, readable while a load is in flight
#[derive(Debug, Clone, Default)]
pub struct LoadingState {
    conversations: Arc<AtomicBool>,
    messages: Arc<AtomicBool>,
}

impl LoadingState {
    pub fn is_loading_conversations(&self) -> bool {
        self.conversations.load(Ordering::SeqCst)
    }

    pub fn is_loading_messages(&self) -> bool {
        self.messages.load(Ordering::SeqCst)
    }
}

/// Resets a loading flag when dropped, so success, error and
/// cancellation all leave the store idle
struct LoadingGuard(Arc<AtomicBool>);

impl LoadingGuard {
    fn set(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(Arc::clone(flag))
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ConversationStore {
    backend: Arc<dyn ChatBackend>,
    conversation_page_size: u32,
    message_page_size: u32,

    conversations: Arc<Vec<Conversation>>,
    messages: Arc<Vec<ChatMessage>>,

    loading: LoadingState,

    last_conversation_query: Option<ConversationQuery>,
    last_message_query: Option<MessageQuery>,
}

impl ConversationStore {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        conversation_page_size: u32,
        message_page_size: u32,
    ) -> Self {
        Self {
            backend,
            conversation_page_size,
            message_page_size,
            conversations: Arc::new(Vec::new()),
            messages: Arc::new(Vec::new()),
            loading: LoadingState::default(),
            last_conversation_query: None,
            last_message_query: None,
        }
    }

    pub fn conversations(&self) -> Arc<Vec<Conversation>> {
        Arc::clone(&self.conversations)
    }

    pub fn messages(&self) -> Arc<Vec<ChatMessage>> {
        Arc::clone(&self.messages)
    }

    pub fn is_loading_conversations(&self) -> bool {
        self.loading.is_loading_conversations()
    }

    pub fn is_loading_messages(&self) -> bool {
        self.loading.is_loading_messages()
    }

    /// Shared handle for a view that polls loading state during a load
    pub fn loading(&self) -> LoadingState {
        self.loading.clone()
    }

    /// Conversation id of the last message query
    pub fn loaded_conversation(&self) -> Option<ConversationId> {
        self.last_message_query.map(|q| q.conversation_id)
    }

    /// Fetch page 1 of conversations for `hall_id` and replace the list
    pub async fn load_conversations(
        &mut self,
        hall_id: Option<HallId>,
    ) -> Result<Arc<Vec<Conversation>>> {
        let query = ConversationQuery {
            page: 1,
            limit: self.conversation_page_size,
            hall_id,
        };
        self.run_conversation_query(query).await
    }

    /// Re-issue the last conversation query with the same filters
    pub async fn refresh_conversations(&mut self) -> Result<Arc<Vec<Conversation>>> {
        let query = self.last_conversation_query.unwrap_or(ConversationQuery {
            page: 1,
            limit: self.conversation_page_size,
            hall_id: None,
        });
        self.run_conversation_query(query).await
    }

    async fn run_conversation_query(
        &mut self,
        query: ConversationQuery,
    ) -> Result<Arc<Vec<Conversation>>> {
        self.last_conversation_query = Some(query);

        let guard = LoadingGuard::set(&self.loading.conversations);
        let fetched = self.backend.list_conversations(query).await;
        drop(guard);

        let conversations = fetched?;
        debug!(count = conversations.len(), hall_id = ?query.hall_id, "Conversation list replaced");
        self.conversations = Arc::new(conversations);
        Ok(self.conversations())
    }

    /// Fetch a conversation's messages as chronological display messages
    pub async fn load_messages(
        &mut self,
        conversation_id: ConversationId,
    ) -> Result<Arc<Vec<ChatMessage>>> {
        let query = MessageQuery {
            conversation_id,
            page: 1,
            limit: self.message_page_size,
        };
        self.run_message_query(query).await
    }

    /// Re-issue the last message query; no-op if nothing was loaded yet
    pub async fn refresh_messages(&mut self) -> Result<Arc<Vec<ChatMessage>>> {
        match self.last_message_query {
            Some(query) => self.run_message_query(query).await,
            None => Ok(self.messages()),
        }
    }

    async fn run_message_query(&mut self, query: MessageQuery) -> Result<Arc<Vec<ChatMessage>>> {
        self.last_message_query = Some(query);

        let guard = LoadingGuard::set(&self.loading.messages);
        let fetched = self.backend.list_messages(query).await;
        drop(guard);

        let records = fetched?;
        let mut messages: Vec<ChatMessage> = records
            .into_iter()
            .flat_map(|record| record.into_display_messages())
            .collect();
        // stable: a user prompt stays ahead of its reply on equal timestamps
        messages.sort_by_key(|m| m.timestamp);

        debug!(
            conversation_id = query.conversation_id,
            count = messages.len(),
            "Messages loaded"
        );
        self.messages = Arc::new(messages);
        Ok(self.messages())
    }

    /// Move (or insert) a conversation to the front after local activity
    pub fn note_activity(&mut self, conversation_id: ConversationId, at: DateTime<Utc>) {
        let mut next: Vec<Conversation> = Vec::with_capacity(self.conversations.len() + 1);
        let existing = self
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned();

        let mut touched = existing.unwrap_or_else(|| {
            warn!(conversation_id, "Activity on a conversation not in the cached list");
            Conversation {
                id: conversation_id,
                topic: None,
                last_message_at: None,
            }
        });
        touched.last_message_at = Some(at);

        next.push(touched);
        next.extend(
            self.conversations
                .iter()
                .filter(|c| c.id != conversation_id)
                .cloned(),
        );
        self.conversations = Arc::new(next);
    }

    /// Drop cached data, e.g. on logout
    pub fn clear(&mut self) {
        self.conversations = Arc::new(Vec::new());
        self.messages = Arc::new(Vec::new());
        self.last_conversation_query = None;
        self.last_message_query = None;
    }
}
