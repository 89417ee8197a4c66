//! Message list reducer
//!
//! The chat view's messages live in an immutable list keyed by message id.
//! Every change goes through `MessageList::apply`, which returns a new list
//! or rejects the action and leaves the old one untouched.

use std::sync::Arc;

use thiserror::Error;

use crate::types::{ChatMessage, MessageStatus};

/// Closed set of mutations on the message list
#[derive(Debug, Clone, PartialEq)]
pub enum MessageAction {
    Append(ChatMessage),
    UpdateStatus {
        id: String,
        status: MessageStatus,
    },
    AppendStreamChunk {
        id: String,
        chunk: String,
    },
    /// Stream or synchronous reply completed
    Finalize {
        id: String,
        text: String,
        chart_url: Option<String>,
    },
    Fail {
        id: String,
        error: String,
    },
    /// Drop a transient placeholder
    Remove {
        id: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("message {0} already exists")]
    DuplicateId(String),

    #[error("message {0} not found")]
    UnknownId(String),

    #[error("illegal status transition for {id}: {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("message {existing} is already streaming")]
    AlreadyStreaming { existing: String },

    #[error("message {0} is not streaming")]
    NotStreaming(String),

    #[error("message {0} is not a transient placeholder")]
    NotRemovable(String),
}

/// Snapshot of the chat view's messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageList {
    messages: Arc<Vec<ChatMessage>>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Arc::new(messages),
        }
    }

    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The message currently receiving stream output, if any
    pub fn streaming(&self) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    fn position(&self, id: &str) -> Result<usize, ReduceError> {
        self.messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| ReduceError::UnknownId(id.to_string()))
    }

    /// Apply an action, producing the next list
    pub fn apply(&self, action: MessageAction) -> Result<MessageList, ReduceError> {
        let mut next = Arc::clone(&self.messages);

        match action {
            MessageAction::Append(message) => {
                if self.get(&message.id).is_some() {
                    return Err(ReduceError::DuplicateId(message.id));
                }
                if message.is_streaming {
                    if let Some(existing) = self.streaming() {
                        return Err(ReduceError::AlreadyStreaming {
                            existing: existing.id.clone(),
                        });
                    }
                }
                Arc::make_mut(&mut next).push(message);
            }
            MessageAction::UpdateStatus { id, status } => {
                let idx = self.position(&id)?;
                check_transition(&self.messages[idx], status)?;
                Arc::make_mut(&mut next)[idx].status = Some(status);
            }
            MessageAction::AppendStreamChunk { id, chunk } => {
                let idx = self.position(&id)?;
                if !self.messages[idx].is_streaming {
                    return Err(ReduceError::NotStreaming(id));
                }
                let msg = &mut Arc::make_mut(&mut next)[idx];
                msg.streaming_content
                    .get_or_insert_with(String::new)
                    .push_str(&chunk);
            }
            MessageAction::Finalize {
                id,
                text,
                chart_url,
            } => {
                let idx = self.position(&id)?;
                check_transition(&self.messages[idx], MessageStatus::Delivered)?;
                let msg = &mut Arc::make_mut(&mut next)[idx];
                msg.message = text;
                msg.streaming_content = None;
                msg.is_streaming = false;
                msg.status = Some(MessageStatus::Delivered);
                if chart_url.is_some() {
                    msg.chart_url = chart_url;
                }
            }
            MessageAction::Fail { id, error } => {
                let idx = self.position(&id)?;
                check_transition(&self.messages[idx], MessageStatus::Failed)?;
                let msg = &mut Arc::make_mut(&mut next)[idx];
                msg.error = Some(error);
                msg.is_streaming = false;
                msg.status = Some(MessageStatus::Failed);
            }
            MessageAction::Remove { id } => {
                let idx = self.position(&id)?;
                let msg = &self.messages[idx];
                // Only in-flight placeholders are transient; everything else is append-only
                if !(msg.is_streaming || msg.status == Some(MessageStatus::Sending)) || msg.is_user() {
                    return Err(ReduceError::NotRemovable(id));
                }
                Arc::make_mut(&mut next).remove(idx);
            }
        }

        Ok(MessageList { messages: next })
    }
}

fn check_transition(message: &ChatMessage, to: MessageStatus) -> Result<(), ReduceError> {
    match message.status {
        Some(from) if !from.can_transition_to(to) => Err(ReduceError::IllegalTransition {
            id: message.id.clone(),
            from: from.as_str(),
            to: to.as_str(),
        }),
        // Messages without a status (welcome, history) never transition
        None => Err(ReduceError::IllegalTransition {
            id: message.id.clone(),
            from: "none",
            to: to.as_str(),
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_with_exchange() -> (MessageList, String, String) {
        let user = ChatMessage::outgoing("hi", vec![3]);
        let placeholder = ChatMessage::placeholder(vec![3]);
        let (uid, pid) = (user.id.clone(), placeholder.id.clone());
        let list = MessageList::new()
            .apply(MessageAction::Append(user))
            .unwrap()
            .apply(MessageAction::Append(placeholder))
            .unwrap();
        (list, uid, pid)
    }

    #[test]
    fn test_append_order() {
        let (list, uid, pid) = list_with_exchange();
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[0].id, uid);
        assert_eq!(list.as_slice()[1].id, pid);
    }

    #[test]
    fn test_apply_leaves_original_untouched() {
        let (list, _, pid) = list_with_exchange();
        let next = list
            .apply(MessageAction::AppendStreamChunk {
                id: pid.clone(),
                chunk: "Hel".into(),
            })
            .unwrap();
        assert_eq!(list.get(&pid).unwrap().display_text(), "");
        assert_eq!(next.get(&pid).unwrap().display_text(), "Hel");
    }

    #[test]
    fn test_second_streaming_message_rejected() {
        let (list, _, pid) = list_with_exchange();
        let err = list
            .apply(MessageAction::Append(ChatMessage::placeholder(vec![])))
            .unwrap_err();
        assert_eq!(err, ReduceError::AlreadyStreaming { existing: pid });
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (list, uid, _) = list_with_exchange();
        let mut dup = ChatMessage::outgoing("again", vec![]);
        dup.id = uid.clone();
        assert_eq!(
            list.apply(MessageAction::Append(dup)).unwrap_err(),
            ReduceError::DuplicateId(uid)
        );
    }

    #[test]
    fn test_finalize_flushes_stream() {
        let (list, _, pid) = list_with_exchange();
        let list = list
            .apply(MessageAction::AppendStreamChunk {
                id: pid.clone(),
                chunk: "Hel".into(),
            })
            .unwrap()
            .apply(MessageAction::Finalize {
                id: pid.clone(),
                text: "Hello".into(),
                chart_url: None,
            })
            .unwrap();

        let msg = list.get(&pid).unwrap();
        assert_eq!(msg.message, "Hello");
        assert!(!msg.is_streaming);
        assert!(msg.streaming_content.is_none());
        assert_eq!(msg.status, Some(MessageStatus::Delivered));
        assert!(list.streaming().is_none());
    }

    #[test]
    fn test_status_never_moves_backward() {
        let (list, uid, _) = list_with_exchange();
        let list = list
            .apply(MessageAction::UpdateStatus {
                id: uid.clone(),
                status: MessageStatus::Sent,
            })
            .unwrap()
            .apply(MessageAction::UpdateStatus {
                id: uid.clone(),
                status: MessageStatus::Delivered,
            })
            .unwrap();

        let err = list
            .apply(MessageAction::UpdateStatus {
                id: uid.clone(),
                status: MessageStatus::Sending,
            })
            .unwrap_err();
        assert!(matches!(err, ReduceError::IllegalTransition { .. }));
        assert_eq!(list.get(&uid).unwrap().status, Some(MessageStatus::Delivered));
    }

    #[test]
    fn test_no_chunks_after_failure() {
        let (list, _, pid) = list_with_exchange();
        let list = list
            .apply(MessageAction::Fail {
                id: pid.clone(),
                error: "boom".into(),
            })
            .unwrap();
        let msg = list.get(&pid).unwrap();
        assert!(msg.is_failed());
        assert!(!msg.is_streaming);

        let err = list
            .apply(MessageAction::AppendStreamChunk {
                id: pid.clone(),
                chunk: "late".into(),
            })
            .unwrap_err();
        assert_eq!(err, ReduceError::NotStreaming(pid));
    }

    #[test]
    fn test_remove_only_transient() {
        let (list, uid, pid) = list_with_exchange();
        assert_eq!(
            list.apply(MessageAction::Remove { id: uid.clone() }).unwrap_err(),
            ReduceError::NotRemovable(uid)
        );
        let list = list.apply(MessageAction::Remove { id: pid }).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_unknown_id() {
        let list = MessageList::new();
        assert_eq!(
            list.apply(MessageAction::Fail {
                id: "nope".into(),
                error: "x".into()
            })
            .unwrap_err(),
            ReduceError::UnknownId("nope".into())
        );
    }
}
