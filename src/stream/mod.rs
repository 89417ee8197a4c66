//! Server-sent event streaming of incremental assistant output
//!
//! - `channel`: the push connection, exposed as a typed message-passing handle
//! - `reducer`: per-stream state machine that accumulates content and throttles renders

pub mod channel;
pub mod reducer;

use serde::Deserialize;

pub use channel::{ChannelError, ChannelItem, StreamChannel, StreamSender};
pub use reducer::{Reduction, StreamOutcome, StreamPhase, StreamReducer, Throttle};

/// Default minimum interval between UI renders of partial content
pub const DEFAULT_THROTTLE_MS: u64 = 33;

/// A single event pushed by the stream channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Delta(String),
    Done,
    Complete,
    Error(Option<String>),
}

/// Raw wire shape, `{type, content?, delta?, error?}`
#[derive(Debug, Deserialize)]
struct RawStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl StreamEvent {
    /// Parse one `data:` payload.
    ///
    /// Returns `Ok(None)` for event types this client does not know about.
    pub fn parse(data: &str) -> Result<Option<StreamEvent>, serde_json::Error> {
        let raw: RawStreamEvent = serde_json::from_str(data)?;
        let event = match raw.kind.as_str() {
            "content" => StreamEvent::Content(raw.content.unwrap_or_default()),
            "delta" => StreamEvent::Delta(raw.delta.or(raw.content).unwrap_or_default()),
            "done" => StreamEvent::Done,
            "complete" => StreamEvent::Complete,
            "error" => StreamEvent::Error(raw.error),
            other => {
                tracing::debug!(event_type = other, "Ignoring unknown stream event");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Done | StreamEvent::Complete | StreamEvent::Error(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_and_content() {
        assert_eq!(
            StreamEvent::parse(r#"{"type":"delta","delta":"Hel"}"#).unwrap(),
            Some(StreamEvent::Delta("Hel".into()))
        );
        assert_eq!(
            StreamEvent::parse(r#"{"type":"content","content":"lo"}"#).unwrap(),
            Some(StreamEvent::Content("lo".into()))
        );
    }

    #[test]
    fn test_parse_terminal_events() {
        assert_eq!(StreamEvent::parse(r#"{"type":"done"}"#).unwrap(), Some(StreamEvent::Done));
        assert_eq!(
            StreamEvent::parse(r#"{"type":"complete"}"#).unwrap(),
            Some(StreamEvent::Complete)
        );
        let err = StreamEvent::parse(r#"{"type":"error","error":"model overloaded"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(err, StreamEvent::Error(Some("model overloaded".into())));
        assert!(err.is_terminal());
    }

    #[test]
    fn test_parse_unknown_type_is_ignored() {
        assert_eq!(StreamEvent::parse(r#"{"type":"heartbeat"}"#).unwrap(), None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(StreamEvent::parse("not json").is_err());
        assert!(StreamEvent::parse(r#"{"delta":"no type"}"#).is_err());
    }
}
