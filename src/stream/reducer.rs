//! Stream reducer: one state machine per active stream
//!
//! `Open -> Accumulating -> Closed(Success | Error)`. Content and delta
//! payloads are appended to a buffer; partial renders are throttled, the
//! terminal flush is not.

use std::time::{Duration, Instant};

use super::channel::{ChannelError, ChannelItem};
use super::StreamEvent;

pub const INVALID_FORMAT_MESSAGE: &str = "Invalid response format";
pub const STREAM_ENDED_MESSAGE: &str = "Stream ended unexpectedly";
pub const STREAM_FAILED_MESSAGE: &str = "The assistant could not complete the response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Open,
    Accumulating,
    Closed(StreamOutcome),
}

/// What the caller should do with the message after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// Appended to the buffer, render deferred by the throttle
    Buffered,
    /// Render this chunk (everything since the previous render)
    Render(String),
    /// Stream finished; this is the full text
    Finished(String),
    /// Stream failed with this user-facing error
    Failed(String),
    /// Event arrived after close, or carried nothing
    Ignored,
}

/// Caps how often partial content is pushed to the UI
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True (and arms the next window) if a render is allowed at `now`
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

#[derive(Debug)]
pub struct StreamReducer {
    message_id: String,
    phase: StreamPhase,
    buffer: String,
    rendered: usize,
    throttle: Throttle,
    events: u32,
}

impl StreamReducer {
    pub fn new(message_id: impl Into<String>, throttle: Duration) -> Self {
        Self {
            message_id: message_id.into(),
            phase: StreamPhase::Open,
            buffer: String::new(),
            rendered: 0,
            throttle: Throttle::new(throttle),
            events: 0,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, StreamPhase::Closed(_))
    }

    /// Everything accumulated so far
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Accumulated text not yet rendered
    pub fn pending(&self) -> &str {
        &self.buffer[self.rendered..]
    }

    /// Length of the prefix of `buffer` already handed out for rendering
    pub fn rendered_len(&self) -> usize {
        self.rendered
    }

    pub fn event_count(&self) -> u32 {
        self.events
    }

    /// Render buffered text if the throttle window has passed
    pub fn flush(&mut self, now: Instant) -> Reduction {
        if self.is_closed() || self.pending().is_empty() {
            return Reduction::Ignored;
        }
        if self.throttle.ready(now) {
            let chunk = self.buffer[self.rendered..].to_string();
            self.rendered = self.buffer.len();
            Reduction::Render(chunk)
        } else {
            Reduction::Buffered
        }
    }

    pub fn throttle_interval(&self) -> Duration {
        self.throttle.interval()
    }

    /// Apply one channel item received at `now`
    pub fn apply(&mut self, item: ChannelItem, now: Instant) -> Reduction {
        if self.is_closed() {
            return Reduction::Ignored;
        }
        self.events += 1;

        match item {
            Ok(StreamEvent::Content(text)) | Ok(StreamEvent::Delta(text)) => {
                self.accumulate(&text, now)
            }
            Ok(StreamEvent::Done) | Ok(StreamEvent::Complete) => {
                self.phase = StreamPhase::Closed(StreamOutcome::Success);
                self.rendered = self.buffer.len();
                Reduction::Finished(self.buffer.clone())
            }
            Ok(StreamEvent::Error(message)) => {
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| STREAM_FAILED_MESSAGE.to_string());
                self.fail(message)
            }
            Err(ChannelError::Malformed(_)) => self.fail(INVALID_FORMAT_MESSAGE.to_string()),
            Err(ChannelError::Transport(detail)) => {
                tracing::debug!(message_id = %self.message_id, detail = %detail, "Stream transport failure");
                self.fail(STREAM_FAILED_MESSAGE.to_string())
            }
        }
    }

    /// The channel closed without a terminal event
    pub fn end_of_channel(&mut self) -> Reduction {
        if self.is_closed() {
            return Reduction::Ignored;
        }
        self.fail(STREAM_ENDED_MESSAGE.to_string())
    }

    fn accumulate(&mut self, text: &str, now: Instant) -> Reduction {
        self.phase = StreamPhase::Accumulating;
        if text.is_empty() {
            return Reduction::Ignored;
        }
        self.buffer.push_str(text);

        if self.throttle.ready(now) {
            let chunk = self.buffer[self.rendered..].to_string();
            self.rendered = self.buffer.len();
            Reduction::Render(chunk)
        } else {
            Reduction::Buffered
        }
    }

    fn fail(&mut self, message: String) -> Reduction {
        self.phase = StreamPhase::Closed(StreamOutcome::Error);
        Reduction::Failed(message)
    }
}
