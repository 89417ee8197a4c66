//! Push channel for incremental model output
//!
//! The SSE connection runs in a spawned task that forwards typed events, in
//! arrival order, over a bounded mpsc channel. The consumer side is a
//! `StreamChannel` handle; closing or dropping it tears the connection down.

use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::StreamEvent;
use crate::error::{HallChatError, Result};

const CHANNEL_BUFFER: usize = 100;

/// Failure reported by the channel itself rather than by an `error` event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Payload could not be parsed as a stream event
    Malformed(String),
    /// Connection-level failure
    Transport(String),
}

pub type ChannelItem = std::result::Result<StreamEvent, ChannelError>;

/// Producer half of a stream channel
#[derive(Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<ChannelItem>,
    cancel: CancellationToken,
}

impl StreamSender {
    /// Forward one item. Returns false once the consumer has closed the channel.
    pub async fn send(&self, item: ChannelItem) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            res = self.tx.send(item) => res.is_ok(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the consumer closes the channel
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

/// Consumer handle for one open stream
pub struct StreamChannel {
    label: String,
    rx: mpsc::Receiver<ChannelItem>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamChannel {
    /// Create a connected sender/channel pair with no network behind it
    pub fn pair(label: impl Into<String>) -> (StreamSender, StreamChannel) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let cancel = CancellationToken::new();
        let sender = StreamSender {
            tx,
            cancel: cancel.clone(),
        };
        let channel = StreamChannel {
            label: label.into(),
            rx,
            cancel,
            task: None,
        };
        (sender, channel)
    }

    /// Open an SSE connection at `url` and start forwarding its events
    pub fn open(http: &reqwest::Client, url: Url, bearer: Option<&str>) -> Result<Self> {
        let mut request = http.get(url.clone());
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let mut es = EventSource::new(request)
            .map_err(|e| HallChatError::Stream(format!("failed to create event source: {}", e)))?;
        // No reconnects: a failed stream is terminal
        es.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        let (sender, mut channel) = Self::pair(url.as_str());
        channel.task = Some(tokio::spawn(forward_events(es, sender, url.to_string())));

        debug!(url = %url, "Stream channel opened");
        Ok(channel)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Next event in arrival order; `None` once closed or the producer is gone
    pub async fn recv(&mut self) -> Option<ChannelItem> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Close the channel and stop the underlying connection
    pub fn close(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!(channel = %self.label, "Stream channel closed");
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn forward_events(mut es: EventSource, sender: StreamSender, url: String) {
    let mut forwarded = 0u32;

    loop {
        let next = tokio::select! {
            _ = sender.closed() => break,
            next = es.next() => next,
        };

        match next {
            None => break,
            Some(Ok(Event::Open)) => {
                debug!(url = %url, "SSE connection opened");
            }
            Some(Ok(Event::Message(msg))) => {
                let item = match StreamEvent::parse(&msg.data) {
                    Ok(Some(event)) => Ok(event),
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(url = %url, error = %e, "Failed to parse stream event");
                        debug!(raw_data = %msg.data, "Raw stream event");
                        Err(ChannelError::Malformed(e.to_string()))
                    }
                };
                forwarded += 1;
                if !sender.send(item).await {
                    break;
                }
            }
            Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                debug!(url = %url, events = forwarded, "SSE stream ended");
                break;
            }
            Some(Err(e)) => {
                warn!(url = %url, error = %e, "SSE connection error");
                let _ = sender.send(Err(ChannelError::Transport(e.to_string()))).await;
                break;
            }
        }
    }

    es.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_in_order() {
        let (tx, mut channel) = StreamChannel::pair("test");
        tokio::spawn(async move {
            tx.send(Ok(StreamEvent::Delta("a".into()))).await;
            tx.send(Ok(StreamEvent::Delta("b".into()))).await;
            tx.send(Ok(StreamEvent::Done)).await;
        });

        assert_eq!(channel.recv().await, Some(Ok(StreamEvent::Delta("a".into()))));
        assert_eq!(channel.recv().await, Some(Ok(StreamEvent::Delta("b".into()))));
        assert_eq!(channel.recv().await, Some(Ok(StreamEvent::Done)));
        assert_eq!(channel.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_stops_sender() {
        let (tx, mut channel) = StreamChannel::pair("test");
        channel.close();

        assert!(channel.is_closed());
        assert!(tx.is_closed());
        assert!(!tx.send(Ok(StreamEvent::Done)).await);
        assert_eq!(channel.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_closes() {
        let (tx, channel) = StreamChannel::pair("test");
        drop(channel);
        assert!(tx.is_closed());
    }
}
