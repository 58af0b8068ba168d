//! Raw response events for debugging panels.
//!
//! Emitting never blocks the extraction pipeline and never fails it.

use tokio::sync::mpsc;
use tracing::debug;

use crate::providers::ProviderId;

/// One raw provider response, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponseEvent {
    pub provider: ProviderId,
    /// HTTP status, absent when the request never got an answer.
    pub http_status: Option<u16>,
    pub raw_response_text: String,
}

/// Receiver of raw response events.
pub trait ResponseSink: Send + Sync {
    fn emit(&self, event: RawResponseEvent);
}

/// Logs events at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ResponseSink for TracingSink {
    fn emit(&self, event: RawResponseEvent) {
        debug!(
            provider = %event.provider,
            status = ?event.http_status,
            body = %truncate(&event.raw_response_text, 2000),
            "raw provider response"
        );
    }
}

/// Forwards events over an unbounded channel. Send failures (receiver
/// dropped) are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<RawResponseEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RawResponseEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ResponseSink for ChannelSink {
    fn emit(&self, event: RawResponseEvent) {
        let _ = self.sender.send(event);
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
