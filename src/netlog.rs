//! Network Event Log
//!
//! Buffered network events drained in batches. Reading the log consumes
//! it, so two consecutive drains never return the same entry.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::cdp::transport::CdpMessage;
use crate::cdp::types::{NetworkRequestWillBeSentEvent, NetworkResponseReceivedEvent};
use crate::cdp::Transport;

/// A single captured network event
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// CDP event name, e.g. `Network.requestWillBeSent`
    pub method: String,
    /// Raw event payload
    pub params: Value,
    /// Milliseconds since the epoch at drain time
    pub timestamp: u64,
}

impl LogEntry {
    /// Decode as a request-will-be-sent event, `None` for anything else
    pub fn request_will_be_sent(&self) -> Option<NetworkRequestWillBeSentEvent> {
        if self.method != "Network.requestWillBeSent" {
            return None;
        }
        serde_json::from_value(self.params.clone()).ok()
    }

    /// Decode as a response-received event, `None` for anything else
    pub fn response_received(&self) -> Option<NetworkResponseReceivedEvent> {
        if self.method != "Network.responseReceived" {
            return None;
        }
        serde_json::from_value(self.params.clone()).ok()
    }
}

/// Consuming view over the browser's captured network events
pub struct NetworkLog {
    transport: Arc<Transport>,
}

impl NetworkLog {
    pub(crate) fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Drain every buffered network event
    ///
    /// Non-network events are discarded. Returns immediately with whatever
    /// has accumulated since the previous drain.
    pub async fn drain(&self) -> Vec<LogEntry> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut entries = Vec::new();
        while let Some(message) = self.transport.try_recv_event().await {
            if let CdpMessage::Event { method, params, .. } = message {
                if method.starts_with("Network.") {
                    entries.push(LogEntry {
                        method,
                        params,
                        timestamp: now,
                    });
                }
            }
        }

        if !entries.is_empty() {
            tracing::trace!("Drained {} network events", entries.len());
        }

        entries
    }
}
