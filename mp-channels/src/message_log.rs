//! Accumulating message log, optionally filtered to one event name.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::warn;

use mp_socket::{Connection, Envelope};

/// One logged envelope with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedMessage {
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub envelope: Envelope,
}

#[derive(Clone, Default)]
pub struct MessageLog {
    filter: Option<String>,
    messages: Arc<Mutex<Vec<LoggedMessage>>>,
}

impl MessageLog {
    /// A log keeping only `filter` events, or everything when `None`.
    pub fn new(filter: Option<String>) -> Self {
        Self {
            filter,
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn accepts(&self, event: &str) -> bool {
        self.filter.as_deref().map_or(true, |f| f == event)
    }

    /// Append `envelope` if it passes the filter.
    pub fn add_message(&self, envelope: Envelope) -> bool {
        if !self.accepts(&envelope.event) {
            return false;
        }
        self.messages.lock().push(LoggedMessage {
            received_at: Utc::now(),
            envelope,
        });
        true
    }

    pub fn messages(&self) -> Vec<LoggedMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Record everything `connection` dispatches, until the task is aborted
    /// or the connection is dropped.
    pub fn listen(&self, connection: &Connection) -> JoinHandle<()> {
        let mut rx = connection.dispatcher().subscribe_all();
        let log = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        log.add_message(envelope);
                    }
                    Err(RecvError::Lagged(n)) => warn!("message log lagged, {n} event(s) lost"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter() {
        let log = MessageLog::new(Some("notification".into()));
        assert!(log.add_message(Envelope::new("notification", json!({"id": 1}))));
        assert!(!log.add_message(Envelope::new("chat_message", json!({}))));
        assert_eq!(log.len(), 1);
        assert_eq!(log.messages()[0].envelope.event, "notification");
    }

    #[test]
    fn test_unfiltered_keeps_everything_in_order() {
        let log = MessageLog::new(None);
        log.add_message(Envelope::new("a", json!(1)));
        log.add_message(Envelope::new("b", json!(2)));
        let events: Vec<_> = log.messages().into_iter().map(|m| m.envelope.event).collect();
        assert_eq!(events, vec!["a", "b"]);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_serializes_flat() {
        let log = MessageLog::new(None);
        log.add_message(Envelope::new("ping", json!(null)));
        let value = serde_json::to_value(&log.messages()[0]).unwrap();
        assert_eq!(value["event"], "ping");
        assert!(value["received_at"].is_string());
    }
}
