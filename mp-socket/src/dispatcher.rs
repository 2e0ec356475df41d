//! Per-connection event dispatcher.
//!
//! Maps event names to ordered handler sets. Dispatch snapshots the set
//! before invoking anything, so handlers may subscribe, unsubscribe or emit
//! while a dispatch is running. A panicking handler is caught and logged and
//! the remaining handlers still run.
//!
//! A broadcast tap (`subscribe_all`) mirrors every dispatched envelope for
//! consumers that want the raw stream, like the CLI listener.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error};

use crate::envelope::Envelope;

/// A callback for one event name. Identity is the `Arc` allocation.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Wrap a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_handler(a: &EventHandler, b: &EventHandler) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

const TAP_CAPACITY: usize = 256;

/// Event name -> handler set registry.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Arc<Mutex<HashMap<String, Vec<EventHandler>>>>,
    tap: broadcast::Sender<Envelope>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            handlers: Arc::new(Mutex::new(HashMap::new())),
            tap,
        }
    }

    /// Add `handler` to the set for `event`.
    ///
    /// Returns false if that exact handler was already registered.
    pub fn subscribe(&self, event: &str, handler: EventHandler) -> bool {
        let mut handlers = self.handlers.lock();
        let set = handlers.entry(event.to_string()).or_default();
        if set.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        set.push(handler);
        true
    }

    /// Remove `handler` from the set for `event`. Absent handlers are ignored.
    pub fn unsubscribe(&self, event: &str, handler: &EventHandler) {
        let mut handlers = self.handlers.lock();
        if let Some(set) = handlers.get_mut(event) {
            set.retain(|h| !same_handler(h, handler));
            if set.is_empty() {
                handlers.remove(event);
            }
        }
    }

    /// Invoke every handler registered for `event`, in insertion order.
    ///
    /// Returns how many handlers ran to completion.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        let snapshot: Vec<EventHandler> = self
            .handlers
            .lock()
            .get(event)
            .cloned()
            .unwrap_or_default();

        if self.tap.receiver_count() > 0 {
            let _ = self.tap.send(Envelope::new(event, data.clone()));
        }

        let mut completed = 0;
        for handler in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(data))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(event = %event, "handler panicked: {message}");
                }
            }
        }

        debug!("dispatched {event} to {completed}/{} handler(s)", snapshot.len());
        completed
    }

    /// Dispatch a decoded envelope.
    pub fn dispatch_envelope(&self, envelope: &Envelope) -> usize {
        self.dispatch(&envelope.event, &envelope.data)
    }

    /// Receive a copy of every dispatched envelope.
    ///
    /// Slow consumers get `RecvError::Lagged` and miss events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Envelope> {
        self.tap.subscribe()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.lock().get(event).map_or(0, Vec::len)
    }

    /// Drop every registered handler.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}
