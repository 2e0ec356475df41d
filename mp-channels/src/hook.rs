//! Generic mount/unmount wrapper around a [`Connection`].
//!
//! A [`ChannelHook`] is what a screen or command holds while it is using a
//! channel. Mounting optionally opens the connection; dropping the hook
//! closes it again when the hook opened it. [`EventSubscription`] is the
//! matching guard for one event handler.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use mp_core::constants::reserved_events;
use mp_socket::{handler, ClientEvent, Connection, ConnectionState, EventHandler};

/// A mounted view of one channel connection.
pub struct ChannelHook {
    connection: Connection,
    auto_connect: bool,
    connected: watch::Receiver<bool>,
    status_handler: EventHandler,
}

impl ChannelHook {
    /// Mount on `connection`. With `auto_connect`, connects now (unless
    /// already connected) and disconnects when the hook is dropped.
    pub fn mount(connection: Connection, auto_connect: bool) -> Self {
        let hook = Self::attach(connection, auto_connect);
        hook.start();
        hook
    }

    /// Mount without connecting yet, so adapters can register their own
    /// handlers before the first open can fire. Pair with [`Self::start`].
    pub(crate) fn attach(connection: Connection, auto_connect: bool) -> Self {
        let (tx, rx) = watch::channel(connection.is_connected());
        let status_handler = handler(move |data: &Value| {
            if let Some(connected) = data.get("connected").and_then(Value::as_bool) {
                tx.send_replace(connected);
            }
        });
        connection.on(reserved_events::CONNECTION, status_handler.clone());
        debug!(path = %connection.url().path(), auto_connect, "channel hook mounted");

        Self {
            connection,
            auto_connect,
            connected: rx,
            status_handler,
        }
    }

    /// Connect if this hook owns the connection and it is not open yet.
    pub(crate) fn start(&self) {
        if self.auto_connect && !self.connection.is_connected() {
            self.connection.connect();
        }
    }

    pub fn on(&self, event: &str, handler: EventHandler) {
        self.connection.on(event, handler);
    }

    pub fn off(&self, event: &str, handler: &EventHandler) {
        self.connection.off(event, handler);
    }

    pub fn emit(&self, event: &str, data: Value) {
        self.connection.emit(event, data);
    }

    pub fn emit_event(&self, event: &ClientEvent) {
        self.connection.emit_event(event);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Follows `connection` events: true after open, false after close.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Register a typed handler for as long as the returned guard lives.
    pub fn subscribe<T, F>(&self, event: &str, f: F) -> EventSubscription
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        EventSubscription::typed(&self.connection, event, f)
    }
}

impl Drop for ChannelHook {
    fn drop(&mut self) {
        self.connection
            .off(reserved_events::CONNECTION, &self.status_handler);
        if self.auto_connect {
            self.connection.disconnect();
        }
        debug!(path = %self.connection.url().path(), "channel hook unmounted");
    }
}

/// Keeps one handler registered until dropped.
#[must_use = "the handler is removed as soon as the subscription is dropped"]
pub struct EventSubscription {
    connection: Connection,
    event: String,
    handler: EventHandler,
}

impl EventSubscription {
    /// Register `f` for `event`, receiving `data` as `T`.
    pub fn typed<T, F>(connection: &Connection, event: &str, f: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler = connection.on_typed(event, f);
        Self {
            connection: connection.clone(),
            event: event.to_string(),
            handler,
        }
    }

    /// Register an untyped handler.
    pub fn raw(connection: &Connection, event: &str, handler: EventHandler) -> Self {
        connection.on(event, handler.clone());
        Self {
            connection: connection.clone(),
            event: event.to_string(),
            handler,
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.connection.off(&self.event, &self.handler);
    }
}
