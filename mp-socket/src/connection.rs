//! WebSocket connection manager.
//!
//! Keeps at most one live transport per [`Connection`] and recovers from
//! unexpected closures on its own:
//! - `connect()` / `disconnect()` are idempotent and never block
//! - a close with any code other than 1000 schedules `connect()` again after a
//!   fixed delay, up to a bounded number of attempts
//! - a successful open resets the attempt counter
//! - lifecycle changes fan out through the dispatcher as `connection` and
//!   `error` events
//!
//! Each transport session is driven by a background task that holds only a
//! `Weak` reference to the connection. Sessions are tagged with a generation
//! number; `disconnect()` bumps it, so whatever the old transport reports
//! afterwards is ignored.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use mp_core::config::AppConfig;
use mp_core::constants::{self, close_code, reserved_events};
use mp_core::error::{MpError, MpResult};

use crate::dispatcher::{handler, EventDispatcher, EventHandler};
use crate::envelope::Envelope;
use crate::events::ClientEvent;
use crate::transport::{Connector, OutboundFrame, TransportEvent};

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Base WebSocket URL, e.g. `wss://mebelplace.com.kz`.
    pub url: String,
    /// Channel path appended to `url`, e.g. `/ws/chats`.
    pub path: String,
    /// Connect as soon as the connection is created.
    pub auto_connect: bool,
    /// Maximum reconnect attempts after an abnormal close.
    pub reconnection_attempts: u32,
    /// Fixed delay before each reconnect attempt.
    pub reconnection_delay: Duration,
    /// Bearer token appended as `?token=`.
    pub token: Option<String>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_WS_URL.to_string(),
            path: String::new(),
            auto_connect: true,
            reconnection_attempts: constants::DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: Duration::from_millis(constants::DEFAULT_RECONNECTION_DELAY_MS),
            token: None,
        }
    }
}

impl SocketConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build from the application config, targeting `path`.
    pub fn from_app_config(config: &AppConfig, path: &str) -> Self {
        Self {
            url: config.server.ws_url.clone(),
            path: path.to_string(),
            auto_connect: true,
            reconnection_attempts: config.socket.reconnection_attempts,
            reconnection_delay: config.socket.reconnection_delay(),
            token: config.token(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The full target URL: base + path, plus the token query parameter.
    pub fn endpoint(&self) -> MpResult<Url> {
        let base = self.url.trim().trim_end_matches('/');
        let path = self.path.trim();
        let joined = if path.is_empty() || path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        };

        let mut url = Url::parse(&joined)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(MpError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme, got {}",
                url.scheme()
            )));
        }

        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            url.query_pairs_mut()
                .append_pair(constants::TOKEN_QUERY_PARAM, token);
        }
        Ok(url)
    }
}

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport and nothing scheduled.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Transport open.
    Connected,
    /// Closed abnormally; a reconnect is waiting on its timer.
    ReconnectScheduled,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::ReconnectScheduled => write!(f, "reconnect scheduled"),
        }
    }
}

/// One transport session, from handshake start to close.
struct Session {
    /// Set once the handshake succeeds.
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    open: bool,
    /// Dropping this stops the session's driver task.
    _cancel: watch::Sender<()>,
}

struct Shared {
    session: Option<Session>,
    generation: u64,
    reconnect_attempts: u32,
    reconnect_timer: Option<JoinHandle<()>>,
    state: ConnectionState,
}

struct Inner {
    id: Uuid,
    config: SocketConfig,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    runtime: Handle,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
}

/// A self-healing WebSocket connection to one channel.
///
/// Cheap to clone; all clones share the same transport and handlers. The
/// transport is closed once the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("url", &self.inner.redacted_url())
            .field("state", &self.state())
            .finish()
    }
}

/// A non-owning reference to a [`Connection`].
///
/// Handlers registered on a connection should hold one of these rather than
/// a clone, which would keep the connection alive through its own dispatcher.
#[derive(Clone)]
pub struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    pub fn upgrade(&self) -> Option<Connection> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl Connection {
    /// Create a connection. Must be called from within a Tokio runtime.
    ///
    /// Connects immediately when `config.auto_connect` is set.
    pub fn new(config: SocketConfig, connector: Arc<dyn Connector>) -> MpResult<Self> {
        let runtime = Handle::try_current().map_err(|e| MpError::Runtime(e.to_string()))?;
        let endpoint = config.endpoint()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let auto_connect = config.auto_connect;

        let connection = Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                config,
                endpoint,
                connector,
                dispatcher: EventDispatcher::new(),
                runtime,
                shared: Mutex::new(Shared {
                    session: None,
                    generation: 0,
                    reconnect_attempts: 0,
                    reconnect_timer: None,
                    state: ConnectionState::Disconnected,
                }),
                state_tx,
            }),
        };

        if auto_connect {
            connection.connect();
        }
        Ok(connection)
    }

    /// Open the transport unless one is already open or opening.
    pub fn connect(&self) {
        let mut shared = self.inner.shared.lock();
        self.inner.start_session(&mut shared);
    }

    /// Close the transport with code 1000 and cancel any pending reconnect.
    ///
    /// `is_connected()` is false as soon as this returns. The close does not
    /// schedule a reconnect, and no `connection` event is fired for it.
    pub fn disconnect(&self) {
        let session = {
            let mut shared = self.inner.shared.lock();
            if let Some(timer) = shared.reconnect_timer.take() {
                timer.abort();
            }
            shared.generation += 1;
            let session = shared.session.take();
            self.inner.set_state(&mut shared, ConnectionState::Disconnected);
            session
        };

        if let Some(session) = session {
            if let Some(outbound) = &session.outbound {
                let _ = outbound.send(OutboundFrame::Close {
                    code: close_code::NORMAL,
                    reason: close_code::CLIENT_DISCONNECT_REASON.to_string(),
                });
            }
            info!("disconnected from {}", self.inner.redacted_url());
        }
    }

    /// Send `{event, data}` if the transport is open. Dropped with a
    /// warning otherwise.
    pub fn emit(&self, event: &str, data: Value) {
        let outbound = {
            let shared = self.inner.shared.lock();
            shared
                .session
                .as_ref()
                .filter(|s| s.open)
                .and_then(|s| s.outbound.clone())
        };

        let Some(outbound) = outbound else {
            warn!(event = %event, "not connected, cannot emit event");
            return;
        };

        match Envelope::new(event, data).encode() {
            Ok(text) => {
                if outbound.send(OutboundFrame::Text(text)).is_err() {
                    warn!(event = %event, "transport went away, event dropped");
                }
            }
            Err(e) => error!(event = %event, "failed to encode event: {e}"),
        }
    }

    /// Typed form of [`Connection::emit`].
    pub fn emit_event(&self, event: &ClientEvent) {
        match event.to_envelope() {
            Ok(envelope) => self.emit(&envelope.event, envelope.data),
            Err(e) => error!(event = event.name(), "failed to encode event: {e}"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .shared
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.open)
    }

    /// Register `handler` for `event`. Registering the same handler twice
    /// has no further effect.
    pub fn on(&self, event: &str, handler: EventHandler) {
        self.inner.dispatcher.subscribe(event, handler);
    }

    pub fn off(&self, event: &str, handler: &EventHandler) {
        self.inner.dispatcher.unsubscribe(event, handler);
    }

    /// Register a handler that receives `data` deserialized as `T`.
    ///
    /// Payloads that do not fit `T` are logged and skipped. Returns the
    /// registered handler so it can be passed to [`Connection::off`].
    pub fn on_typed<T, F>(&self, event: &str, f: F) -> EventHandler
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = event.to_string();
        let h = handler(move |data| match serde_json::from_value::<T>(data.clone()) {
            Ok(payload) => f(payload),
            Err(e) => warn!(event = %name, "unexpected payload shape: {e}"),
        });
        self.on(event, h.clone());
        h
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Subscribe to state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.shared.lock().reconnect_attempts
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The target URL, token included.
    pub fn url(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Inner {
    fn redacted_url(&self) -> String {
        let mut url = self.endpoint.clone();
        url.set_query(None);
        url.to_string()
    }

    fn set_state(&self, shared: &mut Shared, new_state: ConnectionState) {
        if shared.state != new_state {
            info!("socket state: {} -> {}", shared.state, new_state);
            shared.state = new_state;
            self.state_tx.send_replace(new_state);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.lock().generation == generation
    }

    fn start_session(self: &Arc<Self>, shared: &mut Shared) {
        if let Some(session) = &shared.session {
            if session.open {
                info!("already connected to {}", self.redacted_url());
            } else {
                debug!("handshake already in flight, skipping connect");
            }
            return;
        }

        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }
        shared.generation += 1;
        let generation = shared.generation;

        let (cancel_tx, cancel_rx) = watch::channel(());
        shared.session = Some(Session {
            outbound: None,
            open: false,
            _cancel: cancel_tx,
        });
        self.set_state(shared, ConnectionState::Connecting);
        info!("connecting to {}", self.redacted_url());

        self.runtime.spawn(drive_session(
            Arc::downgrade(self),
            generation,
            self.connector.clone(),
            self.endpoint.clone(),
            cancel_rx,
        ));
    }

    /// Attach a freshly opened transport. False if the session was abandoned
    /// while the handshake was in flight.
    fn on_open(&self, generation: u64, outbound: mpsc::UnboundedSender<OutboundFrame>) -> bool {
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return false;
            }
            let Some(session) = shared.session.as_mut() else {
                return false;
            };
            session.outbound = Some(outbound);
            session.open = true;
            shared.reconnect_attempts = 0;
            self.set_state(&mut shared, ConnectionState::Connected);
        }

        info!("connected to {}", self.redacted_url());
        self.dispatcher
            .dispatch(reserved_events::CONNECTION, &json!({ "connected": true }));
        true
    }

    fn on_text(&self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            return;
        }
        match Envelope::decode(text) {
            Ok(Some(envelope)) => {
                self.dispatcher.dispatch_envelope(&envelope);
            }
            Ok(None) => debug!("ignoring frame without event/data"),
            Err(e) => error!("failed to parse websocket message: {e}"),
        }
    }

    fn on_error(&self, generation: u64, message: &str) {
        if !self.is_current(generation) {
            return;
        }
        error!("websocket error: {message}");
        self.dispatcher
            .dispatch(reserved_events::ERROR, &json!({ "message": message }));
    }

    fn on_handshake_failed(self: &Arc<Self>, generation: u64, err: &MpError) {
        self.on_error(generation, &err.to_string());
        self.on_close(generation, close_code::ABNORMAL, "");
    }

    fn on_close(self: &Arc<Self>, generation: u64, code: u16, reason: &str) {
        {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.session = None;

            if code != close_code::NORMAL
                && shared.reconnect_attempts < self.config.reconnection_attempts
            {
                shared.reconnect_attempts += 1;
                let attempt = shared.reconnect_attempts;
                let delay = self.config.reconnection_delay;
                warn!(
                    "connection closed (code {code}), reconnecting in {}ms (attempt {attempt}/{})",
                    delay.as_millis(),
                    self.config.reconnection_attempts
                );
                self.set_state(&mut shared, ConnectionState::ReconnectScheduled);

                let weak = Arc::downgrade(self);
                shared.reconnect_timer = Some(self.runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_reconnect(generation);
                    }
                }));
            } else {
                if code == close_code::NORMAL {
                    info!("connection closed normally");
                } else {
                    warn!("connection closed (code {code}), no reconnect attempts left");
                }
                self.set_state(&mut shared, ConnectionState::Disconnected);
            }
        }

        self.dispatcher.dispatch(
            reserved_events::CONNECTION,
            &json!({ "connected": false, "reason": reason }),
        );
    }

    fn fire_reconnect(self: &Arc<Self>, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            return;
        }
        // Detach our own handle so start_session does not abort this task.
        shared.reconnect_timer.take();
        self.start_session(&mut shared);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let shared = self.shared.get_mut();
        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(session) = shared.session.take() {
            if let Some(outbound) = session.outbound {
                let _ = outbound.send(OutboundFrame::Close {
                    code: close_code::NORMAL,
                    reason: close_code::CLIENT_DISCONNECT_REASON.to_string(),
                });
            }
        }
    }
}

/// Open one transport and feed its events back into the connection until
/// it closes or the session is abandoned.
async fn drive_session(
    weak: Weak<Inner>,
    generation: u64,
    connector: Arc<dyn Connector>,
    url: Url,
    mut cancel: watch::Receiver<()>,
) {
    let result = connector.open(&url).await;

    let Some(inner) = weak.upgrade() else {
        if let Ok(handle) = result {
            let _ = handle.outbound.send(OutboundFrame::Close {
                code: close_code::NORMAL,
                reason: close_code::CLIENT_DISCONNECT_REASON.to_string(),
            });
        }
        return;
    };

    let (outbound, mut inbound) = match result {
        Ok(handle) => handle.into_parts(),
        Err(e) => {
            inner.on_handshake_failed(generation, &e);
            return;
        }
    };

    if !inner.on_open(generation, outbound.clone()) {
        debug!("handshake finished after disconnect, closing");
        let _ = outbound.send(OutboundFrame::Close {
            code: close_code::NORMAL,
            reason: close_code::CLIENT_DISCONNECT_REASON.to_string(),
        });
        return;
    }
    drop(outbound);
    drop(inner);

    loop {
        let event = tokio::select! {
            _ = cancel.changed() => break,
            event = inbound.recv() => event,
        };

        let Some(inner) = weak.upgrade() else {
            break;
        };
        match event {
            Some(TransportEvent::Text(text)) => inner.on_text(generation, &text),
            Some(TransportEvent::Error(message)) => inner.on_error(generation, &message),
            Some(TransportEvent::Closed { code, reason }) => {
                inner.on_close(generation, code, &reason);
                break;
            }
            None => {
                inner.on_close(generation, close_code::ABNORMAL, "");
                break;
            }
        }
    }
}
