//! Shared test utilities for integration tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use mp_channels::ChannelRegistry;
use mp_socket::{handler, Connection, Envelope, MemoryConnector, SocketConfig};

pub const RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Base config pointing at a fake local server.
pub fn create_test_config() -> SocketConfig {
    SocketConfig::new("ws://localhost:8080")
        .with_token("test-token")
        .with_reconnection_attempts(3)
        .with_reconnection_delay(RETRY_DELAY)
}

/// A registry backed by an in-memory connector, plus the connector.
pub fn create_test_registry() -> (ChannelRegistry, MemoryConnector) {
    let connector = MemoryConnector::new();
    let registry = ChannelRegistry::new(create_test_config(), Arc::new(connector.clone()));
    (registry, connector)
}

/// Let spawned driver tasks run without moving the paused clock.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Record every payload dispatched for `event`.
pub fn record(connection: &Connection, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    connection.on(event, handler(move |data| sink.lock().push(data.clone())));
    seen
}

/// Event names of a batch of sent envelopes.
pub fn event_names(envelopes: &[Envelope]) -> Vec<&str> {
    envelopes.iter().map(|e| e.event.as_str()).collect()
}
