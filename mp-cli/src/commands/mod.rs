//! CLI command implementations.

pub mod config;
pub mod emit;
pub mod listen;
pub mod status;

use std::time::Duration;

use mp_core::error::{MpError, MpResult};
use mp_socket::{Connection, ConnectionState};

/// Wait until `connection` reports `Connected`, or give up after `timeout`.
pub async fn wait_connected(connection: &Connection, timeout: Duration) -> MpResult<()> {
    let mut state = connection.state_receiver();
    // Release the watch borrow before `state` goes out of scope.
    let result = tokio::time::timeout(
        timeout,
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .map(|waited| waited.map(|_| ()));

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(MpError::NotConnected),
        Err(_) => Err(MpError::Socket(format!(
            "timed out after {}s connecting to {}",
            timeout.as_secs(),
            connection.url().path()
        ))),
    }
}

/// Truncate a string to a maximum length, appending an ellipsis if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let head: String = s.chars().take(keep).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mp_socket::{MemoryConnector, SocketConfig};

    fn memory_connection(connector: &MemoryConnector) -> Connection {
        let config = SocketConfig::new("ws://localhost:8080")
            .with_path("/ws/notifications")
            .with_auto_connect(false);
        Connection::new(config, Arc::new(connector.clone())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_returns_once_open() {
        let connector = MemoryConnector::new();
        let connection = memory_connection(&connector);
        connection.connect();
        wait_connected(&connection, Duration::from_secs(5)).await.unwrap();
        assert!(connection.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_times_out_when_refused() {
        let connector = MemoryConnector::new();
        connector.refuse_connections(true);
        let connection = memory_connection(&connector);
        connection.connect();
        let result = wait_connected(&connection, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(MpError::Socket(msg)) if msg.contains("/ws/notifications")));
        connection.disconnect();
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("sofa", 10), "sofa");
        assert_eq!(truncate("wardrobe with mirror", 10), "wardrob...");
        assert_eq!(truncate("шкаф-купе большой", 7), "шкаф...");
    }
}
