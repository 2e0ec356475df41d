//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "MebelPlace";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Production WebSocket endpoint used when nothing is configured.
pub const DEFAULT_WS_URL: &str = "wss://mebelplace.com.kz";

/// Query parameter carrying the bearer token on the connection URL.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Default number of reconnect attempts after an abnormal close.
pub const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 5;

/// Default fixed delay between reconnect attempts in milliseconds.
pub const DEFAULT_RECONNECTION_DELAY_MS: u64 = 3_000;

/// WebSocket close codes the client cares about.
pub mod close_code {
    /// Deliberate closure. Suppresses auto-reconnect.
    pub const NORMAL: u16 = 1000;
    /// Connection dropped without a close frame.
    pub const ABNORMAL: u16 = 1006;

    /// Reason sent with a client-initiated close.
    pub const CLIENT_DISCONNECT_REASON: &str = "Client disconnect";
}

/// Channel paths appended to the base WebSocket URL.
pub mod paths {
    pub const CHATS: &str = "/ws/chats";
    pub const REQUESTS: &str = "/ws/requests";
    pub const NOTIFICATIONS: &str = "/ws/notifications";
}

/// Event names reserved for connection lifecycle notifications.
pub mod reserved_events {
    /// Fired on open (`{"connected": true}`) and close (`{"connected": false, "reason": ...}`).
    pub const CONNECTION: &str = "connection";
    /// Fired on transport errors (`{"message": ...}`).
    pub const ERROR: &str = "error";

    pub const ALL: &[&str] = &[CONNECTION, ERROR];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_events() {
        assert_eq!(reserved_events::ALL.len(), 2);
        assert!(reserved_events::ALL.contains(&"connection"));
    }

    #[test]
    fn test_paths_are_rooted() {
        for path in [paths::CHATS, paths::REQUESTS, paths::NOTIFICATIONS] {
            assert!(path.starts_with('/'));
        }
    }
}
