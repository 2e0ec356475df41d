//! Channel registry.
//!
//! Owns one [`Connection`] per [`Channel`], created on first use from a
//! shared base config and connector, and tears them all down on
//! [`ChannelRegistry::shutdown`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use mp_core::config::AppConfig;
use mp_core::constants::paths;
use mp_core::error::{MpError, MpResult};
use mp_socket::events::ChatId;
use mp_socket::{Connection, Connector, SocketConfig, WsConnector};

use crate::chat::ChatChannel;
use crate::notifications::NotificationsChannel;
use crate::requests::RequestsChannel;

/// A logical stream, distinguished by URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Chats,
    Requests,
    Notifications,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Self::Chats, Self::Requests, Self::Notifications];

    pub fn path(&self) -> &'static str {
        match self {
            Self::Chats => paths::CHATS,
            Self::Requests => paths::REQUESTS,
            Self::Notifications => paths::NOTIFICATIONS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chats => "chats",
            Self::Requests => "requests",
            Self::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = MpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chats" | "chat" => Ok(Self::Chats),
            "requests" | "request" => Ok(Self::Requests),
            "notifications" | "notification" => Ok(Self::Notifications),
            other => Err(MpError::Config(format!("unknown channel: {other}"))),
        }
    }
}

/// Lazily created, explicitly disposed per-channel connections.
pub struct ChannelRegistry {
    base: SocketConfig,
    connector: Arc<dyn Connector>,
    connections: Mutex<HashMap<Channel, Connection>>,
}

impl ChannelRegistry {
    /// `base` supplies url, token and retry policy; path and auto-connect
    /// are set per channel.
    pub fn new(base: SocketConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            base,
            connector,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Registry over real WebSocket connections described by `config`.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            SocketConfig::from_app_config(config, ""),
            Arc::new(WsConnector::new()),
        )
    }

    pub fn config_for(&self, channel: Channel) -> SocketConfig {
        self.base
            .clone()
            .with_path(channel.path())
            .with_auto_connect(false)
    }

    /// The connection for `channel`, created on first use. Never connects by
    /// itself.
    pub fn get(&self, channel: Channel) -> MpResult<Connection> {
        let mut connections = self.connections.lock();
        if let Some(connection) = connections.get(&channel) {
            return Ok(connection.clone());
        }

        let connection = Connection::new(self.config_for(channel), self.connector.clone())?;
        info!("registered channel: {channel} ({})", channel.path());
        connections.insert(channel, connection.clone());
        Ok(connection)
    }

    pub fn chat(&self, chat_id: Option<ChatId>) -> MpResult<ChatChannel> {
        Ok(ChatChannel::mount(self.get(Channel::Chats)?, chat_id))
    }

    pub fn requests(&self) -> MpResult<RequestsChannel> {
        Ok(RequestsChannel::mount(self.get(Channel::Requests)?))
    }

    pub fn notifications(&self) -> MpResult<NotificationsChannel> {
        Ok(NotificationsChannel::mount(self.get(Channel::Notifications)?))
    }

    /// Channels created so far, in declaration order.
    pub fn active_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.connections.lock().keys().copied().collect();
        channels.sort();
        channels
    }

    pub fn is_connected(&self, channel: Channel) -> bool {
        self.connections
            .lock()
            .get(&channel)
            .is_some_and(Connection::is_connected)
    }

    /// Disconnect and forget every connection. Handlers are cleared, so
    /// clones still held elsewhere stay silent.
    pub fn shutdown(&self) {
        let drained: Vec<(Channel, Connection)> = self.connections.lock().drain().collect();
        info!("shutting down {} channel(s)", drained.len());
        for (channel, connection) in drained {
            connection.disconnect();
            connection.dispatcher().clear();
            info!("channel {channel} shut down");
        }
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_and_paths() {
        assert_eq!(Channel::Chats.path(), "/ws/chats");
        assert_eq!(Channel::Requests.path(), "/ws/requests");
        assert_eq!(Channel::Notifications.path(), "/ws/notifications");
        assert_eq!("Notification".parse::<Channel>().unwrap(), Channel::Notifications);
        assert!("orders".parse::<Channel>().is_err());
        for channel in Channel::ALL {
            assert_eq!(channel.to_string().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn test_config_for_disables_auto_connect() {
        let registry = ChannelRegistry::new(
            SocketConfig::new("ws://localhost:8080").with_token("t"),
            Arc::new(mp_socket::MemoryConnector::new()),
        );
        let config = registry.config_for(Channel::Requests);
        assert!(!config.auto_connect);
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "ws://localhost:8080/ws/requests?token=t"
        );
    }
}
