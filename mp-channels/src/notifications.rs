//! Notifications channel adapter.

use mp_socket::events::NotificationPayload;
use mp_socket::{Connection, ServerEventKind};

use crate::hook::{ChannelHook, EventSubscription};

pub struct NotificationsChannel {
    hook: ChannelHook,
}

impl NotificationsChannel {
    /// Mount and connect.
    pub fn mount(connection: Connection) -> Self {
        Self {
            hook: ChannelHook::mount(connection, true),
        }
    }

    pub fn hook(&self) -> &ChannelHook {
        &self.hook
    }

    pub fn is_connected(&self) -> bool {
        self.hook.is_connected()
    }

    pub fn on_notification<F>(&self, f: F) -> EventSubscription
    where
        F: Fn(NotificationPayload) + Send + Sync + 'static,
    {
        self.hook.subscribe(ServerEventKind::Notification.as_str(), f)
    }
}
