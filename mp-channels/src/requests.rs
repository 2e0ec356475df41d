//! Requests channel adapter: per-request update subscriptions.

use mp_socket::events::RequestId;
use mp_socket::events::RequestUpdatePayload;
use mp_socket::{ClientEvent, Connection, ServerEventKind};

use crate::hook::{ChannelHook, EventSubscription};

pub struct RequestsChannel {
    hook: ChannelHook,
}

impl RequestsChannel {
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

    pub fn subscribe_to_request(&self, request_id: RequestId) {
        self.hook
            .emit_event(&ClientEvent::SubscribeRequest { request_id });
    }

    pub fn unsubscribe_from_request(&self, request_id: RequestId) {
        self.hook
            .emit_event(&ClientEvent::UnsubscribeRequest { request_id });
    }

    pub fn on_request_update<F>(&self, f: F) -> EventSubscription
    where
        F: Fn(RequestUpdatePayload) + Send + Sync + 'static,
    {
        self.hook.subscribe(ServerEventKind::RequestUpdate.as_str(), f)
    }
}
