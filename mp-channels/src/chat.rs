//! Chat channel adapter.
//!
//! Mounted with an optional chat id. Without one the adapter is inert: it
//! does not connect and every send is a no-op. With one it connects, joins
//! the chat room once the transport is open (again after every reconnect),
//! and leaves the room when dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use mp_core::constants::reserved_events;
use mp_socket::events::{ChatId, MessageId};
use mp_socket::{
    handler, Attachment, ChatMessage, ClientEvent, Connection, EventHandler, NewMessagePayload,
    ServerEventKind, UserRef,
};

use crate::hook::{ChannelHook, EventSubscription};

pub struct ChatChannel {
    hook: ChannelHook,
    chat_id: Option<ChatId>,
    joined: Arc<AtomicBool>,
    rejoin_handler: Option<EventHandler>,
}

impl ChatChannel {
    pub fn mount(connection: Connection, chat_id: Option<ChatId>) -> Self {
        let hook = ChannelHook::attach(connection, chat_id.is_some());
        let joined = Arc::new(AtomicBool::new(false));

        // Registered before connecting so the first open is never missed.
        let rejoin_handler = chat_id.map(|chat_id| {
            let weak = hook.connection().downgrade();
            let joined = joined.clone();
            let h = handler(move |data: &Value| {
                let Some(connection) = weak.upgrade() else {
                    return;
                };
                match data.get("connected").and_then(Value::as_bool) {
                    Some(true) => {
                        if !joined.swap(true, Ordering::SeqCst) {
                            connection.emit_event(&ClientEvent::JoinChat { chat_id });
                        }
                    }
                    Some(false) => joined.store(false, Ordering::SeqCst),
                    None => {}
                }
            });
            hook.on(reserved_events::CONNECTION, h.clone());
            h
        });
        hook.start();

        // Already open before mount: no open event will come for this transport.
        if let Some(chat_id) = chat_id {
            if hook.is_connected() && !joined.swap(true, Ordering::SeqCst) {
                hook.emit_event(&ClientEvent::JoinChat { chat_id });
            }
        }

        Self {
            hook,
            chat_id,
            joined,
            rejoin_handler,
        }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.chat_id
    }

    /// Whether `join_chat` has been sent on the current transport.
    pub fn has_joined(&self) -> bool {
        self.joined.load(Ordering::SeqCst)
    }

    pub fn hook(&self) -> &ChannelHook {
        &self.hook
    }

    pub fn is_connected(&self) -> bool {
        self.hook.is_connected()
    }

    pub fn send_message(&self, content: &str, attachments: Option<Vec<Attachment>>) {
        let Some(chat_id) = self.chat_id else {
            return;
        };
        self.hook.emit_event(&ClientEvent::SendMessage {
            chat_id,
            content: content.to_string(),
            attachments,
        });
    }

    pub fn mark_as_read(&self, message_ids: &[MessageId]) {
        let Some(chat_id) = self.chat_id else {
            return;
        };
        self.hook.emit_event(&ClientEvent::MarkRead {
            chat_id,
            message_ids: message_ids.to_vec(),
        });
    }

    pub fn start_typing(&self) {
        if let Some(chat_id) = self.chat_id {
            self.hook.emit_event(&ClientEvent::TypingStart { chat_id });
        }
    }

    pub fn stop_typing(&self) {
        if let Some(chat_id) = self.chat_id {
            self.hook.emit_event(&ClientEvent::TypingStop { chat_id });
        }
    }

    /// `new_message` broadcasts for any chat on this connection.
    pub fn on_new_message<F>(&self, f: F) -> EventSubscription
    where
        F: Fn(NewMessagePayload) + Send + Sync + 'static,
    {
        self.hook.subscribe(ServerEventKind::NewMessage.as_str(), f)
    }

    /// Flat `chat_message` frames.
    pub fn on_chat_message<F>(&self, f: F) -> EventSubscription
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        self.hook.subscribe(ServerEventKind::ChatMessage.as_str(), f)
    }

    pub fn on_user_joined<F>(&self, f: F) -> EventSubscription
    where
        F: Fn(UserRef) + Send + Sync + 'static,
    {
        self.hook.subscribe(ServerEventKind::UserJoined.as_str(), f)
    }
}

impl Drop for ChatChannel {
    fn drop(&mut self) {
        if let Some(h) = self.rejoin_handler.take() {
            self.hook.off(reserved_events::CONNECTION, &h);
        }
        if let Some(chat_id) = self.chat_id {
            if self.joined.swap(false, Ordering::SeqCst) {
                self.hook.emit_event(&ClientEvent::LeaveChat { chat_id });
                debug!(chat_id, "left chat");
            }
        }
    }
}
