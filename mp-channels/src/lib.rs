//! MebelPlace Channels - Feature adapters over the socket layer.
//!
//! This crate provides:
//! - The channel registry (one connection per chats/requests/notifications path)
//! - A generic mount/unmount hook and RAII event subscriptions
//! - Chat, requests and notifications adapters emitting typed client events
//! - Local typing-indicator and presence state, optionally bound to events
//! - An accumulating, filterable message log

pub mod chat;
pub mod hook;
pub mod message_log;
pub mod notifications;
pub mod presence;
pub mod registry;
pub mod requests;
pub mod typing;

// Re-export key types
pub use chat::ChatChannel;
pub use hook::{ChannelHook, EventSubscription};
pub use message_log::{LoggedMessage, MessageLog};
pub use notifications::NotificationsChannel;
pub use presence::Presence;
pub use registry::{Channel, ChannelRegistry};
pub use requests::RequestsChannel;
pub use typing::{TypingIndicator, TypingState};
