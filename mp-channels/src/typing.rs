//! Local "who is typing" state.
//!
//! Updated by the caller, or fed from a connection's `typing_start` and
//! `typing_stop` events with [`TypingIndicator::bind`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use mp_socket::events::UserId;
use mp_socket::{Connection, ServerEventKind, UserRef};

use crate::hook::EventSubscription;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypingState {
    /// Set by any `start_typing`, reset only by `clear_typing`.
    pub is_typing: bool,
    /// Users currently typing, in the order they started.
    pub users: Vec<UserId>,
}

#[derive(Clone)]
pub struct TypingIndicator {
    state: Arc<watch::Sender<TypingState>>,
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingIndicator {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TypingState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    pub fn start_typing(&self, user_id: UserId) {
        self.state.send_modify(|state| {
            if !state.users.contains(&user_id) {
                state.users.push(user_id);
            }
            state.is_typing = true;
        });
    }

    pub fn stop_typing(&self, user_id: UserId) {
        self.state
            .send_modify(|state| state.users.retain(|id| *id != user_id));
    }

    pub fn clear_typing(&self) {
        self.state.send_replace(TypingState::default());
    }

    pub fn is_typing(&self) -> bool {
        self.state.borrow().is_typing
    }

    pub fn typing_users(&self) -> Vec<UserId> {
        self.state.borrow().users.clone()
    }

    pub fn snapshot(&self) -> TypingState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TypingState> {
        self.state.subscribe()
    }

    /// Track typing events on `connection` until the returned guards drop.
    pub fn bind(&self, connection: &Connection) -> Vec<EventSubscription> {
        let start = self.clone();
        let stop = self.clone();
        vec![
            EventSubscription::typed(
                connection,
                ServerEventKind::TypingStart.as_str(),
                move |user: UserRef| start.start_typing(user.user_id),
            ),
            EventSubscription::typed(
                connection,
                ServerEventKind::TypingStop.as_str(),
                move |user: UserRef| stop.stop_typing(user.user_id),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_dedupes_and_keeps_order() {
        let typing = TypingIndicator::new();
        typing.start_typing(3);
        typing.start_typing(1);
        typing.start_typing(3);
        assert_eq!(typing.typing_users(), vec![3, 1]);
        assert!(typing.is_typing());
    }

    #[test]
    fn test_stop_keeps_flag_until_clear() {
        let typing = TypingIndicator::new();
        typing.start_typing(1);
        typing.stop_typing(1);
        typing.stop_typing(42);
        assert!(typing.typing_users().is_empty());
        assert!(typing.is_typing());

        typing.clear_typing();
        assert_eq!(typing.snapshot(), TypingState::default());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let typing = TypingIndicator::new();
        let rx = typing.subscribe();
        typing.start_typing(7);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().users, vec![7]);
    }
}
