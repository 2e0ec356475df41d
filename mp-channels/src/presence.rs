//! Local online-users set.

use std::sync::Arc;

use tokio::sync::watch;

use mp_socket::events::UserId;
use mp_socket::{Connection, ServerEventKind, UserRef, UserStatusPayload};

use crate::hook::EventSubscription;

/// Ordered set of online user ids, observable through a watch channel.
#[derive(Clone)]
pub struct Presence {
    online: Arc<watch::Sender<Vec<UserId>>>,
}

impl Default for Presence {
    fn default() -> Self {
        Self::new()
    }
}

impl Presence {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { online: Arc::new(tx) }
    }

    pub fn set_online(&self, user_id: UserId) {
        self.online.send_if_modified(|users| {
            if users.contains(&user_id) {
                false
            } else {
                users.push(user_id);
                true
            }
        });
    }

    pub fn set_offline(&self, user_id: UserId) {
        self.online.send_if_modified(|users| {
            let before = users.len();
            users.retain(|id| *id != user_id);
            users.len() != before
        });
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online.borrow().contains(&user_id)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.online.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<UserId>> {
        self.online.subscribe()
    }

    /// Track `user_online`, `user_offline` and `user_status_changed` on
    /// `connection` until the returned guards drop.
    pub fn bind(&self, connection: &Connection) -> Vec<EventSubscription> {
        let online = self.clone();
        let offline = self.clone();
        let changed = self.clone();
        vec![
            EventSubscription::typed(
                connection,
                ServerEventKind::UserOnline.as_str(),
                move |user: UserRef| online.set_online(user.user_id),
            ),
            EventSubscription::typed(
                connection,
                ServerEventKind::UserOffline.as_str(),
                move |user: UserRef| offline.set_offline(user.user_id),
            ),
            EventSubscription::typed(
                connection,
                ServerEventKind::UserStatusChanged.as_str(),
                move |status: UserStatusPayload| {
                    if status.is_active {
                        changed.set_online(status.user_id);
                    } else {
                        changed.set_offline(status.user_id);
                    }
                },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_set_semantics() {
        let presence = Presence::new();
        presence.set_online(5);
        presence.set_online(2);
        presence.set_online(5);
        assert_eq!(presence.online_users(), vec![5, 2]);

        presence.set_offline(5);
        presence.set_offline(99);
        assert_eq!(presence.online_users(), vec![2]);
        assert!(presence.is_online(2));
        assert!(!presence.is_online(5));
    }

    #[test]
    fn test_noop_updates_do_not_notify() {
        let presence = Presence::new();
        presence.set_online(1);
        let rx = presence.subscribe();
        presence.set_online(1);
        presence.set_offline(2);
        assert!(!rx.has_changed().unwrap());
    }
}
