//! Channel registry lifecycle tests.

mod common;

use std::sync::Arc;

use mp_channels::{Channel, ChannelRegistry};
use mp_core::error::MpError;
use mp_socket::{ConnectionState, MemoryConnector};

#[tokio::test(start_paused = true)]
async fn registry_creates_connections_lazily_and_reuses_them() {
    let (registry, connector) = common::create_test_registry();
    assert!(registry.active_channels().is_empty());

    let first = registry.get(Channel::Requests).unwrap();
    let again = registry.get(Channel::Requests).unwrap();
    assert_eq!(first.id(), again.id());

    registry.get(Channel::Chats).unwrap();
    assert_eq!(
        registry.active_channels(),
        vec![Channel::Chats, Channel::Requests]
    );

    // Creating a connection never opens it.
    common::settle().await;
    assert_eq!(connector.attempts(), 0);
    assert_eq!(first.state(), ConnectionState::Disconnected);
    assert!(!first.config().auto_connect);
}

#[tokio::test(start_paused = true)]
async fn registry_connections_use_channel_paths() {
    let (registry, _connector) = common::create_test_registry();
    for channel in Channel::ALL {
        let connection = registry.get(channel).unwrap();
        assert_eq!(connection.url().path(), channel.path());
        assert_eq!(connection.url().query(), Some("token=test-token"));
    }
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_and_disposes_everything() {
    let (registry, connector) = common::create_test_registry();
    let requests = registry.requests().unwrap();
    let connection = registry.get(Channel::Requests).unwrap();
    let events = common::record(&connection, "connection");
    common::settle().await;
    assert!(registry.is_connected(Channel::Requests));
    let _peer = connector.try_next_peer().unwrap();
    assert_eq!(
        connector.attempted_urls()[0].as_str(),
        "ws://localhost:8080/ws/requests?token=test-token"
    );

    registry.shutdown();
    assert!(!requests.is_connected());
    assert!(registry.active_channels().is_empty());
    assert_eq!(connection.dispatcher().handler_count("connection"), 0);
    assert_eq!(events.lock().len(), 1);

    // A fresh connection is created after shutdown.
    let next = registry.get(Channel::Requests).unwrap();
    assert_ne!(next.id(), connection.id());

    tokio::time::advance(common::RETRY_DELAY * 2).await;
    common::settle().await;
    assert_eq!(connector.attempts(), 1);
}

#[test]
fn registry_requires_runtime() {
    let registry = ChannelRegistry::new(
        common::create_test_config(),
        Arc::new(MemoryConnector::new()),
    );
    assert!(matches!(
        registry.get(Channel::Chats),
        Err(MpError::Runtime(_))
    ));
}
