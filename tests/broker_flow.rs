//! End-to-end wire protocol scenarios over real sockets.

mod common;

use common::{admin_get, TestPeer, TestRuntime};
use trackcast::config::{AuthConfig, AuthMode};
use trackcast::protocol::{ClientMessage, DisconnectReason, ErrorCode, Role, ServerMessage};

#[tokio::test]
async fn welcome_precedes_authentication() {
    let rt = TestRuntime::start().await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;
    assert!(matches!(peer.recv().await, ServerMessage::Welcome { .. }));
    rt.shutdown().await;
}

#[tokio::test]
async fn status_event_reaches_only_topic_subscribers() {
    let rt = TestRuntime::start().await;

    let mut interested = TestPeer::connect(rt.peer_addr).await;
    interested.authenticate("dash-1", Role::Client, "dev").await;
    interested.subscribe("PKG-1").await;

    let mut bystander = TestPeer::connect(rt.peer_addr).await;
    bystander.authenticate("dash-2", Role::Client, "dev").await;
    bystander.subscribe("PKG-2").await;

    let (code, body) = admin_get(
        rt.admin_addr,
        "/v1/notify?topic=PKG-1&status=out_for_delivery&details=van+42",
    )
    .await;
    assert_eq!(code, 200);
    assert_eq!(body, "{\"delivered\":1}");

    let event = interested
        .recv_until(|m| matches!(m, ServerMessage::PackageUpdate { .. }))
        .await;
    match event {
        ServerMessage::PackageUpdate { topic, payload, .. } => {
            assert_eq!(topic, "PKG-1");
            assert_eq!(payload.status, "out_for_delivery");
            assert_eq!(payload.details.as_deref(), Some("van 42"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The bystander sees nothing beyond its own acks; a ping/pong round trip
    // proves the channel is drained.
    bystander.send(&ClientMessage::Ping).await;
    let next = bystander
        .recv_until(|m| {
            matches!(
                m,
                ServerMessage::Pong { .. } | ServerMessage::PackageUpdate { .. }
            )
        })
        .await;
    assert!(matches!(next, ServerMessage::Pong { .. }));

    rt.shutdown().await;
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let rt = TestRuntime::start().await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;
    peer.authenticate("dash-1", Role::Client, "dev").await;
    peer.subscribe("PKG-1").await;

    peer.send(&ClientMessage::UnsubscribeTopic {
        topic: "PKG-1".into(),
    })
    .await;
    peer.recv_until(|m| matches!(m, ServerMessage::Unsubscribed { .. }))
        .await;

    let (_, body) = admin_get(rt.admin_addr, "/v1/notify?topic=PKG-1&status=delivered").await;
    assert_eq!(body, "{\"delivered\":0}");
    rt.shutdown().await;
}

#[tokio::test]
async fn courier_location_fans_out_to_subscribers() {
    let rt = TestRuntime::start().await;

    let mut watcher = TestPeer::connect(rt.peer_addr).await;
    watcher.authenticate("dash-1", Role::Client, "dev").await;
    watcher.subscribe("PKG-7").await;

    let mut courier = TestPeer::connect(rt.peer_addr).await;
    courier.authenticate("c-9", Role::Courier, "dev").await;
    courier
        .send(&ClientMessage::UpdateLocation {
            topic: "PKG-7".into(),
            latitude: 52.52,
            longitude: 13.405,
            accuracy: Some(12.0),
        })
        .await;

    let event = watcher
        .recv_until(|m| matches!(m, ServerMessage::LocationUpdate { .. }))
        .await;
    match event {
        ServerMessage::LocationUpdate { topic, payload, .. } => {
            assert_eq!(topic, "PKG-7");
            assert!((payload.latitude - 52.52).abs() < f64::EPSILON);
            assert_eq!(payload.accuracy, Some(12.0));
        }
        other => panic!("unexpected event {other:?}"),
    }
    rt.shutdown().await;
}

#[tokio::test]
async fn client_role_may_not_publish_location() {
    let rt = TestRuntime::start().await;

    let mut watcher = TestPeer::connect(rt.peer_addr).await;
    watcher.authenticate("dash-1", Role::Client, "dev").await;
    watcher.subscribe("PKG-1").await;

    let mut client = TestPeer::connect(rt.peer_addr).await;
    client.authenticate("dash-2", Role::Client, "dev").await;
    client
        .send(&ClientMessage::UpdateLocation {
            topic: "PKG-1".into(),
            latitude: 0.0,
            longitude: 0.0,
            accuracy: None,
        })
        .await;

    let reply = client
        .recv_until(|m| matches!(m, ServerMessage::Error { .. }))
        .await;
    match reply {
        ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::NotAuthorized),
        other => panic!("unexpected reply {other:?}"),
    }

    // Zero broadcasts happened: the watcher's next frame is its own pong.
    watcher.send(&ClientMessage::Ping).await;
    let next = watcher
        .recv_until(|m| {
            matches!(
                m,
                ServerMessage::Pong { .. } | ServerMessage::LocationUpdate { .. }
            )
        })
        .await;
    assert!(matches!(next, ServerMessage::Pong { .. }));
    rt.shutdown().await;
}

#[tokio::test]
async fn messages_before_authentication_are_rejected() {
    let rt = TestRuntime::start().await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;

    // Every non-authenticate message gets a not_authenticated error and no
    // other reply; ping is not answered with pong and echo is not echoed.
    let attempts = [
        ClientMessage::SubscribeTopic {
            topic: "PKG-1".into(),
        },
        ClientMessage::UnsubscribeTopic {
            topic: "PKG-1".into(),
        },
        ClientMessage::UpdateLocation {
            topic: "PKG-1".into(),
            latitude: 0.0,
            longitude: 0.0,
            accuracy: None,
        },
        ClientMessage::Ping,
        ClientMessage::Pong,
        ClientMessage::Echo {
            payload: serde_json::json!({"x": 1}),
        },
    ];
    for attempt in &attempts {
        peer.send(attempt).await;
        let reply = peer
            .recv_until(|m| !matches!(m, ServerMessage::Welcome { .. }))
            .await;
        match reply {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::NotAuthenticated),
            other => panic!("expected not_authenticated error, got {other:?}"),
        }
    }

    // No state leaked: the handshake still works on the same connection.
    peer.authenticate("dash-1", Role::Client, "dev").await;
    rt.shutdown().await;
}

#[tokio::test]
async fn empty_topic_rejected_on_subscribe_and_unsubscribe() {
    let rt = TestRuntime::start().await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;
    peer.authenticate("dash-1", Role::Client, "dev").await;

    for message in [
        ClientMessage::SubscribeTopic { topic: String::new() },
        ClientMessage::UnsubscribeTopic { topic: String::new() },
    ] {
        peer.send(&message).await;
        let reply = peer
            .recv_until(|m| matches!(m, ServerMessage::Error { .. }))
            .await;
        match reply {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::Protocol),
            other => panic!("unexpected reply {other:?}"),
        }
    }

    // The connection is still usable.
    peer.subscribe("PKG-1").await;
    rt.shutdown().await;
}

#[tokio::test]
async fn unauthenticated_connection_closed_after_deadline() {
    let rt = TestRuntime::start_with_auth_deadline(1).await;

    let mut idle = TestPeer::connect(rt.peer_addr).await;
    assert!(matches!(idle.recv().await, ServerMessage::Welcome { .. }));
    assert!(idle.wait_closed().await, "idle connection was not closed");

    // An authenticated connection outlives the deadline.
    let mut active = TestPeer::connect(rt.peer_addr).await;
    active.authenticate("dash-1", Role::Client, "dev").await;
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    active.send(&ClientMessage::Ping).await;
    let reply = active
        .recv_until(|m| matches!(m, ServerMessage::Pong { .. }))
        .await;
    assert!(matches!(reply, ServerMessage::Pong { .. }));
    rt.shutdown().await;
}

#[tokio::test]
async fn malformed_and_unknown_messages_keep_the_connection_open() {
    let rt = TestRuntime::start().await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;

    peer.send_raw("this is not json").await;
    let reply = peer
        .recv_until(|m| matches!(m, ServerMessage::Error { .. }))
        .await;
    assert!(matches!(
        reply,
        ServerMessage::Error {
            code: ErrorCode::Protocol,
            ..
        }
    ));

    peer.send_raw(r#"{"type":"format_disk"}"#).await;
    let reply = peer
        .recv_until(|m| matches!(m, ServerMessage::Error { .. }))
        .await;
    assert!(matches!(
        reply,
        ServerMessage::Error {
            code: ErrorCode::Protocol,
            ..
        }
    ));

    // Connection survives and the handshake still works.
    peer.authenticate("dash-1", Role::Client, "dev").await;
    rt.shutdown().await;
}

#[tokio::test]
async fn rejected_handshake_keeps_connection_open_for_retry() {
    let auth = AuthConfig {
        mode: AuthMode::Static,
        admin_token: None,
        courier_token: Some("right".into()),
        client_token: None,
    };
    let rt = TestRuntime::start_with(3600, auth).await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;

    peer.send(&ClientMessage::Authenticate {
        identity: "c-1".into(),
        role: Role::Courier,
        credential_token: "wrong".into(),
    })
    .await;
    let reply = peer
        .recv_until(|m| matches!(m, ServerMessage::Error { .. }))
        .await;
    assert!(matches!(
        reply,
        ServerMessage::Error {
            code: ErrorCode::AuthenticationFailed,
            ..
        }
    ));

    // Same connection, correct token.
    peer.authenticate("c-1", Role::Courier, "right").await;
    rt.shutdown().await;
}

#[tokio::test]
async fn second_connection_takes_over_the_identity() {
    let rt = TestRuntime::start_with(3600, AuthConfig::default()).await;

    let mut first = TestPeer::connect(rt.peer_addr).await;
    first.authenticate("dash-1", Role::Client, "dev").await;
    first.subscribe("PKG-1").await;

    let mut second = TestPeer::connect(rt.peer_addr).await;
    second.authenticate("dash-1", Role::Client, "dev").await;

    let notice = first
        .recv_until(|m| matches!(m, ServerMessage::Disconnect { .. }))
        .await;
    assert!(matches!(
        notice,
        ServerMessage::Disconnect {
            reason: DisconnectReason::SessionTakenOver
        }
    ));
    assert!(first.wait_closed().await);

    // Subscriptions carried over; the event lands on the new connection,
    // and the old connection's teardown did not evict it.
    let (_, body) = admin_get(rt.admin_addr, "/v1/notify?topic=PKG-1&status=delivered").await;
    assert_eq!(body, "{\"delivered\":1}");
    second
        .recv_until(|m| matches!(m, ServerMessage::PackageUpdate { .. }))
        .await;
    rt.shutdown().await;
}

#[tokio::test]
async fn echo_and_ping_round_trip() {
    let rt = TestRuntime::start().await;
    let mut peer = TestPeer::connect(rt.peer_addr).await;
    peer.authenticate("dash-1", Role::Client, "dev").await;

    peer.send(&ClientMessage::Echo {
        payload: serde_json::json!({"marco": "polo"}),
    })
    .await;
    let reply = peer
        .recv_until(|m| matches!(m, ServerMessage::Echo { .. }))
        .await;
    match reply {
        ServerMessage::Echo { payload } => {
            assert_eq!(payload, serde_json::json!({"marco": "polo"}));
        }
        other => panic!("unexpected reply {other:?}"),
    }

    peer.send(&ClientMessage::Ping).await;
    let reply = peer
        .recv_until(|m| matches!(m, ServerMessage::Pong { .. }))
        .await;
    match reply {
        ServerMessage::Pong { timestamp_ms } => assert!(timestamp_ms > 0),
        other => panic!("unexpected reply {other:?}"),
    }
    rt.shutdown().await;
}

#[tokio::test]
async fn disconnect_reclaims_registry_and_subscriptions() {
    let rt = TestRuntime::start().await;

    let mut peer = TestPeer::connect(rt.peer_addr).await;
    peer.authenticate("dash-1", Role::Client, "dev").await;
    peer.subscribe("PKG-1").await;
    drop(peer);

    // Deliveries stop once the teardown lands; poll briefly.
    let mut reclaimed = false;
    for _ in 0..50 {
        let (_, body) = admin_get(rt.admin_addr, "/metrics").await;
        if body.contains("trackcast_sessions 0") && body.contains("trackcast_topics_active 0") {
            reclaimed = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(reclaimed, "disconnect did not reclaim broker state");
    rt.shutdown().await;
}
