//! Realtime Flow Integration Tests
//!
//! Purpose: Verify the full in-process flow from rooms and the connection
//! registry through the notification store and fanout, without a network.
//!
//! Test Coverage:
//! 1. Room scoping: messages reach only the members of that room
//! 2. No replay: joining a room never surfaces earlier messages
//! 3. Entitlement checks on department rooms
//! 4. Store-backed catch-up after a silent offline period
//! 5. Forced invalidation closes every connection of a subject
//! 6. Per-room publish order is identical for every member
//!
//! Run: cargo test --test realtime_flow_tests

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use realtime_service::auth::Claims;
use realtime_service::config::{Config, PushRelayConfig};
use realtime_service::services::{
    BrowserPushSender, InMemoryNotificationStore, NotificationFanout, NotificationStore,
};
use realtime_service::models::NotificationPayload;
use realtime_service::websocket::{
    ConnectionId, ConnectionRegistry, RoomId, RoomRouter, ServerEvent,
};

fn claims_for(sub: Uuid, departments: Vec<Uuid>) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub,
        name: format!("user-{}", &sub.to_string()[..8]),
        role: "member".to_string(),
        departments,
        iat: now,
        exp: now + 3600,
    }
}

fn payload(title: &str) -> NotificationPayload {
    NotificationPayload {
        title: title.to_string(),
        body: "body".to_string(),
        link: None,
    }
}

async fn connect(
    registry: &ConnectionRegistry,
    subject: Uuid,
) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
    registry.register(subject).await
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(json) = rx.try_recv() {
        events.push(ServerEvent::from_json(&json).expect("server event should parse"));
    }
    events
}

fn room_texts(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::RoomMessage { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn test_fanout(
    registry: &ConnectionRegistry,
) -> (Arc<NotificationFanout>, Arc<InMemoryNotificationStore>) {
    let config = Config {
        port: 8080,
        jwt_secret: "flow-test-secret".to_string(),
        jwt_leeway_seconds: 0,
        database_url: None,
        db_max_connections: 1,
        heartbeat_interval_seconds: 5,
        client_timeout_seconds: 30,
        credential_recheck_seconds: 60,
        push_relay: PushRelayConfig {
            url: None,
            token: None,
        },
    };
    let store = Arc::new(InMemoryNotificationStore::new());
    let fanout = Arc::new(NotificationFanout::new(
        store.clone(),
        registry.clone(),
        BrowserPushSender::from_config(&config),
    ));
    (fanout, store)
}

#[tokio::test]
async fn test_messages_stay_inside_their_room() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRouter::new(registry.clone());
    let department = Uuid::new_v4();

    let insider = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let (insider_conn, mut insider_rx) = connect(&registry, insider).await;
    let (outsider_conn, mut outsider_rx) = connect(&registry, outsider).await;

    let dept_room = RoomId::Department(department);
    rooms
        .join(insider_conn, &claims_for(insider, vec![department]), dept_room.clone())
        .await
        .unwrap();
    rooms
        .join(outsider_conn, &claims_for(outsider, vec![]), RoomId::Public)
        .await
        .unwrap();

    rooms
        .publish(&dept_room, insider_conn, insider, "Ana", "budget draft".to_string())
        .await
        .unwrap();

    let insider_events = drain(&mut insider_rx);
    assert_eq!(room_texts(&insider_events), vec!["budget draft"]);
    assert!(
        drain(&mut outsider_rx).is_empty(),
        "a department message must not reach the public room"
    );
}

#[tokio::test]
async fn test_join_never_surfaces_earlier_messages() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRouter::new(registry.clone());

    let early = Uuid::new_v4();
    let late = Uuid::new_v4();
    let (early_conn, mut early_rx) = connect(&registry, early).await;
    rooms
        .join(early_conn, &claims_for(early, vec![]), RoomId::Public)
        .await
        .unwrap();

    rooms
        .publish(&RoomId::Public, early_conn, early, "Ana", "before".to_string())
        .await
        .unwrap();

    // A second connection joins after the first message went out.
    let (late_conn, mut late_rx) = connect(&registry, late).await;
    rooms
        .join(late_conn, &claims_for(late, vec![]), RoomId::Public)
        .await
        .unwrap();
    assert!(
        drain(&mut late_rx).is_empty(),
        "joining must not replay room history"
    );

    rooms
        .publish(&RoomId::Public, early_conn, early, "Ana", "after".to_string())
        .await
        .unwrap();

    assert_eq!(room_texts(&drain(&mut early_rx)), vec!["before", "after"]);
    assert_eq!(room_texts(&drain(&mut late_rx)), vec!["after"]);
}

#[tokio::test]
async fn test_department_room_requires_entitlement() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRouter::new(registry.clone());
    let department = Uuid::new_v4();

    let subject = Uuid::new_v4();
    let claims = claims_for(subject, vec![Uuid::new_v4()]);
    let (conn, _rx) = connect(&registry, subject).await;

    rooms.join(conn, &claims, RoomId::Public).await.unwrap();

    let err = rooms
        .join(conn, &claims, RoomId::Department(department))
        .await
        .unwrap_err();
    assert!(matches!(err, realtime_service::AppError::RoomAccessDenied(_)));
    assert!(!rooms.is_member(&RoomId::Department(department), conn).await);
    assert!(
        rooms.is_member(&RoomId::Public, conn).await,
        "a refused join must not disturb memberships already held"
    );
}

#[tokio::test]
async fn test_offline_subject_catches_up_through_the_store() {
    let registry = ConnectionRegistry::new();
    let (fanout, store) = test_fanout(&registry);
    let recipient = Uuid::new_v4();

    // Nobody connected; pushes are silently skipped but the store keeps both.
    fanout.notify(recipient, payload("first")).await.unwrap();
    fanout.notify(recipient, payload("second")).await.unwrap();

    // On reconnect the client asks the store, newest first.
    let unread = store.list_unread(recipient).await.unwrap();
    let titles: Vec<&str> = unread.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["second", "first"]);
    assert_eq!(store.unread_count(recipient).await.unwrap(), 2);
}

#[tokio::test]
async fn test_forced_invalidation_closes_every_connection() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRouter::new(registry.clone());
    let target = Uuid::new_v4();
    let witness = Uuid::new_v4();

    let (conn_a, mut rx_a) = connect(&registry, target).await;
    let (_conn_b, mut rx_b) = connect(&registry, target).await;
    let (conn_w, mut rx_w) = connect(&registry, witness).await;

    rooms
        .join(conn_a, &claims_for(target, vec![]), RoomId::Public)
        .await
        .unwrap();
    rooms
        .join(conn_w, &claims_for(witness, vec![]), RoomId::Public)
        .await
        .unwrap();

    let dropped = registry.disconnect_subject(target).await;
    assert_eq!(dropped, 2);

    // Both channels are closed: the sessions would now terminate their
    // transports.
    assert!(rx_a.recv().await.is_none());
    assert!(rx_b.recv().await.is_none());

    // The witness keeps working; the dead membership is pruned on publish.
    rooms
        .publish(&RoomId::Public, conn_w, witness, "Wit", "still here".to_string())
        .await
        .unwrap();
    assert_eq!(room_texts(&drain(&mut rx_w)), vec!["still here"]);
    assert_eq!(rooms.member_count(&RoomId::Public).await, 1);
}

#[tokio::test]
async fn test_members_see_one_publish_order_under_concurrency() {
    let registry = ConnectionRegistry::new();
    let rooms = RoomRouter::new(registry.clone());

    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let carol = Uuid::new_v4();
    let (alice_conn, mut alice_rx) = connect(&registry, alice).await;
    let (bob_conn, mut bob_rx) = connect(&registry, bob).await;
    let (carol_conn, mut carol_rx) = connect(&registry, carol).await;

    for (conn, sub) in [(alice_conn, alice), (bob_conn, bob), (carol_conn, carol)] {
        rooms
            .join(conn, &claims_for(sub, vec![]), RoomId::Public)
            .await
            .unwrap();
    }

    // Two members publish concurrently.
    let rooms_a = rooms.clone();
    let publisher_a = tokio::spawn(async move {
        for i in 0..10 {
            rooms_a
                .publish(&RoomId::Public, alice_conn, alice, "Alice", format!("a-{i}"))
                .await
                .unwrap();
        }
    });
    let rooms_b = rooms.clone();
    let publisher_b = tokio::spawn(async move {
        for i in 0..10 {
            rooms_b
                .publish(&RoomId::Public, bob_conn, bob, "Bob", format!("b-{i}"))
                .await
                .unwrap();
        }
    });
    publisher_a.await.unwrap();
    publisher_b.await.unwrap();

    let seq_alice = room_texts(&drain(&mut alice_rx));
    let seq_bob = room_texts(&drain(&mut bob_rx));
    let seq_carol = room_texts(&drain(&mut carol_rx));

    assert_eq!(seq_alice.len(), 20);
    assert_eq!(
        seq_alice, seq_bob,
        "every member must observe the same room order"
    );
    assert_eq!(seq_alice, seq_carol);

    // Each publisher's own messages keep their relative order.
    let only_a: Vec<&String> = seq_carol.iter().filter(|t| t.starts_with("a-")).collect();
    let expected_a: Vec<String> = (0..10).map(|i| format!("a-{i}")).collect();
    assert_eq!(only_a, expected_a.iter().collect::<Vec<_>>());
}

#[tokio::test]
async fn test_unread_badge_converges_after_mark_all_read() {
    let registry = ConnectionRegistry::new();
    let (fanout, store) = test_fanout(&registry);
    let recipient = Uuid::new_v4();

    for title in ["one", "two", "three"] {
        fanout.notify(recipient, payload(title)).await.unwrap();
    }
    let updated = store.mark_all_read(recipient).await.unwrap();
    assert_eq!(updated, 3);

    let (_conn, mut rx) = connect(&registry, recipient).await;
    fanout.push_unread_count(recipient).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::UnreadCount { count: 0 }));
}

#[tokio::test]
async fn test_marking_foreign_notifications_is_refused() {
    let registry = ConnectionRegistry::new();
    let (fanout, store) = test_fanout(&registry);
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let created = fanout.notify(owner, payload("private")).await.unwrap();

    let err = store.mark_read(created.id, stranger).await.unwrap_err();
    assert!(matches!(err, realtime_service::AppError::NotificationNotFound));
    assert_eq!(
        store.unread_count(owner).await.unwrap(),
        1,
        "the owner's unread state must be untouched"
    );
}
