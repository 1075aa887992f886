//! Bridge behaviour driven through the mock connector.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::transport::ReadyState;
use crate::transport::testing::MockConnector;

use super::*;

// ============================================================================
// Helpers
// ============================================================================

fn bridge_with(options: BridgeOptions) -> (Bridge, Arc<MockConnector>) {
    let connector = MockConnector::new();
    let bridge = Bridge::builder()
        .options(options)
        .host("10.0.0.5")
        .port(9999)
        .connector(Arc::clone(&connector) as Arc<dyn crate::transport::Connector>)
        .build()
        .expect("build bridge");
    (bridge, connector)
}

fn bridge() -> (Bridge, Arc<MockConnector>) {
    bridge_with(BridgeOptions::default())
}

fn keep_alive() -> BridgeOptions {
    BridgeOptions::new().with_disconnect_when_idle(false)
}

fn record_events(bridge: &Bridge) -> Arc<Mutex<Vec<BridgeEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge.on_change(move |event| sink.lock().push(event.clone()));
    seen
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_subscribe_then_unsubscribe_scenario() {
    let (bridge, connector) = bridge();

    bridge.subscribe("/imu", SubscribeOptions::with_rate(10.0));
    assert_eq!(connector.opened(), 1);
    assert_eq!(bridge.status(), ConnectionState::Connecting);

    let socket = connector.last();
    assert_eq!(socket.url.as_str(), "ws://10.0.0.5:9999/rosboard/v1");
    socket.accept();

    assert!(bridge.is_connected());
    assert_eq!(
        socket.sent(),
        vec![json!(["s", {"topicName": "/imu", "maxUpdateRate": 10}])]
    );
    assert!(bridge.is_subscribed_on_wire("/imu"));

    bridge.unsubscribe("/imu");

    assert_eq!(socket.sent_with_tag("u"), vec![json!(["u", {"topicName": "/imu"}])]);
    assert_eq!(socket.state(), ReadyState::Closed);
    assert_eq!(bridge.status(), ConnectionState::Disconnected);
    assert_eq!(bridge.active_topic_count(), 0);
}

#[test]
fn test_duplicate_subscribe_sends_once() {
    let (bridge, connector) = bridge();

    bridge.subscribe("/imu", SubscribeOptions::default());
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    bridge.subscribe("/imu", SubscribeOptions::default());

    assert_eq!(connector.opened(), 1);
    assert_eq!(connector.last().sent_with_tag("s").len(), 1);
    assert_eq!(bridge.refcount("/imu"), 3);
}

#[test]
fn test_default_rate_applied() {
    let (bridge, connector) = bridge_with(BridgeOptions::new().with_default_update_rate(5.0));
    bridge.subscribe("/gps", SubscribeOptions::default());
    connector.last().accept();
    assert_eq!(
        connector.last().sent(),
        vec![json!(["s", {"topicName": "/gps", "maxUpdateRate": 5}])]
    );
}

#[test]
fn test_rate_change_resends_immediately() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/imu", SubscribeOptions::with_rate(10.0));
    connector.last().accept();

    bridge.subscribe("/imu", SubscribeOptions::with_rate(2.5));

    let subs = connector.last().sent_with_tag("s");
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[1], json!(["s", {"topicName": "/imu", "maxUpdateRate": 2.5}]));
    assert_eq!(
        bridge.subscription("/imu").map(|sub| sub.max_update_rate),
        Some(2.5)
    );
}

#[test]
fn test_subscribe_before_open_event_waits_for_resync() {
    let (bridge, connector) = bridge();
    bridge.connect();
    let socket = connector.last();

    // Transport is open but the bridge has not seen the open event yet
    socket.mark_open();
    bridge.subscribe("/imu", SubscribeOptions::default());
    bridge.subscribe("/imu", SubscribeOptions::with_rate(3.0));
    assert!(socket.sent().is_empty());
    assert_eq!(bridge.status(), ConnectionState::Connecting);

    socket.announce_open();

    assert_eq!(
        socket.sent_with_tag("s"),
        vec![json!(["s", {"topicName": "/imu", "maxUpdateRate": 3}])]
    );
    assert!(bridge.is_subscribed_on_wire("/imu"));
}

#[test]
fn test_topic_name_trimmed_and_empty_ignored() {
    let (bridge, connector) = bridge();
    bridge.subscribe("   ", SubscribeOptions::default());
    assert_eq!(connector.opened(), 0);

    bridge.subscribe("  /imu ", SubscribeOptions::default());
    assert_eq!(bridge.refcount("/imu"), 1);

    bridge.unsubscribe("/unknown");
    assert_eq!(bridge.active_topic_count(), 1);
}

#[test]
fn test_reopen_resyncs_every_topic_once() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/a", SubscribeOptions::default());
    bridge.subscribe("/b", SubscribeOptions::with_rate(1.0));
    connector.last().accept();
    assert_eq!(connector.last().sent_with_tag("s").len(), 2);

    connector.last().drop_connection();
    assert_eq!(bridge.status(), ConnectionState::Disconnected);
    assert!(!bridge.is_subscribed_on_wire("/a"));

    bridge.connect();
    assert_eq!(connector.opened(), 2);
    let second = connector.socket(1);
    second.accept();

    let topics: Vec<_> = second
        .sent_with_tag("s")
        .iter()
        .map(|frame| frame[1]["topicName"].clone())
        .collect();
    assert_eq!(topics, vec![json!("/a"), json!("/b")]);
}

#[test]
fn test_ping_answered_with_pong() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/imu", SubscribeOptions::default());
    let socket = connector.last();
    socket.accept();

    socket.receive(r#"["p", {"s": 7}]"#);

    let sent = socket.sent();
    let pong = sent.last().expect("pong sent");
    assert_eq!(pong[0], "q");
    assert_eq!(pong[1]["s"], 7);
    assert!(pong[1]["t"].as_i64().is_some_and(|t| t > 0));
}

#[test]
fn test_empty_catalog_prunes_cached_message() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/x", SubscribeOptions::default());
    let socket = connector.last();
    socket.accept();

    socket.receive(r#"["m", {"_topic_name": "/x", "_topic_type": "T", "val": 1}]"#);
    assert_eq!(bridge.topic_type("/x").as_deref(), Some("T"));
    assert_eq!(
        bridge.latest("/x").and_then(|m| m.field("val").cloned()),
        Some(json!(1))
    );

    socket.receive(r#"["t", {}]"#);
    assert!(bridge.latest("/x").is_none());
    assert!(bridge.topics().is_empty());
}

#[test]
fn test_catalog_and_nodes() {
    let (bridge, connector) = bridge();
    bridge.connect();
    let socket = connector.last();
    socket.accept();

    socket.receive(r#"["t", {"/rover/imu": "sensor_msgs/Imu", "/arm/joint": "sensor_msgs/JointState"}]"#);

    assert_eq!(bridge.topics().len(), 2);
    assert_eq!(bridge.nodes(), vec!["arm".to_owned(), "rover".to_owned()]);
}

#[test]
fn test_system_info_stored() {
    let (bridge, connector) = bridge();
    bridge.connect();
    connector.last().accept();
    connector.last().receive(r#"["y", {"hostname": "rover", "version": "1.3"}]"#);
    assert_eq!(
        bridge.system_info(),
        Some(json!({"hostname": "rover", "version": "1.3"}))
    );
}

#[test]
fn test_relaxed_json_accepted() {
    let (bridge, connector) = bridge();
    bridge.connect();
    connector.last().accept();
    connector.last().receive(r#"["m", {_topic_name: "/x", val: 2,}]"#);
    assert_eq!(
        bridge
            .latest("/x")
            .and_then(|m| m.field("val").and_then(serde_json::Value::as_f64)),
        Some(2.0)
    );
    assert!(bridge.last_error().is_none());
}

#[test]
fn test_malformed_frame_recorded_not_fatal() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/x", SubscribeOptions::default());
    let socket = connector.last();
    socket.accept();
    socket.receive(r#"["m", {"_topic_name": "/x", "val": 1}]"#);

    socket.receive("{{ not json at all");

    assert!(bridge.is_connected());
    assert!(bridge.last_error().is_some());
    assert!(bridge.latest("/x").is_some());
    assert_eq!(socket.state(), ReadyState::Open);
}

#[test]
fn test_wrong_shape_discarded_silently() {
    let (bridge, connector) = bridge();
    bridge.connect();
    connector.last().accept();

    connector.last().receive("[1]");
    connector.last().receive(r#"{"p": 1}"#);

    assert!(bridge.last_error().is_none());
    assert!(bridge.is_connected());
}

#[test]
fn test_embedded_error_recorded_without_state_change() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/cam", SubscribeOptions::default());
    connector.last().accept();

    connector
        .last()
        .receive(r#"["m", {"_topic_name": "/cam", "_error": "no such topic"}]"#);

    assert_eq!(bridge.last_error().as_deref(), Some("no such topic"));
    assert!(bridge.is_connected());
}

#[test]
fn test_idle_disabled_keeps_socket_open() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();

    bridge.unsubscribe("/imu");

    assert_eq!(connector.last().state(), ReadyState::Open);
    assert!(bridge.is_connected());
    assert_eq!(bridge.active_topic_count(), 0);
}

#[test]
fn test_unsubscribe_evicts_topic_from_caches() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/x", SubscribeOptions::default());
    connector.last().accept();
    connector
        .last()
        .receive(r#"["m", {"_topic_name": "/x", "_topic_type": "T"}]"#);

    bridge.unsubscribe("/x");

    assert!(bridge.latest("/x").is_none());
    assert!(bridge.topic_type("/x").is_none());
}

#[test]
fn test_refcount_keeps_topic_until_last_holder() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/x", SubscribeOptions::default());
    bridge.subscribe("/x", SubscribeOptions::default());
    connector.last().accept();

    bridge.unsubscribe("/x");
    assert!(connector.last().sent_with_tag("u").is_empty());
    assert!(bridge.is_connected());

    bridge.unsubscribe("/x");
    assert_eq!(connector.last().sent_with_tag("u").len(), 1);
    assert_eq!(bridge.refcount("/x"), 0);
}

#[test]
fn test_unsubscribe_before_open_sends_nothing() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/x", SubscribeOptions::default());
    bridge.unsubscribe("/x");

    assert_eq!(connector.last().state(), ReadyState::Closed);
    assert!(connector.last().sent().is_empty());
}

#[test]
fn test_clear_all_subscriptions() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/a", SubscribeOptions::default());
    bridge.subscribe("/b", SubscribeOptions::default());
    let socket = connector.last();
    socket.accept();
    socket.receive(r#"["m", {"_topic_name": "/a", "_topic_type": "T"}]"#);

    bridge.clear_all_subscriptions();

    assert_eq!(socket.sent_with_tag("u").len(), 2);
    assert_eq!(bridge.active_topic_count(), 0);
    assert!(bridge.latest("/a").is_none());
    assert_eq!(bridge.topic_type("/a").as_deref(), Some("T"));
}

#[test]
fn test_unconfigured_subscribe_records_error() {
    let connector = MockConnector::new();
    let bridge = Bridge::builder()
        .connector(Arc::clone(&connector) as Arc<dyn crate::transport::Connector>)
        .build()
        .expect("build");

    bridge.subscribe("/imu", SubscribeOptions::default());

    assert_eq!(connector.opened(), 0);
    assert_eq!(bridge.status(), ConnectionState::Error);
    assert!(bridge.last_error().is_some());
    assert_eq!(bridge.active_topic_count(), 1);
    assert!(bridge.url().is_none());

    bridge.configure(Some("10.0.0.5"), None);
    bridge.ensure_connected();
    assert_eq!(connector.opened(), 1);
    assert_eq!(bridge.status(), ConnectionState::Connecting);
}

#[test]
fn test_ensure_connected_without_host() {
    let connector = MockConnector::new();
    let bridge = Bridge::builder()
        .connector(Arc::clone(&connector) as Arc<dyn crate::transport::Connector>)
        .build()
        .expect("build");

    bridge.ensure_connected();

    assert_eq!(connector.opened(), 0);
    assert_eq!(bridge.status(), ConnectionState::Disconnected);
    assert_eq!(bridge.last_error().as_deref(), Some("Board host is not configured"));
}

#[test]
fn test_ensure_connected_reuses_usable_socket() {
    let (bridge, connector) = bridge();
    bridge.ensure_connected();
    bridge.ensure_connected();
    connector.last().accept();
    bridge.ensure_connected();
    assert_eq!(connector.opened(), 1);
}

#[test]
fn test_transport_error_sets_error_then_disconnected() {
    let (bridge, connector) = bridge();
    let seen = record_events(&bridge);
    bridge.subscribe("/imu", SubscribeOptions::default());

    connector.last().fail("connection refused");

    assert_eq!(bridge.status(), ConnectionState::Disconnected);
    assert_eq!(
        bridge.last_error().as_deref(),
        Some("Failed to connect to ROSboard at ws://10.0.0.5:9999/rosboard/v1")
    );
    let statuses: Vec<_> = seen
        .lock()
        .iter()
        .filter_map(|event| match event {
            BridgeEvent::StatusChanged(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Error,
            ConnectionState::Disconnected,
        ]
    );
}

#[test]
fn test_disconnect_detaches_socket_events() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/imu", SubscribeOptions::default());
    let socket = connector.last();

    bridge.disconnect(false);
    socket.accept();
    socket.receive(r#"["m", {"_topic_name": "/imu"}]"#);

    assert_eq!(bridge.status(), ConnectionState::Disconnected);
    assert!(bridge.latest("/imu").is_none());
    assert!(socket.sent().is_empty());
    assert_eq!(bridge.active_topic_count(), 1);
}

#[test]
fn test_disconnect_clearing_config() {
    let (bridge, connector) = bridge();
    bridge.connect();
    connector.last().accept();

    bridge.disconnect(true);

    assert!(!bridge.is_configured());
    assert!(bridge.address().is_none());
    assert_eq!(bridge.endpoint().port, DEFAULT_PORT);
}

#[test]
fn test_send_failure_recorded_and_not_marked_sent() {
    let (bridge, connector) = bridge();
    bridge.connect();
    connector.last().accept();
    connector.last().fail_sends(true);

    bridge.subscribe("/imu", SubscribeOptions::default());

    assert!(bridge.last_error().is_some());
    assert!(!bridge.is_subscribed_on_wire("/imu"));
    assert!(bridge.is_connected());
}

#[test]
fn test_set_disconnect_when_idle() {
    let (bridge, connector) = bridge();
    bridge.connect();
    connector.last().accept();

    bridge.set_disconnect_when_idle(true);
    assert_eq!(connector.last().state(), ReadyState::Closed);
    assert!(bridge.disconnect_when_idle());

    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().drop_connection();
    assert_eq!(connector.opened(), 2);

    bridge.set_disconnect_when_idle(false);
    assert_eq!(connector.opened(), 3);
    assert!(!bridge.disconnect_when_idle());
}

#[test]
fn test_disconnect_if_idle() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.connect();
    connector.last().accept();

    bridge.disconnect_if_idle();
    assert!(bridge.is_connected());

    bridge.set_disconnect_when_idle(true);
    assert!(!bridge.is_connected());
}

// ============================================================================
// Change Notification
// ============================================================================

#[test]
fn test_change_events_in_order() {
    let (bridge, connector) = bridge();
    let seen = record_events(&bridge);

    bridge.subscribe("/x", SubscribeOptions::default());
    connector.last().accept();
    connector
        .last()
        .receive(r#"["m", {"_topic_name": "/x", "_topic_type": "T"}]"#);

    assert_eq!(
        *seen.lock(),
        vec![
            BridgeEvent::StatusChanged(ConnectionState::Connecting),
            BridgeEvent::StatusChanged(ConnectionState::Connected),
            BridgeEvent::TopicTypeUpdated { topic: "/x".into() },
            BridgeEvent::MessageUpdated { topic: "/x".into() },
        ]
    );
}

#[test]
fn test_listener_may_read_bridge() {
    let (bridge, connector) = bridge();
    let observed = Arc::new(Mutex::new(Vec::new()));
    let reader = bridge.clone();
    let sink = Arc::clone(&observed);
    bridge.on_change(move |event| {
        if let BridgeEvent::MessageUpdated { topic } = event {
            sink.lock().push(reader.latest(topic).is_some());
        }
    });

    bridge.connect();
    connector.last().accept();
    connector.last().receive(r#"["m", {"_topic_name": "/x"}]"#);

    assert_eq!(*observed.lock(), vec![true]);
}

fn status_changes(seen: &Mutex<Vec<BridgeEvent>>) -> Vec<ConnectionState> {
    seen.lock()
        .iter()
        .filter_map(|event| match event {
            BridgeEvent::StatusChanged(state) => Some(*state),
            _ => None,
        })
        .collect()
}

#[test]
fn test_listener_reentry_keeps_event_order() {
    let (bridge, connector) = bridge();
    let reentrant = bridge.clone();
    bridge.on_change(move |event| {
        if *event == BridgeEvent::StatusChanged(ConnectionState::Connected) {
            reentrant.disconnect(false);
        }
    });
    let seen = record_events(&bridge);

    bridge.connect();
    connector.last().accept();

    assert_eq!(
        status_changes(&seen),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    assert_eq!(bridge.status(), ConnectionState::Disconnected);
}

#[test]
fn test_status_mirror_agrees_after_concurrent_changes() {
    let (bridge, connector) = bridge_with(keep_alive());
    let seen = record_events(&bridge);

    let workers: Vec<_> = (0..4_usize)
        .map(|worker| {
            let bridge = bridge.clone();
            let connector = Arc::clone(&connector);
            std::thread::spawn(move || {
                for round in 0..200_usize {
                    if (worker + round) % 2 == 0 {
                        bridge.connect();
                        connector.last().accept();
                    } else {
                        bridge.disconnect(false);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread");
    }

    let statuses = status_changes(&seen);
    assert_eq!(statuses.last().copied(), Some(bridge.status()));
    assert!(statuses.windows(2).all(|pair| pair[0] != pair[1]));
}

#[test]
fn test_remove_listener_stops_delivery() {
    let (bridge, _connector) = bridge();
    let count = Arc::new(Mutex::new(0_usize));
    let sink = Arc::clone(&count);
    let id = bridge.on_change(move |_| *sink.lock() += 1);

    bridge.connect();
    assert!(bridge.remove_listener(id));
    bridge.disconnect(false);

    assert_eq!(*count.lock(), 1);
    assert_eq!(bridge.listener_count(), 0);
}

// ============================================================================
// Reconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_retry_after_unexpected_close() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();

    connector.last().drop_connection();
    assert_eq!(connector.opened(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(connector.opened(), 2);

    // The retry fails too; no further attempt without a caller.
    connector.last().fail("refused");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.opened(), 2);
    assert_eq!(bridge.status(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_successful_retry_resyncs_and_rearms() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    connector.last().drop_connection();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    connector.last().accept();
    assert_eq!(connector.last().sent_with_tag("s").len(), 1);

    connector.last().drop_connection();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(connector.opened(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_when_idle_policy_on() {
    let (bridge, connector) = bridge();
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    connector.last().drop_connection();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_retry_without_topics() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.connect();
    connector.last().accept();
    connector.last().drop_connection();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    connector.last().drop_connection();

    bridge.disconnect(false);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(connector.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_skipped_when_socket_created_meanwhile() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    connector.last().drop_connection();

    bridge.connect();
    assert_eq!(connector.opened(), 2);
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(connector.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_close_from_detached_socket_ignored() {
    let (bridge, connector) = bridge_with(keep_alive());
    bridge.subscribe("/imu", SubscribeOptions::default());
    let first = connector.last();
    first.accept();

    bridge.disconnect(false);
    bridge.connect();
    first.emit_closed();

    assert_eq!(bridge.status(), ConnectionState::Connecting);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exponential_policy_escalates() {
    let policy = ReconnectPolicy::exponential(
        Duration::from_millis(100),
        Duration::from_millis(400),
        Some(3),
    );
    let (bridge, connector) = bridge_with(keep_alive().with_reconnect(policy));
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    connector.last().drop_connection();

    for (expected, wait_ms) in [(2, 150), (3, 250), (4, 450)] {
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        assert_eq!(connector.opened(), expected);
        connector.last().fail("refused");
    }

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.opened(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_never_policy() {
    let (bridge, connector) =
        bridge_with(keep_alive().with_reconnect(ReconnectPolicy::Never));
    bridge.subscribe("/imu", SubscribeOptions::default());
    connector.last().accept();
    connector.last().drop_connection();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(connector.opened(), 1);
}

// ============================================================================
// End to End
// ============================================================================

#[tokio::test]
async fn test_end_to_end_with_local_board() {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();

    let board = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("upgrade");

        let mut received = Vec::new();
        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let frame: serde_json::Value =
                serde_json::from_str(text.as_str()).expect("client json");
            received.push(frame.clone());

            if frame[0] == "s" {
                for reply in [
                    r#"["t", {"/imu": "sensor_msgs/Imu"}]"#,
                    r#"["m", {"_topic_name": "/imu", "_topic_type": "sensor_msgs/Imu", "x": 1.5}]"#,
                    r#"["p", {"s": 3}]"#,
                ] {
                    ws.send(Message::Text(String::from(reply).into()))
                        .await
                        .expect("board send");
                }
            }
            if frame[0] == "u" {
                break;
            }
        }
        received
    });

    let bridge = Bridge::builder()
        .host("127.0.0.1")
        .port(port)
        .build()
        .expect("build");
    bridge.subscribe("/imu", SubscribeOptions::with_rate(10.0));

    let mut sample = None;
    for _ in 0..200 {
        sample = bridge.latest("/imu");
        if sample.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let sample = sample.expect("sample arrived");
    assert_eq!(sample.field("x"), Some(&json!(1.5)));
    assert_eq!(bridge.topic_type("/imu").as_deref(), Some("sensor_msgs/Imu"));

    // Give the PONG a moment to go out before unsubscribing
    tokio::time::sleep(Duration::from_millis(50)).await;
    bridge.unsubscribe("/imu");

    let received = tokio::time::timeout(Duration::from_secs(5), board)
        .await
        .expect("board finished")
        .expect("board task");

    assert_eq!(
        received.first(),
        Some(&json!(["s", {"topicName": "/imu", "maxUpdateRate": 10}]))
    );
    assert!(received.iter().any(|frame| frame[0] == "q" && frame[1]["s"] == 3));
    assert_eq!(received.last(), Some(&json!(["u", {"topicName": "/imu"}])));
}
