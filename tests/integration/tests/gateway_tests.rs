//! Gateway client end-to-end tests
//!
//! Each test drives a real client against the in-process mock gateway.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use chat_gateway_client::buffer::{BufferConfig, BufferError, OverflowPolicy};
use chat_gateway_client::events::DropReason;
use chat_gateway_client::heartbeat::HeartbeatConfig;
use chat_gateway_client::protocol::{
    GatewayMessage, OpCode, ReconnectPayload, ResumeAckPayload, ResumePayload,
};
use chat_gateway_client::{
    ClientConfig, ClientEvent, ConnectionState, GatewayClient, GatewayError, SessionDescriptor,
};
use integration_tests::{
    next_sequences, test_config, wait_for, EventCollector, MockGateway, TEST_TOKEN, WAIT,
};

fn is_ready(event: &ClientEvent) -> bool {
    matches!(event, ClientEvent::Ready { .. })
}

fn is_reconnecting(event: &ClientEvent) -> bool {
    matches!(
        event,
        ClientEvent::Disconnected {
            will_reconnect: true,
            ..
        }
    )
}

fn is_final_disconnect(event: &ClientEvent) -> bool {
    matches!(
        event,
        ClientEvent::Disconnected {
            will_reconnect: false,
            ..
        }
    )
}

fn resume_ack(session_id: &str) -> GatewayMessage {
    GatewayMessage::resume_ack(&ResumeAckPayload {
        session_id: session_id.to_string(),
    })
    .unwrap()
}

// ============================================================================
// Ordered delivery
// ============================================================================

#[tokio::test]
async fn test_out_of_order_events_are_delivered_in_sequence() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(test_config(&gateway.url()), collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut conn = gateway.accept().await.unwrap();
    conn.hello("s1").await.unwrap();

    let ready = wait_for(&mut notifications, is_ready).await.unwrap();
    assert!(matches!(
        ready,
        ClientEvent::Ready { ref session_id, resumed: false } if session_id == "s1"
    ));
    assert_eq!(client.state(), ConnectionState::Connected);

    // The first event sets the baseline; later ones may arrive in any order
    for sequence in [1, 3, 2, 5, 4] {
        conn.event(sequence).await.unwrap();
    }

    assert_eq!(
        next_sequences(&mut events, 5).await.unwrap(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(
        client.session(),
        SessionDescriptor {
            session_id: Some("s1".to_string()),
            last_sequence: 5,
        }
    );

    client.stop().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_undecodable_event_is_skipped_without_stalling() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(test_config(&gateway.url()), collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut conn = gateway.accept().await.unwrap();
    conn.hello("s1").await.unwrap();
    wait_for(&mut notifications, is_ready).await.unwrap();

    conn.event(1).await.unwrap();
    conn.send_raw(r#"{"op":0,"s":2,"t":5}"#).await.unwrap();
    conn.event(3).await.unwrap();

    assert_eq!(next_sequences(&mut events, 2).await.unwrap(), vec![1, 3]);

    let dropped = wait_for(&mut notifications, |e| {
        matches!(e, ClientEvent::FrameDropped { .. })
    })
    .await
    .unwrap();
    assert!(matches!(
        dropped,
        ClientEvent::FrameDropped {
            sequence: 2,
            reason: DropReason::Undecodable(_)
        }
    ));
    assert_eq!(client.session().last_sequence, 3);

    client.stop().await;
}

// ============================================================================
// Buffer overflow
// ============================================================================

fn overflow_config(url: &str, policy: OverflowPolicy) -> ClientConfig {
    test_config(url).with_buffer(BufferConfig::new(2).with_overflow_policy(policy))
}

fn is_buffer_full(event: &ClientEvent) -> bool {
    matches!(
        event,
        ClientEvent::FrameDropped {
            reason: DropReason::BufferFull,
            ..
        }
    )
}

#[tokio::test]
async fn test_throw_overflow_faults_and_resumes() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(
        overflow_config(&gateway.url(), OverflowPolicy::Throw),
        collector,
    );
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut first = gateway.accept().await.unwrap();
    first.hello("s1").await.unwrap();
    wait_for(&mut notifications, is_ready).await.unwrap();

    first.event(1).await.unwrap();
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![1]);

    // 2 never arrives; the third frame behind the gap overflows
    for sequence in [3, 4, 5] {
        first.event(sequence).await.unwrap();
    }

    let dropped = wait_for(&mut notifications, is_buffer_full).await.unwrap();
    assert!(matches!(dropped, ClientEvent::FrameDropped { sequence: 5, .. }));

    let disconnected = wait_for(&mut notifications, is_reconnecting).await.unwrap();
    assert!(matches!(
        disconnected,
        ClientEvent::Disconnected { error: Some(ref e), .. }
            if matches!(
                **e,
                GatewayError::Buffer(BufferError::CapacityExceeded { sequence: 5, capacity: 2 })
            )
    ));

    let mut second = gateway.accept().await.unwrap();
    second.hello("s1").await.unwrap();
    let resume: ResumePayload = second.expect(OpCode::Resume).await.unwrap().payload().unwrap();
    assert_eq!(
        resume,
        ResumePayload {
            session_id: "s1".to_string(),
            seq: 1,
        }
    );

    for sequence in [2, 3, 4, 5] {
        second.event(sequence).await.unwrap();
    }
    second.send(resume_ack("s1")).await.unwrap();

    wait_for(&mut notifications, |e| {
        matches!(e, ClientEvent::Ready { resumed: true, .. })
    })
    .await
    .unwrap();
    assert_eq!(
        next_sequences(&mut events, 4).await.unwrap(),
        vec![2, 3, 4, 5]
    );
    assert_eq!(client.session().last_sequence, 5);

    client.stop().await;
}

#[tokio::test]
async fn test_drop_incoming_overflow_keeps_connection() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(
        overflow_config(&gateway.url(), OverflowPolicy::DropIncoming),
        collector,
    );
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut conn = gateway.accept().await.unwrap();
    conn.hello("s1").await.unwrap();
    wait_for(&mut notifications, is_ready).await.unwrap();

    for sequence in [1, 3, 4, 5] {
        conn.event(sequence).await.unwrap();
    }
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![1]);

    let dropped = wait_for(&mut notifications, is_buffer_full).await.unwrap();
    assert!(matches!(dropped, ClientEvent::FrameDropped { sequence: 5, .. }));

    // Filling the gap releases what was kept; the dropped frame can come again
    conn.event(2).await.unwrap();
    assert_eq!(next_sequences(&mut events, 3).await.unwrap(), vec![2, 3, 4]);
    conn.event(5).await.unwrap();
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![5]);

    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(gateway
        .accept_within(Duration::from_millis(300))
        .await
        .is_err());

    client.stop().await;
}

// ============================================================================
// Reconnect and resume
// ============================================================================

#[tokio::test]
async fn test_dropped_socket_resumes_without_duplicates() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(test_config(&gateway.url()), collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut first = gateway.accept().await.unwrap();
    first.hello("s1").await.unwrap();
    first.event(1).await.unwrap();
    first.event(2).await.unwrap();
    assert_eq!(next_sequences(&mut events, 2).await.unwrap(), vec![1, 2]);

    drop(first);
    wait_for(&mut notifications, is_reconnecting).await.unwrap();

    let mut second = gateway.accept().await.unwrap();
    second.hello("ignored").await.unwrap();

    let resume: ResumePayload = second.expect(OpCode::Resume).await.unwrap().payload().unwrap();
    assert_eq!(
        resume,
        ResumePayload {
            session_id: "s1".to_string(),
            seq: 2,
        }
    );

    // Replay overlaps what was already delivered
    second.event(2).await.unwrap();
    second.event(3).await.unwrap();
    second.send(resume_ack("s1")).await.unwrap();

    let ready = wait_for(&mut notifications, is_ready).await.unwrap();
    assert!(matches!(ready, ClientEvent::Ready { resumed: true, .. }));
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![3]);

    second.event(4).await.unwrap();
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![4]);

    client.stop().await;
}

#[tokio::test]
async fn test_reconnect_request_starts_a_fresh_session() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(test_config(&gateway.url()), collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut first = gateway.accept().await.unwrap();
    first.hello("s1").await.unwrap();
    first.event(1).await.unwrap();
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![1]);

    first
        .send(GatewayMessage::reconnect(&ReconnectPayload::default()).unwrap())
        .await
        .unwrap();

    let disconnected = wait_for(&mut notifications, is_reconnecting).await.unwrap();
    assert!(matches!(
        disconnected,
        ClientEvent::Disconnected { error: Some(ref e), .. }
            if matches!(**e, GatewayError::ReconnectRequested)
    ));

    let mut second = gateway.accept().await.unwrap();
    second.hello("s2").await.unwrap();

    let ready = wait_for(&mut notifications, is_ready).await.unwrap();
    assert!(matches!(
        ready,
        ClientEvent::Ready { ref session_id, resumed: false } if session_id == "s2"
    ));

    // The new session numbers its events from 1 again
    second.event(1).await.unwrap();
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![1]);
    assert_eq!(client.session().session_id.as_deref(), Some("s2"));

    client.stop().await;
}

#[tokio::test]
async fn test_restart_after_stop_resumes_the_session() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, mut events) = EventCollector::new();
    let client = GatewayClient::new(test_config(&gateway.url()), collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut first = gateway.accept().await.unwrap();
    first.hello("s1").await.unwrap();
    first.event(1).await.unwrap();
    first.event(2).await.unwrap();
    assert_eq!(next_sequences(&mut events, 2).await.unwrap(), vec![1, 2]);

    client.stop().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.session().last_sequence, 2);

    client.start().await.unwrap();
    let mut second = gateway.accept().await.unwrap();
    second.hello("s1").await.unwrap();

    let resume: ResumePayload = second.expect(OpCode::Resume).await.unwrap().payload().unwrap();
    assert_eq!(resume.seq, 2);

    second.event(2).await.unwrap();
    second.event(3).await.unwrap();
    second.send(resume_ack("s1")).await.unwrap();

    wait_for(&mut notifications, |e| {
        matches!(e, ClientEvent::Ready { resumed: true, .. })
    })
    .await
    .unwrap();
    assert_eq!(next_sequences(&mut events, 1).await.unwrap(), vec![3]);

    client.stop().await;
}

// ============================================================================
// Heartbeat
// ============================================================================

fn heartbeat_config(url: &str, slack: Duration) -> ClientConfig {
    test_config(url).with_heartbeat(
        HeartbeatConfig::new(Duration::from_secs(60)).with_slack(slack),
    )
}

#[tokio::test]
async fn test_pong_reports_latency() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, _events) = EventCollector::new();
    let client = GatewayClient::new(
        heartbeat_config(&gateway.url(), Duration::from_secs(5)),
        collector,
    );
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut conn = gateway.accept().await.unwrap();
    conn.hello_with_interval("s1", 50).await.unwrap();

    conn.expect(OpCode::Ping).await.unwrap();
    conn.send(GatewayMessage::pong()).await.unwrap();

    wait_for(&mut notifications, |e| {
        matches!(e, ClientEvent::LatencyUpdated { .. })
    })
    .await
    .unwrap();
    assert!(client.latency().is_some());

    client.stop().await;
}

#[tokio::test]
async fn test_zero_hello_interval_falls_back_to_configured() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, _events) = EventCollector::new();
    let config = test_config(&gateway.url()).with_heartbeat(
        HeartbeatConfig::new(Duration::from_millis(50)).with_slack(Duration::from_secs(5)),
    );
    let client = GatewayClient::new(config, collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut conn = gateway.accept().await.unwrap();
    conn.hello_with_interval("s1", 0).await.unwrap();
    wait_for(&mut notifications, is_ready).await.unwrap();

    // Pings keep flowing at the configured pace
    for _ in 0..2 {
        conn.expect(OpCode::Ping).await.unwrap();
        conn.send(GatewayMessage::pong()).await.unwrap();
    }
    assert_eq!(client.state(), ConnectionState::Connected);

    client.stop().await;
}

#[tokio::test]
async fn test_silent_server_triggers_resume() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, _events) = EventCollector::new();
    let client = GatewayClient::new(
        heartbeat_config(&gateway.url(), Duration::from_millis(20)),
        collector,
    );
    let mut notifications = client.subscribe();

    client.start().await.unwrap();
    let mut first = gateway.accept().await.unwrap();
    first.hello_with_interval("s1", 50).await.unwrap();
    first.expect(OpCode::Ping).await.unwrap();

    let disconnected = wait_for(&mut notifications, is_reconnecting).await.unwrap();
    assert!(matches!(
        disconnected,
        ClientEvent::Disconnected { error: Some(ref e), .. }
            if matches!(**e, GatewayError::MissedHeartbeat)
    ));

    let mut second = gateway.accept().await.unwrap();
    second.hello("s1").await.unwrap();
    let resume: ResumePayload = second.expect(OpCode::Resume).await.unwrap().payload().unwrap();
    assert_eq!(resume.session_id, "s1");

    client.stop().await;
}

// ============================================================================
// Critical failures
// ============================================================================

#[tokio::test]
async fn test_authentication_close_stops_reconnecting() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, _events) = EventCollector::new();
    let client = GatewayClient::new(test_config(&gateway.url()), collector);
    let mut notifications = client.subscribe();
    let mut state = client.subscribe_state();

    client.start().await.unwrap();
    let mut conn = gateway.accept().await.unwrap();
    conn.hello("s1").await.unwrap();
    wait_for(&mut notifications, is_ready).await.unwrap();

    conn.close(4004, "Authentication failed").await.unwrap();

    let disconnected = wait_for(&mut notifications, is_final_disconnect).await.unwrap();
    assert!(matches!(
        disconnected,
        ClientEvent::Disconnected { error: Some(ref e), .. }
            if matches!(**e, GatewayError::TransportClosed { code: Some(4004), .. })
    ));

    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Disconnected))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.session(), SessionDescriptor::default());
    assert!(gateway
        .accept_within(Duration::from_millis(300))
        .await
        .is_err());

    client.stop().await;
}

#[tokio::test]
async fn test_rejected_token_is_critical() {
    let mut gateway = MockGateway::start(TEST_TOKEN).await.unwrap();
    let (collector, _events) = EventCollector::new();
    let mut config = test_config(&gateway.url());
    config.token = "wrong-token".to_string();
    let client = GatewayClient::new(config, collector);
    let mut notifications = client.subscribe();

    client.start().await.unwrap();

    let disconnected = wait_for(&mut notifications, is_final_disconnect).await.unwrap();
    assert!(matches!(
        disconnected,
        ClientEvent::Disconnected { error: Some(ref e), .. }
            if matches!(**e, GatewayError::AuthenticationFailed(_))
    ));
    assert!(gateway
        .accept_within(Duration::from_millis(300))
        .await
        .is_err());

    client.stop().await;
}
