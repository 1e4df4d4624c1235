// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use council_adapters::{FakeReply, FakeTransport};
use council_core::kinds;
use serde_json::json;

fn id(s: &str) -> WorkerIdentity {
    WorkerIdentity::from(s)
}

fn router_with(workers: &[&str]) -> (
    FakeTransport,
    MessageRouter<FakeTransport>,
    mpsc::UnboundedReceiver<RouterEvent>,
) {
    let transport = FakeTransport::new();
    for w in workers {
        transport.add_worker(*w);
    }
    let (router, events) = MessageRouter::new(transport.clone(), DEFAULT_REQUEST_TIMEOUT);
    (transport, router, events)
}

fn capture() -> Envelope {
    Envelope::new(kinds::CAPTURE, json!(null))
}

#[tokio::test]
async fn immediate_reply_resolves_request() {
    let (transport, router, _events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::Ack(json!({"text": "hello"})));

    let ack = router.send_with_ack(&id("w1"), capture(), None).await.unwrap();
    assert_eq!(ack.payload["text"], "hello");
    assert_eq!(router.pending_count(), 0);

    let delivered = transport.delivered(&id("w1"));
    assert!(delivered[0].needs_ack);
    assert_eq!(ack.acknowledges(), Some(delivered[0].correlation_id.clone()));
}

#[tokio::test]
async fn ack_on_channel_resolves_request() {
    let (transport, router, _events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::AckOnChannel(json!({"text": "via channel"})));
    router.connect(&id("w1")).await.unwrap();

    let ack = router.send_with_ack(&id("w1"), capture(), None).await.unwrap();
    assert_eq!(ack.payload["text"], "via channel");
}

#[tokio::test]
async fn delivery_failure_fails_immediately() {
    let (transport, router, _events) = router_with(&["w1"]);
    transport.set_unreachable(&id("w1"), true);

    let started = Instant::now();
    let err = router
        .send_with_ack(&id("w1"), capture(), Some(Duration::from_secs(60)))
        .await
        .unwrap_err();
    assert!(err.is_unreachable());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn silent_worker_times_out_at_deadline() {
    let (transport, router, _events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::Silent);

    let started = Instant::now();
    let err = router
        .send_with_ack(&id("w1"), capture(), Some(Duration::from_secs(3)))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Timeout { after, .. } if after == Duration::from_secs(3)));
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(router.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn default_timeout_applies_when_none_given() {
    let (transport, router, _events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::Silent);

    let started = Instant::now();
    let _ = router.send_with_ack(&id("w1"), capture(), None).await;
    assert_eq!(started.elapsed(), DEFAULT_REQUEST_TIMEOUT);
}

#[tokio::test(start_paused = true)]
async fn late_ack_has_no_effect() {
    let (transport, router, mut events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::Silent);
    router.connect(&id("w1")).await.unwrap();

    let err = router
        .send_with_ack(&id("w1"), capture(), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    let RouterError::Timeout { correlation_id, .. } = err else {
        panic!("expected timeout, got {err:?}");
    };

    assert!(transport.push(&id("w1"), Envelope::ack(&correlation_id, json!({"text": "late"}))));
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(router.pending_count(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn ack_queued_past_deadline_is_a_timeout() {
    let (transport, router, mut events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::Silent);
    router.connect(&id("w1")).await.unwrap();

    let request = {
        let router = router.clone();
        tokio::spawn(async move {
            router
                .send_with_ack(&id("w1"), capture(), Some(Duration::from_millis(50)))
                .await
        })
    };
    while transport.delivered(&id("w1")).is_empty() {
        tokio::task::yield_now().await;
    }
    let correlation_id = transport.delivered(&id("w1"))[0].correlation_id.clone();

    // Hold the runtime so the deadline passes before anything is polled
    std::thread::sleep(Duration::from_millis(200));
    assert!(transport.push(&id("w1"), Envelope::ack(&correlation_id, json!({"text": "late"}))));

    let err = request.await.unwrap().unwrap_err();
    assert!(matches!(err, RouterError::Timeout { .. }), "got {err:?}");
    tokio::task::yield_now().await;
    assert_eq!(router.pending_count(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn inbound_messages_become_events() {
    let (transport, router, mut events) = router_with(&["w1"]);
    router.connect(&id("w1")).await.unwrap();

    let update = Envelope::new(kinds::STATUS_UPDATE, json!({"status": "streaming"}));
    transport.push(&id("w1"), update.clone());

    assert_eq!(
        events.recv().await.unwrap(),
        RouterEvent::Message {
            identity: id("w1"),
            envelope: update,
        }
    );
}

#[tokio::test]
async fn unknown_ack_is_dropped() {
    let (transport, router, mut events) = router_with(&["w1"]);
    router.connect(&id("w1")).await.unwrap();

    transport.push(&id("w1"), Envelope::ack(&CorrelationId::generate(), json!({})));
    transport.push(&id("w1"), Envelope::new("marker", json!({})));

    match events.recv().await.unwrap() {
        RouterEvent::Message { envelope, .. } => assert_eq!(envelope.kind, "marker"),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn worker_disconnect_emits_channel_closed() {
    let (transport, router, mut events) = router_with(&["w1"]);
    let generation = router.connect(&id("w1")).await.unwrap();

    transport.disconnect(&id("w1"));

    assert_eq!(
        events.recv().await.unwrap(),
        RouterEvent::ChannelClosed {
            identity: id("w1"),
            generation,
        }
    );
    assert!(!router.has_channel(&id("w1")));
}

#[tokio::test]
async fn reconnect_tears_down_prior_channel() {
    let (transport, router, mut events) = router_with(&["w1"]);
    let first = router.connect(&id("w1")).await.unwrap();
    let second = router.connect(&id("w1")).await.unwrap();
    assert!(second > first);

    assert_eq!(
        events.recv().await.unwrap(),
        RouterEvent::ChannelClosed {
            identity: id("w1"),
            generation: first,
        }
    );
    assert_eq!(router.channel_generation(&id("w1")), Some(second));
    assert_eq!(
        transport
            .calls()
            .iter()
            .filter(|c| matches!(c, council_adapters::TransportCall::Open { .. }))
            .count(),
        2
    );

    // the successor keeps working
    assert!(router.send_via_channel(&id("w1"), Envelope::new("ping", json!({}))));
    assert_eq!(transport.posted(&id("w1")).len(), 1);
}

#[tokio::test]
async fn explicit_disconnect() {
    let (_transport, router, mut events) = router_with(&["w1"]);
    router.connect(&id("w1")).await.unwrap();

    assert!(router.disconnect(&id("w1")));
    assert!(!router.disconnect(&id("w1")));
    assert!(matches!(
        events.recv().await.unwrap(),
        RouterEvent::ChannelClosed { .. }
    ));
    assert!(router.connected_identities().is_empty());
    assert!(!router.send_via_channel(&id("w1"), Envelope::new("ping", json!({}))));
}

#[tokio::test]
async fn connect_to_unreachable_worker_fails() {
    let (_transport, router, _events) = router_with(&[]);
    let err = router.connect(&id("ghost")).await.unwrap_err();
    assert!(matches!(err, RouterError::Connect(..)));
    assert!(!router.has_channel(&id("ghost")));
}

#[tokio::test(start_paused = true)]
async fn broadcast_settles_every_branch() {
    let (transport, router, _events) = router_with(&["w1", "w2", "w3", "w4"]);
    transport.set_unreachable(&id("w2"), true);

    let outcomes = router
        .broadcast(Envelope::new("refresh", json!({})), Some(Duration::from_secs(1)))
        .await
        .unwrap();

    let ok: Vec<_> = outcomes
        .iter()
        .filter(|o| o.result.is_ok())
        .map(|o| o.identity.as_str())
        .collect();
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| o.identity.as_str())
        .collect();
    assert_eq!(ok, vec!["w1", "w3", "w4"]);
    assert_eq!(failed, vec!["w2"]);
}

#[tokio::test(start_paused = true)]
async fn broadcast_slow_branch_does_not_block_others() {
    let (transport, router, _events) = router_with(&["w1", "w2"]);
    transport.set_reply(&id("w2"), FakeReply::Silent);

    let outcomes = router
        .broadcast(Envelope::new("refresh", json!({})), Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(RouterError::Timeout { .. })));
}

#[tokio::test]
async fn shutdown_cancels_pending() {
    let (transport, router, _events) = router_with(&["w1"]);
    transport.set_reply(&id("w1"), FakeReply::Silent);

    let waiter = {
        let router = router.clone();
        tokio::spawn(async move { router.send_with_ack(&id("w1"), capture(), None).await })
    };
    while router.pending_count() == 0 {
        tokio::task::yield_now().await;
    }
    router.shutdown();

    assert!(matches!(
        waiter.await.unwrap(),
        Err(RouterError::Cancelled(_))
    ));
}
