//! End-to-end session behaviour against an in-memory device.
//!
//! Time is paused, so polling ticks and read timeouts advance instantly.

use std::sync::Arc;
use std::time::Duration;

use keepkey_client::messages::{ButtonRequest, CharacterAck, Failure, Features, Success};
use keepkey_client::{
    ClientError, DeviceFamily, DeviceId, DeviceManager, Expect, Message, MessageType,
    SessionRegistry,
};
use keepkey_transport::mock::{MockDiscovery, MockLink};
use keepkey_transport::{DeviceDescriptor, TransportError};

const WAIT: Duration = Duration::from_secs(30);

fn device_wiped() -> Message {
    Success {
        message: Some("Device wiped".into()),
    }
    .into()
}

#[tokio::test(start_paused = true)]
async fn polling_starts_with_initialize() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    registry.create(link.clone(), DeviceFamily::KeepKey);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(link.sent_types(DeviceFamily::KeepKey), vec!["Initialize"]);
}

#[tokio::test(start_paused = true)]
async fn wipe_resolves_on_device_wiped() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    let session = registry.create(link.clone(), DeviceFamily::KeepKey);

    let pending = session.wipe_device().await.unwrap();
    link.inject(DeviceFamily::KeepKey, &ButtonRequest::default().into()).unwrap();
    link.inject(
        DeviceFamily::KeepKey,
        &Features {
            vendor: Some("keepkey.com".into()),
            initialized: Some(false),
            ..Default::default()
        }
        .into(),
    ).unwrap();
    link.inject(DeviceFamily::KeepKey, &device_wiped()).unwrap();

    let reply = pending
        .wait_for_timeout(Expect::success_message("Device wiped"), WAIT)
        .await
        .unwrap();
    assert_eq!(reply, device_wiped());

    // Features arrived while waiting: stored, did not resolve the wipe
    let features = registry.features().get(&DeviceId::from("kk")).unwrap();
    assert_eq!(features.initialized, Some(false));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let sent = link.sent_types(DeviceFamily::KeepKey);
    assert!(sent.contains(&"WipeDevice"));
    assert!(sent.contains(&"ButtonAck"));
    // Initialize on start, then again after the Success
    assert_eq!(sent.iter().filter(|t| **t == "Initialize").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn other_success_does_not_resolve_wipe() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    let session = registry.create(link.clone(), DeviceFamily::KeepKey);

    let pending = session.wipe_device().await.unwrap();
    link.inject(
        DeviceFamily::KeepKey,
        &Success {
            message: Some("Settings applied".into()),
        }
        .into(),
    ).unwrap();

    assert!(matches!(
        pending
            .wait_for_timeout(Expect::success_message("Device wiped"), Duration::from_secs(5))
            .await,
        Err(ClientError::Timeout)
    ));
}

#[tokio::test(start_paused = true)]
async fn failure_rejects_pending_request() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    let session = registry.create(link.clone(), DeviceFamily::KeepKey);

    let pending = session.wipe_device().await.unwrap();
    link.inject(
        DeviceFamily::KeepKey,
        &Failure {
            code: Some(4),
            message: Some("Action cancelled by user".into()),
        }
        .into(),
    ).unwrap();

    match pending.wait_for_timeout(MessageType::Success, WAIT).await {
        Err(ClientError::DeviceFailure { code, message }) => {
            assert_eq!(code, Some(4));
            assert_eq!(message, "Action cancelled by user");
        }
        other => panic!("expected DeviceFailure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn every_waiter_sees_every_message() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    let session = registry.create(link.clone(), DeviceFamily::KeepKey);

    let features = session.get_features().await.unwrap();
    let ping = session.ping("hello").await.unwrap();
    link.inject(DeviceFamily::KeepKey, &Features::default().into()).unwrap();
    link.inject(
        DeviceFamily::KeepKey,
        &Success {
            message: Some("hello".into()),
        }
        .into(),
    ).unwrap();

    let (f, p) = tokio::join!(
        features.wait_for_timeout(MessageType::Features, WAIT),
        ping.wait_for_timeout(Expect::success_message("hello"), WAIT),
    );
    assert_eq!(f.unwrap().message_type(), MessageType::Features);
    assert_eq!(p.unwrap().message_type(), MessageType::Success);
}

#[tokio::test(start_paused = true)]
async fn no_concurrent_link_io() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    let session = registry.create(link.clone(), DeviceFamily::KeepKey);

    for _ in 0..4 {
        link.inject(DeviceFamily::KeepKey, &ButtonRequest::default().into()).unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..8 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            session.ping(&"x".repeat(100 + i)).await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(link.max_in_flight(), 1);
    let sent = link.sent_types(DeviceFamily::KeepKey);
    assert_eq!(sent.iter().filter(|t| **t == "Ping").count(), 8);
    assert_eq!(sent.iter().filter(|t| **t == "ButtonAck").count(), 4);
}

#[tokio::test(start_paused = true)]
async fn stop_polling_silences_session() {
    let registry = SessionRegistry::default();
    let link = MockLink::keepkey("kk");
    let session = registry.create(link.clone(), DeviceFamily::KeepKey);
    let mut events = session.subscribe();

    session.stop_polling();
    session.stop_polling();
    link.inject(DeviceFamily::KeepKey, &device_wiped()).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(events.try_recv().is_err());
    assert!(link.sent_reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_removes_session() {
    let discovery = MockDiscovery::new();
    let manager = DeviceManager::new(discovery.clone(), Arc::new(SessionRegistry::default()));
    let link = MockLink::keepkey("kk");
    discovery.attach(link.clone());

    manager.tick().await;
    let session = manager.registry().find(&DeviceId::from("kk")).unwrap();
    let again = manager
        .registry()
        .create(link.clone(), DeviceFamily::KeepKey);
    assert!(Arc::ptr_eq(&session, &again));

    let mut events = session.subscribe();
    discovery.detach(&DeviceId::from("kk"));
    manager.tick().await;

    assert!(manager.registry().find(&DeviceId::from("kk")).is_none());
    assert!(!session.is_polling());

    link.inject(DeviceFamily::KeepKey, &device_wiped()).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn trezor_rejects_character_cipher() {
    let registry = SessionRegistry::default();
    let link = MockLink::new("t1", DeviceDescriptor::new(0x534C, 0x0001));
    let session = registry.create(link.clone(), DeviceFamily::Trezor);

    let err = session
        .character_ack(CharacterAck {
            character: Some("a".into()),
            ..Default::default()
        })
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ClientError::Transport(TransportError::UnsupportedMessage { .. })
    ));
}
