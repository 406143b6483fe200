//! Integration tests against a real wallet.
//!
//! These tests require a KeepKey or Trezor One to be connected.
//! Run with: cargo test -p keepkey-client --test device_queries -- --ignored --nocapture

use std::sync::Arc;
use std::time::Duration;

use keepkey_client::{ClientSession, DeviceManager, Expect, MessageType, SessionRegistry};
use keepkey_transport::HidDiscovery;

/// Enumerate once and return the first session
async fn open_wallet() -> (DeviceManager, Arc<ClientSession>) {
    let registry = Arc::new(SessionRegistry::default());
    let manager = DeviceManager::new(Arc::new(HidDiscovery::new()), registry);
    manager.tick().await;
    let session = manager
        .registry()
        .first()
        .expect("No wallet found — plug in a supported device");
    (manager, session)
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // requires hardware
async fn features_after_initialize() {
    let (manager, session) = open_wallet().await;

    let reply = session
        .initialize_request()
        .await
        .unwrap()
        .wait_for_timeout(MessageType::Features, Duration::from_secs(5))
        .await
        .unwrap();
    println!("{}", reply.to_json());

    assert!(session.features().is_some());
    manager.registry().clear().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // requires hardware
async fn ping_echo() {
    let (manager, session) = open_wallet().await;

    session
        .ping("ping from host")
        .await
        .unwrap()
        .wait_for_timeout(
            Expect::success_message("ping from host"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    manager.registry().clear().await;
}
