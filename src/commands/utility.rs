//! Utility command handlers.

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use keepkey_client::{ClientSession, DiscoveryEvent};
use keepkey_transport::{device_registry, DeviceDiscovery, HidDiscovery};
use tokio::sync::broadcast::error::RecvError;

use super::{setup_interrupt_handler, Context};

/// List attached wallets
pub async fn list() -> Result<()> {
    let devices = HidDiscovery::new().list_devices().await?;
    if devices.is_empty() {
        println!("No wallets found");
        return Ok(());
    }

    for device in devices {
        let model = device_registry::find(device.descriptor)
            .map(|d| d.name)
            .unwrap_or("unknown");
        println!(
            "{:<11} {} serial={} path={}",
            model,
            device.descriptor,
            device.serial.as_deref().unwrap_or("-"),
            device.id
        );
    }
    Ok(())
}

/// Print every message a session publishes, as JSON lines
fn print_messages(session: &ClientSession) {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => println!("{} {}", event.device_id, event.message.to_json()),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Run discovery and print what happens until Ctrl-C
pub async fn watch(ctx: &Context) -> Result<()> {
    let running = setup_interrupt_handler();
    let manager = ctx.manager();
    let mut events = manager.subscribe();
    manager.start();
    println!("Watching for wallets. Ctrl+C to stop.");

    while running.load(Ordering::SeqCst) {
        let event = match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(RecvError::Lagged(_))) | Err(_) => continue,
            Ok(Err(RecvError::Closed)) => break,
        };

        match event {
            DiscoveryEvent::Connected { id, family } => {
                println!("connected    {id} ({family})");
                if let Some(session) = manager.registry().find(&id) {
                    print_messages(&session);
                }
            }
            DiscoveryEvent::Disconnected { id } => {
                println!("disconnected {id}");
            }
        }
    }

    manager.stop();
    manager.registry().clear().await;
    println!("Done.");
    Ok(())
}
