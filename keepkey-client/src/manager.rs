//! Hot-plug tracking: periodic enumeration diffed against the registry

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keepkey_transport::{DeviceDiscovery, DeviceId, DiscoveryEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

struct Shared {
    discovery: Arc<dyn DeviceDiscovery>,
    registry: Arc<SessionRegistry>,
    events: broadcast::Sender<DiscoveryEvent>,
}

impl Shared {
    async fn tick(&self) {
        let devices = match self.discovery.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                return;
            }
        };

        let present: HashSet<&DeviceId> = devices.iter().map(|d| &d.id).collect();
        for id in self.registry.ids() {
            if present.contains(&id) {
                continue;
            }
            if self.registry.remove(&id).await.is_some() {
                info!("{}: disconnected", id);
                let _ = self.events.send(DiscoveryEvent::Disconnected { id });
            }
        }

        for device in &devices {
            if self.registry.find(&device.id).is_some() {
                continue;
            }

            let Some(family) = device.family() else {
                debug!("{}: ignoring unknown device {}", device.id, device.descriptor);
                continue;
            };

            let link = match self.discovery.open_device(device).await {
                Ok(link) => link,
                Err(e) => {
                    warn!("{}: failed to open: {}", device.id, e);
                    continue;
                }
            };

            self.registry.create(link, family);
            info!("{}: {} connected", device.id, family);
            let _ = self.events.send(DiscoveryEvent::Connected {
                id: device.id.clone(),
                family,
            });
        }
    }
}

/// Keeps the registry in sync with attached devices
///
/// Nothing happens until [`start`](Self::start); [`tick`](Self::tick) runs a
/// single enumeration pass on demand.
pub struct DeviceManager {
    shared: Arc<Shared>,
    interval: Duration,
    /// Run flag of the current discovery task, one per `start`
    running: Mutex<Option<Arc<AtomicBool>>>,
}

impl DeviceManager {
    pub fn new(discovery: Arc<dyn DeviceDiscovery>, registry: Arc<SessionRegistry>) -> Self {
        let interval = registry.config().discovery_interval();
        let (events, _) = broadcast::channel(registry.config().event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                discovery,
                registry,
                events,
            }),
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.shared.registry
    }

    /// Connect/disconnect notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.shared.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Start periodic discovery; no-op if already running
    ///
    /// A task left over from an earlier `stop` keeps its own cleared flag, so
    /// it exits on its next tick instead of running alongside this one.
    pub fn start(&self) {
        let running = {
            let mut current = self.running.lock();
            if current
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                return;
            }
            let flag = Arc::new(AtomicBool::new(true));
            *current = Some(Arc::clone(&flag));
            flag
        };

        let shared = Arc::clone(&self.shared);
        let interval = self.interval;

        tokio::spawn(async move {
            info!("Started device discovery every {}ms", interval.as_millis());

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                shared.tick().await;
            }

            info!("Stopped device discovery");
        });
    }

    /// Stop periodic discovery
    ///
    /// Sessions stay registered; call [`SessionRegistry::clear`] to drop them.
    pub fn stop(&self) {
        if let Some(flag) = self.running.lock().take() {
            flag.store(false, Ordering::SeqCst);
        }
    }

    /// Run one enumeration pass now
    pub async fn tick(&self) {
        self.shared.tick().await;
    }
}
