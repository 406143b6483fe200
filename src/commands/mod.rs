//! Command handlers for the CLI application.
//!
//! - `device`: commands that talk to one wallet (wipe, features, ping, firmware)
//! - `utility`: enumeration and monitoring (list, watch)

pub mod device;
pub mod utility;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use keepkey_client::{
    ClientConfig, ClientSession, DeviceManager, Expect, Message, PendingResponse, SessionRegistry,
};
use keepkey_transport::HidDiscovery;

/// Settings shared by every command
pub struct Context {
    pub config: ClientConfig,
    /// Bound on waits for device replies; `None` waits until the device answers
    pub timeout: Option<Duration>,
}

impl Context {
    pub fn new(config: ClientConfig, timeout_secs: Option<u64>) -> Self {
        Self {
            config,
            timeout: timeout_secs.map(Duration::from_secs),
        }
    }

    /// Discovery manager over real HID devices
    pub fn manager(&self) -> DeviceManager {
        let registry = Arc::new(SessionRegistry::new(self.config.clone()));
        DeviceManager::new(Arc::new(HidDiscovery::new()), registry)
    }

    /// Enumerate once and return a session for the first wallet found
    ///
    /// The manager is returned as well; dropping it does not stop the session.
    pub async fn connect(&self) -> Result<(DeviceManager, Arc<ClientSession>)> {
        let manager = self.manager();
        manager.tick().await;
        match manager.registry().first() {
            Some(session) => {
                eprintln!(
                    "Using {} {} at {}",
                    session.family(),
                    session.device_info(),
                    session.device_id()
                );
                Ok((manager, session))
            }
            None => bail!("No KeepKey or Trezor found"),
        }
    }

    /// Wait for a reply, bounded by `--timeout` if given
    pub async fn wait(&self, pending: PendingResponse, expect: impl Into<Expect>) -> Result<Message> {
        let reply = match self.timeout {
            Some(timeout) => pending.wait_for_timeout(expect, timeout).await?,
            None => pending.wait_for(expect).await?,
        };
        Ok(reply)
    }
}

/// Set up a Ctrl-C handler that sets the given flag to false when triggered.
/// Returns the Arc<AtomicBool> for use in the main loop.
pub fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    running
}
