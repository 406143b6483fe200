//! Per-device session: polling, built-in message handling and requests
//!
//! A session owns one [`Transport`]. Its polling task reads at most one
//! message per tick, publishes it on the session's event sink and then runs
//! the built-in handler for its type. Request operations write a message and
//! hand back a [`PendingResponse`] subscribed before the write.

use std::sync::Arc;
use std::time::Duration;

use keepkey_transport::messages::{
    ApplySettings, ButtonAck, Cancel, ChangePin, CharacterAck, ClearSession, EntropyAck,
    FirmwareErase, FirmwareUpload, GetFeatures, Initialize, PassphraseAck, PinMatrixAck, Ping,
    RecoveryDevice, ResetDevice, WipeDevice, WordAck,
};
use keepkey_transport::{DeviceDescriptor, DeviceFamily, DeviceId, Message, Transport};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::error::ClientError;
use crate::features::FeaturesStore;
use crate::pending::PendingResponse;

/// Bytes of host entropy sent in reply to `EntropyRequest`
pub const ENTROPY_ACK_LEN: usize = 32;

/// A message received from a device, as published on the event sink
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    pub device_id: DeviceId,
    pub message: Message,
}

/// Whether a polling read is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Reading,
}

/// Holds the poll state at `Reading`; restores `Idle` on drop
struct ReadGuard<'a> {
    state: &'a Mutex<PollState>,
}

impl<'a> ReadGuard<'a> {
    fn try_enter(state: &'a Mutex<PollState>) -> Option<Self> {
        let mut current = state.lock();
        if *current == PollState::Reading {
            return None;
        }
        *current = PollState::Reading;
        Some(Self { state })
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = PollState::Idle;
    }
}

/// State shared between the session handle and its polling task
struct SessionInner {
    transport: Transport,
    events: broadcast::Sender<DeviceEvent>,
    features: FeaturesStore,
    poll_state: Mutex<PollState>,
    stop_tx: watch::Sender<bool>,
}

impl SessionInner {
    fn device_id(&self) -> &DeviceId {
        self.transport.device_id()
    }

    fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    async fn initialize(&self) -> Result<(), ClientError> {
        self.transport
            .write(&Initialize {}.into())
            .await
            .map_err(|e| {
                warn!("{}: failed to send Initialize: {}", self.device_id(), e);
                ClientError::Initialization(e.to_string())
            })
    }

    async fn poll_once(&self) -> Option<Message> {
        if self.is_stopped() {
            return None;
        }

        let Some(guard) = ReadGuard::try_enter(&self.poll_state) else {
            trace!("{}: read already in progress, skipping tick", self.device_id());
            return None;
        };
        let result = self.transport.read().await;
        drop(guard);

        let message = match result {
            Ok(message) => message,
            Err(e) if e.is_timeout() => {
                trace!("{}: nothing pending", self.device_id());
                return None;
            }
            Err(e) => {
                trace!("{}: poll read failed: {}", self.device_id(), e);
                return None;
            }
        };

        if self.is_stopped() {
            debug!(
                "{}: dropping {} received after stop",
                self.device_id(),
                message.type_name()
            );
            return None;
        }

        // No subscribers is fine
        let _ = self.events.send(DeviceEvent {
            device_id: self.device_id().clone(),
            message: message.clone(),
        });
        self.dispatch(&message).await;
        Some(message)
    }

    async fn dispatch(&self, message: &Message) {
        let id = self.device_id();
        let result = match message {
            Message::ButtonRequest(request) => {
                debug!("{}: button request (code {:?}), acking", id, request.code);
                self.transport.write(&ButtonAck {}.into()).await
            }
            Message::EntropyRequest(_) => match host_entropy() {
                Ok(entropy) => {
                    let ack = EntropyAck {
                        entropy: Some(entropy),
                    };
                    self.transport.write(&ack.into()).await
                }
                Err(e) => {
                    warn!("{}: OS RNG failed, not answering EntropyRequest: {}", id, e);
                    Ok(())
                }
            },
            Message::Features(features) => {
                info!(
                    "{}: {} {} (label {:?})",
                    id,
                    features.vendor.as_deref().unwrap_or("unknown vendor"),
                    features.version_string(),
                    features.label.as_deref().unwrap_or("")
                );
                self.features.insert(id.clone(), features.clone());
                Ok(())
            }
            Message::Success(success) => {
                debug!(
                    "{}: success ({}), re-initializing",
                    id,
                    success.message.as_deref().unwrap_or("")
                );
                self.transport.write(&Initialize {}.into()).await
            }
            other => {
                debug!("{}: no handler for {}", id, other.type_name());
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("{}: handling {} failed: {}", id, message.type_name(), e);
        }
    }
}

fn host_entropy() -> Result<Vec<u8>, rand::Error> {
    let mut entropy = vec![0u8; ENTROPY_ACK_LEN];
    OsRng.try_fill_bytes(&mut entropy)?;
    Ok(entropy)
}

async fn poll_loop(inner: Arc<SessionInner>, interval: Duration) {
    let mut stop_rx = inner.stop_tx.subscribe();
    if *stop_rx.borrow_and_update() {
        return;
    }

    let _ = inner.initialize().await;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                inner.poll_once().await;
            }
        }
    }

    debug!("{}: polling stopped", inner.device_id());
}

/// Client session for one device
pub struct ClientSession {
    inner: Arc<SessionInner>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl ClientSession {
    /// Create a session over `transport`
    ///
    /// Polling does not start until [`start_polling`](Self::start_polling).
    pub fn new(transport: Transport, features: FeaturesStore, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                transport,
                events,
                features,
                poll_state: Mutex::new(PollState::Idle),
                stop_tx,
            }),
            poll_task: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        self.inner.device_id()
    }

    pub fn family(&self) -> DeviceFamily {
        self.inner.transport.family()
    }

    /// Vendor/product pair of the device
    pub fn device_info(&self) -> DeviceDescriptor {
        self.inner.transport.device_info()
    }

    pub fn poll_state(&self) -> PollState {
        *self.inner.poll_state.lock()
    }

    /// Last `Features` this device reported
    pub fn features(&self) -> Option<keepkey_transport::messages::Features> {
        self.inner.features.get(self.device_id())
    }

    /// Receiver for every message this device sends
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.subscribe()
    }

    /// Spawn the polling task: send `Initialize`, then read once per `interval`
    ///
    /// No-op if the task is already running or polling was stopped.
    pub fn start_polling(&self, interval: Duration) {
        let mut task = self.poll_task.lock();
        if task.is_some() || self.inner.is_stopped() {
            return;
        }
        debug!(
            "{}: polling every {}ms",
            self.device_id(),
            interval.as_millis()
        );
        *task = Some(tokio::spawn(poll_loop(Arc::clone(&self.inner), interval)));
    }

    /// Stop polling; idempotent
    ///
    /// A read already in flight completes, but its message is neither
    /// published nor dispatched.
    pub fn stop_polling(&self) {
        let was_stopped = self.inner.stop_tx.send_replace(true);
        if !was_stopped {
            debug!("{}: stop polling", self.device_id());
        }
    }

    pub fn is_polling(&self) -> bool {
        !self.inner.is_stopped()
            && self
                .poll_task
                .lock()
                .as_ref()
                .is_some_and(|t| !t.is_finished())
    }

    /// Run one polling step now
    ///
    /// Returns the message read and dispatched, if any.
    pub async fn poll_once(&self) -> Option<Message> {
        self.inner.poll_once().await
    }

    /// Send `Initialize`, logging (not propagating) failures to callers that
    /// ignore the result
    pub async fn initialize(&self) -> Result<(), ClientError> {
        self.inner.initialize().await
    }

    /// Write `message` and return a handle for its reply
    pub async fn send(&self, message: impl Into<Message>) -> Result<PendingResponse, ClientError> {
        let message = message.into();
        let rx = self.inner.events.subscribe();
        self.inner.transport.write(&message).await?;
        Ok(PendingResponse::new(self.device_id().clone(), rx))
    }

    /// `Initialize`; the reply is `Features`
    pub async fn initialize_request(&self) -> Result<PendingResponse, ClientError> {
        self.send(Initialize {}).await
    }

    /// `GetFeatures`; the reply is `Features`
    pub async fn get_features(&self) -> Result<PendingResponse, ClientError> {
        self.send(GetFeatures {}).await
    }

    /// `Ping`; the device echoes `text` in a `Success`
    pub async fn ping(&self, text: &str) -> Result<PendingResponse, ClientError> {
        self.send(Ping {
            message: Some(text.to_string()),
            ..Default::default()
        })
        .await
    }

    /// `WipeDevice`; resolves with `Success { message: "Device wiped" }`
    pub async fn wipe_device(&self) -> Result<PendingResponse, ClientError> {
        self.send(WipeDevice {}).await
    }

    pub async fn reset_device(&self, settings: ResetDevice) -> Result<PendingResponse, ClientError> {
        self.send(settings).await
    }

    pub async fn recovery_device(
        &self,
        settings: RecoveryDevice,
    ) -> Result<PendingResponse, ClientError> {
        self.send(settings).await
    }

    /// Answer a `PinMatrixRequest` with matrix positions
    pub async fn pin_matrix_ack(&self, pin: &str) -> Result<PendingResponse, ClientError> {
        self.send(PinMatrixAck {
            pin: pin.to_string(),
        })
        .await
    }

    pub async fn passphrase_ack(&self, passphrase: &str) -> Result<PendingResponse, ClientError> {
        self.send(PassphraseAck {
            passphrase: passphrase.to_string(),
        })
        .await
    }

    pub async fn word_ack(&self, word: &str) -> Result<PendingResponse, ClientError> {
        self.send(WordAck {
            word: word.to_string(),
        })
        .await
    }

    /// Answer a `CharacterRequest` (KeepKey only)
    pub async fn character_ack(&self, ack: CharacterAck) -> Result<PendingResponse, ClientError> {
        self.send(ack).await
    }

    pub async fn cancel(&self) -> Result<PendingResponse, ClientError> {
        self.send(Cancel {}).await
    }

    pub async fn clear_session(&self) -> Result<PendingResponse, ClientError> {
        self.send(ClearSession {}).await
    }

    pub async fn apply_settings(
        &self,
        settings: ApplySettings,
    ) -> Result<PendingResponse, ClientError> {
        self.send(settings).await
    }

    /// Change the PIN, or remove it when `remove` is set
    pub async fn change_pin(&self, remove: bool) -> Result<PendingResponse, ClientError> {
        self.send(ChangePin {
            remove: remove.then_some(true),
        })
        .await
    }

    /// Bootloader only
    pub async fn firmware_erase(&self) -> Result<PendingResponse, ClientError> {
        self.send(FirmwareErase {}).await
    }

    /// Upload a firmware image (bootloader only); the hash is computed here
    pub async fn firmware_upload(&self, image: Vec<u8>) -> Result<PendingResponse, ClientError> {
        let payload_hash = Sha256::digest(&image).to_vec();
        debug!(
            "{}: uploading {} byte image",
            self.device_id(),
            image.len()
        );
        self.send(FirmwareUpload {
            payload_hash,
            payload: image,
        })
        .await
    }

    /// Close the underlying link after stopping polling
    pub async fn close(&self) -> Result<(), ClientError> {
        self.stop_polling();
        self.inner.transport.close().await?;
        Ok(())
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.inner.stop_tx.send_replace(true);
    }
}
