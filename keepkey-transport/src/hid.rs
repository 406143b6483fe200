//! hidapi-backed [`HidLink`]
//!
//! The wallets use unnumbered 64-byte reports whose first byte is always
//! `'?'`; that byte plays the role of the report ID for the framing layer.
//! hidapi wants an explicit report number 0 in front of every write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::frame::SEGMENT_SIZE;
use crate::link::HidLink;
use crate::types::{DeviceDescriptor, DeviceId};

/// Bytes of one report as read from the device ('?' + segment)
const REPORT_SIZE: usize = SEGMENT_SIZE + 1;

/// HID link over a hidapi device handle
///
/// Reads and writes are blocking hidapi calls, so each one runs on the
/// blocking thread pool with the handle behind a mutex.
pub struct HidapiLink {
    device: Arc<Mutex<HidDevice>>,
    id: DeviceId,
    descriptor: DeviceDescriptor,
}

impl HidapiLink {
    pub fn new(device: HidDevice, id: DeviceId, descriptor: DeviceDescriptor) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            id,
            descriptor,
        }
    }
}

#[async_trait]
impl HidLink for HidapiLink {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError> {
        // [hid report number 0] [report_id] [segment]
        let mut buf = vec![0u8; REPORT_SIZE + 1];
        buf[1] = report_id;
        let len = data.len().min(SEGMENT_SIZE);
        buf[2..2 + len].copy_from_slice(&data[..len]);

        let device = Arc::clone(&self.device);
        let written = tokio::task::spawn_blocking(move || device.lock().write(&buf))
            .await
            .map_err(|e| TransportError::LinkWrite(e.to_string()))?
            .map_err(|e| TransportError::LinkWrite(e.to_string()))?;

        trace!("{}: wrote {} bytes", self.id, written);
        Ok(())
    }

    async fn receive_report(&self, timeout: Duration) -> Result<(u8, Vec<u8>), TransportError> {
        let device = Arc::clone(&self.device);
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

        let (len, buf) = tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; REPORT_SIZE];
            device
                .lock()
                .read_timeout(&mut buf, timeout_ms)
                .map(|len| (len, buf))
        })
        .await
        .map_err(|e| TransportError::LinkRead(e.to_string()))?
        .map_err(|e| TransportError::LinkRead(e.to_string()))?;

        if len == 0 {
            return Err(TransportError::Timeout);
        }

        trace!("{}: read {} bytes: {:02X?}", self.id, len, &buf[..len.min(16)]);
        Ok((buf[0], buf[1..len].to_vec()))
    }

    async fn close(&self) -> Result<(), TransportError> {
        // HidDevice closes when the last handle drops
        debug!("{}: closing HID link", self.id);
        Ok(())
    }
}
