//! Raw HID report link
//!
//! The transport only needs to push and pull single reports. Everything
//! above one report (framing, schema) lives in [`crate::transport`].

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{DeviceDescriptor, DeviceId};

/// One opened HID device that exchanges fixed-size reports
#[async_trait]
pub trait HidLink: Send + Sync {
    /// Identity of the underlying device
    fn id(&self) -> &DeviceId;

    /// Vendor/product pair reported at enumeration
    fn descriptor(&self) -> DeviceDescriptor;

    /// Send one report
    ///
    /// # Arguments
    /// * `report_id` - Report ID byte
    /// * `data` - Report payload (one segment)
    async fn send_report(&self, report_id: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one report as `(report_id, payload)`
    ///
    /// Returns `TransportError::Timeout` when nothing arrives within `timeout`.
    async fn receive_report(&self, timeout: Duration) -> Result<(u8, Vec<u8>), TransportError>;

    /// Close the link gracefully
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
