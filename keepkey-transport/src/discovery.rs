//! Device discovery for KeepKey/Trezor wallets

use std::sync::Arc;

use async_trait::async_trait;
use hidapi::{DeviceInfo, HidApi};
use tracing::{debug, info};

use crate::device_registry;
use crate::error::TransportError;
use crate::hid::HidapiLink;
use crate::link::HidLink;
use crate::types::{DeviceDescriptor, DeviceId, DiscoveredDevice};

/// Vendor usage page of the wallet interface
///
/// Only consulted on platforms that do not report interface numbers.
const WALLET_USAGE_PAGE: u16 = 0xFF00;

/// Device discovery abstraction
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    /// List currently attached devices
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Open a specific device
    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn HidLink>, TransportError>;
}

/// hidapi enumeration of known wallets
pub struct HidDiscovery {
    /// Known VID/PID pairs to look for
    known_devices: Vec<(u16, u16)>,
}

impl Default for HidDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl HidDiscovery {
    /// Discover every device in the registry table
    pub fn new() -> Self {
        Self {
            known_devices: device_registry::KNOWN_DEVICES
                .iter()
                .map(|d| (d.descriptor.vendor_id, d.descriptor.product_id))
                .collect(),
        }
    }

    fn is_known_device(&self, vid: u16, pid: u16) -> bool {
        self.known_devices.contains(&(vid, pid))
    }

    /// Check if this is the main wallet interface
    ///
    /// KeepKey also exposes a debug link and a U2F interface under the same
    /// VID/PID; those must not be opened as sessions.
    fn is_wallet_interface(device_info: &DeviceInfo) -> bool {
        match device_info.interface_number() {
            0 => true,
            -1 => device_info.usage_page() == WALLET_USAGE_PAGE,
            _ => false,
        }
    }

    fn device_id(device_info: &DeviceInfo) -> DeviceId {
        DeviceId::new(device_info.path().to_string_lossy())
    }
}

#[async_trait]
impl DeviceDiscovery for HidDiscovery {
    async fn list_devices(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;
        let mut devices: Vec<DiscoveredDevice> = Vec::new();

        for device_info in api.device_list() {
            let vid = device_info.vendor_id();
            let pid = device_info.product_id();

            if !self.is_known_device(vid, pid) || !Self::is_wallet_interface(device_info) {
                continue;
            }

            let id = Self::device_id(device_info);
            if devices.iter().any(|d| d.id == id) {
                continue;
            }

            debug!(
                "Found device: VID={:04X} PID={:04X} iface={} path={}",
                vid,
                pid,
                device_info.interface_number(),
                id
            );

            devices.push(DiscoveredDevice {
                id,
                descriptor: DeviceDescriptor::new(vid, pid),
                serial: device_info.serial_number().map(|s| s.to_string()),
                product_name: device_info.product_string().map(|s| s.to_string()),
            });
        }

        debug!("Found {} devices", devices.len());
        Ok(devices)
    }

    async fn open_device(
        &self,
        device: &DiscoveredDevice,
    ) -> Result<Arc<dyn HidLink>, TransportError> {
        if device.family().is_none() {
            return Err(TransportError::UnknownDevice {
                vendor_id: device.descriptor.vendor_id,
                product_id: device.descriptor.product_id,
            });
        }

        let api = HidApi::new().map_err(|e| TransportError::HidError(e.to_string()))?;

        let device_info = api
            .device_list()
            .find(|d| Self::device_id(d) == device.id)
            .ok_or_else(|| TransportError::DeviceNotFound(device.id.to_string()))?;

        let handle = device_info
            .open_device(&api)
            .map_err(TransportError::from)?;

        info!("Opened {} at {}", device.descriptor, device.id);

        Ok(Arc::new(HidapiLink::new(
            handle,
            device.id.clone(),
            device.descriptor,
        )))
    }
}
