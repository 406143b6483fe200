//! Common types for transport layer

use std::fmt;

use crate::schema::DeviceFamily;

/// Opaque device identity assigned by the HID layer
///
/// For hidapi this is the platform device path. It is stable for the life of
/// one physical connection only; a replug may produce a different id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// USB vendor/product pair used to select the device family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
}

impl DeviceDescriptor {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

/// Device found during enumeration, not yet opened
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Identity used as the session registry key
    pub id: DeviceId,
    /// Vendor/product pair
    pub descriptor: DeviceDescriptor,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

impl DiscoveredDevice {
    /// Family binding for this device, if it is a known wallet
    pub fn family(&self) -> Option<DeviceFamily> {
        crate::device_registry::family_for(self.descriptor)
    }
}

/// Discovery events for hot-plug support
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A known device was attached and a session created for it
    Connected {
        id: DeviceId,
        family: DeviceFamily,
    },
    /// A previously connected device vanished from enumeration
    Disconnected { id: DeviceId },
}
