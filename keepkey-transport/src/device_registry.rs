//! Device registry - family detection by VID/PID
//!
//! Static table mapping USB vendor/product ids to the wallet family whose
//! message schema the device speaks. Anything not listed here is ignored by
//! discovery.

use crate::schema::DeviceFamily;
use crate::types::DeviceDescriptor;

/// KeepKey vendor ID
pub const KEEPKEY_VENDOR_ID: u16 = 0x2B24;
/// KeepKey product ID
pub const KEEPKEY_PRODUCT_ID: u16 = 0x0001;

/// SatoshiLabs vendor ID (Trezor One)
pub const TREZOR_VENDOR_ID: u16 = 0x534C;
/// Trezor One product ID
pub const TREZOR_PRODUCT_ID: u16 = 0x0001;

/// One known device model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub descriptor: DeviceDescriptor,
    pub family: DeviceFamily,
    pub name: &'static str,
}

/// All supported devices
pub const KNOWN_DEVICES: &[KnownDevice] = &[
    KnownDevice {
        descriptor: DeviceDescriptor::new(KEEPKEY_VENDOR_ID, KEEPKEY_PRODUCT_ID),
        family: DeviceFamily::KeepKey,
        name: "KeepKey",
    },
    KnownDevice {
        descriptor: DeviceDescriptor::new(TREZOR_VENDOR_ID, TREZOR_PRODUCT_ID),
        family: DeviceFamily::Trezor,
        name: "Trezor One",
    },
];

/// Find the table entry for a descriptor
pub fn find(descriptor: DeviceDescriptor) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES.iter().find(|d| d.descriptor == descriptor)
}

/// Family binding for a descriptor, `None` for unknown devices
#[inline]
pub fn family_for(descriptor: DeviceDescriptor) -> Option<DeviceFamily> {
    find(descriptor).map(|d| d.family)
}

/// Check if a VID/PID is a known device
#[inline]
pub fn is_known(vendor_id: u16, product_id: u16) -> bool {
    find(DeviceDescriptor::new(vendor_id, product_id)).is_some()
}
