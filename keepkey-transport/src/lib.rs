//! Transport layer for KeepKey/Trezor hardware wallet communication
//!
//! Layers, bottom up:
//!
//! - [`HidLink`]: raw 64-byte HID reports (hidapi or mock)
//! - [`frame`]: 8-byte header and 63-byte segmentation
//! - [`schema`]: per-family message type ids and protobuf payloads
//! - [`Transport`]: one whole message at a time over a link
//! - [`DeviceDiscovery`]: enumerate and open known wallets

pub mod device_registry;
pub mod error;
pub mod frame;
pub mod messages;
pub mod schema;
pub mod types;

mod discovery;
mod hid;
mod link;
mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use device_registry::{KnownDevice, KNOWN_DEVICES};
pub use discovery::{DeviceDiscovery, HidDiscovery};
pub use error::{FramingError, TransportError};
pub use hid::HidapiLink;
pub use link::HidLink;
pub use schema::{DeviceFamily, Message, MessageType};
pub use transport::{Transport, DEFAULT_READ_TIMEOUT, DEFAULT_SEGMENT_TIMEOUT};
pub use types::{DeviceDescriptor, DeviceId, DiscoveredDevice, DiscoveryEvent};
