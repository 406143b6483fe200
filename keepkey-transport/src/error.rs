//! Transport error types

use thiserror::Error;

/// Errors raised while parsing a frame header
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Bad frame magic: expected 0x2323, got {0:02X?}")]
    BadMagic([u8; 2]),

    #[error("Segment too short for frame header ({0} bytes)")]
    Truncated(usize),

    #[error("Payload length {0} exceeds limit")]
    PayloadTooLarge(usize),
}

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Failed to write report: {0}")]
    LinkWrite(String),

    #[error("Failed to read report: {0}")]
    LinkRead(String),

    #[error("Communication timeout")]
    Timeout,

    #[error("Unexpected report ID: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedReport { expected: u8, actual: u8 },

    #[error("Unknown device {vendor_id:04X}:{product_id:04X}")]
    UnknownDevice { vendor_id: u16, product_id: u16 },

    #[error("Unknown message type id {0}")]
    UnknownMessageType(u16),

    #[error("{message} is not supported by {family}")]
    UnsupportedMessage {
        family: &'static str,
        message: &'static str,
    },

    #[error("Malformed message payload: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),
}

impl TransportError {
    /// True for the "nothing arrived yet" case the poller treats as idle
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
