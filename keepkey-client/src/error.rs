//! Client error types

use keepkey_transport::{DeviceId, TransportError};
use thiserror::Error;

/// Errors from session and registry operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Initialize could not be sent
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Device answered with a Failure message
    #[error("Device failure (code {code:?}): {message}")]
    DeviceFailure { code: Option<i32>, message: String },

    /// Bounded wait expired
    #[error("Operation timed out")]
    Timeout,

    /// Event sink closed before the expected message arrived
    #[error("Session closed")]
    SessionClosed,

    /// Waiter fell behind the event sink; the reply may have been dropped
    #[error("Missed {0} device messages while waiting")]
    Lagged(u64),

    /// No session for this device
    #[error("Device not found: {0}")]
    NotFound(DeviceId),

    /// Invalid configuration file
    #[error("Configuration error: {0}")]
    Config(String),
}
