//! Session engine for KeepKey/Trezor hardware wallets
//!
//! Builds on `keepkey-transport`: each attached device gets a
//! [`ClientSession`] that polls its transport, answers the messages the host
//! can answer on its own (button and entropy requests) and publishes
//! everything it reads. Sessions live in a [`SessionRegistry`]; a
//! [`DeviceManager`] keeps that registry in step with what is plugged in.

pub mod config;
pub mod error;
pub mod features;
pub mod manager;
pub mod pending;
pub mod registry;
pub mod session;

pub use config::ClientConfig;
pub use error::ClientError;
pub use features::FeaturesStore;
pub use manager::DeviceManager;
pub use pending::{Expect, PendingResponse};
pub use registry::SessionRegistry;
pub use session::{ClientSession, DeviceEvent, PollState};

pub use keepkey_transport::messages;
pub use keepkey_transport::{DeviceFamily, DeviceId, DiscoveryEvent, Message, MessageType};
