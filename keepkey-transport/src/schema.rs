//! Message type enumeration and per-family type id tables
//!
//! [`MessageType`] is the closed set of messages this client understands and
//! [`Message`] pairs each with its decoded payload. The numeric type id that
//! goes into the frame header is not global: each [`DeviceFamily`] carries its
//! own table, so the same `Message` may encode differently (or not at all)
//! depending on which device it is sent to.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::TransportError;
use crate::messages;

macro_rules! message_set {
    ($($name:ident),* $(,)?) => {
        /// Closed set of message types, the dispatch key for encode and decode
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum MessageType {
            $($name),*
        }

        impl MessageType {
            /// Every known message type
            pub const ALL: &'static [MessageType] = &[$(MessageType::$name),*];

            /// Wire type name, e.g. `"Success"`
            pub fn name(self) -> &'static str {
                match self {
                    $(MessageType::$name => stringify!($name)),*
                }
            }
        }

        /// A decoded message: type plus typed payload
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(tag = "type", content = "payload")]
        pub enum Message {
            $($name(messages::$name)),*
        }

        impl Message {
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(Message::$name(_) => MessageType::$name),*
                }
            }

            /// Serialize the payload (without frame header)
            pub fn encode_payload(&self) -> Vec<u8> {
                match self {
                    $(Message::$name(m) => prost::Message::encode_to_vec(m)),*
                }
            }

            /// Parse a payload of the given type
            pub fn decode_payload(
                kind: MessageType,
                payload: &[u8],
            ) -> Result<Self, prost::DecodeError> {
                Ok(match kind {
                    $(MessageType::$name => {
                        Message::$name(<messages::$name as prost::Message>::decode(payload)?)
                    })*
                })
            }
        }

        $(
            impl From<messages::$name> for Message {
                fn from(m: messages::$name) -> Self {
                    Message::$name(m)
                }
            }
        )*
    };
}

message_set!(
    // Session
    Initialize,
    GetFeatures,
    Features,
    Ping,
    Success,
    Failure,
    Cancel,
    ClearSession,
    // Device management
    ChangePin,
    WipeDevice,
    ApplySettings,
    ResetDevice,
    RecoveryDevice,
    // Bootloader
    FirmwareErase,
    FirmwareUpload,
    // Entropy
    GetEntropy,
    Entropy,
    EntropyRequest,
    EntropyAck,
    // User interaction
    ButtonRequest,
    ButtonAck,
    PinMatrixRequest,
    PinMatrixAck,
    PassphraseRequest,
    PassphraseAck,
    WordRequest,
    WordAck,
    CharacterRequest,
    CharacterAck,
);

impl MessageType {
    /// Look up a type by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown message type '{s}'"))
    }
}

impl Message {
    /// Wire type name of this message
    pub fn type_name(&self) -> &'static str {
        self.message_type().name()
    }

    /// Plain JSON view (`{"type": ..., "payload": {...}}`) for UI and CLI output
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Type ids shared by both families
const COMMON_IDS: &[(MessageType, u16)] = &[
    (MessageType::Initialize, 0),
    (MessageType::Ping, 1),
    (MessageType::Success, 2),
    (MessageType::Failure, 3),
    (MessageType::ChangePin, 4),
    (MessageType::WipeDevice, 5),
    (MessageType::FirmwareErase, 6),
    (MessageType::FirmwareUpload, 7),
    (MessageType::GetEntropy, 9),
    (MessageType::Entropy, 10),
    (MessageType::ResetDevice, 14),
    (MessageType::Features, 17),
    (MessageType::PinMatrixRequest, 18),
    (MessageType::PinMatrixAck, 19),
    (MessageType::Cancel, 20),
    (MessageType::ClearSession, 24),
    (MessageType::ApplySettings, 25),
    (MessageType::ButtonRequest, 26),
    (MessageType::ButtonAck, 27),
    (MessageType::EntropyRequest, 35),
    (MessageType::EntropyAck, 36),
    (MessageType::PassphraseRequest, 41),
    (MessageType::PassphraseAck, 42),
    (MessageType::RecoveryDevice, 45),
    (MessageType::WordRequest, 46),
    (MessageType::WordAck, 47),
    (MessageType::GetFeatures, 55),
];

/// KeepKey-only additions (character cipher recovery)
const KEEPKEY_IDS: &[(MessageType, u16)] = &[
    (MessageType::CharacterRequest, 80),
    (MessageType::CharacterAck, 81),
];

/// Device family: selects the message schema used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceFamily {
    KeepKey,
    Trezor,
}

impl DeviceFamily {
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::KeepKey => "KeepKey",
            DeviceFamily::Trezor => "Trezor",
        }
    }

    fn tables(self) -> impl Iterator<Item = &'static (MessageType, u16)> {
        let extra: &'static [(MessageType, u16)] = match self {
            DeviceFamily::KeepKey => KEEPKEY_IDS,
            DeviceFamily::Trezor => &[],
        };
        COMMON_IDS.iter().chain(extra.iter())
    }

    /// Wire id of a message type, if this family supports it
    pub fn type_id(self, kind: MessageType) -> Option<u16> {
        self.tables().find(|(t, _)| *t == kind).map(|(_, id)| *id)
    }

    /// Message type for a wire id, if known to this family
    pub fn message_type(self, id: u16) -> Option<MessageType> {
        self.tables().find(|(_, i)| *i == id).map(|(t, _)| *t)
    }

    /// Encode a message into `(type_id, payload)`
    pub fn encode(self, message: &Message) -> Result<(u16, Vec<u8>), TransportError> {
        let kind = message.message_type();
        let id = self
            .type_id(kind)
            .ok_or(TransportError::UnsupportedMessage {
                family: self.name(),
                message: kind.name(),
            })?;
        Ok((id, message.encode_payload()))
    }

    /// Decode `(type_id, payload)` into a typed message
    pub fn decode(self, id: u16, payload: &[u8]) -> Result<Message, TransportError> {
        let kind = self
            .message_type(id)
            .ok_or(TransportError::UnknownMessageType(id))?;
        Ok(Message::decode_payload(kind, payload)?)
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
