//! Protocol Buffers payloads exchanged with the device
//!
//! Field tags follow the KeepKey/Trezor `messages.proto` (proto2). Only the
//! messages and fields this client drives are declared; unknown fields sent
//! by newer firmware are skipped by the decoder.

use serde::Serialize;

/// Reset device to default state and ask for device details
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Initialize {}

/// Ask for device details (no session reset)
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct GetFeatures {}

/// Test if the device is alive; the device echoes `message` in a Success
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Ping {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub button_protection: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub passphrase_protection: Option<bool>,
}

/// Success result for the previous request
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Success {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
}

/// Failure result for the previous request
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Failure {
    /// See [`FailureType`]
    #[prost(int32, optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
}

/// Start the PIN change flow (or remove the PIN)
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ChangePin {
    #[prost(bool, optional, tag = "1")]
    pub remove: Option<bool>,
}

/// Erase all device state
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct WipeDevice {}

/// Bootloader: erase the firmware region
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct FirmwareErase {}

/// Bootloader: flash a firmware image
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct FirmwareUpload {
    /// SHA-256 of `payload`
    #[prost(bytes = "vec", required, tag = "1")]
    #[serde(skip)]
    pub payload_hash: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    #[serde(skip)]
    pub payload: Vec<u8>,
}

/// Ask the device for random bytes
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct GetEntropy {
    #[prost(uint32, required, tag = "1")]
    pub size: u32,
}

/// Random bytes produced by the device
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Entropy {
    #[prost(bytes = "vec", required, tag = "1")]
    pub entropy: Vec<u8>,
}

/// Generate a new seed on the device
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ResetDevice {
    #[prost(bool, optional, tag = "1")]
    pub display_random: Option<bool>,
    /// Seed strength in bits (128, 192 or 256)
    #[prost(uint32, optional, tag = "2")]
    pub strength: Option<u32>,
    #[prost(bool, optional, tag = "3")]
    pub passphrase_protection: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub pin_protection: Option<bool>,
    #[prost(string, optional, tag = "5")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub label: Option<String>,
}

/// Device capabilities and state
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Features {
    #[prost(string, optional, tag = "1")]
    pub vendor: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub major_version: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub minor_version: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub patch_version: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub bootloader_mode: Option<bool>,
    #[prost(string, optional, tag = "6")]
    pub device_id: Option<String>,
    #[prost(bool, optional, tag = "7")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub passphrase_protection: Option<bool>,
    #[prost(string, optional, tag = "9")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "10")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "12")]
    pub initialized: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "13")]
    pub revision: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "14")]
    pub bootloader_hash: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "15")]
    pub imported: Option<bool>,
    #[prost(bool, optional, tag = "16")]
    pub pin_cached: Option<bool>,
    #[prost(bool, optional, tag = "17")]
    pub passphrase_cached: Option<bool>,
}

impl Features {
    /// "major.minor.patch", with missing parts as 0
    pub fn version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            self.major_version.unwrap_or(0),
            self.minor_version.unwrap_or(0),
            self.patch_version.unwrap_or(0)
        )
    }
}

/// Device asks for the PIN via the scrambled matrix
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct PinMatrixRequest {
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
}

/// PIN entered as matrix positions
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct PinMatrixAck {
    #[prost(string, required, tag = "1")]
    #[serde(skip)]
    pub pin: String,
}

/// Abort the current operation
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Cancel {}

/// Forget the cached PIN and passphrase
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ClearSession {}

/// Change label, language or passphrase use
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ApplySettings {
    #[prost(string, optional, tag = "1")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "3")]
    pub use_passphrase: Option<bool>,
}

/// Device waits for a physical button press
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ButtonRequest {
    #[prost(int32, optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub data: Option<String>,
}

/// Host is ready for the button press
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ButtonAck {}

/// Device asks for host entropy during seed generation
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct EntropyRequest {}

/// Host entropy mixed into the generated seed
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct EntropyAck {
    #[prost(bytes = "vec", optional, tag = "1")]
    #[serde(skip)]
    pub entropy: Option<Vec<u8>>,
}

/// Device asks for the passphrase
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct PassphraseRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct PassphraseAck {
    #[prost(string, required, tag = "1")]
    #[serde(skip)]
    pub passphrase: String,
}

/// Start seed recovery
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct RecoveryDevice {
    /// Number of words in the mnemonic (12, 18 or 24)
    #[prost(uint32, optional, tag = "1")]
    pub word_count: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub passphrase_protection: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub pin_protection: Option<bool>,
    #[prost(string, optional, tag = "4")]
    pub language: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub label: Option<String>,
    #[prost(bool, optional, tag = "6")]
    pub enforce_wordlist: Option<bool>,
    /// KeepKey: enter words through the character cipher
    #[prost(bool, optional, tag = "8")]
    pub use_character_cipher: Option<bool>,
}

/// Device asks for the next mnemonic word
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct WordRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct WordAck {
    #[prost(string, required, tag = "1")]
    #[serde(skip)]
    pub word: String,
}

/// KeepKey cipher recovery: device asks for the next character
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct CharacterRequest {
    #[prost(uint32, required, tag = "1")]
    pub word_pos: u32,
    #[prost(uint32, required, tag = "2")]
    pub character_pos: u32,
}

/// KeepKey cipher recovery: one ciphered character, or delete / done
#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct CharacterAck {
    #[prost(string, optional, tag = "1")]
    #[serde(skip)]
    pub character: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub delete: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub done: Option<bool>,
}

/// Failure codes carried in [`Failure::code`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    UnexpectedMessage,
    ButtonExpected,
    SyntaxError,
    ActionCancelled,
    PinExpected,
    PinCancelled,
    PinInvalid,
    InvalidSignature,
    Other,
    NotEnoughFunds,
    NotInitialized,
    FirmwareError,
}

impl FailureType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::UnexpectedMessage,
            2 => Self::ButtonExpected,
            3 => Self::SyntaxError,
            4 => Self::ActionCancelled,
            5 => Self::PinExpected,
            6 => Self::PinCancelled,
            7 => Self::PinInvalid,
            8 => Self::InvalidSignature,
            9 => Self::Other,
            10 => Self::NotEnoughFunds,
            11 => Self::NotInitialized,
            99 => Self::FirmwareError,
            _ => return None,
        })
    }
}

impl Failure {
    pub fn failure_type(&self) -> Option<FailureType> {
        self.code.and_then(FailureType::from_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    #[test]
    fn test_success_wire_bytes() {
        let msg = Success {
            message: Some("ok".into()),
        };
        // field 1, wire type 2, len 2
        assert_eq!(msg.encode_to_vec(), vec![0x0A, 0x02, b'o', b'k']);
    }

    #[test]
    fn test_features_skip_unknown_fields() {
        // vendor = "keepkey.com", coins (field 11) present but undeclared
        let mut bytes = vec![0x0A, 11];
        bytes.extend_from_slice(b"keepkey.com");
        bytes.extend_from_slice(&[0x5A, 0x02, 0x08, 0x01]);
        bytes.extend_from_slice(&[0x10, 0x04]);

        let f = Features::decode(bytes.as_slice()).unwrap();
        assert_eq!(f.vendor.as_deref(), Some("keepkey.com"));
        assert_eq!(f.major_version, Some(4));
        assert_eq!(f.version_string(), "4.0.0");
    }

    #[test]
    fn test_failure_type() {
        let f = Failure {
            code: Some(4),
            message: Some("Cancelled".into()),
        };
        assert_eq!(f.failure_type(), Some(FailureType::ActionCancelled));
        assert_eq!(FailureType::from_code(1234), None);
    }
}
