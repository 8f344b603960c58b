//! Command frames and transport encoding
//!
//! Every command written to the safety module's auth characteristic is an
//! 18-byte [`Frame`]: a 2-byte opcode followed by one 16-byte block of data.
//! The characteristic API works on text, so frames and notification values
//! travel as standard base64 ([`to_transport_encoding`] /
//! [`from_transport_encoding`]).
//!
//! ## Frame Layout
//!
//! ```text
//! offset  0      1      2 ........................ 17
//!        +------+------+----------------------------+
//!        | cmd0 | cmd1 | payload (16 bytes)         |
//!        +------+------+----------------------------+
//! ```

use crate::{PairingError, Result};
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the command prefix
pub const COMMAND_LEN: usize = 2;

/// Length of the data block carried by a frame
pub const PAYLOAD_LEN: usize = 16;

/// Total frame length
pub const FRAME_LEN: usize = COMMAND_LEN + PAYLOAD_LEN;

/// Character offset of the base64 nonce inside a challenge notification
pub const NONCE_OFFSET: usize = 4;

/// Two-byte opcode at the start of every frame
pub type Command = [u8; COMMAND_LEN];

/// Opcodes understood by the safety module firmware
pub mod commands {
    use super::Command;

    /// Wake the auth characteristic
    pub const ACTIVATE: Command = [0x01, 0x00];

    /// Announce our key (payload: the pre-shared key)
    pub const SEND_KEY: Command = [0x01, 0x08];

    /// Ask the device for its challenge
    pub const REQUEST_KEY: Command = [0x02, 0x00];

    /// Return the encrypted challenge (payload: ciphertext)
    pub const SEND_ENCRYPTED: Command = [0x03, 0x00];

    /// Alert text for a command that could not be written
    pub fn write_failure_message(command: Command) -> &'static str {
        match command {
            ACTIVATE => "Initial write failed",
            SEND_KEY => "Sending our key to device failed",
            REQUEST_KEY => "Error requesting device key",
            SEND_ENCRYPTED => "Sending encrypted key back to device failed",
            _ => "Write to device failed",
        }
    }
}

/// Decoder that accepts base64 with or without trailing padding
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// How payload-less frames are put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameLayout {
    /// Bare 2-byte command, as deployed firmware expects
    #[default]
    Compact,
    /// Full 18-byte frame with a zeroed payload
    Padded,
}

/// An 18-byte command frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
    has_data: bool,
}

impl Frame {
    /// Build a frame from a command and exactly 16 bytes of payload
    pub fn new(command: Command, payload: &[u8]) -> Result<Self> {
        if payload.len() != PAYLOAD_LEN {
            return Err(PairingError::InvalidLength {
                expected: PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let mut bytes = [0u8; FRAME_LEN];
        bytes[..COMMAND_LEN].copy_from_slice(&command);
        bytes[COMMAND_LEN..].copy_from_slice(payload);

        Ok(Self {
            bytes,
            has_data: true,
        })
    }

    /// Build a frame that carries no data (payload zeroed)
    pub fn command_only(command: Command) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..COMMAND_LEN].copy_from_slice(&command);
        Self {
            bytes,
            has_data: false,
        }
    }

    pub fn command(&self) -> Command {
        [self.bytes[0], self.bytes[1]]
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[COMMAND_LEN..]
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    /// Whether the payload is meaningful or just padding
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    /// The bytes that are written to the characteristic under `layout`
    ///
    /// Frames carrying data are always written whole.
    pub fn wire_bytes(&self, layout: FrameLayout) -> &[u8] {
        match (self.has_data, layout) {
            (false, FrameLayout::Compact) => &self.bytes[..COMMAND_LEN],
            _ => &self.bytes,
        }
    }

    /// Transport-encoded form ready for a characteristic write
    pub fn to_transport(&self, layout: FrameLayout) -> String {
        to_transport_encoding(self.wire_bytes(layout))
    }
}

// Payloads can hold the pre-shared key, so only the opcode is printed
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("command", &format_args!("{:02x}{:02x}", self.bytes[0], self.bytes[1]))
            .field("has_data", &self.has_data)
            .finish()
    }
}

/// Place `command` at offset 0-1 and `payload` at offset 2-17
pub fn encode_frame(command: Command, payload: &[u8]) -> Result<Frame> {
    Frame::new(command, payload)
}

/// Extract the device nonce from a challenge notification
///
/// The nonce is the base64 text starting at character offset 4.
pub fn decode_nonce(value: &str) -> Result<[u8; PAYLOAD_LEN]> {
    if value.chars().count() < NONCE_OFFSET {
        return Err(PairingError::MalformedNotification(format!(
            "value too short for a challenge ({} chars)",
            value.chars().count()
        )));
    }

    let tail: String = value.chars().skip(NONCE_OFFSET).collect();
    let decoded = LENIENT.decode(tail.as_bytes()).map_err(|e| {
        PairingError::MalformedNotification(format!("nonce is not valid base64: {}", e))
    })?;

    decoded.as_slice().try_into().map_err(|_| {
        PairingError::MalformedNotification(format!(
            "nonce must be {} bytes, got {}",
            PAYLOAD_LEN,
            decoded.len()
        ))
    })
}

/// Encode raw bytes for a characteristic write
pub fn to_transport_encoding(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a characteristic value back into raw bytes
pub fn from_transport_encoding(value: &str) -> Result<Vec<u8>> {
    LENIENT.decode(value.as_bytes()).map_err(|e| {
        PairingError::MalformedNotification(format!("invalid transport encoding: {}", e))
    })
}
