//! Error handling for the safety link pairing protocol
//!
//! Every fallible operation in this crate returns [`Result`], whose error type
//! is [`PairingError`]. Codec and cipher errors are local to one handshake
//! step: the session turns them into a terminal
//! [`FailureReason`](crate::FailureReason) instead of dropping them.
//!
//! ## Error Handling Patterns
//!
//! ```rust
//! use safety_link_protocol::{codec, PairingError, Result};
//!
//! fn nonce_of(value: &str) -> Result<[u8; 16]> {
//!     let nonce = codec::decode_nonce(value)?;
//!     Ok(nonce)
//! }
//!
//! assert!(matches!(
//!     nonce_of("EA"),
//!     Err(PairingError::MalformedNotification(_))
//! ));
//! ```
//!
//! ## Error Categories
//!
//! ### Framing Errors
//! - `InvalidLength`: a frame payload that is not exactly one block
//! - `MalformedNotification`: a notification value that does not carry a
//!   decodable 16-byte nonce, or bad transport encoding
//!
//! ### Crypto Errors
//! - `CipherError`: wrong key or block size handed to the block cipher
//!
//! ### Session Errors
//! - `AlreadyStarted` / `NotStarted`: lifecycle misuse
//! - `WriteFailed` / `Link`: failures reported by the DeviceLink
//! - `Configuration`: bad settings (for example a key that is not 32 hex chars)

use thiserror::Error;

/// Result type for pairing operations
pub type Result<T> = std::result::Result<T, PairingError>;

/// Errors that can occur while pairing with a safety module
///
/// # Examples
///
/// ```rust
/// use safety_link_protocol::PairingError;
///
/// let error = PairingError::InvalidLength { expected: 16, actual: 3 };
/// assert_eq!(error.to_string(), "Invalid length: expected 16 bytes, got 3");
///
/// let error = PairingError::AlreadyStarted;
/// assert_eq!(error.to_string(), "Session already started");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// Frame payload with the wrong size
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required number of bytes
        expected: usize,
        /// Number of bytes supplied
        actual: usize,
    },

    /// Notification value that could not be decoded
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    /// Block cipher rejected its input
    #[error("Cipher error: {0}")]
    CipherError(String),

    /// Writing a frame to the characteristic failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// `start()` was called on a session that is already running
    #[error("Session already started")]
    AlreadyStarted,

    /// The session has not been started yet
    #[error("Session not started")]
    NotStarted,

    /// Transport-level failure (subscription, disconnect, adapter)
    #[error("Link error: {0}")]
    Link(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl PairingError {
    /// Check if this error is transient and the operation may succeed on retry
    ///
    /// ```rust
    /// use safety_link_protocol::PairingError;
    ///
    /// assert!(PairingError::WriteFailed("busy".into()).is_recoverable());
    /// assert!(!PairingError::AlreadyStarted.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PairingError::WriteFailed(_) | PairingError::Link(_))
    }

    /// Get a short message suitable for an alert dialog
    pub fn user_message(&self) -> String {
        match self {
            PairingError::InvalidLength { .. } | PairingError::CipherError(_) => {
                "Failed to authenticate device".to_string()
            }
            PairingError::MalformedNotification(_) => {
                "Device sent an unexpected response".to_string()
            }
            PairingError::WriteFailed(msg) => format!("Sending data to device failed: {}", msg),
            PairingError::AlreadyStarted => "Pairing is already in progress".to_string(),
            PairingError::NotStarted => "Pairing has not been started".to_string(),
            PairingError::Link(msg) => {
                format!("Connection to device lost: {}. Move closer and try again.", msg)
            }
            PairingError::Configuration(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PairingError::MalformedNotification("too short".to_string());
        assert_eq!(error.to_string(), "Malformed notification: too short");

        let error = PairingError::CipherError("key must be 16 bytes".to_string());
        assert_eq!(error.to_string(), "Cipher error: key must be 16 bytes");

        let error = PairingError::Link("disconnected".to_string());
        assert_eq!(error.to_string(), "Link error: disconnected");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(PairingError::Link("gone".into()).is_recoverable());
        assert!(!PairingError::NotStarted.is_recoverable());
        assert!(!PairingError::InvalidLength { expected: 16, actual: 0 }.is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        let message = PairingError::Link("adapter off".into()).user_message();
        assert!(message.contains("adapter off"));

        let message = PairingError::CipherError("bad".into()).user_message();
        assert_eq!(message, "Failed to authenticate device");
    }
}
