//! Device responses
//!
//! The safety module answers every command with a notification on the auth
//! characteristic. Four values are fixed status codes; anything else is the
//! challenge carrying the nonce to encrypt.

use crate::codec::{self, PAYLOAD_LEN};
use crate::Result;

/// "User didn't confirm pairing on device" (`10 01 02`)
pub const CONFIRMATION_DENIED: &str = "EAEC";

/// Generic device-side error (`10 03 04`)
pub const DEVICE_ERROR: &str = "EAME";

/// Authentication succeeded (`10 03 01`)
pub const AUTHENTICATED: &str = "EAMB";

/// Device accepted our key and wants us to ask for its challenge (`10 01 01`)
pub const KEY_REQUESTED: &str = "EAEB";

/// Decoded notification value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    ConfirmationDenied,
    DeviceError,
    Authenticated,
    KeyRequested,
    /// Anything else: the device challenge with its nonce
    Challenge([u8; PAYLOAD_LEN]),
}

impl StatusCode {
    /// Classify a transport-encoded notification value
    ///
    /// Only the challenge branch can fail, when the nonce is not decodable.
    pub fn decode(value: &str) -> Result<Self> {
        Ok(match value {
            CONFIRMATION_DENIED => StatusCode::ConfirmationDenied,
            DEVICE_ERROR => StatusCode::DeviceError,
            AUTHENTICATED => StatusCode::Authenticated,
            KEY_REQUESTED => StatusCode::KeyRequested,
            other => StatusCode::Challenge(codec::decode_nonce(other)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PairingError;

    #[test]
    fn test_reserved_codes() {
        assert_eq!(
            StatusCode::decode("EAEC").unwrap(),
            StatusCode::ConfirmationDenied
        );
        assert_eq!(StatusCode::decode("EAME").unwrap(), StatusCode::DeviceError);
        assert_eq!(
            StatusCode::decode("EAMB").unwrap(),
            StatusCode::Authenticated
        );
        assert_eq!(
            StatusCode::decode("EAEB").unwrap(),
            StatusCode::KeyRequested
        );
    }

    #[test]
    fn test_challenge() {
        let status = StatusCode::decode("EAIBAAECAwQFBgcICQoLDA0ODw==").unwrap();
        let expected: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(status, StatusCode::Challenge(expected));
    }

    #[test]
    fn test_unknown_short_value_is_malformed_challenge() {
        assert!(matches!(
            StatusCode::decode("EAXX"),
            Err(PairingError::MalformedNotification(_))
        ));
        assert!(StatusCode::decode("").is_err());
    }
}
