//! Challenge cipher
//!
//! The safety module proves the phone knows the shared key by having it
//! encrypt a 16-byte nonce with AES-128, one block, no chaining and no IV.
//! That is ECB on a single block: deterministic, and only kept because the
//! device firmware verifies exactly this construction.

use crate::{PairingError, Result};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use std::fmt;
use std::str::FromStr;

/// AES block size in bytes
pub const BLOCK_LEN: usize = 16;

/// Key shared with every safety module
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PreSharedKey([u8; BLOCK_LEN]);

impl PreSharedKey {
    /// Key compiled into the deployed firmware
    pub const DEFAULT: PreSharedKey = PreSharedKey([
        245, 210, 41, 135, 101, 10, 29, 130, 5, 171, 130, 190, 185, 56, 89, 207,
    ]);

    pub const fn new(bytes: [u8; BLOCK_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key written as 32 hex characters
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| PairingError::Configuration(format!("key is not valid hex: {}", e)))?;
        let bytes: [u8; BLOCK_LEN] = bytes.as_slice().try_into().map_err(|_| {
            PairingError::Configuration(format!(
                "key must be {} bytes, got {}",
                BLOCK_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_LEN] {
        &self.0
    }

    /// Encrypt one block under this key
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<[u8; BLOCK_LEN]> {
        encrypt_block(plaintext, &self.0)
    }
}

impl Default for PreSharedKey {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for PreSharedKey {
    type Err = PairingError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for PreSharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreSharedKey(<redacted>)")
    }
}

/// AES-128 encrypt a single 16-byte block
pub fn encrypt_block(plaintext: &[u8], key: &[u8]) -> Result<[u8; BLOCK_LEN]> {
    if plaintext.len() != BLOCK_LEN {
        return Err(PairingError::CipherError(format!(
            "plaintext must be {} bytes, got {}",
            BLOCK_LEN,
            plaintext.len()
        )));
    }
    if key.len() != BLOCK_LEN {
        return Err(PairingError::CipherError(format!(
            "key must be {} bytes, got {}",
            BLOCK_LEN,
            key.len()
        )));
    }

    let cipher = Aes128::new_from_slice(key)
        .map_err(|e| PairingError::CipherError(format!("invalid key: {}", e)))?;

    let mut block = [0u8; BLOCK_LEN];
    block.copy_from_slice(plaintext);
    cipher.encrypt_block((&mut block).into());

    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_block_golden_value() {
        let ciphertext = encrypt_block(&[0u8; 16], PreSharedKey::DEFAULT.as_bytes()).unwrap();
        assert_eq!(
            ciphertext,
            [97, 234, 203, 186, 96, 247, 195, 247, 200, 15, 64, 109, 255, 92, 5, 76]
        );
    }

    #[test]
    fn test_counting_block_golden_value() {
        let plaintext: [u8; 16] = core::array::from_fn(|i| i as u8);
        let ciphertext = PreSharedKey::DEFAULT.encrypt(&plaintext).unwrap();
        assert_eq!(
            ciphertext,
            [176, 28, 38, 0, 114, 179, 193, 9, 150, 141, 254, 147, 64, 173, 252, 16]
        );
    }

    #[test]
    fn test_encryption_is_deterministic() {
        let key = PreSharedKey::new([7u8; 16]);
        let plaintext = [0x42u8; 16];
        assert_eq!(
            key.encrypt(&plaintext).unwrap(),
            key.encrypt(&plaintext).unwrap()
        );
        assert_ne!(key.encrypt(&plaintext).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_sizes_rejected() {
        assert!(matches!(
            encrypt_block(&[0u8; 15], &[0u8; 16]),
            Err(PairingError::CipherError(_))
        ));
        assert!(matches!(
            encrypt_block(&[0u8; 16], &[0u8; 32]),
            Err(PairingError::CipherError(_))
        ));
    }

    #[test]
    fn test_key_from_hex() {
        let key: PreSharedKey = "f5d22987650a1d8205ab82beb93859cf".parse().unwrap();
        assert_eq!(key, PreSharedKey::DEFAULT);

        assert!(PreSharedKey::from_hex("f5d2").is_err());
        assert!(PreSharedKey::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let printed = format!("{:?}", PreSharedKey::DEFAULT);
        assert_eq!(printed, "PreSharedKey(<redacted>)");
    }
}
