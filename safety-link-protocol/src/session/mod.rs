//! Safety Module Pairing Handshake
//!
//! This module implements the authentication handshake run over the safety
//! module's auth characteristic.
//!
//! ## Handshake Protocol
//!
//! 1. **Activation**: phone writes `01 00`
//! 2. **Key Announcement**: phone writes `01 08` followed by the shared key
//! 3. **Confirmation**: user confirms on the device, device answers `EAEB`
//!    (or `EAEC` when the user refuses)
//! 4. **Challenge Request**: phone writes `02 00`
//! 5. **Challenge**: device sends a 16-byte nonce
//! 6. **Response**: phone writes `03 00` + AES-128(key, nonce)
//! 7. **Verdict**: device answers `EAMB` (authenticated) or `EAME` (error)
//!
//! ## Usage
//!
//! ```no_run
//! use safety_link_protocol::{DeviceLink, HandshakeSession, PreSharedKey, SessionConfig};
//! use std::sync::Arc;
//!
//! async fn pair(link: Arc<dyn DeviceLink>) {
//!     let session = HandshakeSession::new(link, PreSharedKey::DEFAULT, SessionConfig::default());
//!     let outcome = session.run().await;
//!     println!("{}", outcome);
//! }
//! ```

pub mod events;
pub mod handler;
pub mod service;
pub mod state;

// Re-export main types
pub use events::SessionEvent;
pub use handler::{PairingHandler, Transition};
pub use service::{HandshakeSession, OutcomeWatcher};
pub use state::{FailureReason, PairingOutcome, SessionState};
