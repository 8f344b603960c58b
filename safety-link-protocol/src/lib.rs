//! Safety Link Protocol Implementation
//!
//! This library implements the pairing handshake of the safety module: a
//! short challenge/response exchange over one BLE characteristic, secured by
//! a pre-shared AES-128 key. Scanning, connecting and the Bluetooth stack
//! itself stay outside; the handshake drives any [`DeviceLink`].

pub mod cipher;
pub mod codec;
pub mod config;
pub mod link;
pub mod session;
pub mod status;

mod error;
pub use cipher::{encrypt_block, PreSharedKey};
pub use codec::{
    decode_nonce, encode_frame, from_transport_encoding, to_transport_encoding, Command, Frame,
    FrameLayout,
};
pub use config::{SessionConfig, WriteFailurePolicy};
pub use error::{PairingError, Result};
pub use link::{DeviceLink, Notification, NotificationReceiver};
pub use session::{
    FailureReason, HandshakeSession, OutcomeWatcher, PairingOutcome, SessionEvent, SessionState,
};
pub use status::StatusCode;
