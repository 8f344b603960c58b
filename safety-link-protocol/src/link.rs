//! DeviceLink Abstraction
//!
//! The handshake does not talk to Bluetooth directly. It drives a
//! [`DeviceLink`]: one connected peer that accepts characteristic writes and
//! delivers value-changed notifications. The CLI provides a BlueZ-backed
//! implementation; tests provide in-memory ones.

use crate::codec;
use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Safety module GATT service
pub const SERVICE_UUID: Uuid = uuid::uuid!("0000fee1-0000-1000-8000-00805f9b34fb");

/// Auth characteristic (write without response + notify)
pub const AUTH_CHARACTERISTIC_UUID: Uuid = uuid::uuid!("00000009-0000-3512-2118-0009af100700");

/// A value-changed event from the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Transport-encoded characteristic value
    Value(String),
    /// Transport-level error reported instead of a value
    Error(String),
}

impl Notification {
    /// Wrap a raw characteristic value in its transport encoding
    pub fn from_raw(bytes: &[u8]) -> Self {
        Notification::Value(codec::to_transport_encoding(bytes))
    }

    pub fn value(value: impl Into<String>) -> Self {
        Notification::Value(value.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notification::Error(message.into())
    }
}

/// Stream of notifications for one subscription
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

/// A connected peer the handshake can talk to
#[async_trait]
pub trait DeviceLink: Send + Sync + Debug {
    /// Write a transport-encoded value to a characteristic
    ///
    /// # Errors
    ///
    /// Returns `PairingError::WriteFailed` if the peer did not take the value.
    async fn write(&self, service: Uuid, characteristic: Uuid, value: &str) -> Result<()>;

    /// Start receiving value-changed notifications for a characteristic
    ///
    /// The receiver yields `None` once the peer disconnects or the
    /// subscription is removed.
    async fn subscribe(&self, service: Uuid, characteristic: Uuid)
        -> Result<NotificationReceiver>;

    /// Stop notification delivery
    async fn unsubscribe(&self) -> Result<()>;

    /// Human-readable peer identifier for logs
    fn peer(&self) -> String {
        "unknown".to_string()
    }
}
