//! BlueZ DeviceLink
//!
//! Connects to a safety module through BlueZ (via the bluer crate) and
//! exposes its GATT characteristics as a [`DeviceLink`].

use crate::config::BluetoothConfig;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::StreamExt;
use safety_link_protocol::{
    from_transport_encoding, DeviceLink, Notification, NotificationReceiver, PairingError, Result,
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Poll interval while waiting for BlueZ to resolve GATT services
const SERVICES_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Open the configured adapter and look up a device by address
///
/// Runs discovery if BlueZ does not know the device yet.
pub async fn find_device(config: &BluetoothConfig, address: &str) -> anyhow::Result<Device> {
    let address = Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Bluetooth address '{}': {}", address, e))?;

    let session = Session::new()
        .await
        .context("Failed to connect to BlueZ")?;

    let adapter = match &config.adapter {
        Some(name) => session
            .adapter(name)
            .with_context(|| format!("Bluetooth adapter {} not found", name))?,
        None => session
            .default_adapter()
            .await
            .context("No Bluetooth adapter available")?,
    };

    adapter
        .set_powered(true)
        .await
        .context("Failed to power on Bluetooth adapter")?;

    let known = adapter
        .device_addresses()
        .await
        .context("Failed to list known devices")?;

    if !known.contains(&address) {
        timeout(config.connect_timeout(), discover(&adapter, address))
            .await
            .map_err(|_| anyhow!("Device {} not found", address))??;
    }

    adapter
        .device(address)
        .with_context(|| format!("Failed to open device {}", address))
}

async fn discover(adapter: &Adapter, address: Address) -> anyhow::Result<()> {
    info!("Scanning for {}...", address);

    let events = adapter
        .discover_devices()
        .await
        .context("Failed to start discovery")?;
    let mut events = Box::pin(events);

    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(found) = event {
            if found == address {
                debug!("Discovered {}", address);
                return Ok(());
            }
        }
    }

    Err(anyhow!("Discovery ended before {} was seen", address))
}

/// A connected safety module
pub struct BluerLink {
    device: Device,

    /// Task forwarding characteristic notifications into the subscription
    notify_task: Mutex<Option<JoinHandle<()>>>,
}

impl BluerLink {
    /// Connect and wait until GATT services are resolved
    pub async fn connect(config: &BluetoothConfig, address: &str) -> anyhow::Result<Self> {
        let device = find_device(config, address).await?;

        if !device.is_connected().await.unwrap_or(false) {
            info!("Connecting to {}...", device.address());
            timeout(config.connect_timeout(), device.connect())
                .await
                .map_err(|_| anyhow!("Connection to {} timed out", device.address()))?
                .with_context(|| format!("Failed to connect to {}", device.address()))?;
        }

        timeout(config.connect_timeout(), wait_for_services(&device))
            .await
            .map_err(|_| anyhow!("GATT services of {} not resolved", device.address()))??;

        info!("Connected to {}", device.address());

        Ok(Self {
            device,
            notify_task: Mutex::new(None),
        })
    }

    pub async fn disconnect(&self) -> anyhow::Result<()> {
        self.stop_notifications().await;
        self.device
            .disconnect()
            .await
            .with_context(|| format!("Failed to disconnect from {}", self.device.address()))
    }

    async fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        let services = self
            .device
            .services()
            .await
            .map_err(|e| PairingError::Link(format!("failed to list services: {}", e)))?;

        for candidate in services {
            if candidate.uuid().await.ok() != Some(service) {
                continue;
            }

            let characteristics = candidate.characteristics().await.map_err(|e| {
                PairingError::Link(format!("failed to list characteristics: {}", e))
            })?;

            for c in characteristics {
                if c.uuid().await.ok() == Some(characteristic) {
                    return Ok(c);
                }
            }
        }

        Err(PairingError::Link(format!(
            "characteristic {} of service {} not found",
            characteristic, service
        )))
    }

    async fn stop_notifications(&self) -> bool {
        match self.notify_task.lock().await.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

async fn wait_for_services(device: &Device) -> anyhow::Result<()> {
    while !device
        .is_services_resolved()
        .await
        .context("Failed to query device")?
    {
        sleep(SERVICES_POLL_INTERVAL).await;
    }
    Ok(())
}

#[async_trait]
impl DeviceLink for BluerLink {
    async fn write(&self, service: Uuid, characteristic: Uuid, value: &str) -> Result<()> {
        let bytes = from_transport_encoding(value)?;
        let target = self
            .characteristic(service, characteristic)
            .await
            .map_err(|e| PairingError::WriteFailed(e.to_string()))?;

        target
            .write(&bytes)
            .await
            .map_err(|e| PairingError::WriteFailed(e.to_string()))
    }

    async fn subscribe(&self, service: Uuid, characteristic: Uuid) -> Result<NotificationReceiver> {
        let source = self.characteristic(service, characteristic).await?;
        let stream = source
            .notify()
            .await
            .map_err(|e| PairingError::Link(format!("failed to enable notifications: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let peer = self.peer();

        let task = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(value) = stream.next().await {
                if tx.send(Notification::from_raw(&value)).is_err() {
                    break;
                }
            }
            debug!("Notifications from {} ended", peer);
        });

        if let Some(previous) = self.notify_task.lock().await.replace(task) {
            warn!("Replacing existing notification subscription");
            previous.abort();
        }

        Ok(rx)
    }

    async fn unsubscribe(&self) -> Result<()> {
        if self.stop_notifications().await {
            debug!("Unsubscribed from {}", self.peer());
        }
        Ok(())
    }

    fn peer(&self) -> String {
        self.device.address().to_string()
    }
}

impl fmt::Debug for BluerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BluerLink")
            .field("address", &self.device.address())
            .field("adapter", &self.device.adapter_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        assert!(Address::from_str("C4:7C:8D:6A:12:34").is_ok());
        assert!(Address::from_str("invalid").is_err());
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_bluez() {
        match find_device(&BluetoothConfig::default(), "not-an-address").await {
            Ok(_) => panic!("address should have been rejected"),
            Err(e) => assert!(e.to_string().contains("Invalid Bluetooth address")),
        }
    }
}
