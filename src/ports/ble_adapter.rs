//! BLE Adapter Port
//!
//! This module defines the `BleAdapter` trait, which abstracts BLE operations
//! for testability and swappability. This allows the domain logic to work with
//! both real BLE hardware (via btleplug) and simulated data (via MockAdapter).

use crate::domain::device::DiscoveredDevice;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;

/// One raw BLE notification, tagged by which characteristic it arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// EEG channel-pair notifications.
    Eeg,
    /// PPG red/IR notifications.
    Ppg,
    /// Accelerometer notifications.
    Acc,
    /// Battery level notifications.
    Battery,
}

/// An opaque notification packet as received from the link, with the
/// characteristic it arrived on.
#[derive(Debug, Clone)]
pub struct RawNotification {
    /// Which GATT characteristic produced this packet.
    pub characteristic: Characteristic,
    /// The raw bytes, undecoded.
    pub payload: Vec<u8>,
}

/// Abstraction for BLE operations to enable testing and swappable implementations.
///
/// This trait defines the interface for all BLE-related operations including
/// device discovery, connection management, and data subscription. It is
/// implemented by both the real btleplug adapter and the mock adapter for testing.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// Start scanning for BLE devices.
    ///
    /// This initiates a BLE scan that will populate the list of discovered devices.
    /// Devices can be retrieved using `get_discovered_devices()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the BLE adapter fails to start scanning, typically due to
    /// platform-specific BLE issues or permission problems.
    async fn start_scan(&self) -> Result<()>;

    /// Stop scanning for BLE devices.
    ///
    /// This halts the BLE scan initiated by `start_scan()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the BLE adapter fails to stop scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Get the list of devices discovered since `start_scan()`.
    async fn get_discovered_devices(&self) -> Vec<DiscoveredDevice>;

    /// Connect to a BLE device by its device ID.
    ///
    /// Resolves once every required GATT characteristic has been discovered
    /// and the battery level has been read once (§4.1's `Connecting → Connected`
    /// transition).
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be found or the connection fails.
    async fn connect(&self, device_id: &str) -> Result<()>;

    /// Disconnect from the currently connected BLE device.
    ///
    /// # Errors
    ///
    /// Returns an error if disconnection fails or no device is currently connected.
    async fn disconnect(&self) -> Result<()>;

    /// Enable notifications on every configured sensor characteristic and
    /// return a single receiver multiplexing all of them, tagged by
    /// [`Characteristic`]. This is the `Connected → Streaming` transition.
    ///
    /// # Errors
    ///
    /// Returns an error if subscription fails, typically because no device is
    /// connected or a required characteristic is missing.
    async fn subscribe_notifications(&self) -> Result<Receiver<RawNotification>>;

    /// Read the battery level from the connected device.
    ///
    /// # Returns
    ///
    /// Battery level as a percentage (0-100), or `None` if the device doesn't
    /// support the Battery Service.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails due to connection issues, but returns
    /// `Ok(None)` if the Battery Service is not found.
    async fn read_battery(&self) -> Result<Option<u8>>;
}
