//! Btleplug-based BLE adapter implementation.
//!
//! This module provides a real BLE adapter implementation using the btleplug library.
//! It supports scanning for LinkBand-style biosignal headbands, connecting, and
//! subscribing to EEG/PPG/ACC/battery notifications on Linux (BlueZ), macOS, and
//! Windows platforms.

use crate::domain::device::DiscoveredDevice;
use crate::ports::ble_adapter::{BleAdapter, Characteristic, RawNotification};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic as BtleCharacteristic, Manager as _, Peripheral as _,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Primary biosignal service advertised by the headband.
const SENSOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000fee0_0000_1000_8000_00805f9b34fb);
const EEG_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fee1_0000_1000_8000_00805f9b34fb);
const PPG_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fee2_0000_1000_8000_00805f9b34fb);
const ACC_CHAR_UUID: Uuid = Uuid::from_u128(0x0000fee3_0000_1000_8000_00805f9b34fb);

/// Standard Battery Service (0x180F) / Battery Level (0x2A19).
const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
const BATTERY_LEVEL_UUID: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// Real BLE adapter implementation using btleplug.
///
/// Uses the platform-specific BLE backend (BlueZ on Linux, CoreBluetooth on
/// macOS, WinRT on Windows) to talk to a real biosignal headband.
pub struct BtleplugAdapter {
    adapter: Arc<Adapter>,
    discovered_devices: Arc<Mutex<Vec<DiscoveredDevice>>>,
    connected_peripheral: Arc<Mutex<Option<Peripheral>>>,
}

impl BtleplugAdapter {
    /// Create a new btleplug adapter instance.
    ///
    /// # Errors
    ///
    /// Returns an error if no BLE adapter is available on the system.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .context("Failed to create BLE manager")?;

        let adapters = manager.adapters().await.context("Failed to get adapters")?;
        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No BLE adapter found"))?;

        Ok(Self {
            adapter: Arc::new(adapter),
            discovered_devices: Arc::new(Mutex::new(Vec::new())),
            connected_peripheral: Arc::new(Mutex::new(None)),
        })
    }

    async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await?;
        for peripheral in peripherals {
            if peripheral.id().to_string() == device_id {
                return Ok(peripheral);
            }
        }

        Err(anyhow!("Device not found: {}", device_id))
    }

    async fn get_characteristic(
        peripheral: &Peripheral,
        service_uuid: Uuid,
        char_uuid: Uuid,
    ) -> Result<BtleCharacteristic> {
        let services = peripheral
            .services()
            .into_iter()
            .filter(|s| s.uuid == service_uuid)
            .collect::<Vec<_>>();

        let service = services
            .first()
            .ok_or_else(|| anyhow!("Service {} not found", service_uuid))?;

        let characteristic = service
            .characteristics
            .iter()
            .find(|c| c.uuid == char_uuid)
            .ok_or_else(|| anyhow!("Characteristic {} not found", char_uuid))?;

        Ok(characteristic.clone())
    }
}

#[async_trait]
impl BleAdapter for BtleplugAdapter {
    async fn start_scan(&self) -> Result<()> {
        self.discovered_devices.lock().await.clear();

        let filter = ScanFilter {
            services: vec![SENSOR_SERVICE_UUID],
        };

        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| anyhow!("Failed to start BLE scan: {}", e))?;
        tracing::info!("BLE scan started");

        let mut events = self.adapter.events().await?;
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDiscovered(id) = event {
                    tracing::debug!("Discovered device: {:?}", id);
                }
            }
        });

        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter
            .stop_scan()
            .await
            .context("Failed to stop BLE scan")?;
        Ok(())
    }

    async fn get_discovered_devices(&self) -> Vec<DiscoveredDevice> {
        let peripherals = match self.adapter.peripherals().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to get peripherals: {}", e);
                return Vec::new();
            }
        };

        let mut devices = Vec::new();
        for peripheral in peripherals {
            let properties = match peripheral.properties().await {
                Ok(Some(props)) => props,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Failed to get properties: {}", e);
                    continue;
                }
            };

            if properties.services.contains(&SENSOR_SERVICE_UUID) {
                devices.push(DiscoveredDevice {
                    id: peripheral.id().to_string(),
                    name: properties.local_name,
                    rssi: properties.rssi.unwrap_or(0),
                    is_registered: false,
                });
            }
        }

        *self.discovered_devices.lock().await = devices.clone();
        devices
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        let peripheral = self.find_peripheral(device_id).await?;

        let mut last_error = None;
        for attempt in 1..=3 {
            match peripheral.connect().await {
                Ok(()) => {
                    peripheral
                        .discover_services()
                        .await
                        .context("Failed to discover services")?;

                    // §4.1: Connecting -> Connected requires every required
                    // characteristic to be discovered and battery read once.
                    for uuid in [EEG_CHAR_UUID, PPG_CHAR_UUID, ACC_CHAR_UUID] {
                        Self::get_characteristic(&peripheral, SENSOR_SERVICE_UUID, uuid)
                            .await
                            .context("required characteristic missing")?;
                    }
                    if let Ok(battery_char) = Self::get_characteristic(
                        &peripheral,
                        BATTERY_SERVICE_UUID,
                        BATTERY_LEVEL_UUID,
                    )
                    .await
                    {
                        let _ = peripheral.read(&battery_char).await;
                    }

                    *self.connected_peripheral.lock().await = Some(peripheral);
                    tracing::info!("Connected successfully on attempt {}", attempt);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Connection attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < 3 {
                        tokio::time::sleep(tokio::time::Duration::from_millis(500 * attempt))
                            .await;
                    }
                }
            }
        }

        Err(anyhow!(
            "Failed to connect after 3 attempts: {}",
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self.connected_peripheral.lock().await;
        if let Some(peripheral) = guard.take() {
            peripheral
                .disconnect()
                .await
                .context("Failed to disconnect from device")?;
            Ok(())
        } else {
            Err(anyhow!("No device connected"))
        }
    }

    async fn subscribe_notifications(&self) -> Result<mpsc::Receiver<RawNotification>> {
        let guard = self.connected_peripheral.lock().await;
        let peripheral = guard
            .as_ref()
            .ok_or_else(|| anyhow!("No device connected"))?;

        let mut tagged = Vec::new();
        for (uuid, characteristic) in [
            (EEG_CHAR_UUID, Characteristic::Eeg),
            (PPG_CHAR_UUID, Characteristic::Ppg),
            (ACC_CHAR_UUID, Characteristic::Acc),
        ] {
            let char_handle =
                Self::get_characteristic(peripheral, SENSOR_SERVICE_UUID, uuid).await?;
            peripheral.subscribe(&char_handle).await.with_context(|| {
                format!("Failed to subscribe to {:?} notifications", characteristic)
            })?;
            tagged.push((uuid, characteristic));
        }

        let (tx, rx) = mpsc::channel(256);
        let peripheral_clone = peripheral.clone();

        tokio::spawn(async move {
            let mut notification_stream = match peripheral_clone.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!("Failed to get notification stream: {}", e);
                    return;
                }
            };

            while let Some(notification) = notification_stream.next().await {
                let characteristic = tagged
                    .iter()
                    .find(|(uuid, _)| *uuid == notification.uuid)
                    .map(|(_, c)| *c);

                let Some(characteristic) = characteristic else {
                    continue;
                };

                let raw = RawNotification {
                    characteristic,
                    payload: notification.value,
                };

                if tx.send(raw).await.is_err() {
                    tracing::debug!("Notification receiver dropped");
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn read_battery(&self) -> Result<Option<u8>> {
        let guard = self.connected_peripheral.lock().await;
        let peripheral = guard
            .as_ref()
            .ok_or_else(|| anyhow!("No device connected"))?;

        let battery_char =
            match Self::get_characteristic(peripheral, BATTERY_SERVICE_UUID, BATTERY_LEVEL_UUID)
                .await
            {
                Ok(char) => char,
                Err(e) => {
                    tracing::debug!("Battery service not found: {}", e);
                    return Ok(None);
                }
            };

        let value = peripheral
            .read(&battery_char)
            .await
            .context("Failed to read battery level")?;

        Ok(value.first().copied())
    }
}
