//! Mock BLE adapter for testing without hardware.
//!
//! Generates realistic EEG/PPG/ACC/battery notification packets, encoded in
//! the same wire format `domain::frame` decodes, so the link state machine
//! exercises its real parsing path end to end without physical hardware.

use crate::domain::device::DiscoveredDevice;
use crate::ports::ble_adapter::{BleAdapter, Characteristic, RawNotification};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Duration};

/// Configuration for the mock adapter's simulated data.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// EEG alpha-wave amplitude, in device raw units.
    pub eeg_amplitude: f32,
    /// Simulated PPG heart rate in BPM.
    pub ppg_bpm: f64,
    /// Simulated resting accelerometer magnitude, in g.
    pub acc_baseline_g: f32,
    /// Battery level (0-100) to simulate.
    pub battery_level: u8,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            eeg_amplitude: 50.0,
            ppg_bpm: 70.0,
            acc_baseline_g: 1.0,
            battery_level: 85,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Mock BLE adapter that simulates a LinkBand-style headband.
///
/// Useful for development without hardware, automated testing, and
/// demonstrating the server's behavior deterministically.
pub struct MockAdapter {
    config: MockConfig,
    discovered_devices: Arc<Mutex<Vec<DiscoveredDevice>>>,
    is_connected: Arc<Mutex<bool>>,
    connected_device_id: Arc<Mutex<Option<String>>>,
}

impl MockAdapter {
    /// Create a new mock adapter with default configuration.
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create a new mock adapter with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            discovered_devices: Arc::new(Mutex::new(Vec::new())),
            is_connected: Arc::new(Mutex::new(false)),
            connected_device_id: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawn background generators for all three sensor streams plus battery.
    fn start_streams(&self, tx: mpsc::Sender<RawNotification>) {
        let config = self.config.clone();
        let is_connected = self.is_connected.clone();
        let device_tick = Arc::new(AtomicU32::new(0));

        tokio::spawn(Self::stream_loop(
            tx.clone(),
            is_connected.clone(),
            Duration::from_secs_f64(4.0 / 250.0),
            4,
            device_tick.clone(),
            {
                let config = config.clone();
                move |t_device, n| Self::generate_eeg_packet(&config, t_device, n)
            },
            Characteristic::Eeg,
        ));

        tokio::spawn(Self::stream_loop(
            tx.clone(),
            is_connected.clone(),
            Duration::from_secs_f64(4.0 / 50.0),
            4,
            device_tick.clone(),
            {
                let config = config.clone();
                move |t_device, n| Self::generate_ppg_packet(&config, t_device, n)
            },
            Characteristic::Ppg,
        ));

        tokio::spawn(Self::stream_loop(
            tx.clone(),
            is_connected.clone(),
            Duration::from_secs_f64(5.0 / 25.0),
            5,
            device_tick,
            {
                let config = config.clone();
                move |t_device, n| Self::generate_acc_packet(&config, t_device, n)
            },
            Characteristic::Acc,
        ));

        tokio::spawn(Self::battery_loop(tx, is_connected, config.battery_level));
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_loop(
        tx: mpsc::Sender<RawNotification>,
        is_connected: Arc<Mutex<bool>>,
        packet_interval: Duration,
        samples_per_packet: u32,
        device_tick: Arc<AtomicU32>,
        generator: impl Fn(u32, u32) -> Vec<u8> + Send + 'static,
        characteristic: Characteristic,
    ) {
        let mut interval = time::interval(packet_interval);
        loop {
            interval.tick().await;
            if !*is_connected.lock().await {
                break;
            }

            let t_device = device_tick.fetch_add(samples_per_packet, Ordering::Relaxed);
            let payload = generator(t_device, samples_per_packet);

            if tx
                .send(RawNotification {
                    characteristic,
                    payload,
                })
                .await
                .is_err()
            {
                break;
            }
        }
    }

    async fn battery_loop(
        tx: mpsc::Sender<RawNotification>,
        is_connected: Arc<Mutex<bool>>,
        level: u8,
    ) {
        let mut interval = time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            if !*is_connected.lock().await {
                break;
            }
            if tx
                .send(RawNotification {
                    characteristic: Characteristic::Battery,
                    payload: vec![level],
                })
                .await
                .is_err()
            {
                break;
            }
        }
    }

    /// Encode `n` synthetic EEG samples as a wire packet `domain::frame::parse_eeg_packet` understands.
    fn generate_eeg_packet(config: &MockConfig, t_device_start: u32, n: u32) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let mut packet = Vec::with_capacity(5 + (n as usize) * 4);
        packet.extend_from_slice(&t_device_start.to_le_bytes());
        packet.push(0); // no lead-off

        for i in 0..n {
            let t = (t_device_start + i) as f64 / 250.0;
            let alpha = (2.0 * PI * 10.0 * t).sin() * config.eeg_amplitude as f64;
            let noise: f64 = rng.gen_range(-5.0..5.0);
            let ch1 = (alpha + noise) as i16;
            let ch2 = (alpha * 0.9 + noise) as i16;
            packet.extend_from_slice(&ch1.to_le_bytes());
            packet.extend_from_slice(&ch2.to_le_bytes());
        }
        packet
    }

    fn generate_ppg_packet(config: &MockConfig, t_device_start: u32, n: u32) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let mut packet = Vec::with_capacity(4 + (n as usize) * 4);
        packet.extend_from_slice(&t_device_start.to_le_bytes());

        let freq_hz = config.ppg_bpm / 60.0;
        for i in 0..n {
            let t = (t_device_start + i) as f64 / 50.0;
            let wave = (2.0 * PI * freq_hz * t).sin();
            let red = (2000.0 + wave * 300.0 + rng.gen_range(-10.0..10.0)).max(0.0) as u16;
            let ir = (1800.0 + wave * 280.0 + rng.gen_range(-10.0..10.0)).max(0.0) as u16;
            packet.extend_from_slice(&red.to_le_bytes());
            packet.extend_from_slice(&ir.to_le_bytes());
        }
        packet
    }

    fn generate_acc_packet(config: &MockConfig, t_device_start: u32, n: u32) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let mut packet = Vec::with_capacity(4 + (n as usize) * 6);
        packet.extend_from_slice(&t_device_start.to_le_bytes());

        for _ in 0..n {
            let mut jitter = || rng.gen_range(-20i16..20i16);
            let x = jitter();
            let y = jitter();
            let z = (config.acc_baseline_g as f64 * 1000.0) as i16 + jitter();
            packet.extend_from_slice(&x.to_le_bytes());
            packet.extend_from_slice(&y.to_le_bytes());
            packet.extend_from_slice(&z.to_le_bytes());
        }
        packet
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    async fn start_scan(&self) -> Result<()> {
        tracing::debug!("Mock adapter: Starting scan");

        let devices = vec![
            DiscoveredDevice {
                id: "mock-device-001".to_string(),
                name: Some("Mock LinkBand".to_string()),
                rssi: -65,
                is_registered: false,
            },
            DiscoveredDevice {
                id: "mock-device-002".to_string(),
                name: Some("Simulated Headband".to_string()),
                rssi: -72,
                is_registered: false,
            },
        ];

        *self.discovered_devices.lock().await = devices;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        tracing::debug!("Mock adapter: Stopping scan");
        Ok(())
    }

    async fn get_discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.discovered_devices.lock().await.clone()
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        tracing::debug!("Mock adapter: Connecting to {}", device_id);

        let devices = self.discovered_devices.lock().await;
        if !devices.iter().any(|d| d.id == device_id) {
            return Err(anyhow!("Device not found: {}", device_id));
        }
        drop(devices);

        time::sleep(Duration::from_millis(200)).await;

        *self.is_connected.lock().await = true;
        *self.connected_device_id.lock().await = Some(device_id.to_string());

        tracing::info!("Mock adapter: Connected to {}", device_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let device_id = self.connected_device_id.lock().await.take();
        if device_id.is_none() {
            return Err(anyhow!("No device connected"));
        }
        *self.is_connected.lock().await = false;
        tracing::info!("Mock adapter: Disconnected from {:?}", device_id);
        Ok(())
    }

    async fn subscribe_notifications(&self) -> Result<mpsc::Receiver<RawNotification>> {
        if !*self.is_connected.lock().await {
            return Err(anyhow!("No device connected"));
        }

        tracing::debug!("Mock adapter: Subscribing to sensor notifications");
        let (tx, rx) = mpsc::channel(256);
        self.start_streams(tx);
        Ok(rx)
    }

    async fn read_battery(&self) -> Result<Option<u8>> {
        if !*self.is_connected.lock().await {
            return Err(anyhow!("No device connected"));
        }
        time::sleep(Duration::from_millis(50)).await;
        Ok(Some(self.config.battery_level))
    }
}
