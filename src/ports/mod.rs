//! Port traits for the biosignal acquisition server.
//!
//! This module contains trait definitions that abstract external dependencies
//! and I/O operations, following the hexagonal architecture pattern. These
//! traits enable dependency injection and testing with mock implementations.

pub mod ble_adapter;
pub mod device_catalogue;
pub mod metrics_source;
pub mod session_repository;

pub use ble_adapter::{BleAdapter, Characteristic, RawNotification};
pub use device_catalogue::DeviceCatalogue;
pub use metrics_source::{MetricsSource, OsMetrics};
pub use session_repository::SessionRepository;
