//! Adapter implementations.
//!
//! This module contains concrete implementations of port traits,
//! including both real hardware adapters and mock adapters for testing.

pub mod btleplug_adapter;
pub mod file_session_repository;
pub mod mock_adapter;
pub mod sqlite_device_catalogue;
pub mod sysinfo_metrics;

pub use btleplug_adapter::BtleplugAdapter;
pub use file_session_repository::FileSessionRepository;
pub use mock_adapter::{MockAdapter, MockConfig};
pub use sqlite_device_catalogue::SqliteDeviceCatalogue;
pub use sysinfo_metrics::SysinfoMetrics;
