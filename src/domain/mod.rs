//! Domain layer containing pure business logic and data types.
//!
//! This module contains all domain models and logic with no I/O dependencies,
//! following hexagonal architecture principles.

pub mod acc;
pub mod battery;
pub mod device;
pub mod eeg;
pub mod export;
pub mod frame;
pub mod ppg;
pub mod reconnection;
pub mod sample;
pub mod session;

// Re-export key types for convenient access
pub use battery::BatteryLevel;
pub use device::{Device, DiscoveredDevice};
pub use reconnection::{ConnectionStatus, ReconnectionPolicy};
pub use sample::{
    ActivityState, AccProcessed, AccSample, BandPowers, BatterySample, EegProcessed, EegSample,
    PpgProcessed, PpgSample, ProcessedFrame, RawSample, SensorKind,
};
pub use session::{DataFormat, FileIndexEntry, Session, SessionStatus};
