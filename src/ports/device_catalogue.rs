//! Device Catalogue Port
//!
//! Abstracts the small persisted table of registered devices (§6's
//! `{id, name, address, registered_at}`), backed by SQLite in production.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::device::Device;

/// Abstraction over the registered-device catalogue.
#[async_trait]
pub trait DeviceCatalogue: Send + Sync {
    /// Register a device, or update its name if it is already registered.
    async fn register(&self, id: &str, name: &str) -> Result<()>;

    /// List every registered device.
    async fn list(&self) -> Result<Vec<Device>>;

    /// Look up a single registered device by id.
    async fn get(&self, id: &str) -> Result<Option<Device>>;
}
