//! Device catalogue domain types.
//!
//! A stable, persisted registration record plus the transient view surfaced
//! during a scan. Pure data, no I/O.

use serde::{Deserialize, Serialize};

/// A registered headband: `{ id, name, rssi?, registered }` per §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Stable platform identifier (MAC address or platform UUID).
    pub id: String,
    /// User- or factory-assigned display name.
    pub name: String,
    /// Most recently observed RSSI in dBm, if known.
    pub rssi: Option<i16>,
    /// Whether this device has been registered in the catalogue.
    pub registered: bool,
}

/// A device observed during an active scan, not necessarily registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Stable platform identifier.
    pub id: String,
    /// Advertised device name, if available.
    pub name: Option<String>,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Whether this id is already present in the catalogue.
    pub is_registered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_serializes_with_registered_flag() {
        let device = Device {
            id: "AA:BB:CC:DD:EE:FF".to_string(),
            name: "LXB-01".to_string(),
            rssi: Some(-52),
            registered: true,
        };
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"registered\":true"));
    }
}
