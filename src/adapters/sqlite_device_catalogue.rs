//! SQLite-backed device catalogue.
//!
//! Registration persists across restarts (§3: "Registration persists across
//! restarts in a small catalogue"). The table is tiny — a handful of rows —
//! so every operation takes the connection lock directly rather than using a
//! background writer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use tokio::sync::Mutex;

use crate::domain::device::Device;
use crate::ports::device_catalogue::DeviceCatalogue;

/// `DeviceCatalogue` backed by a SQLite file.
pub struct SqliteDeviceCatalogue {
    conn: Mutex<Connection>,
}

impl SqliteDeviceCatalogue {
    /// Open (or create) the catalogue database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).context("failed to open device catalogue database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                id   TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );",
        )
        .context("failed to create devices table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory catalogue, useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS devices (
                id   TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl DeviceCatalogue for SqliteDeviceCatalogue {
    async fn register(&self, id: &str, name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO devices (id, name) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id, name],
        )
        .context("failed to upsert device")?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Device>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, name FROM devices ORDER BY id")?;
        let devices = stmt
            .query_map([], |row| {
                Ok(Device {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    rssi: None,
                    registered: true,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to read devices")?;
        Ok(devices)
    }

    async fn get(&self, id: &str) -> Result<Option<Device>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT id, name FROM devices WHERE id = ?1",
            params![id],
            |row| {
                Ok(Device {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    rssi: None,
                    registered: true,
                })
            },
        );

        match result {
            Ok(device) => Ok(Some(device)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("failed to read device"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let catalogue = SqliteDeviceCatalogue::open_in_memory().unwrap();
        catalogue.register("dev-1", "LinkBand A").await.unwrap();

        let device = catalogue.get("dev-1").await.unwrap().unwrap();
        assert_eq!(device.name, "LinkBand A");
        assert!(device.registered);
    }

    #[tokio::test]
    async fn re_registering_updates_name() {
        let catalogue = SqliteDeviceCatalogue::open_in_memory().unwrap();
        catalogue.register("dev-1", "Old Name").await.unwrap();
        catalogue.register("dev-1", "New Name").await.unwrap();

        let devices = catalogue.list().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "New Name");
    }

    #[tokio::test]
    async fn get_unknown_device_returns_none() {
        let catalogue = SqliteDeviceCatalogue::open_in_memory().unwrap();
        assert!(catalogue.get("missing").await.unwrap().is_none());
    }
}
