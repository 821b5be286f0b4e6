//! Session Repository Port
//!
//! This module defines the `SessionRepository` trait, which abstracts session
//! storage operations for testability and swappability. This allows the domain
//! logic to work with different storage backends (file system, database, etc.).

use crate::domain::session::Session;
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction for session storage operations.
///
/// This trait defines the interface for persisting and retrieving recorded
/// sessions. It can be implemented with different storage backends: file
/// system plus a SQLite index, in-memory for tests, etc.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a session's metadata, overwriting any prior record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved due to I/O issues,
    /// permission problems, or serialization failures.
    async fn save(&self, session: &Session) -> Result<()>;

    /// List every known session, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns an error if the session list cannot be read due to I/O issues
    /// or permission problems.
    async fn list(&self) -> Result<Vec<Session>>;

    /// Get a session by its name (the on-disk directory name).
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read due to I/O issues,
    /// deserialization failures, or permission problems. Returns `Ok(None)` if
    /// the session doesn't exist.
    async fn get(&self, name: &str) -> Result<Option<Session>>;

    /// Delete a session by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be deleted due to I/O issues
    /// or permission problems. Succeeds silently if the session doesn't exist.
    async fn delete(&self, name: &str) -> Result<()>;
}
