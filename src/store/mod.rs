//! Profile Persistence
//!
//! Two tables per backend: a current-state table upserted on every
//! harvest, and an append-only snapshot table gated to one row per
//! identity per calendar day. Backends are selected at runtime from
//! configuration.

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::profile::ProfileRecord;

/// A profile row as persisted
#[derive(Debug, Clone, Serialize)]
pub struct StoredProfile {
    pub username: String,
    pub record: ProfileRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Create tables and indexes if they don't exist
    async fn create_table(&self) -> Result<()>;

    /// Insert or update the current-state row for an identity
    ///
    /// The original `created_at` survives updates; `updated_at` moves.
    async fn upsert_profile(&self, username: &str, record: &ProfileRecord) -> Result<()>;

    /// Append a snapshot unless one already exists for today
    ///
    /// Returns whether a row was written. A same-day duplicate is a
    /// no-op reporting `false`, never an error.
    async fn insert_snapshot(&self, username: &str, record: &ProfileRecord) -> Result<bool>;

    /// Current-state row for one identity
    async fn get(&self, username: &str) -> Result<Option<StoredProfile>>;

    /// All current-state rows, newest first
    async fn get_all(&self) -> Result<Vec<StoredProfile>>;

    /// Remove an identity's current-state row, `false` if absent
    async fn delete(&self, username: &str) -> Result<bool>;

    /// Probe the connection
    async fn test_connection(&self) -> bool;

    /// Release the connection pool
    async fn close(&self);
}

/// Build the store named by the configuration
pub async fn create_store(config: &StoreConfig) -> Result<Box<dyn ProfileStore>> {
    match config {
        StoreConfig::Sqlite { path } => {
            tracing::info!("Using sqlite store at {}", path.display());
            Ok(Box::new(SqliteStore::connect(path).await?))
        }
        StoreConfig::Postgres { url } => {
            tracing::info!("Using postgres store");
            Ok(Box::new(PostgresStore::connect(url).await?))
        }
    }
}
