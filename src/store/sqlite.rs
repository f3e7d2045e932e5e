//! SQLite store, the development and single-host default.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;

use crate::error::Result;
use crate::profile::ProfileRecord;
use crate::store::{ProfileStore, StoredProfile};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self { pool })
    }

    fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<StoredProfile> {
        let data: String = row.get("profile_data");
        Ok(StoredProfile {
            username: row.get("username"),
            record: serde_json::from_str(&data)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn create_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                profile_data TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                profile_data TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_profiles_username ON profiles(username)",
            "CREATE INDEX IF NOT EXISTS idx_profiles_created_at ON profiles(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_username ON profile_snapshots(username)",
            "CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON profile_snapshots(created_at)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn upsert_profile(&self, username: &str, record: &ProfileRecord) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO profiles (username, profile_data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(username) DO UPDATE SET
                profile_data = excluded.profile_data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(username)
        .bind(serde_json::to_string(record)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_snapshot(&self, username: &str, record: &ProfileRecord) -> Result<bool> {
        let now = Utc::now();
        let today = now.format("%Y-%m-%d").to_string();

        let existing = sqlx::query(
            "SELECT id FROM profile_snapshots WHERE username = ?1 AND DATE(created_at) = ?2",
        )
        .bind(username)
        .bind(&today)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            tracing::debug!("Snapshot for {} already exists today", username);
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO profile_snapshots (username, profile_data, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(username)
        .bind(serde_json::to_string(record)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    async fn get(&self, username: &str) -> Result<Option<StoredProfile>> {
        let row = sqlx::query(
            r#"
            SELECT username, profile_data, created_at, updated_at
            FROM profiles
            WHERE username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::row_to_profile(&r)).transpose()
    }

    async fn get_all(&self) -> Result<Vec<StoredProfile>> {
        let rows = sqlx::query(
            r#"
            SELECT username, profile_data, created_at, updated_at
            FROM profiles
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_profile).collect()
    }

    async fn delete(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE username = ?1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn test_connection(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::connect(&dir.path().join("test.db"))
            .await
            .unwrap();
        store.create_table().await.unwrap();
        (dir, store)
    }

    fn record(username: &str, posts: i64) -> ProfileRecord {
        ProfileRecord::from_api(username, &json!({"name": username, "postsCount": posts}))
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let (_dir, store) = temp_store().await;

        store.upsert_profile("alice", &record("alice", 1)).await.unwrap();
        let first = store.get("alice").await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        store.upsert_profile("alice", &record("alice", 2)).await.unwrap();
        let second = store.get("alice").await.unwrap().unwrap();

        assert_eq!(second.record.posts_count, 2);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
    }

    #[tokio::test]
    async fn test_snapshot_same_day_is_noop() {
        let (_dir, store) = temp_store().await;

        assert!(store.insert_snapshot("alice", &record("alice", 1)).await.unwrap());
        assert!(!store.insert_snapshot("alice", &record("alice", 2)).await.unwrap());

        // A different identity is not gated
        assert!(store.insert_snapshot("bob", &record("bob", 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_and_delete() {
        let (_dir, store) = temp_store().await;

        assert!(store.get("nobody").await.unwrap().is_none());
        assert!(!store.delete("nobody").await.unwrap());

        store.upsert_profile("alice", &record("alice", 1)).await.unwrap();
        assert!(store.delete("alice").await.unwrap());
        assert!(store.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_newest_first() {
        let (_dir, store) = temp_store().await;

        store.upsert_profile("older", &record("older", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.upsert_profile("newer", &record("newer", 1)).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].username, "newer");
        assert_eq!(all[1].username, "older");
    }

    #[tokio::test]
    async fn test_record_round_trips_through_store() {
        let (_dir, store) = temp_store().await;

        let original = ProfileRecord::from_api(
            "carol",
            &json!({
                "name": "Carol",
                "isVerified": true,
                "subscribePrice": 9.99,
                "postsCount": 42
            }),
        );

        store.upsert_profile("carol", &original).await.unwrap();
        let stored = store.get("carol").await.unwrap().unwrap();

        assert_eq!(stored.record, original);
    }

    #[tokio::test]
    async fn test_connection_probe() {
        let (_dir, store) = temp_store().await;
        assert!(store.test_connection().await);

        store.close().await;
        assert!(!store.test_connection().await);
    }
}
