//! Postgres store for shared deployments.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::error::Result;
use crate::profile::ProfileRecord;
use crate::store::{ProfileStore, StoredProfile};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self { pool })
    }

    fn row_to_profile(row: &PgRow) -> Result<StoredProfile> {
        let data: serde_json::Value = row.get("profile_data");
        Ok(StoredProfile {
            username: row.get("username"),
            record: serde_json::from_value(data)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ProfileStore for PostgresStore {
    async fn create_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id SERIAL PRIMARY KEY,
                username VARCHAR(255) UNIQUE NOT NULL,
                profile_data JSONB NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profile_snapshots (
                id SERIAL PRIMARY KEY,
                username VARCHAR(255) NOT NULL,
                profile_data JSONB NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
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
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (username) DO UPDATE SET
                profile_data = excluded.profile_data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(username)
        .bind(serde_json::to_value(record)?)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_snapshot(&self, username: &str, record: &ProfileRecord) -> Result<bool> {
        let today = Utc::now().date_naive();

        let existing = sqlx::query(
            "SELECT id FROM profile_snapshots WHERE username = $1 AND created_at::date = $2",
        )
        .bind(username)
        .bind(today)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            tracing::debug!("Snapshot for {} already exists today", username);
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO profile_snapshots (username, profile_data, created_at) VALUES ($1, $2, $3)",
        )
        .bind(username)
        .bind(serde_json::to_value(record)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    async fn get(&self, username: &str) -> Result<Option<StoredProfile>> {
        let row = sqlx::query(
            r#"
            SELECT username, profile_data, created_at, updated_at
            FROM profiles
            WHERE username = $1
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
        let result = sqlx::query("DELETE FROM profiles WHERE username = $1")
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

    // Run with a scratch database:
    //   DATABASE_URL=postgres://... cargo test postgres -- --ignored

    #[tokio::test]
    #[ignore = "requires a postgres server"]
    async fn test_postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let store = PostgresStore::connect(&url).await.unwrap();
        store.create_table().await.unwrap();

        let record = ProfileRecord::from_api("pg_test_user", &json!({"postsCount": 3}));
        store.upsert_profile("pg_test_user", &record).await.unwrap();

        let stored = store.get("pg_test_user").await.unwrap().unwrap();
        assert_eq!(stored.record.posts_count, 3);

        assert!(store.delete("pg_test_user").await.unwrap());
        store.close().await;
    }
}
