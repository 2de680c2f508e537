use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};

use super::records::StoreError;

/// Maximum number of keys removed per batched delete statement, matching
/// the batch-write ceiling of the backing store.
pub const DELETE_BATCH_SIZE: usize = 25;

/// Composite key of one record in the single-table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub partition_key: String,
    pub sort_key: String,
}

/// Generic single-table key-value store.
///
/// One SQLite table holds every record: composite `(partition_key,
/// sort_key)` primary key, JSON body, and a `sort_key` index standing in
/// for the secondary index that serves cross-partition scans by record
/// kind. Nothing in here knows about feeds; the record translation layer
/// owns the shapes.
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    /// Opens (creating if needed) the backing database and runs the
    /// idempotent migration. Use `":memory:"` in tests.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{path}?mode=rwc");

        // busy_timeout=5000: wait for transient lock contention instead of
        // surfacing SQLITE_BUSY to callers.
        let options = SqliteConnectOptions::from_str(&url)?.pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                partition_key TEXT NOT NULL,
                sort_key TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (partition_key, sort_key)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        // Stands in for the sort-key secondary index of the original
        // table design; serves query_by_sort_key across partitions.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_sort_key ON records(sort_key)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Point lookup by exact composite key.
    pub async fn get<T: DeserializeOwned>(
        &self,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<T>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM records WHERE partition_key = ? AND sort_key = ?")
                .bind(partition_key)
                .bind(sort_key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// All records under one partition whose sort key starts with `prefix`.
    pub async fn query_prefix<T: DeserializeOwned>(
        &self,
        partition_key: &str,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT body FROM records
             WHERE partition_key = ?1 AND substr(sort_key, 1, length(?2)) = ?2
             ORDER BY sort_key",
        )
        .bind(partition_key)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(body,)| serde_json::from_str(&body).map_err(StoreError::from))
            .collect()
    }

    /// Keys only, for bounded batch deletion.
    pub async fn query_keys_by_prefix(
        &self,
        partition_key: &str,
        prefix: &str,
    ) -> Result<Vec<RecordKey>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT partition_key, sort_key FROM records
             WHERE partition_key = ?1 AND substr(sort_key, 1, length(?2)) = ?2
             ORDER BY sort_key",
        )
        .bind(partition_key)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(partition_key, sort_key)| RecordKey {
                partition_key,
                sort_key,
            })
            .collect())
    }

    /// Cross-partition scan of every record with the given sort key.
    pub async fn query_by_sort_key<T: DeserializeOwned>(
        &self,
        sort_key: &str,
    ) -> Result<Vec<T>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT body FROM records WHERE sort_key = ? ORDER BY partition_key",
        )
        .bind(sort_key)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(body,)| serde_json::from_str(&body).map_err(StoreError::from))
            .collect()
    }

    /// Idempotent upsert of one record.
    pub async fn put<T: Serialize>(
        &self,
        partition_key: &str,
        sort_key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO records (partition_key, sort_key, body) VALUES (?, ?, ?)
             ON CONFLICT(partition_key, sort_key) DO UPDATE SET body = excluded.body",
        )
        .bind(partition_key)
        .bind(sort_key)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes one record by exact key. Deleting a missing key is a no-op.
    pub async fn delete(&self, partition_key: &str, sort_key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM records WHERE partition_key = ? AND sort_key = ?")
            .bind(partition_key)
            .bind(sort_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes the given keys in statements of at most [`DELETE_BATCH_SIZE`]
    /// keys each. Returns the number of statements issued.
    pub async fn batch_delete(&self, keys: &[RecordKey]) -> Result<usize, StoreError> {
        let mut batches = 0;
        for chunk in keys.chunks(DELETE_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("DELETE FROM records WHERE ");

            let mut first = true;
            for key in chunk {
                if !first {
                    builder.push(" OR ");
                }
                first = false;
                builder.push("(partition_key = ");
                builder.push_bind(&key.partition_key);
                builder.push(" AND sort_key = ");
                builder.push_bind(&key.sort_key);
                builder.push(")");
            }

            builder.build().execute(&self.pool).await?;
            batches += 1;
        }
        Ok(batches)
    }
}
