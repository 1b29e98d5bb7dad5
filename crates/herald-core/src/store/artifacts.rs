use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use tracing::debug;

use super::StoreError;
use crate::report::types::{GeneratedReportArtifact, OutputFormat};

/// Persistence contract for generated report payloads and their index metadata.
///
/// The engine keeps its own in-memory artifact index; [`load_index`](Self::load_index) is only
/// used to rehydrate that index on startup.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores the payload under `key` together with its metadata, replacing any previous entry.
    async fn put(
        &self,
        key: &str,
        payload: &[u8],
        meta: &GeneratedReportArtifact,
    ) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Removes the payload. Deleting an unknown key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Metadata of every stored artifact.
    async fn load_index(&self) -> Result<Vec<GeneratedReportArtifact>, StoreError>;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryArtifactStore {
    entries: DashMap<String, (Arc<[u8]>, GeneratedReportArtifact)>,
}

impl MemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(
        &self,
        key: &str,
        payload: &[u8],
        meta: &GeneratedReportArtifact,
    ) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), (Arc::from(payload), meta.clone()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|entry| entry.value().0.to_vec()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<GeneratedReportArtifact>, StoreError> {
        Ok(self.entries.iter().map(|entry| entry.value().1.clone()).collect())
    }
}

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS report_artifacts (
    storage_key      TEXT PRIMARY KEY NOT NULL,
    id               TEXT NOT NULL,
    definition_id    TEXT NOT NULL,
    format           TEXT NOT NULL,
    generated_at     TEXT NOT NULL,
    duration_ms      INTEGER NOT NULL,
    data_point_count INTEGER NOT NULL,
    size_bytes       INTEGER NOT NULL,
    synthetic        INTEGER NOT NULL,
    payload          BLOB NOT NULL
)";

/// `SQLite`-backed store. Artifacts survive restarts.
pub struct SqliteArtifactStore {
    pool: Pool<Sqlite>,
}

impl SqliteArtifactStore {
    /// Opens (creating if needed) the database and ensures the artifact table exists.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection or schema setup fails.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Each connection to an in-memory database is a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool =
            SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        debug!(url = %database_url, "artifact store ready");

        Ok(Self { pool })
    }

    fn to_i64(key: &str, field: &str, value: u64) -> Result<i64, StoreError> {
        i64::try_from(value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("{field} {value} does not fit in i64: {e}"),
        })
    }

    fn get_required<'r, T>(row: &'r SqliteRow, key: &str, column: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
    {
        row.try_get::<T, _>(column).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("column '{column}': {e}"),
        })
    }

    fn get_unsigned(row: &SqliteRow, key: &str, column: &str) -> Result<u64, StoreError> {
        let value: i64 = Self::get_required(row, key, column)?;
        u64::try_from(value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: format!("column '{column}' value {value} is negative: {e}"),
        })
    }

    fn row_to_artifact(row: &SqliteRow) -> Result<GeneratedReportArtifact, StoreError> {
        let storage_key: String = row.try_get("storage_key")?;
        let key = storage_key.as_str();

        let format: String = Self::get_required(row, key, "format")?;
        let format = OutputFormat::from_str(&format)
            .map_err(|reason| StoreError::Corrupt { key: key.to_string(), reason })?;

        let generated_at: String = Self::get_required(row, key, "generated_at")?;
        let generated_at = DateTime::parse_from_rfc3339(&generated_at)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: format!("generated_at '{generated_at}': {e}"),
            })?
            .with_timezone(&Utc);

        let data_point_count = Self::get_unsigned(row, key, "data_point_count")?;
        let size_bytes = Self::get_unsigned(row, key, "size_bytes")?;

        Ok(GeneratedReportArtifact {
            id: Self::get_required(row, key, "id")?,
            definition_id: Self::get_required(row, key, "definition_id")?,
            format,
            generated_at,
            duration_ms: Self::get_unsigned(row, key, "duration_ms")?,
            data_point_count: usize::try_from(data_point_count).unwrap_or(usize::MAX),
            size_bytes: usize::try_from(size_bytes).unwrap_or(usize::MAX),
            synthetic: Self::get_required(row, key, "synthetic")?,
            storage_key,
        })
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    async fn put(
        &self,
        key: &str,
        payload: &[u8],
        meta: &GeneratedReportArtifact,
    ) -> Result<(), StoreError> {
        let duration_ms = Self::to_i64(key, "duration_ms", meta.duration_ms)?;
        let data_point_count = Self::to_i64(key, "data_point_count", meta.data_point_count as u64)?;
        let size_bytes = Self::to_i64(key, "size_bytes", meta.size_bytes as u64)?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO report_artifacts
                (storage_key, id, definition_id, format, generated_at, duration_ms,
                 data_point_count, size_bytes, synthetic, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(key)
        .bind(&meta.id)
        .bind(&meta.definition_id)
        .bind(meta.format.as_str())
        .bind(meta.generated_at.to_rfc3339())
        .bind(duration_ms)
        .bind(data_point_count)
        .bind(size_bytes)
        .bind(meta.synthetic)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT payload FROM report_artifacts WHERE storage_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::get_required::<Vec<u8>>(&row, key, "payload")).transpose()
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM report_artifacts WHERE storage_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_index(&self) -> Result<Vec<GeneratedReportArtifact>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT storage_key, id, definition_id, format, generated_at, duration_ms,
                   data_point_count, size_bytes, synthetic
            FROM report_artifacts
            ORDER BY generated_at DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_artifact).collect()
    }
}
