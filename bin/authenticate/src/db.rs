//! PostgreSQL storage service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_session::{DataBroker, DataBrokerError, Record, Session, StoredRecord};
use rootcause::prelude::Report;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::instrument;

/// Row type for record queries.
#[derive(FromRow)]
struct RecordRow {
    version: i64,
    data: Value,
}

impl RecordRow {
    fn into_stored(self) -> StoredRecord {
        StoredRecord {
            version: u64::try_from(self.version).unwrap_or_default(),
            data: self.data,
        }
    }
}

/// A storage service backed by the `records` table.
///
/// Every write takes the next value of `records_version_seq`, so versions
/// increase across all record types.
#[derive(Debug, Clone)]
pub struct PgDataBroker {
    pool: PgPool,
}

impl PgDataBroker {
    /// Creates a new broker over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unavailable(err: sqlx::Error) -> DataBrokerError {
    DataBrokerError::Unavailable {
        details: err.to_string(),
    }
}

#[async_trait]
impl DataBroker for PgDataBroker {
    #[instrument(skip(self))]
    async fn get(
        &self,
        record_type: &str,
        id: &str,
    ) -> Result<Option<StoredRecord>, Report<DataBrokerError>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"
            SELECT version, data
            FROM records
            WHERE record_type = $1 AND id = $2
            "#,
        )
        .bind(record_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row.map(RecordRow::into_stored))
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        record_type: &str,
        id: &str,
        data: Value,
    ) -> Result<u64, Report<DataBrokerError>> {
        let (version,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO records (record_type, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (record_type, id) DO UPDATE
            SET data = EXCLUDED.data,
                version = nextval('records_version_seq'),
                modified_at = NOW()
            RETURNING version
            "#,
        )
        .bind(record_type)
        .bind(id)
        .bind(data)
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(u64::try_from(version).unwrap_or_default())
    }

    #[instrument(skip(self))]
    async fn delete(&self, record_type: &str, id: &str) -> Result<(), Report<DataBrokerError>> {
        sqlx::query("DELETE FROM records WHERE record_type = $1 AND id = $2")
            .bind(record_type)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, Report<DataBrokerError>> {
        let result = sqlx::query(
            r#"
            DELETE FROM records
            WHERE record_type = $1
              AND (data->>'expires_at')::timestamptz < $2
            "#,
        )
        .bind(Session::RECORD_TYPE)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(result.rows_affected())
    }
}
