//! The storage service contract.
//!
//! Backends store JSON records keyed by record type and id. Every write
//! bumps a server-wide version counter, which the local session artifact
//! records so a session can be tied to the write that created it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rootcause::prelude::Report;
use serde_json::Value;
use tracing::instrument;

use crate::error::DataBrokerError;
use crate::records::{Record, Session};

/// A record as held by the storage service.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Server version of the write that produced this record.
    pub version: u64,
    pub data: Value,
}

/// Read and write operations required of the storage service.
#[async_trait]
pub trait DataBroker: Send + Sync {
    /// Fetches a record, or `None` if there is no record with that id.
    async fn get(
        &self,
        record_type: &str,
        id: &str,
    ) -> Result<Option<StoredRecord>, Report<DataBrokerError>>;

    /// Creates or replaces a record and returns the new server version.
    async fn put(&self, record_type: &str, id: &str, data: Value)
    -> Result<u64, Report<DataBrokerError>>;

    /// Removes a record. Removing a missing record succeeds.
    async fn delete(&self, record_type: &str, id: &str) -> Result<(), Report<DataBrokerError>>;

    /// Removes session records that expired before `now` and returns how many
    /// were removed.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>)
    -> Result<u64, Report<DataBrokerError>>;
}

/// Fetches and deserializes a typed record.
///
/// # Errors
///
/// Returns a `DataBrokerError` if the backend fails or the stored data does
/// not deserialize as `R`.
pub async fn get<R: Record>(
    broker: &dyn DataBroker,
    id: &str,
) -> portcullis_core::Result<Option<R>, DataBrokerError> {
    let Some(stored) = broker.get(R::RECORD_TYPE, id).await? else {
        return Ok(None);
    };
    let record = serde_json::from_value(stored.data).map_err(|e| DataBrokerError::Serialization {
        record_type: R::RECORD_TYPE.to_string(),
        id: id.to_string(),
        details: e.to_string(),
    })?;
    Ok(Some(record))
}

/// Serializes and stores a typed record, returning the server version.
///
/// # Errors
///
/// Returns a `DataBrokerError` if the record does not serialize or the
/// backend fails.
pub async fn put<R: Record>(
    broker: &dyn DataBroker,
    record: &R,
) -> portcullis_core::Result<u64, DataBrokerError> {
    let data = serde_json::to_value(record).map_err(|e| DataBrokerError::Serialization {
        record_type: R::RECORD_TYPE.to_string(),
        id: record.record_id().to_string(),
        details: e.to_string(),
    })?;
    broker.put(R::RECORD_TYPE, record.record_id(), data).await
}

/// Removes a typed record.
///
/// # Errors
///
/// Returns a `DataBrokerError` if the backend fails.
pub async fn delete<R: Record>(
    broker: &dyn DataBroker,
    id: &str,
) -> portcullis_core::Result<(), DataBrokerError> {
    broker.delete(R::RECORD_TYPE, id).await
}

/// A storage service held in process memory.
///
/// Used for development and tests. Records are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryDataBroker {
    records: Mutex<HashMap<(String, String), StoredRecord>>,
    version: AtomicU64,
}

impl InMemoryDataBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DataBroker for InMemoryDataBroker {
    #[instrument(skip(self))]
    async fn get(
        &self,
        record_type: &str,
        id: &str,
    ) -> Result<Option<StoredRecord>, Report<DataBrokerError>> {
        let key = (record_type.to_string(), id.to_string());
        Ok(self.records.lock().get(&key).cloned())
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        record_type: &str,
        id: &str,
        data: Value,
    ) -> Result<u64, Report<DataBrokerError>> {
        let mut records = self.records.lock();
        // Versions must be issued in write order.
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        records.insert(
            (record_type.to_string(), id.to_string()),
            StoredRecord { version, data },
        );
        Ok(version)
    }

    #[instrument(skip(self))]
    async fn delete(&self, record_type: &str, id: &str) -> Result<(), Report<DataBrokerError>> {
        self.records
            .lock()
            .remove(&(record_type.to_string(), id.to_string()));
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_expired_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, Report<DataBrokerError>> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|(record_type, _), stored| {
            record_type != Session::RECORD_TYPE || !session_expired(&stored.data, now)
        });
        Ok((before - records.len()) as u64)
    }
}

fn session_expired(data: &Value, now: DateTime<Utc>) -> bool {
    data.get("expires_at")
        .cloned()
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok())
        .is_some_and(|expires_at| expires_at < now)
}
