use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use haggle_core::domain::call_record::{CallRecord, CallRecordPatch, CallState};
use haggle_core::ports::{CallRecordStore, CollaboratorError};

use super::RepositoryError;
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT call_id, session_id, vendor_name, vendor_phone, started_at,
        ended_at, duration_secs, status, ended_reason, requirements_json, quoted_price,
        negotiated_price, transcript, recording_url, notes, created_at, updated_at
 FROM call_record";

pub struct SqlCallRecordRepository {
    pool: DbPool,
}

impl SqlCallRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, record: &CallRecord) -> Result<(), RepositoryError> {
        let requirements_json = serde_json::to_string(&record.requirements)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO call_record (call_id, session_id, vendor_name, vendor_phone, started_at,
                                      ended_at, duration_secs, status, ended_reason,
                                      requirements_json, quoted_price, negotiated_price,
                                      transcript, recording_url, notes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(call_id) DO UPDATE SET
                 status = excluded.status,
                 ended_at = excluded.ended_at,
                 duration_secs = excluded.duration_secs,
                 ended_reason = excluded.ended_reason,
                 quoted_price = excluded.quoted_price,
                 negotiated_price = excluded.negotiated_price,
                 transcript = excluded.transcript,
                 recording_url = excluded.recording_url,
                 notes = excluded.notes,
                 updated_at = excluded.updated_at",
        )
        .bind(&record.call_id)
        .bind(&record.session_id)
        .bind(&record.vendor_name)
        .bind(&record.vendor_phone)
        .bind(record.started_at.map(timestamp))
        .bind(record.ended_at.map(timestamp))
        .bind(record.duration_secs)
        .bind(record.status.as_str())
        .bind(&record.ended_reason)
        .bind(requirements_json)
        .bind(record.quoted_price.map(|price| price.to_string()))
        .bind(record.negotiated_price.map(|price| price.to_string()))
        .bind(&record.transcript)
        .bind(&record.recording_url)
        .bind(&record.notes)
        .bind(timestamp(record.created_at))
        .bind(timestamp(record.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, call_id: &str) -> Result<Option<CallRecord>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE call_id = ?"))
            .bind(call_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_call_record).transpose()
    }

    async fn patch(
        &self,
        call_id: &str,
        patch: CallRecordPatch,
    ) -> Result<Option<CallRecord>, RepositoryError> {
        let Some(mut record) = self.find(call_id).await? else {
            return Ok(None);
        };
        record.apply(patch);
        self.insert(&record).await?;
        Ok(Some(record))
    }

    async fn remove(&self, call_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM call_record WHERE call_id = ?")
            .bind(call_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<CallRecord>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, call_id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_call_record).collect()
    }
}

/// Fixed-width UTC so `ORDER BY created_at` sorts chronologically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode(error: impl ToString) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).map_err(decode)
}

fn parse_price(value: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    value.as_deref().map(Decimal::from_str).transpose().map_err(decode)
}

fn row_to_call_record(row: &sqlx::sqlite::SqliteRow) -> Result<CallRecord, RepositoryError> {
    let status: String = row.try_get("status").map_err(decode)?;
    let requirements_json: String = row.try_get("requirements_json").map_err(decode)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(decode)?;
    let ended_at: Option<String> = row.try_get("ended_at").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    Ok(CallRecord {
        call_id: row.try_get("call_id").map_err(decode)?,
        session_id: row.try_get("session_id").map_err(decode)?,
        vendor_name: row.try_get("vendor_name").map_err(decode)?,
        vendor_phone: row.try_get("vendor_phone").map_err(decode)?,
        started_at: started_at.as_deref().map(parse_timestamp).transpose()?,
        ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
        duration_secs: row.try_get("duration_secs").map_err(decode)?,
        status: CallState::from_str(&status).map_err(RepositoryError::Decode)?,
        ended_reason: row.try_get("ended_reason").map_err(decode)?,
        requirements: serde_json::from_str(&requirements_json).map_err(decode)?,
        quoted_price: parse_price(row.try_get("quoted_price").map_err(decode)?)?,
        negotiated_price: parse_price(row.try_get("negotiated_price").map_err(decode)?)?,
        transcript: row.try_get("transcript").map_err(decode)?,
        recording_url: row.try_get("recording_url").map_err(decode)?,
        notes: row.try_get("notes").map_err(decode)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait::async_trait]
impl CallRecordStore for SqlCallRecordRepository {
    async fn create(&self, record: CallRecord) -> Result<(), CollaboratorError> {
        Ok(self.insert(&record).await?)
    }

    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, CollaboratorError> {
        Ok(self.find(call_id).await?)
    }

    async fn update(
        &self,
        call_id: &str,
        patch: CallRecordPatch,
    ) -> Result<Option<CallRecord>, CollaboratorError> {
        Ok(self.patch(call_id, patch).await?)
    }

    async fn delete(&self, call_id: &str) -> Result<bool, CollaboratorError> {
        Ok(self.remove(call_id).await?)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<CallRecord>, CollaboratorError> {
        Ok(self.recent(limit).await?)
    }
}
