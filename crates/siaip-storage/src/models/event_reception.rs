use crate::error::StorageResult;
use crate::store::{Fields, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siaip_core::DecodedEvent;
use sqlx::SqlitePool;

/// Table holding one row per received event.
pub const TABLE: &str = "event_receptions";

/// Column names of [`TABLE`].
pub mod columns {
    pub const ID: &str = "id";
    pub const OCCURRED_AT: &str = "occurred_at";
    pub const SIGNAL_CODE: &str = "signal_code";
    pub const SIGNAL_TYPE_ID: &str = "signal_type_id";
    pub const ZONE_NUMBER: &str = "zone_number";
    pub const ZONE_ID: &str = "zone_id";
    pub const ACCOUNT: &str = "account";
    pub const SYSTEM_ID: &str = "system_id";
    pub const ORIGIN: &str = "origin";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

/// Persisted event record.
///
/// Inserted with the decoded fields and three NULL lookup ids; the
/// correlation pipeline fills `signal_type_id`, `system_id` and `zone_id`
/// as lookups succeed. Records are never deleted by the receiver.
///
/// # Fields
///
/// * `occurred_at` - Reconciled panel time of the event
/// * `signal_code` - Two-letter signal code, if one was decoded
/// * `zone_number` - Zone address, only for zone codes
/// * `account` - Account as reported by the panel
/// * `origin` - Instance tag of the receiver that inserted the row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventReception {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub signal_code: Option<String>,
    pub signal_type_id: Option<i64>,
    pub zone_number: Option<i64>,
    pub zone_id: Option<i64>,
    pub account: String,
    pub system_id: Option<i64>,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventReception {
    /// Returns `true` once all three lookup ids are populated.
    pub fn is_fully_correlated(&self) -> bool {
        self.signal_type_id.is_some() && self.system_id.is_some() && self.zone_id.is_some()
    }

    /// Load a record by id.
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> StorageResult<Option<Self>> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, occurred_at, signal_code, signal_type_id, zone_number,
                   zone_id, account, system_id, origin, created_at, updated_at
            FROM event_receptions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(record)
    }

    /// All records for an account, oldest first.
    pub async fn find_by_account(pool: &SqlitePool, account: &str) -> StorageResult<Vec<Self>> {
        let records = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, occurred_at, signal_code, signal_type_id, zone_number,
                   zone_id, account, system_id, origin, created_at, updated_at
            FROM event_receptions
            WHERE account = ?
            ORDER BY id ASC
            "#,
        )
        .bind(account)
        .fetch_all(pool)
        .await?;

        Ok(records)
    }

    /// Total number of stored records.
    pub async fn count(pool: &SqlitePool) -> StorageResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_receptions")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

/// Insertable form of [`EventReception`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewEventReception {
    pub occurred_at: DateTime<Utc>,
    pub signal_code: Option<String>,
    pub zone_number: Option<i64>,
    pub account: String,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

impl NewEventReception {
    pub fn from_event(event: &DecodedEvent, origin: &str, now: DateTime<Utc>) -> Self {
        Self {
            occurred_at: event.timestamps.panel,
            signal_code: event.signal.code.clone(),
            zone_number: event.signal.address,
            account: event.account.clone(),
            origin: origin.to_string(),
            created_at: now,
        }
    }

    /// Column/value pairs for the insert; all lookup ids are NULL.
    pub fn into_fields(self) -> Fields {
        vec![
            (columns::OCCURRED_AT, Value::Timestamp(self.occurred_at)),
            (columns::SIGNAL_CODE, self.signal_code.into()),
            (columns::SIGNAL_TYPE_ID, Value::Null),
            (columns::ZONE_NUMBER, self.zone_number.into()),
            (columns::ZONE_ID, Value::Null),
            (columns::ACCOUNT, self.account.into()),
            (columns::SYSTEM_ID, Value::Null),
            (columns::ORIGIN, self.origin.into()),
            (columns::CREATED_AT, Value::Timestamp(self.created_at)),
            (columns::UPDATED_AT, Value::Timestamp(self.created_at)),
        ]
    }
}
