//! Correlation pipeline run by the storage sink for every accepted event.
//!
//! ```text
//! insert -> signal type -> system (full account, then last 4) -> zone
//! ```
//!
//! Every stage is a lookup followed by one conditional `UPDATE`. The update
//! predicates (`id IS NULL` plus the matching fields) make each backfill an
//! atomic check-and-set inside the database, so no in-process lock guards
//! the writers. A failed stage is logged and leaves its id NULL; the
//! following stages still run, except the zone stage which needs the system.

use crate::error::StorageResult;
use crate::models::event_reception::{self, columns};
use crate::models::{NewEventReception, SignalType, System, Zone};
use crate::store::{Condition, EventStore, Fields, Value};
use chrono::Utc;
use siaip_core::DecodedEvent;
use siaip_core::constants::{BACKFILL_SIGNAL_CODE_LEN, SYSTEM_FALLBACK_LEN};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ids resolved while correlating one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationOutcome {
    /// Id of the inserted record; `None` if the insert failed.
    pub record_id: Option<i64>,
    pub signal_type_id: Option<i64>,
    pub system_id: Option<i64>,
    pub zone_id: Option<i64>,
}

/// Result of the system lookup, which gates the zone stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SystemLookup {
    Found(i64),
    Missing,
    Failed,
}

/// Drives the insert and the three backfill stages against an [`EventStore`].
#[derive(Debug)]
pub struct CorrelationPipeline<S> {
    store: Arc<S>,
    origin: String,
}

impl<S> Clone for CorrelationPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            origin: self.origin.clone(),
        }
    }
}

impl<S: EventStore> CorrelationPipeline<S> {
    /// Pipeline writing records tagged with `origin`.
    pub fn new(store: Arc<S>, origin: impl Into<String>) -> Self {
        Self {
            store,
            origin: origin.into(),
        }
    }

    /// Persist `event` and backfill whatever lookup ids can be resolved.
    ///
    /// Never fails: storage errors are logged per stage.
    pub async fn correlate(&self, event: &DecodedEvent) -> CorrelationOutcome {
        let mut outcome = CorrelationOutcome::default();

        match self.insert(event).await {
            Ok(id) => {
                debug!(record_id = id, account = %event.account, "event record inserted");
                outcome.record_id = Some(id);
            }
            Err(e) => warn!(account = %event.account, error = %e, "event insert failed"),
        }

        if let Some(code) = event.signal.code.as_deref() {
            match self.resolve_signal_type(code).await {
                Ok(id) => outcome.signal_type_id = id,
                Err(e) => warn!(signal_code = code, error = %e, "signal type stage failed"),
            }
        }

        let system = match self.resolve_system(&event.account).await {
            Ok(Some(id)) => SystemLookup::Found(id),
            Ok(None) => SystemLookup::Missing,
            Err(e) => {
                warn!(account = %event.account, error = %e, "system stage failed");
                SystemLookup::Failed
            }
        };
        if let SystemLookup::Found(id) = system {
            outcome.system_id = Some(id);
        }

        match (system, event.signal.address) {
            (SystemLookup::Found(system_id), Some(address)) => {
                match self.resolve_zone(system_id, &event.account, address).await {
                    Ok(id) => outcome.zone_id = id,
                    Err(e) => {
                        warn!(account = %event.account, zone = address, error = %e, "zone stage failed")
                    }
                }
            }
            (SystemLookup::Failed, _) => debug!("zone stage skipped after system failure"),
            _ => {}
        }

        outcome
    }

    async fn insert(&self, event: &DecodedEvent) -> StorageResult<i64> {
        let record = NewEventReception::from_event(event, &self.origin, Utc::now());
        self.store
            .insert(event_reception::TABLE, record.into_fields())
            .await
    }

    /// Look up the signal type and backfill it on records still lacking one.
    async fn resolve_signal_type(&self, code: &str) -> StorageResult<Option<i64>> {
        let rows = self
            .store
            .select(
                SignalType::TABLE,
                &[SignalType::ID],
                vec![Condition::eq(SignalType::SIGNAL_CODE, code)],
            )
            .await?;
        let Some(id) = rows.first().and_then(|row| row.get_i64(SignalType::ID)) else {
            debug!(signal_code = code, "unknown signal type");
            return Ok(None);
        };

        let updated = self
            .store
            .update(
                event_reception::TABLE,
                backfill(columns::SIGNAL_TYPE_ID, id),
                vec![
                    Condition::is_null(columns::SIGNAL_TYPE_ID),
                    Condition::eq(columns::SIGNAL_CODE, code),
                ],
            )
            .await?;
        debug!(signal_code = code, signal_type_id = id, updated, "signal type backfilled");
        Ok(Some(id))
    }

    /// Look up the system by full account, falling back to its last four
    /// characters, and backfill it on matching records.
    async fn resolve_system(&self, account: &str) -> StorageResult<Option<i64>> {
        let mut id = self.find_system(account).await?;
        if id.is_none()
            && let Some(short) = fallback_account(account)
        {
            debug!(account, fallback = short, "retrying system lookup");
            id = self.find_system(short).await?;
        }
        let Some(id) = id else {
            debug!(account, "unknown system");
            return Ok(None);
        };

        let updated = self
            .store
            .update(
                event_reception::TABLE,
                backfill(columns::SYSTEM_ID, id),
                vec![
                    Condition::is_null(columns::SYSTEM_ID),
                    Condition::eq(columns::ACCOUNT, account),
                    Condition::LengthEq(columns::SIGNAL_CODE, BACKFILL_SIGNAL_CODE_LEN),
                ],
            )
            .await?;
        debug!(account, system_id = id, updated, "system backfilled");
        Ok(Some(id))
    }

    async fn find_system(&self, account_code: &str) -> StorageResult<Option<i64>> {
        let rows = self
            .store
            .select(
                System::TABLE,
                &[System::ID],
                vec![Condition::eq(System::ACCOUNT_CODE, account_code)],
            )
            .await?;
        Ok(rows.first().and_then(|row| row.get_i64(System::ID)))
    }

    /// Look up the zone of `system_id` and backfill it on this instance's
    /// records for the account and address.
    async fn resolve_zone(
        &self,
        system_id: i64,
        account: &str,
        address: i64,
    ) -> StorageResult<Option<i64>> {
        let rows = self
            .store
            .select(
                Zone::TABLE,
                &[Zone::ID],
                vec![
                    Condition::eq(Zone::SYSTEM_ID, system_id),
                    Condition::eq(Zone::ZONE_NUMBER, address),
                ],
            )
            .await?;
        let Some(id) = rows.first().and_then(|row| row.get_i64(Zone::ID)) else {
            debug!(system_id, zone = address, "unknown zone");
            return Ok(None);
        };

        let updated = self
            .store
            .update(
                event_reception::TABLE,
                backfill(columns::ZONE_ID, id),
                vec![
                    Condition::is_null(columns::ZONE_ID),
                    Condition::eq(columns::ACCOUNT, account),
                    Condition::eq(columns::ZONE_NUMBER, address),
                    Condition::eq(columns::ORIGIN, self.origin.as_str()),
                ],
            )
            .await?;
        debug!(account, zone_id = id, updated, "zone backfilled");
        Ok(Some(id))
    }
}

/// `SET column = id, updated_at = now`
fn backfill(column: &'static str, id: i64) -> Fields {
    vec![
        (column, Value::Integer(id)),
        (columns::UPDATED_AT, Value::Timestamp(Utc::now())),
    ]
}

/// Last four characters of an account longer than four characters.
fn fallback_account(account: &str) -> Option<&str> {
    let count = account.chars().count();
    if count <= SYSTEM_FALLBACK_LEN {
        return None;
    }
    account
        .char_indices()
        .nth(count - SYSTEM_FALLBACK_LEN)
        .map(|(index, _)| &account[index..])
}
