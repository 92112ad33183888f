#![deny(clippy::print_stdout, clippy::print_stderr)]

//! C4: stages a change set and applies it to the canonical per-country
//! movement table as a set-based update-then-insert, followed by a chunked
//! archive pass. The default backend is in-memory and trait-bound so a real
//! database can be swapped in without touching callers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use movement_model::Movement;
use movement_model::MovementChangeSet;
use movement_model::MovementId;
use movement_model::Reconciliation;
use thiserror::Error;
use tokio::sync::RwLock;

/// Chunk size for the archive pass, mirroring a parameterized
/// `UPDATE ... WHERE id IN (?, ?, ...)` against a real database.
const ARCHIVE_CHUNK_SIZE: usize = 500;

const FOLDER_MAX_LEN: usize = 50;
const RAW_LABEL_MAX_LEN: usize = 200;
const CURRENCY_MAX_LEN: usize = 3;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot truncate key column {column} without changing its identity")]
    KeyTruncation { column: &'static str },
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub updated_count: usize,
    pub inserted_count: usize,
    pub archived_count: usize,
}

#[async_trait]
pub trait MovementStore: Send + Sync {
    async fn load_existing(&self, country_id: &str) -> StoreResult<Vec<Movement>>;

    async fn apply(
        &self,
        country_id: &str,
        changes: &MovementChangeSet,
        now: DateTime<Utc>,
    ) -> StoreResult<MergeOutcome>;
}

/// Truncates string columns to their persisted maximum length. Columns that
/// participate in the business key are never silently truncated: if they
/// would need truncation, the merge fails loudly instead of changing a
/// movement's identity underneath it.
fn stage(mut movement: Movement) -> StoreResult<Movement> {
    if movement.currency.len() > CURRENCY_MAX_LEN {
        return Err(StoreError::KeyTruncation { column: "CCY" });
    }
    if movement.event_num.chars().count() > 64 {
        return Err(StoreError::KeyTruncation {
            column: "Event_Num",
        });
    }
    movement.folder = truncate(&movement.folder, FOLDER_MAX_LEN);
    movement.raw_label = truncate(&movement.raw_label, RAW_LABEL_MAX_LEN);
    Ok(movement)
}

fn truncate(value: &str, max_len: usize) -> String {
    if value.chars().count() <= max_len {
        value.to_string()
    } else {
        value.chars().take(max_len).collect()
    }
}

#[derive(Default)]
pub struct InMemoryMovementStore {
    tables: RwLock<HashMap<String, HashMap<MovementId, Movement>>>,
}

impl InMemoryMovementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a country's table directly; used by tests and by the
    /// orchestrator's `LoadExisting` collaborator before a real persistence
    /// layer exists.
    pub async fn seed(&self, country_id: &str, movements: Vec<Movement>) {
        let mut tables = self.tables.write().await;
        let table = tables.entry(country_id.to_string()).or_default();
        for movement in movements {
            table.insert(movement.id.clone(), movement);
        }
    }
}

#[async_trait]
impl MovementStore for InMemoryMovementStore {
    async fn load_existing(&self, country_id: &str) -> StoreResult<Vec<Movement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(country_id)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply(
        &self,
        country_id: &str,
        changes: &MovementChangeSet,
        now: DateTime<Utc>,
    ) -> StoreResult<MergeOutcome> {
        // Stage: validate/truncate every incoming row before touching the
        // target table, so a bad row aborts before any partial merge.
        let mut staged_updates = Vec::with_capacity(changes.to_update.len());
        for movement in &changes.to_update {
            staged_updates.push(stage(movement.clone())?);
        }
        let mut staged_inserts = Vec::with_capacity(changes.to_add.len());
        for movement in &changes.to_add {
            staged_inserts.push(stage(movement.clone())?);
        }

        let mut tables = self.tables.write().await;
        let table = tables.entry(country_id.to_string()).or_default();

        let mut outcome = MergeOutcome::default();

        // Update before insert: an updated row must never be duplicated by
        // falling through to the insert path.
        for movement in staged_updates {
            table.insert(movement.id.clone(), movement);
            outcome.updated_count += 1;
        }

        for movement in staged_inserts {
            if !table.contains_key(&movement.id) {
                table.insert(movement.id.clone(), movement);
                outcome.inserted_count += 1;
            }
        }

        for chunk in changes.to_archive.chunks(ARCHIVE_CHUNK_SIZE) {
            for id in chunk {
                if let Some(movement) = table.get_mut(id) {
                    movement.delete_date = Some(now);
                    movement.version += 1;
                    outcome.archived_count += 1;
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(feature = "postgres-store")]
#[derive(Clone)]
pub struct PostgresMovementStore {
    connection_string: String,
}

#[cfg(feature = "postgres-store")]
impl PostgresMovementStore {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[cfg(feature = "postgres-store")]
#[async_trait]
impl MovementStore for PostgresMovementStore {
    async fn load_existing(&self, country_id: &str) -> StoreResult<Vec<Movement>> {
        let _ = (&self.connection_string, country_id);
        Err(StoreError::Storage(
            "postgres movement store not yet implemented".into(),
        ))
    }

    async fn apply(
        &self,
        country_id: &str,
        changes: &MovementChangeSet,
        now: DateTime<Utc>,
    ) -> StoreResult<MergeOutcome> {
        let _ = (&self.connection_string, country_id, changes, now);
        Err(StoreError::Storage(
            "postgres movement store not yet implemented".into(),
        ))
    }
}

/// Outcome of a reconciliation batch save, distinguishing rows that were
/// genuinely written from rows whose business fields were unchanged: the
/// import orchestrator must not emit an UPDATE or a changelog entry for the
/// latter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub written_count: usize,
    pub unchanged_count: usize,
    pub archived_count: usize,
}

/// True if any field a save would persist differs between `existing` and
/// `incoming`; version/creation/last-modified bookkeeping never counts.
#[must_use]
pub fn reconciliation_changed(existing: &Reconciliation, incoming: &Reconciliation) -> bool {
    existing.dwings_invoice_id != incoming.dwings_invoice_id
        || existing.dwings_guarantee_id != incoming.dwings_guarantee_id
        || existing.dwings_commission_id != incoming.dwings_commission_id
        || existing.action != incoming.action
        || existing.action_status != incoming.action_status
        || existing.action_date != incoming.action_date
        || existing.kpi != incoming.kpi
        || existing.incident_type != incoming.incident_type
        || existing.risky_item != incoming.risky_item
        || existing.reason_non_risky != incoming.reason_non_risky
        || existing.comments != incoming.comments
        || existing.internal_invoice_reference != incoming.internal_invoice_reference
        || existing.first_claim_date != incoming.first_claim_date
        || existing.last_claim_date != incoming.last_claim_date
        || existing.to_remind != incoming.to_remind
        || existing.to_remind_date != incoming.to_remind_date
        || existing.ack != incoming.ack
        || existing.swift_code != incoming.swift_code
        || existing.payment_reference != incoming.payment_reference
        || existing.trigger_date != incoming.trigger_date
        || existing.assignee != incoming.assignee
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn load_existing(&self, country_id: &str) -> StoreResult<Vec<Reconciliation>>;

    /// Upserts a batch built by the reconciliation builder. Rows whose
    /// business fields are unchanged from what is already stored are
    /// skipped, per the no-op-save invariant.
    async fn save_batch(
        &self,
        country_id: &str,
        reconciliations: &[Reconciliation],
    ) -> StoreResult<SaveOutcome>;

    async fn archive_batch(
        &self,
        country_id: &str,
        ids: &[MovementId],
        now: DateTime<Utc>,
    ) -> StoreResult<SaveOutcome>;

    /// Clears `delete_date` on every id in `ids` that is currently archived,
    /// restoring the 1:1 reconciliation lifecycle when C3 revives a movement
    /// whose business key reappears. Ids that are not archived, or have no
    /// reconciliation row yet, are left untouched.
    async fn revive_batch(&self, country_id: &str, ids: &[MovementId], now: DateTime<Utc>) -> StoreResult<SaveOutcome>;
}

#[derive(Default)]
pub struct InMemoryReconciliationStore {
    tables: RwLock<HashMap<String, HashMap<MovementId, Reconciliation>>>,
}

impl InMemoryReconciliationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, country_id: &str, reconciliations: Vec<Reconciliation>) {
        let mut tables = self.tables.write().await;
        let table = tables.entry(country_id.to_string()).or_default();
        for reconciliation in reconciliations {
            table.insert(reconciliation.id.clone(), reconciliation);
        }
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn load_existing(&self, country_id: &str) -> StoreResult<Vec<Reconciliation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(country_id)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_batch(
        &self,
        country_id: &str,
        reconciliations: &[Reconciliation],
    ) -> StoreResult<SaveOutcome> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(country_id.to_string()).or_default();

        let mut outcome = SaveOutcome::default();
        for reconciliation in reconciliations {
            match table.get(&reconciliation.id) {
                Some(existing) if !reconciliation_changed(existing, reconciliation) => {
                    outcome.unchanged_count += 1;
                }
                _ => {
                    table.insert(reconciliation.id.clone(), reconciliation.clone());
                    outcome.written_count += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn archive_batch(
        &self,
        country_id: &str,
        ids: &[MovementId],
        now: DateTime<Utc>,
    ) -> StoreResult<SaveOutcome> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(country_id.to_string()).or_default();

        let mut outcome = SaveOutcome::default();
        for chunk in ids.chunks(ARCHIVE_CHUNK_SIZE) {
            for id in chunk {
                if let Some(reconciliation) = table.get_mut(id) {
                    reconciliation.archive(now);
                    outcome.archived_count += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn revive_batch(&self, country_id: &str, ids: &[MovementId], now: DateTime<Utc>) -> StoreResult<SaveOutcome> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(country_id.to_string()).or_default();

        let mut outcome = SaveOutcome::default();
        for chunk in ids.chunks(ARCHIVE_CHUNK_SIZE) {
            for id in chunk {
                if let Some(reconciliation) = table.get_mut(id) {
                    if reconciliation.is_archived() {
                        reconciliation.revive(now);
                        outcome.written_count += 1;
                    } else {
                        outcome.unchanged_count += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(feature = "postgres-store")]
#[derive(Clone)]
pub struct PostgresReconciliationStore {
    connection_string: String,
}

#[cfg(feature = "postgres-store")]
impl PostgresReconciliationStore {
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }
}

#[cfg(feature = "postgres-store")]
#[async_trait]
impl ReconciliationStore for PostgresReconciliationStore {
    async fn load_existing(&self, country_id: &str) -> StoreResult<Vec<Reconciliation>> {
        let _ = (&self.connection_string, country_id);
        Err(StoreError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }

    async fn save_batch(
        &self,
        country_id: &str,
        reconciliations: &[Reconciliation],
    ) -> StoreResult<SaveOutcome> {
        let _ = (&self.connection_string, country_id, reconciliations);
        Err(StoreError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }

    async fn archive_batch(
        &self,
        country_id: &str,
        ids: &[MovementId],
        now: DateTime<Utc>,
    ) -> StoreResult<SaveOutcome> {
        let _ = (&self.connection_string, country_id, ids, now);
        Err(StoreError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }

    async fn revive_batch(&self, country_id: &str, ids: &[MovementId], now: DateTime<Utc>) -> StoreResult<SaveOutcome> {
        let _ = (&self.connection_string, country_id, ids, now);
        Err(StoreError::Storage(
            "postgres reconciliation store not yet implemented".into(),
        ))
    }
}
