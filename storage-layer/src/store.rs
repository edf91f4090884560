//! Store and session traits.
//!
//! A [`StoreSession`] is one storage transaction, passed explicitly into
//! every engine call that touches rows — there is no ambient or
//! thread-local transaction state. Entity mutations, checkpoint upserts,
//! and audit appends for one push/pull all go through the same session
//! and become durable together at [`StoreSession::commit`].
//!
//! Updates are conditional: callers pass the version they read, and a
//! write that no longer matches fails with [`StorageError::StaleVersion`]
//! instead of overwriting — compare-and-swap rather than read-then-write.

use async_trait::async_trait;
use audit_engine::AuditEntry;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::models::{
    Appointment, ClinicalRecord, FollowUpVisit, InventoryItem, Prescription, SyncCheckpoint,
    TriageLog,
};
use crate::scope::RecordScope;

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Open a new transaction
    async fn begin(&self) -> StorageResult<Box<dyn StoreSession>>;
}

#[async_trait]
pub trait StoreSession: Send {
    // Appointments
    async fn get_appointment(&mut self, id: Uuid) -> StorageResult<Option<Appointment>>;
    async fn insert_appointment(&mut self, row: &Appointment) -> StorageResult<()>;
    async fn update_appointment(
        &mut self,
        row: &Appointment,
        expected_version: i64,
    ) -> StorageResult<()>;
    async fn appointments_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<Appointment>>;

    // Clinical records
    async fn get_clinical_record(&mut self, id: Uuid) -> StorageResult<Option<ClinicalRecord>>;
    async fn insert_clinical_record(&mut self, row: &ClinicalRecord) -> StorageResult<()>;
    async fn update_clinical_record(
        &mut self,
        row: &ClinicalRecord,
        expected_version: i64,
    ) -> StorageResult<()>;
    async fn clinical_records_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<ClinicalRecord>>;

    // Prescriptions (medicine lines are replaced wholesale on update)
    async fn get_prescription(&mut self, id: Uuid) -> StorageResult<Option<Prescription>>;
    async fn insert_prescription(&mut self, row: &Prescription) -> StorageResult<()>;
    async fn update_prescription(
        &mut self,
        row: &Prescription,
        expected_version: i64,
    ) -> StorageResult<()>;
    async fn prescriptions_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<Prescription>>;

    // Inventory. Lookups return soft-deleted rows so callers can decide
    // between revival and the version gate; the range scan excludes them.
    async fn get_inventory_item(&mut self, id: Uuid) -> StorageResult<Option<InventoryItem>>;
    async fn find_inventory_by_sku(
        &mut self,
        pharmacy_id: Uuid,
        sku: &str,
    ) -> StorageResult<Option<InventoryItem>>;
    async fn insert_inventory_item(&mut self, row: &InventoryItem) -> StorageResult<()>;
    async fn update_inventory_item(
        &mut self,
        row: &InventoryItem,
        expected_version: i64,
    ) -> StorageResult<()>;
    async fn inventory_items_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<InventoryItem>>;

    // Triage logs (append-only)
    async fn get_triage_log(&mut self, id: Uuid) -> StorageResult<Option<TriageLog>>;
    async fn insert_triage_log(&mut self, row: &TriageLog) -> StorageResult<()>;
    async fn triage_logs_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<TriageLog>>;

    // Follow-up visits
    async fn get_follow_up_visit(&mut self, id: Uuid) -> StorageResult<Option<FollowUpVisit>>;
    async fn insert_follow_up_visit(&mut self, row: &FollowUpVisit) -> StorageResult<()>;
    async fn update_follow_up_visit(
        &mut self,
        row: &FollowUpVisit,
        expected_version: i64,
    ) -> StorageResult<()>;
    async fn follow_up_visits_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<FollowUpVisit>>;

    // Sync bookkeeping
    async fn get_checkpoint(
        &mut self,
        actor_id: Uuid,
        device_id: &str,
    ) -> StorageResult<Option<SyncCheckpoint>>;
    async fn save_checkpoint(&mut self, checkpoint: &SyncCheckpoint) -> StorageResult<()>;

    // Audit trail
    async fn append_audit(&mut self, entry: &AuditEntry) -> StorageResult<()>;
    /// Entries strictly older than `before` (all when absent), newest
    /// first, capped at `limit`.
    async fn audit_entries_before(
        &mut self,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<AuditEntry>>;

    /// Make the session's writes durable
    async fn commit(self: Box<Self>) -> StorageResult<()>;
}
