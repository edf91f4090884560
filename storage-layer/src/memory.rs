//! In-memory store for tests and local development.
//!
//! HashMap tables behind a single `parking_lot::RwLock`. Sessions write
//! through immediately under short-lived locks and `commit` is a no-op,
//! so there is no rollback — acceptable for the test/dev backend, where
//! the engine's per-operation error isolation is what is under test.
//! Conditional updates still enforce the version compare-and-swap under
//! the write lock, exactly like the SQL backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use audit_engine::AuditEntry;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{
    Appointment, ClinicalRecord, FollowUpVisit, InventoryItem, Prescription, SyncCheckpoint,
    TriageLog,
};
use crate::scope::RecordScope;
use crate::store::{StoreSession, SyncStore};

#[derive(Default)]
struct Tables {
    appointments: HashMap<Uuid, Appointment>,
    clinical_records: HashMap<Uuid, ClinicalRecord>,
    prescriptions: HashMap<Uuid, Prescription>,
    inventory_items: HashMap<Uuid, InventoryItem>,
    triage_logs: HashMap<Uuid, TriageLog>,
    follow_up_visits: HashMap<Uuid, FollowUpVisit>,
    checkpoints: HashMap<(Uuid, String), SyncCheckpoint>,
    audit_log: Vec<AuditEntry>,
}

/// HashMap-backed store. Clone-friendly via `Arc`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn begin(&self) -> StorageResult<Box<dyn StoreSession>> {
        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
        }))
    }
}

struct MemorySession {
    tables: Arc<RwLock<Tables>>,
}

fn appointment_in_scope(scope: &RecordScope, row: &Appointment) -> bool {
    match scope {
        RecordScope::All => true,
        RecordScope::Participant(id) => {
            row.patient_id == *id || row.doctor_id == *id || row.worker_id == Some(*id)
        }
        _ => false,
    }
}

fn clinical_record_in_scope(scope: &RecordScope, row: &ClinicalRecord) -> bool {
    match scope {
        RecordScope::All => true,
        RecordScope::Patient(id) => row.patient_id == *id,
        RecordScope::Author(id) => row.created_by == *id,
        RecordScope::AuthorOrDoctor(id) => row.created_by == *id || row.doctor_id == Some(*id),
        _ => false,
    }
}

fn prescription_in_scope(scope: &RecordScope, row: &Prescription) -> bool {
    match scope {
        RecordScope::All => true,
        RecordScope::Patient(id) => row.patient_id == *id,
        RecordScope::Prescriber(id) => row.prescribed_by == *id,
        RecordScope::Pharmacy(id) => row.pharmacy_id == Some(*id),
        _ => false,
    }
}

fn inventory_in_scope(scope: &RecordScope, row: &InventoryItem) -> bool {
    match scope {
        RecordScope::All => true,
        RecordScope::Pharmacy(id) => row.pharmacy_id == *id,
        _ => false,
    }
}

fn triage_in_scope(scope: &RecordScope, row: &TriageLog) -> bool {
    match scope {
        RecordScope::All => true,
        RecordScope::Patient(id) => row.patient_id == *id,
        RecordScope::AuthorRole(role) => row.recorded_by_role == *role,
        _ => false,
    }
}

fn follow_up_in_scope(scope: &RecordScope, row: &FollowUpVisit) -> bool {
    match scope {
        RecordScope::All => true,
        RecordScope::Patient(id) => row.patient_id == *id,
        RecordScope::Worker(id) => row.worker_id == *id,
        _ => false,
    }
}

/// Filter, order ascending by the given timestamp (id as tie-break) and
/// cap at `limit`.
fn scan<T: Clone>(
    rows: impl Iterator<Item = T>,
    since: Option<DateTime<Utc>>,
    limit: i64,
    key: impl Fn(&T) -> (DateTime<Utc>, Uuid),
) -> Vec<T> {
    let mut out: Vec<T> = rows
        .filter(|r| match since {
            Some(since) => key(r).0 > since,
            None => true,
        })
        .collect();
    out.sort_by_key(|r| key(r));
    out.truncate(limit.max(0) as usize);
    out
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn get_appointment(&mut self, id: Uuid) -> StorageResult<Option<Appointment>> {
        Ok(self.tables.read().appointments.get(&id).cloned())
    }

    async fn insert_appointment(&mut self, row: &Appointment) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.appointments.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(format!("appointment {}", row.id)));
        }
        tables.appointments.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_appointment(
        &mut self,
        row: &Appointment,
        expected_version: i64,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write();
        match tables.appointments.get_mut(&row.id) {
            Some(current) if current.version == expected_version => {
                *current = row.clone();
                Ok(())
            }
            _ => Err(StorageError::StaleVersion),
        }
    }

    async fn appointments_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<Appointment>> {
        let tables = self.tables.read();
        Ok(scan(
            tables
                .appointments
                .values()
                .filter(|r| appointment_in_scope(scope, r))
                .cloned(),
            since,
            limit,
            |r| (r.updated_at, r.id),
        ))
    }

    async fn get_clinical_record(&mut self, id: Uuid) -> StorageResult<Option<ClinicalRecord>> {
        Ok(self.tables.read().clinical_records.get(&id).cloned())
    }

    async fn insert_clinical_record(&mut self, row: &ClinicalRecord) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.clinical_records.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(format!(
                "clinical record {}",
                row.id
            )));
        }
        tables.clinical_records.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_clinical_record(
        &mut self,
        row: &ClinicalRecord,
        expected_version: i64,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write();
        match tables.clinical_records.get_mut(&row.id) {
            Some(current) if current.version == expected_version => {
                *current = row.clone();
                Ok(())
            }
            _ => Err(StorageError::StaleVersion),
        }
    }

    async fn clinical_records_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<ClinicalRecord>> {
        let tables = self.tables.read();
        Ok(scan(
            tables
                .clinical_records
                .values()
                .filter(|r| clinical_record_in_scope(scope, r))
                .cloned(),
            since,
            limit,
            |r| (r.updated_at, r.id),
        ))
    }

    async fn get_prescription(&mut self, id: Uuid) -> StorageResult<Option<Prescription>> {
        Ok(self.tables.read().prescriptions.get(&id).cloned())
    }

    async fn insert_prescription(&mut self, row: &Prescription) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.prescriptions.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(format!(
                "prescription {}",
                row.id
            )));
        }
        tables.prescriptions.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_prescription(
        &mut self,
        row: &Prescription,
        expected_version: i64,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write();
        match tables.prescriptions.get_mut(&row.id) {
            Some(current) if current.version == expected_version => {
                *current = row.clone();
                Ok(())
            }
            _ => Err(StorageError::StaleVersion),
        }
    }

    async fn prescriptions_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<Prescription>> {
        let tables = self.tables.read();
        Ok(scan(
            tables
                .prescriptions
                .values()
                .filter(|r| prescription_in_scope(scope, r))
                .cloned(),
            since,
            limit,
            |r| (r.updated_at, r.id),
        ))
    }

    async fn get_inventory_item(&mut self, id: Uuid) -> StorageResult<Option<InventoryItem>> {
        Ok(self.tables.read().inventory_items.get(&id).cloned())
    }

    async fn find_inventory_by_sku(
        &mut self,
        pharmacy_id: Uuid,
        sku: &str,
    ) -> StorageResult<Option<InventoryItem>> {
        let tables = self.tables.read();
        Ok(tables
            .inventory_items
            .values()
            .find(|r| r.pharmacy_id == pharmacy_id && r.sku == sku)
            .cloned())
    }

    async fn insert_inventory_item(&mut self, row: &InventoryItem) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.inventory_items.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(format!(
                "inventory item {}",
                row.id
            )));
        }
        if tables
            .inventory_items
            .values()
            .any(|r| r.pharmacy_id == row.pharmacy_id && r.sku == row.sku)
        {
            return Err(StorageError::DuplicateKey(format!(
                "inventory sku {} for pharmacy {}",
                row.sku, row.pharmacy_id
            )));
        }
        tables.inventory_items.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_inventory_item(
        &mut self,
        row: &InventoryItem,
        expected_version: i64,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write();
        match tables.inventory_items.get_mut(&row.id) {
            Some(current) if current.version == expected_version => {
                *current = row.clone();
                Ok(())
            }
            _ => Err(StorageError::StaleVersion),
        }
    }

    async fn inventory_items_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<InventoryItem>> {
        let tables = self.tables.read();
        Ok(scan(
            tables
                .inventory_items
                .values()
                .filter(|r| !r.is_deleted && inventory_in_scope(scope, r))
                .cloned(),
            since,
            limit,
            |r| (r.updated_at, r.id),
        ))
    }

    async fn get_triage_log(&mut self, id: Uuid) -> StorageResult<Option<TriageLog>> {
        Ok(self.tables.read().triage_logs.get(&id).cloned())
    }

    async fn insert_triage_log(&mut self, row: &TriageLog) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.triage_logs.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(format!("triage log {}", row.id)));
        }
        tables.triage_logs.insert(row.id, row.clone());
        Ok(())
    }

    async fn triage_logs_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<TriageLog>> {
        let tables = self.tables.read();
        Ok(scan(
            tables
                .triage_logs
                .values()
                .filter(|r| triage_in_scope(scope, r))
                .cloned(),
            since,
            limit,
            |r| (r.recorded_at, r.id),
        ))
    }

    async fn get_follow_up_visit(&mut self, id: Uuid) -> StorageResult<Option<FollowUpVisit>> {
        Ok(self.tables.read().follow_up_visits.get(&id).cloned())
    }

    async fn insert_follow_up_visit(&mut self, row: &FollowUpVisit) -> StorageResult<()> {
        let mut tables = self.tables.write();
        if tables.follow_up_visits.contains_key(&row.id) {
            return Err(StorageError::DuplicateKey(format!(
                "follow-up visit {}",
                row.id
            )));
        }
        tables.follow_up_visits.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_follow_up_visit(
        &mut self,
        row: &FollowUpVisit,
        expected_version: i64,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write();
        match tables.follow_up_visits.get_mut(&row.id) {
            Some(current) if current.version == expected_version => {
                *current = row.clone();
                Ok(())
            }
            _ => Err(StorageError::StaleVersion),
        }
    }

    async fn follow_up_visits_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<FollowUpVisit>> {
        let tables = self.tables.read();
        Ok(scan(
            tables
                .follow_up_visits
                .values()
                .filter(|r| follow_up_in_scope(scope, r))
                .cloned(),
            since,
            limit,
            |r| (r.updated_at, r.id),
        ))
    }

    async fn get_checkpoint(
        &mut self,
        actor_id: Uuid,
        device_id: &str,
    ) -> StorageResult<Option<SyncCheckpoint>> {
        let tables = self.tables.read();
        Ok(tables
            .checkpoints
            .get(&(actor_id, device_id.to_string()))
            .cloned())
    }

    async fn save_checkpoint(&mut self, checkpoint: &SyncCheckpoint) -> StorageResult<()> {
        let mut tables = self.tables.write();
        tables.checkpoints.insert(
            (checkpoint.actor_id, checkpoint.device_id.clone()),
            checkpoint.clone(),
        );
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> StorageResult<()> {
        self.tables.write().audit_log.push(entry.clone());
        Ok(())
    }

    async fn audit_entries_before(
        &mut self,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<AuditEntry>> {
        let tables = self.tables.read();
        let mut entries: Vec<AuditEntry> = tables
            .audit_log
            .iter()
            .filter(|e| match before {
                Some(before) => e.created_at < before,
                None => true,
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
