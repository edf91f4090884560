//! Postgres store.
//!
//! Runtime-checked sqlx queries over one `Transaction` per session.
//! Every update is conditional on the version the caller read
//! (`WHERE id = $1 AND version = $2`), so a concurrent writer that got
//! there first makes the statement match zero rows and the caller gets
//! `StorageError::StaleVersion` instead of a lost update. The schema
//! this backend expects is in `schema.sql` at the crate root.

use async_trait::async_trait;
use audit_engine::AuditEntry;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{
    Appointment, ClinicalRecord, FollowUpVisit, InventoryItem, MedicineLine, Prescription,
    SyncCheckpoint, TriageLog,
};
use crate::scope::RecordScope;
use crate::store::{StoreSession, SyncStore};

/// Connection-pooled Postgres store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with a default pool configuration
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn begin(&self) -> StorageResult<Box<dyn StoreSession>> {
        debug!("beginning storage transaction");
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }
}

struct PgSession {
    tx: Transaction<'static, Postgres>,
}

/// Prescription header row; medicine lines live in a child table and are
/// hydrated separately.
#[derive(sqlx::FromRow)]
struct PrescriptionRow {
    id: Uuid,
    patient_id: Uuid,
    prescribed_by: Uuid,
    pharmacy_id: Option<Uuid>,
    status: String,
    notes: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct MedicineRow {
    prescription_id: Uuid,
    name: String,
    dosage: String,
    frequency: String,
    duration_days: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Uuid,
    action: String,
    entity_type: Option<String>,
    entity_id: Option<Uuid>,
    summary: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            summary: row.summary,
            created_at: row.created_at,
        }
    }
}

impl PgSession {
    fn assemble_prescription(row: PrescriptionRow, medicines: Vec<MedicineLine>) -> Prescription {
        Prescription {
            id: row.id,
            patient_id: row.patient_id,
            prescribed_by: row.prescribed_by,
            pharmacy_id: row.pharmacy_id,
            status: row.status,
            notes: row.notes,
            medicines,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    async fn insert_medicine_lines(
        &mut self,
        prescription_id: Uuid,
        medicines: &[MedicineLine],
    ) -> StorageResult<()> {
        for (position, line) in medicines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO prescription_medicines
                    (prescription_id, position, name, dosage, frequency, duration_days)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(prescription_id)
            .bind(position as i32)
            .bind(&line.name)
            .bind(&line.dosage)
            .bind(&line.frequency)
            .bind(line.duration_days)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn medicine_lines_for(
        &mut self,
        ids: &[Uuid],
    ) -> StorageResult<Vec<(Uuid, MedicineLine)>> {
        let rows: Vec<MedicineRow> = sqlx::query_as::<_, MedicineRow>(
            r#"
            SELECT prescription_id, name, dosage, frequency, duration_days
            FROM prescription_medicines
            WHERE prescription_id = ANY($1)
            ORDER BY prescription_id, position
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.prescription_id,
                    MedicineLine {
                        name: r.name,
                        dosage: r.dosage,
                        frequency: r.frequency,
                        duration_days: r.duration_days,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn get_appointment(&mut self, id: Uuid) -> StorageResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_appointment(&mut self, row: &Appointment) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO appointments
                (id, patient_id, doctor_id, worker_id, scheduled_at, status, reason,
                 version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(row.id)
        .bind(row.patient_id)
        .bind(row.doctor_id)
        .bind(row.worker_id)
        .bind(row.scheduled_at)
        .bind(&row.status)
        .bind(&row.reason)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_appointment(
        &mut self,
        row: &Appointment,
        expected_version: i64,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET patient_id = $3, doctor_id = $4, worker_id = $5, scheduled_at = $6,
                status = $7, reason = $8, version = $9, updated_at = $10
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(row.id)
        .bind(expected_version)
        .bind(row.patient_id)
        .bind(row.doctor_id)
        .bind(row.worker_id)
        .bind(row.scheduled_at)
        .bind(&row.status)
        .bind(&row.reason)
        .bind(row.version)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::StaleVersion);
        }
        Ok(())
    }

    async fn appointments_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<Appointment>> {
        let rows = match scope {
            RecordScope::All => {
                sqlx::query_as::<_, Appointment>(
                    r#"
                    SELECT * FROM appointments
                    WHERE ($1::timestamptz IS NULL OR updated_at > $1)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Participant(actor) => {
                sqlx::query_as::<_, Appointment>(
                    r#"
                    SELECT * FROM appointments
                    WHERE (patient_id = $1 OR doctor_id = $1 OR worker_id = $1)
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*actor)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            _ => Vec::new(),
        };
        Ok(rows)
    }

    async fn get_clinical_record(&mut self, id: Uuid) -> StorageResult<Option<ClinicalRecord>> {
        let row =
            sqlx::query_as::<_, ClinicalRecord>("SELECT * FROM clinical_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row)
    }

    async fn insert_clinical_record(&mut self, row: &ClinicalRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO clinical_records
                (id, patient_id, doctor_id, created_by, created_by_role, encounter_date,
                 follow_up_date, diagnosis, treatment, notes, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(row.id)
        .bind(row.patient_id)
        .bind(row.doctor_id)
        .bind(row.created_by)
        .bind(&row.created_by_role)
        .bind(row.encounter_date)
        .bind(row.follow_up_date)
        .bind(&row.diagnosis)
        .bind(&row.treatment)
        .bind(&row.notes)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_clinical_record(
        &mut self,
        row: &ClinicalRecord,
        expected_version: i64,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE clinical_records
            SET patient_id = $3, doctor_id = $4, encounter_date = $5, follow_up_date = $6,
                diagnosis = $7, treatment = $8, notes = $9, version = $10, updated_at = $11
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(row.id)
        .bind(expected_version)
        .bind(row.patient_id)
        .bind(row.doctor_id)
        .bind(row.encounter_date)
        .bind(row.follow_up_date)
        .bind(&row.diagnosis)
        .bind(&row.treatment)
        .bind(&row.notes)
        .bind(row.version)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::StaleVersion);
        }
        Ok(())
    }

    async fn clinical_records_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<ClinicalRecord>> {
        let rows = match scope {
            RecordScope::All => {
                sqlx::query_as::<_, ClinicalRecord>(
                    r#"
                    SELECT * FROM clinical_records
                    WHERE ($1::timestamptz IS NULL OR updated_at > $1)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Patient(patient) => {
                sqlx::query_as::<_, ClinicalRecord>(
                    r#"
                    SELECT * FROM clinical_records
                    WHERE patient_id = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*patient)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Author(actor) => {
                sqlx::query_as::<_, ClinicalRecord>(
                    r#"
                    SELECT * FROM clinical_records
                    WHERE created_by = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*actor)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::AuthorOrDoctor(actor) => {
                sqlx::query_as::<_, ClinicalRecord>(
                    r#"
                    SELECT * FROM clinical_records
                    WHERE (created_by = $1 OR doctor_id = $1)
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*actor)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            _ => Vec::new(),
        };
        Ok(rows)
    }

    async fn get_prescription(&mut self, id: Uuid) -> StorageResult<Option<Prescription>> {
        let row =
            sqlx::query_as::<_, PrescriptionRow>("SELECT * FROM prescriptions WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        match row {
            Some(row) => {
                let medicines = self
                    .medicine_lines_for(&[row.id])
                    .await?
                    .into_iter()
                    .map(|(_, line)| line)
                    .collect();
                Ok(Some(Self::assemble_prescription(row, medicines)))
            }
            None => Ok(None),
        }
    }

    async fn insert_prescription(&mut self, row: &Prescription) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO prescriptions
                (id, patient_id, prescribed_by, pharmacy_id, status, notes,
                 version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.id)
        .bind(row.patient_id)
        .bind(row.prescribed_by)
        .bind(row.pharmacy_id)
        .bind(&row.status)
        .bind(&row.notes)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;

        self.insert_medicine_lines(row.id, &row.medicines).await
    }

    async fn update_prescription(
        &mut self,
        row: &Prescription,
        expected_version: i64,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE prescriptions
            SET patient_id = $3, pharmacy_id = $4, status = $5, notes = $6,
                version = $7, updated_at = $8
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(row.id)
        .bind(expected_version)
        .bind(row.patient_id)
        .bind(row.pharmacy_id)
        .bind(&row.status)
        .bind(&row.notes)
        .bind(row.version)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::StaleVersion);
        }

        // Replace the medicine lines wholesale
        sqlx::query("DELETE FROM prescription_medicines WHERE prescription_id = $1")
            .bind(row.id)
            .execute(&mut *self.tx)
            .await?;
        self.insert_medicine_lines(row.id, &row.medicines).await
    }

    async fn prescriptions_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<Prescription>> {
        let rows: Vec<PrescriptionRow> = match scope {
            RecordScope::All => {
                sqlx::query_as::<_, PrescriptionRow>(
                    r#"
                    SELECT * FROM prescriptions
                    WHERE ($1::timestamptz IS NULL OR updated_at > $1)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Patient(patient) => {
                sqlx::query_as::<_, PrescriptionRow>(
                    r#"
                    SELECT * FROM prescriptions
                    WHERE patient_id = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*patient)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Prescriber(doctor) => {
                sqlx::query_as::<_, PrescriptionRow>(
                    r#"
                    SELECT * FROM prescriptions
                    WHERE prescribed_by = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*doctor)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Pharmacy(pharmacy) => {
                sqlx::query_as::<_, PrescriptionRow>(
                    r#"
                    SELECT * FROM prescriptions
                    WHERE pharmacy_id = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*pharmacy)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            _ => Vec::new(),
        };

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut lines_by_id: std::collections::HashMap<Uuid, Vec<MedicineLine>> =
            std::collections::HashMap::new();
        for (prescription_id, line) in self.medicine_lines_for(&ids).await? {
            lines_by_id.entry(prescription_id).or_default().push(line);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let medicines = lines_by_id.remove(&row.id).unwrap_or_default();
                Self::assemble_prescription(row, medicines)
            })
            .collect())
    }

    async fn get_inventory_item(&mut self, id: Uuid) -> StorageResult<Option<InventoryItem>> {
        let row = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn find_inventory_by_sku(
        &mut self,
        pharmacy_id: Uuid,
        sku: &str,
    ) -> StorageResult<Option<InventoryItem>> {
        let row = sqlx::query_as::<_, InventoryItem>(
            "SELECT * FROM inventory_items WHERE pharmacy_id = $1 AND sku = $2",
        )
        .bind(pharmacy_id)
        .bind(sku)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn insert_inventory_item(&mut self, row: &InventoryItem) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items
                (id, pharmacy_id, sku, name, quantity, unit, expiry_date, is_deleted,
                 version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(row.id)
        .bind(row.pharmacy_id)
        .bind(&row.sku)
        .bind(&row.name)
        .bind(row.quantity)
        .bind(&row.unit)
        .bind(row.expiry_date)
        .bind(row.is_deleted)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_inventory_item(
        &mut self,
        row: &InventoryItem,
        expected_version: i64,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET name = $3, quantity = $4, unit = $5, expiry_date = $6, is_deleted = $7,
                version = $8, updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(row.id)
        .bind(expected_version)
        .bind(&row.name)
        .bind(row.quantity)
        .bind(&row.unit)
        .bind(row.expiry_date)
        .bind(row.is_deleted)
        .bind(row.version)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::StaleVersion);
        }
        Ok(())
    }

    async fn inventory_items_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<InventoryItem>> {
        let rows = match scope {
            RecordScope::All => {
                sqlx::query_as::<_, InventoryItem>(
                    r#"
                    SELECT * FROM inventory_items
                    WHERE is_deleted = false
                      AND ($1::timestamptz IS NULL OR updated_at > $1)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Pharmacy(pharmacy) => {
                sqlx::query_as::<_, InventoryItem>(
                    r#"
                    SELECT * FROM inventory_items
                    WHERE pharmacy_id = $1 AND is_deleted = false
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*pharmacy)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            _ => Vec::new(),
        };
        Ok(rows)
    }

    async fn get_triage_log(&mut self, id: Uuid) -> StorageResult<Option<TriageLog>> {
        let row = sqlx::query_as::<_, TriageLog>("SELECT * FROM triage_logs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_triage_log(&mut self, row: &TriageLog) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO triage_logs
                (id, patient_id, recorded_by, recorded_by_role, symptoms, severity, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id)
        .bind(row.patient_id)
        .bind(row.recorded_by)
        .bind(&row.recorded_by_role)
        .bind(&row.symptoms)
        .bind(&row.severity)
        .bind(row.recorded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn triage_logs_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<TriageLog>> {
        let rows = match scope {
            RecordScope::All => {
                sqlx::query_as::<_, TriageLog>(
                    r#"
                    SELECT * FROM triage_logs
                    WHERE ($1::timestamptz IS NULL OR recorded_at > $1)
                    ORDER BY recorded_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Patient(patient) => {
                sqlx::query_as::<_, TriageLog>(
                    r#"
                    SELECT * FROM triage_logs
                    WHERE patient_id = $1
                      AND ($2::timestamptz IS NULL OR recorded_at > $2)
                    ORDER BY recorded_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*patient)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::AuthorRole(role) => {
                sqlx::query_as::<_, TriageLog>(
                    r#"
                    SELECT * FROM triage_logs
                    WHERE recorded_by_role = $1
                      AND ($2::timestamptz IS NULL OR recorded_at > $2)
                    ORDER BY recorded_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(role)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            _ => Vec::new(),
        };
        Ok(rows)
    }

    async fn get_follow_up_visit(&mut self, id: Uuid) -> StorageResult<Option<FollowUpVisit>> {
        let row =
            sqlx::query_as::<_, FollowUpVisit>("SELECT * FROM follow_up_visits WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row)
    }

    async fn insert_follow_up_visit(&mut self, row: &FollowUpVisit) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO follow_up_visits
                (id, patient_id, worker_id, due_date, status, notes,
                 version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(row.id)
        .bind(row.patient_id)
        .bind(row.worker_id)
        .bind(row.due_date)
        .bind(&row.status)
        .bind(&row.notes)
        .bind(row.version)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_follow_up_visit(
        &mut self,
        row: &FollowUpVisit,
        expected_version: i64,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE follow_up_visits
            SET patient_id = $3, worker_id = $4, due_date = $5, status = $6, notes = $7,
                version = $8, updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(row.id)
        .bind(expected_version)
        .bind(row.patient_id)
        .bind(row.worker_id)
        .bind(row.due_date)
        .bind(&row.status)
        .bind(&row.notes)
        .bind(row.version)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::StaleVersion);
        }
        Ok(())
    }

    async fn follow_up_visits_since(
        &mut self,
        scope: &RecordScope,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<FollowUpVisit>> {
        let rows = match scope {
            RecordScope::All => {
                sqlx::query_as::<_, FollowUpVisit>(
                    r#"
                    SELECT * FROM follow_up_visits
                    WHERE ($1::timestamptz IS NULL OR updated_at > $1)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $2
                    "#,
                )
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Patient(patient) => {
                sqlx::query_as::<_, FollowUpVisit>(
                    r#"
                    SELECT * FROM follow_up_visits
                    WHERE patient_id = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*patient)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            RecordScope::Worker(worker) => {
                sqlx::query_as::<_, FollowUpVisit>(
                    r#"
                    SELECT * FROM follow_up_visits
                    WHERE worker_id = $1
                      AND ($2::timestamptz IS NULL OR updated_at > $2)
                    ORDER BY updated_at ASC, id ASC
                    LIMIT $3
                    "#,
                )
                .bind(*worker)
                .bind(since)
                .bind(limit)
                .fetch_all(&mut *self.tx)
                .await?
            }
            _ => Vec::new(),
        };
        Ok(rows)
    }

    async fn get_checkpoint(
        &mut self,
        actor_id: Uuid,
        device_id: &str,
    ) -> StorageResult<Option<SyncCheckpoint>> {
        let row = sqlx::query_as::<_, SyncCheckpoint>(
            "SELECT * FROM sync_checkpoints WHERE actor_id = $1 AND device_id = $2",
        )
        .bind(actor_id)
        .bind(device_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn save_checkpoint(&mut self, checkpoint: &SyncCheckpoint) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints
                (actor_id, device_id, last_pushed_at, last_pulled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (actor_id, device_id) DO UPDATE
            SET last_pushed_at = EXCLUDED.last_pushed_at,
                last_pulled_at = EXCLUDED.last_pulled_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(checkpoint.actor_id)
        .bind(&checkpoint.device_id)
        .bind(checkpoint.last_pushed_at)
        .bind(checkpoint.last_pulled_at)
        .bind(checkpoint.created_at)
        .bind(checkpoint.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, actor_id, action, entity_type, entity_id, summary, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.summary.clone())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn audit_entries_before(
        &mut self,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StorageResult<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT * FROM audit_log
            WHERE ($1::timestamptz IS NULL OR created_at < $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(before)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        debug!("committing storage transaction");
        let session = *self;
        session.tx.commit().await?;
        Ok(())
    }
}
