//! Persisted entity records.
//!
//! All mutable entities share the same versioning shape: `version` starts
//! at 1 on creation and is incremented by exactly 1 on every accepted
//! update, never decremented, skipped, or reused. Protected clinical
//! fields (`reason`, `diagnosis`, `treatment`, `notes`, `symptoms`) hold
//! ciphertext at rest; the sync engine seals them before writing and
//! opens them on projection.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled encounter between a patient and a clinician, optionally
/// attended by a field worker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub worker_id: Option<Uuid>,
    /// Combined scheduling instant; the wire format carries date and time
    /// separately and they are joined/split at the projection boundary.
    pub scheduled_at: DateTime<Utc>,
    pub status: String,
    /// Encrypted at rest
    pub reason: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A clinical encounter note.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClinicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Assigned clinician, if any
    pub doctor_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_by_role: String,
    pub encounter_date: NaiveDate,
    pub follow_up_date: Option<NaiveDate>,
    /// Encrypted at rest
    pub diagnosis: String,
    /// Encrypted at rest
    pub treatment: String,
    /// Encrypted at rest
    pub notes: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One medicine line on a prescription. Lines are replaced wholesale on
/// every prescription update, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineLine {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub prescribed_by: Uuid,
    /// Pharmacy the prescription is routed to, if any
    pub pharmacy_id: Option<Uuid>,
    pub status: String,
    /// Encrypted at rest
    pub notes: String,
    pub medicines: Vec<MedicineLine>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pharmacy stock. Uniquely keyed by (pharmacy_id, sku) in addition to
/// id, and the only entity supporting delete through the sync protocol
/// (soft delete).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct InventoryItem {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub unit: String,
    pub expiry_date: Option<NaiveDate>,
    pub is_deleted: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable triage observation. Append-only: no version column, no
/// update path, idempotent create on id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TriageLog {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub recorded_by: Uuid,
    pub recorded_by_role: String,
    /// Encrypted at rest
    pub symptoms: String,
    pub severity: String,
    pub recorded_at: DateTime<Utc>,
}

/// A follow-up visit owned by the responsible field worker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowUpVisit {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub worker_id: Uuid,
    pub due_date: NaiveDate,
    pub status: String,
    /// Encrypted at rest
    pub notes: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per (actor, device) sync bookkeeping. Created on the first sync call
/// for a device, updated on every subsequent call, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncCheckpoint {
    pub actor_id: Uuid,
    pub device_id: String,
    pub last_pushed_at: Option<DateTime<Utc>>,
    pub last_pulled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
