//! Entity handlers.
//!
//! One handler per entity type, selected through a closed dispatch over
//! `EntityType` — adding an entity is a compile-time-checked addition,
//! not a new branch in a monolithic function. Every handler runs the
//! same sequence for a push operation: decode the payload, resolve the
//! target id, fetch the existing record, run the version gate, run the
//! authorization matrix, seal protected fields, write. Handlers also own
//! their wire projection (decryption included) and their pull
//! collection.

pub mod appointment;
pub mod clinical_record;
pub mod follow_up;
pub mod inventory;
pub mod prescription;
pub mod triage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use storage_layer::StoreSession;

use crate::cipher::FieldCipher;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Actor, AppliedResult, EntityType, SyncOperation};

/// Everything one operation needs: the batch transaction, the field
/// cipher, the acting identity, and the batch's single wall-clock
/// instant. Passed explicitly into every handler call.
pub struct OpContext<'a> {
    pub session: &'a mut dyn StoreSession,
    pub cipher: &'a FieldCipher,
    pub actor: &'a Actor,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait EntityHandler: Send + Sync {
    /// Apply one push operation, returning the applied result or the
    /// error the orchestrator converts into a conflict.
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult>;
}

/// Closed dispatch table over the entity sum type.
pub fn for_entity(entity: EntityType) -> &'static dyn EntityHandler {
    match entity {
        EntityType::Appointment => &appointment::AppointmentHandler,
        EntityType::ClinicalRecord => &clinical_record::ClinicalRecordHandler,
        EntityType::Prescription => &prescription::PrescriptionHandler,
        EntityType::InventoryItem => &inventory::InventoryHandler,
        EntityType::TriageLog => &triage::TriageHandler,
        EntityType::FollowUpVisit => &follow_up::FollowUpHandler,
    }
}

/// Decode an entity-shaped payload; a shape mismatch is a structural
/// error, not a conflict with server state.
pub(crate) fn decode_payload<T: DeserializeOwned>(data: &serde_json::Value) -> SyncResult<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| SyncError::Structural(format!("invalid payload: {e}")))
}

/// Parse a wire calendar date (`YYYY-MM-DD`).
pub(crate) fn parse_wire_date(value: &str, field: &str) -> SyncResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| SyncError::Structural(format!("{field} is not a valid date: {value}")))
}
