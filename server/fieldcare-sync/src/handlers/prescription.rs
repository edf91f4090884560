//! Prescription handler.
//!
//! Updates are restricted to admin or the prescribing doctor, and fully
//! replace the medicine line-items — delete-then-recreate, never a
//! merge. The prescriber is fixed at create time; only an admin payload
//! may name a prescriber other than the acting doctor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_layer::{MedicineLine, Prescription, StorageError, StoreSession};
use uuid::Uuid;

use crate::authz::{self, AuthAction, Ownership};
use crate::cipher::FieldCipher;
use crate::error::{SyncError, SyncResult};
use crate::handlers::{decode_payload, EntityHandler, OpContext};
use crate::occ::{self, Gate};
use crate::protocol::{
    Actor, ActorRole, AppliedResult, EntityType, SyncAction, SyncOperation, MAX_PULL_ROWS,
};

const DEFAULT_STATUS: &str = "active";

#[derive(Debug, Deserialize)]
pub struct MedicineLinePayload {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionPayload {
    pub patient_id: Uuid,
    /// Admin-only override; other roles always prescribe as themselves
    pub prescribed_by: Option<Uuid>,
    pub pharmacy_id: Option<Uuid>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub medicines: Vec<MedicineLinePayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineLineView {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionView {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub prescribed_by: Uuid,
    pub pharmacy_id: Option<Uuid>,
    pub status: String,
    pub notes: String,
    pub medicines: Vec<MedicineLineView>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

fn lines_from_payload(payload: Vec<MedicineLinePayload>) -> SyncResult<Vec<MedicineLine>> {
    if payload.is_empty() {
        return Err(SyncError::Structural(
            "a prescription needs at least one medicine line".to_string(),
        ));
    }
    Ok(payload
        .into_iter()
        .map(|line| MedicineLine {
            name: line.name,
            dosage: line.dosage,
            frequency: line.frequency,
            duration_days: line.duration_days,
        })
        .collect())
}

pub(crate) fn project(row: &Prescription, cipher: &FieldCipher) -> SyncResult<PrescriptionView> {
    Ok(PrescriptionView {
        id: row.id,
        patient_id: row.patient_id,
        prescribed_by: row.prescribed_by,
        pharmacy_id: row.pharmacy_id,
        status: row.status.clone(),
        notes: cipher.open(&row.notes)?,
        medicines: row
            .medicines
            .iter()
            .map(|line| MedicineLineView {
                name: line.name.clone(),
                dosage: line.dosage.clone(),
                frequency: line.frequency.clone(),
                duration_days: line.duration_days,
            })
            .collect(),
        version: row.version,
        updated_at: row.updated_at,
    })
}

fn stale_conflict(current: &Prescription, cipher: &FieldCipher) -> SyncResult<SyncError> {
    Ok(SyncError::VersionConflict {
        server_version: current.version,
        server_data: Some(serde_json::to_value(project(current, cipher)?)?),
    })
}

pub struct PrescriptionHandler;

#[async_trait]
impl EntityHandler for PrescriptionHandler {
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult> {
        if op.action == SyncAction::Delete {
            return Err(SyncError::Unsupported(
                "prescriptions cannot be deleted through sync".to_string(),
            ));
        }

        let payload: PrescriptionPayload = decode_payload(&op.data)?;

        let existing = match op.entity_id {
            Some(id) => cx.session.get_prescription(id).await?,
            None => None,
        };

        match existing {
            Some(current) => {
                if let Gate::Stale { .. } = occ::check(op.base_version, current.version) {
                    return Err(stale_conflict(&current, cx.cipher)?);
                }

                let ownership = if current.prescribed_by == cx.actor.actor_id {
                    Ownership::Owner
                } else {
                    Ownership::None
                };
                authz::authorize(
                    EntityType::Prescription,
                    AuthAction::Update,
                    cx.actor,
                    ownership,
                )?;

                let row = Prescription {
                    id: current.id,
                    patient_id: payload.patient_id,
                    prescribed_by: current.prescribed_by,
                    pharmacy_id: payload.pharmacy_id,
                    status: payload.status.unwrap_or_else(|| current.status.clone()),
                    notes: cx.cipher.seal(payload.notes.as_deref().unwrap_or(""))?,
                    medicines: lines_from_payload(payload.medicines)?,
                    version: occ::next_version(current.version),
                    created_at: current.created_at,
                    updated_at: cx.now,
                };

                match cx.session.update_prescription(&row, current.version).await {
                    Ok(()) => Ok(AppliedResult {
                        op_id: op.op_id.clone(),
                        entity_id: row.id,
                        new_version: row.version,
                    }),
                    Err(StorageError::StaleVersion) => {
                        let fresh = cx.session.get_prescription(row.id).await?.ok_or_else(|| {
                            SyncError::NotFound(format!("prescription {}", row.id))
                        })?;
                        Err(stale_conflict(&fresh, cx.cipher)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                authz::authorize(
                    EntityType::Prescription,
                    AuthAction::Create,
                    cx.actor,
                    Ownership::None,
                )?;

                let prescribed_by = if cx.actor.role == ActorRole::Admin {
                    payload.prescribed_by.unwrap_or(cx.actor.actor_id)
                } else {
                    cx.actor.actor_id
                };

                let row = Prescription {
                    id: op.entity_id.unwrap_or_else(Uuid::new_v4),
                    patient_id: payload.patient_id,
                    prescribed_by,
                    pharmacy_id: payload.pharmacy_id,
                    status: payload.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
                    notes: cx.cipher.seal(payload.notes.as_deref().unwrap_or(""))?,
                    medicines: lines_from_payload(payload.medicines)?,
                    version: 1,
                    created_at: cx.now,
                    updated_at: cx.now,
                };
                cx.session.insert_prescription(&row).await?;

                Ok(AppliedResult {
                    op_id: op.op_id.clone(),
                    entity_id: row.id,
                    new_version: 1,
                })
            }
        }
    }
}

pub(crate) async fn collect(
    session: &mut dyn StoreSession,
    cipher: &FieldCipher,
    actor: &Actor,
    since: Option<DateTime<Utc>>,
) -> SyncResult<Vec<PrescriptionView>> {
    let scope = authz::visibility(EntityType::Prescription, actor);
    if scope.is_none() {
        return Ok(Vec::new());
    }
    let rows = session
        .prescriptions_since(&scope, since, MAX_PULL_ROWS)
        .await?;
    rows.iter().map(|row| project(row, cipher)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_medicine_list_is_structural() {
        assert!(matches!(
            lines_from_payload(Vec::new()),
            Err(SyncError::Structural(_))
        ));
    }
}
