//! Clinical record handler.
//!
//! Encounter and follow-up dates are validated as parseable calendar
//! dates — an unparseable date is a structural error, not a conflict.
//! Updates are restricted to admin or the original creator; diagnosis,
//! treatment, and notes are sealed before writing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_layer::{ClinicalRecord, StorageError, StoreSession};
use uuid::Uuid;

use crate::authz::{self, AuthAction, Ownership};
use crate::cipher::FieldCipher;
use crate::error::{SyncError, SyncResult};
use crate::handlers::{decode_payload, parse_wire_date, EntityHandler, OpContext};
use crate::occ::{self, Gate};
use crate::protocol::{Actor, AppliedResult, EntityType, SyncAction, SyncOperation, MAX_PULL_ROWS};

#[derive(Debug, Deserialize)]
pub struct ClinicalRecordPayload {
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    /// `YYYY-MM-DD`
    pub encounter_date: String,
    pub follow_up_date: Option<String>,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalRecordView {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub created_by: Uuid,
    pub encounter_date: String,
    pub follow_up_date: Option<String>,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn project(row: &ClinicalRecord, cipher: &FieldCipher) -> SyncResult<ClinicalRecordView> {
    Ok(ClinicalRecordView {
        id: row.id,
        patient_id: row.patient_id,
        doctor_id: row.doctor_id,
        created_by: row.created_by,
        encounter_date: row.encounter_date.format("%Y-%m-%d").to_string(),
        follow_up_date: row
            .follow_up_date
            .map(|d| d.format("%Y-%m-%d").to_string()),
        diagnosis: cipher.open(&row.diagnosis)?,
        treatment: cipher.open(&row.treatment)?,
        notes: cipher.open(&row.notes)?,
        version: row.version,
        updated_at: row.updated_at,
    })
}

fn stale_conflict(current: &ClinicalRecord, cipher: &FieldCipher) -> SyncResult<SyncError> {
    Ok(SyncError::VersionConflict {
        server_version: current.version,
        server_data: Some(serde_json::to_value(project(current, cipher)?)?),
    })
}

pub struct ClinicalRecordHandler;

#[async_trait]
impl EntityHandler for ClinicalRecordHandler {
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult> {
        if op.action == SyncAction::Delete {
            return Err(SyncError::Unsupported(
                "clinical records cannot be deleted through sync".to_string(),
            ));
        }

        let payload: ClinicalRecordPayload = decode_payload(&op.data)?;
        let encounter_date = parse_wire_date(&payload.encounter_date, "encounter_date")?;
        let follow_up_date = payload
            .follow_up_date
            .as_deref()
            .map(|d| parse_wire_date(d, "follow_up_date"))
            .transpose()?;

        let existing = match op.entity_id {
            Some(id) => cx.session.get_clinical_record(id).await?,
            None => None,
        };

        match existing {
            Some(current) => {
                if let Gate::Stale { .. } = occ::check(op.base_version, current.version) {
                    return Err(stale_conflict(&current, cx.cipher)?);
                }

                let ownership = if current.created_by == cx.actor.actor_id {
                    Ownership::Owner
                } else {
                    Ownership::None
                };
                authz::authorize(
                    EntityType::ClinicalRecord,
                    AuthAction::Update,
                    cx.actor,
                    ownership,
                )?;

                let row = ClinicalRecord {
                    id: current.id,
                    patient_id: payload.patient_id,
                    doctor_id: payload.doctor_id,
                    created_by: current.created_by,
                    created_by_role: current.created_by_role.clone(),
                    encounter_date,
                    follow_up_date,
                    diagnosis: cx.cipher.seal(&payload.diagnosis)?,
                    treatment: cx.cipher.seal(&payload.treatment)?,
                    notes: cx.cipher.seal(payload.notes.as_deref().unwrap_or(""))?,
                    version: occ::next_version(current.version),
                    created_at: current.created_at,
                    updated_at: cx.now,
                };

                match cx.session.update_clinical_record(&row, current.version).await {
                    Ok(()) => Ok(AppliedResult {
                        op_id: op.op_id.clone(),
                        entity_id: row.id,
                        new_version: row.version,
                    }),
                    Err(StorageError::StaleVersion) => {
                        let fresh =
                            cx.session.get_clinical_record(row.id).await?.ok_or_else(|| {
                                SyncError::NotFound(format!("clinical record {}", row.id))
                            })?;
                        Err(stale_conflict(&fresh, cx.cipher)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                authz::authorize(
                    EntityType::ClinicalRecord,
                    AuthAction::Create,
                    cx.actor,
                    Ownership::None,
                )?;

                let row = ClinicalRecord {
                    id: op.entity_id.unwrap_or_else(Uuid::new_v4),
                    patient_id: payload.patient_id,
                    doctor_id: payload.doctor_id,
                    created_by: cx.actor.actor_id,
                    created_by_role: cx.actor.role.as_str().to_string(),
                    encounter_date,
                    follow_up_date,
                    diagnosis: cx.cipher.seal(&payload.diagnosis)?,
                    treatment: cx.cipher.seal(&payload.treatment)?,
                    notes: cx.cipher.seal(payload.notes.as_deref().unwrap_or(""))?,
                    version: 1,
                    created_at: cx.now,
                    updated_at: cx.now,
                };
                cx.session.insert_clinical_record(&row).await?;

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
) -> SyncResult<Vec<ClinicalRecordView>> {
    let scope = authz::visibility(EntityType::ClinicalRecord, actor);
    if scope.is_none() {
        return Ok(Vec::new());
    }
    let rows = session
        .clinical_records_since(&scope, since, MAX_PULL_ROWS)
        .await?;
    rows.iter().map(|row| project(row, cipher)).collect()
}
