//! Appointment handler.
//!
//! The wire format carries the schedule as separate `date` and `time`
//! fields; they are combined into one instant server-side and split back
//! on projection. Mutation requires the actor to be a participant
//! (patient, doctor, or assigned worker) or admin; delete is never
//! supported.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use storage_layer::{Appointment, StorageError, StoreSession};
use uuid::Uuid;

use crate::authz::{self, AuthAction, Ownership};
use crate::cipher::FieldCipher;
use crate::error::{SyncError, SyncResult};
use crate::handlers::{decode_payload, parse_wire_date, EntityHandler, OpContext};
use crate::occ::{self, Gate};
use crate::protocol::{Actor, AppliedResult, EntityType, SyncAction, SyncOperation, MAX_PULL_ROWS};

const DEFAULT_STATUS: &str = "scheduled";

#[derive(Debug, Deserialize)]
pub struct AppointmentPayload {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub worker_id: Option<Uuid>,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    pub reason: String,
    pub status: Option<String>,
}

/// Wire projection with protected fields decrypted and the schedule
/// split back into date and time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub worker_id: Option<Uuid>,
    pub date: String,
    pub time: String,
    pub reason: String,
    pub status: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

fn combine_schedule(date: &str, time: &str) -> SyncResult<DateTime<Utc>> {
    let date = parse_wire_date(date, "date")?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| SyncError::Structural(format!("time is not a valid HH:MM value: {time}")))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

pub(crate) fn project(row: &Appointment, cipher: &FieldCipher) -> SyncResult<AppointmentView> {
    Ok(AppointmentView {
        id: row.id,
        patient_id: row.patient_id,
        doctor_id: row.doctor_id,
        worker_id: row.worker_id,
        date: row.scheduled_at.format("%Y-%m-%d").to_string(),
        time: row.scheduled_at.format("%H:%M").to_string(),
        reason: cipher.open(&row.reason)?,
        status: row.status.clone(),
        version: row.version,
        updated_at: row.updated_at,
    })
}

fn participant(actor: &Actor, patient: Uuid, doctor: Uuid, worker: Option<Uuid>) -> Ownership {
    if actor.actor_id == patient || actor.actor_id == doctor || worker == Some(actor.actor_id) {
        Ownership::Owner
    } else {
        Ownership::None
    }
}

fn stale_conflict(current: &Appointment, cipher: &FieldCipher) -> SyncResult<SyncError> {
    Ok(SyncError::VersionConflict {
        server_version: current.version,
        server_data: Some(serde_json::to_value(project(current, cipher)?)?),
    })
}

pub struct AppointmentHandler;

#[async_trait]
impl EntityHandler for AppointmentHandler {
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult> {
        if op.action == SyncAction::Delete {
            return Err(SyncError::Unsupported(
                "appointments cannot be deleted through sync".to_string(),
            ));
        }

        let payload: AppointmentPayload = decode_payload(&op.data)?;
        let scheduled_at = combine_schedule(&payload.date, &payload.time)?;

        let existing = match op.entity_id {
            Some(id) => cx.session.get_appointment(id).await?,
            None => None,
        };

        match existing {
            Some(current) => {
                if let Gate::Stale { .. } = occ::check(op.base_version, current.version) {
                    return Err(stale_conflict(&current, cx.cipher)?);
                }

                let ownership = participant(
                    cx.actor,
                    current.patient_id,
                    current.doctor_id,
                    current.worker_id,
                );
                authz::authorize(EntityType::Appointment, AuthAction::Update, cx.actor, ownership)?;

                let row = Appointment {
                    id: current.id,
                    patient_id: payload.patient_id,
                    doctor_id: payload.doctor_id,
                    worker_id: payload.worker_id,
                    scheduled_at,
                    status: payload.status.unwrap_or_else(|| current.status.clone()),
                    reason: cx.cipher.seal(&payload.reason)?,
                    version: occ::next_version(current.version),
                    created_at: current.created_at,
                    updated_at: cx.now,
                };

                match cx.session.update_appointment(&row, current.version).await {
                    Ok(()) => Ok(AppliedResult {
                        op_id: op.op_id.clone(),
                        entity_id: row.id,
                        new_version: row.version,
                    }),
                    Err(StorageError::StaleVersion) => {
                        // Lost a compare-and-swap race after the gate passed
                        let fresh = cx.session.get_appointment(row.id).await?.ok_or_else(|| {
                            SyncError::NotFound(format!("appointment {}", row.id))
                        })?;
                        Err(stale_conflict(&fresh, cx.cipher)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                let ownership = participant(
                    cx.actor,
                    payload.patient_id,
                    payload.doctor_id,
                    payload.worker_id,
                );
                authz::authorize(EntityType::Appointment, AuthAction::Create, cx.actor, ownership)?;

                let row = Appointment {
                    id: op.entity_id.unwrap_or_else(Uuid::new_v4),
                    patient_id: payload.patient_id,
                    doctor_id: payload.doctor_id,
                    worker_id: payload.worker_id,
                    scheduled_at,
                    status: payload.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
                    reason: cx.cipher.seal(&payload.reason)?,
                    version: 1,
                    created_at: cx.now,
                    updated_at: cx.now,
                };
                cx.session.insert_appointment(&row).await?;

                Ok(AppliedResult {
                    op_id: op.op_id.clone(),
                    entity_id: row.id,
                    new_version: 1,
                })
            }
        }
    }
}

/// Role-scoped changes for one pull.
pub(crate) async fn collect(
    session: &mut dyn StoreSession,
    cipher: &FieldCipher,
    actor: &Actor,
    since: Option<DateTime<Utc>>,
) -> SyncResult<Vec<AppointmentView>> {
    let scope = authz::visibility(EntityType::Appointment, actor);
    if scope.is_none() {
        return Ok(Vec::new());
    }
    let rows = session.appointments_since(&scope, since, MAX_PULL_ROWS).await?;
    rows.iter().map(|row| project(row, cipher)).collect()
}
