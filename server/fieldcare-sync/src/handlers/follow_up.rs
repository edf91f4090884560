//! Follow-up visit handler.
//!
//! Restricted to field workers and admin. A field worker may only act on
//! visits assigned to them and may not reassign the responsible worker;
//! reassignment is admin-only, at create time as well as on update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_layer::{FollowUpVisit, StorageError, StoreSession};
use uuid::Uuid;

use crate::authz::{self, AuthAction, Ownership};
use crate::cipher::FieldCipher;
use crate::error::{SyncError, SyncResult};
use crate::handlers::{decode_payload, parse_wire_date, EntityHandler, OpContext};
use crate::occ::{self, Gate};
use crate::protocol::{
    Actor, ActorRole, AppliedResult, EntityType, SyncAction, SyncOperation, MAX_PULL_ROWS,
};

const DEFAULT_STATUS: &str = "pending";

#[derive(Debug, Deserialize)]
pub struct FollowUpPayload {
    pub patient_id: Uuid,
    /// Defaults to the acting field worker when absent
    pub worker_id: Option<Uuid>,
    /// `YYYY-MM-DD`
    pub due_date: String,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpVisitView {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub worker_id: Uuid,
    pub due_date: String,
    pub status: String,
    pub notes: String,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn project(row: &FollowUpVisit, cipher: &FieldCipher) -> SyncResult<FollowUpVisitView> {
    Ok(FollowUpVisitView {
        id: row.id,
        patient_id: row.patient_id,
        worker_id: row.worker_id,
        due_date: row.due_date.format("%Y-%m-%d").to_string(),
        status: row.status.clone(),
        notes: cipher.open(&row.notes)?,
        version: row.version,
        updated_at: row.updated_at,
    })
}

fn stale_conflict(current: &FollowUpVisit, cipher: &FieldCipher) -> SyncResult<SyncError> {
    Ok(SyncError::VersionConflict {
        server_version: current.version,
        server_data: Some(serde_json::to_value(project(current, cipher)?)?),
    })
}

pub struct FollowUpHandler;

#[async_trait]
impl EntityHandler for FollowUpHandler {
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult> {
        if op.action == SyncAction::Delete {
            return Err(SyncError::Unsupported(
                "follow-up visits cannot be deleted through sync".to_string(),
            ));
        }

        let payload: FollowUpPayload = decode_payload(&op.data)?;
        let due_date = parse_wire_date(&payload.due_date, "due_date")?;

        let existing = match op.entity_id {
            Some(id) => cx.session.get_follow_up_visit(id).await?,
            None => None,
        };

        match existing {
            Some(current) => {
                if let Gate::Stale { .. } = occ::check(op.base_version, current.version) {
                    return Err(stale_conflict(&current, cx.cipher)?);
                }

                let ownership = if current.worker_id == cx.actor.actor_id {
                    Ownership::Owner
                } else {
                    Ownership::None
                };
                authz::authorize(
                    EntityType::FollowUpVisit,
                    AuthAction::Update,
                    cx.actor,
                    ownership,
                )?;

                let worker_id = payload.worker_id.unwrap_or(current.worker_id);
                if worker_id != current.worker_id && cx.actor.role != ActorRole::Admin {
                    return Err(SyncError::Forbidden(
                        "only admin may reassign the responsible worker".to_string(),
                    ));
                }

                let row = FollowUpVisit {
                    id: current.id,
                    patient_id: payload.patient_id,
                    worker_id,
                    due_date,
                    status: payload.status.unwrap_or_else(|| current.status.clone()),
                    notes: cx.cipher.seal(payload.notes.as_deref().unwrap_or(""))?,
                    version: occ::next_version(current.version),
                    created_at: current.created_at,
                    updated_at: cx.now,
                };

                match cx.session.update_follow_up_visit(&row, current.version).await {
                    Ok(()) => Ok(AppliedResult {
                        op_id: op.op_id.clone(),
                        entity_id: row.id,
                        new_version: row.version,
                    }),
                    Err(StorageError::StaleVersion) => {
                        let fresh =
                            cx.session.get_follow_up_visit(row.id).await?.ok_or_else(|| {
                                SyncError::NotFound(format!("follow-up visit {}", row.id))
                            })?;
                        Err(stale_conflict(&fresh, cx.cipher)?)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            None => {
                let worker_id = payload.worker_id.unwrap_or(cx.actor.actor_id);
                let ownership = if worker_id == cx.actor.actor_id {
                    Ownership::Owner
                } else {
                    Ownership::None
                };
                authz::authorize(
                    EntityType::FollowUpVisit,
                    AuthAction::Create,
                    cx.actor,
                    ownership,
                )?;

                let row = FollowUpVisit {
                    id: op.entity_id.unwrap_or_else(Uuid::new_v4),
                    patient_id: payload.patient_id,
                    worker_id,
                    due_date,
                    status: payload.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
                    notes: cx.cipher.seal(payload.notes.as_deref().unwrap_or(""))?,
                    version: 1,
                    created_at: cx.now,
                    updated_at: cx.now,
                };
                cx.session.insert_follow_up_visit(&row).await?;

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
) -> SyncResult<Vec<FollowUpVisitView>> {
    let scope = authz::visibility(EntityType::FollowUpVisit, actor);
    if scope.is_none() {
        return Ok(Vec::new());
    }
    let rows = session
        .follow_up_visits_since(&scope, since, MAX_PULL_ROWS)
        .await?;
    rows.iter().map(|row| project(row, cipher)).collect()
}
