//! Triage log handler.
//!
//! Triage results are immutable observations: create-only, append-only,
//! no version column. A repeat create for an id that already exists is a
//! no-op success rather than a conflict, so a device retrying a push
//! after a dropped response does not see phantom failures. Any
//! authenticated actor may log a triage result for themself or a named
//! patient.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage_layer::{StoreSession, TriageLog};
use uuid::Uuid;

use crate::authz::{self, AuthAction, Ownership};
use crate::cipher::FieldCipher;
use crate::error::{SyncError, SyncResult};
use crate::handlers::{decode_payload, EntityHandler, OpContext};
use crate::protocol::{Actor, AppliedResult, EntityType, SyncAction, SyncOperation, MAX_PULL_ROWS};

/// Append-only records project a fixed version.
const TRIAGE_VERSION: i64 = 1;

#[derive(Debug, Deserialize)]
pub struct TriagePayload {
    pub patient_id: Uuid,
    pub symptoms: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageLogView {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub recorded_by: Uuid,
    pub recorded_by_role: String,
    pub symptoms: String,
    pub severity: String,
    pub recorded_at: DateTime<Utc>,
}

pub(crate) fn project(row: &TriageLog, cipher: &FieldCipher) -> SyncResult<TriageLogView> {
    Ok(TriageLogView {
        id: row.id,
        patient_id: row.patient_id,
        recorded_by: row.recorded_by,
        recorded_by_role: row.recorded_by_role.clone(),
        symptoms: cipher.open(&row.symptoms)?,
        severity: row.severity.clone(),
        recorded_at: row.recorded_at,
    })
}

pub struct TriageHandler;

#[async_trait]
impl EntityHandler for TriageHandler {
    async fn apply(&self, cx: &mut OpContext<'_>, op: &SyncOperation) -> SyncResult<AppliedResult> {
        if op.action == SyncAction::Delete {
            return Err(SyncError::Unsupported(
                "triage logs are append-only".to_string(),
            ));
        }

        let payload: TriagePayload = decode_payload(&op.data)?;

        if let Some(id) = op.entity_id {
            if let Some(existing) = cx.session.get_triage_log(id).await? {
                // Idempotent create: the observation is already recorded.
                return Ok(AppliedResult {
                    op_id: op.op_id.clone(),
                    entity_id: existing.id,
                    new_version: TRIAGE_VERSION,
                });
            }
        }

        authz::authorize(
            EntityType::TriageLog,
            AuthAction::Create,
            cx.actor,
            Ownership::None,
        )?;

        let row = TriageLog {
            id: op.entity_id.unwrap_or_else(Uuid::new_v4),
            patient_id: payload.patient_id,
            recorded_by: cx.actor.actor_id,
            recorded_by_role: cx.actor.role.as_str().to_string(),
            symptoms: cx.cipher.seal(&payload.symptoms)?,
            severity: payload.severity,
            recorded_at: cx.now,
        };
        cx.session.insert_triage_log(&row).await?;

        Ok(AppliedResult {
            op_id: op.op_id.clone(),
            entity_id: row.id,
            new_version: TRIAGE_VERSION,
        })
    }
}

pub(crate) async fn collect(
    session: &mut dyn StoreSession,
    cipher: &FieldCipher,
    actor: &Actor,
    since: Option<DateTime<Utc>>,
) -> SyncResult<Vec<TriageLogView>> {
    let scope = authz::visibility(EntityType::TriageLog, actor);
    if scope.is_none() {
        return Ok(Vec::new());
    }
    let rows = session.triage_logs_since(&scope, since, MAX_PULL_ROWS).await?;
    rows.iter().map(|row| project(row, cipher)).collect()
}
