//! Pull orchestrator.
//!
//! Builds a consolidated role-scoped snapshot of everything that changed
//! after the client's `since` cursor: per entity type, visibility filter
//! then a strictly-greater-than timestamp filter, ascending order, 500
//! rows, protected fields decrypted. The returned `server_time` is the
//! client's next cursor. Pull has no per-item batching, so any failure
//! here is a request failure.

use audit_engine::AuditEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use storage_layer::SyncCheckpoint;
use tracing::info;

use crate::error::{SyncError, SyncResult};
use crate::handlers::appointment::{self, AppointmentView};
use crate::handlers::clinical_record::{self, ClinicalRecordView};
use crate::handlers::follow_up::{self, FollowUpVisitView};
use crate::handlers::inventory::{self, InventoryItemView};
use crate::handlers::prescription::{self, PrescriptionView};
use crate::handlers::triage::{self, TriageLogView};
use crate::protocol::{Actor, PullRequest};
use crate::SyncEngine;

/// Consolidated snapshot, keyed by entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// Store this as the next pull's `since` cursor
    pub server_time: DateTime<Utc>,
    pub appointments: Vec<AppointmentView>,
    pub clinical_records: Vec<ClinicalRecordView>,
    pub prescriptions: Vec<PrescriptionView>,
    pub inventory_items: Vec<InventoryItemView>,
    pub triage_logs: Vec<TriageLogView>,
    pub follow_up_visits: Vec<FollowUpVisitView>,
}

pub(crate) async fn execute(
    engine: &SyncEngine,
    actor: &Actor,
    request: PullRequest,
) -> SyncResult<PullResponse> {
    if request.device_id.trim().is_empty() {
        return Err(SyncError::Structural("device_id must not be empty".to_string()));
    }

    let now = engine.clock.now();
    let since = request.since;
    let mut session = engine.store.begin().await?;

    let appointments =
        appointment::collect(session.as_mut(), &engine.cipher, actor, since).await?;
    let clinical_records =
        clinical_record::collect(session.as_mut(), &engine.cipher, actor, since).await?;
    let prescriptions =
        prescription::collect(session.as_mut(), &engine.cipher, actor, since).await?;
    let inventory_items = inventory::collect(session.as_mut(), actor, since).await?;
    let triage_logs = triage::collect(session.as_mut(), &engine.cipher, actor, since).await?;
    let follow_up_visits =
        follow_up::collect(session.as_mut(), &engine.cipher, actor, since).await?;

    let checkpoint = match session.get_checkpoint(actor.actor_id, &request.device_id).await? {
        Some(mut existing) => {
            existing.last_pulled_at = Some(now);
            existing.updated_at = now;
            existing
        }
        None => SyncCheckpoint {
            actor_id: actor.actor_id,
            device_id: request.device_id.clone(),
            last_pushed_at: None,
            last_pulled_at: Some(now),
            created_at: now,
            updated_at: now,
        },
    };
    session.save_checkpoint(&checkpoint).await?;

    let entry = AuditEntry::new(
        actor.actor_id,
        "sync.pull",
        json!({
            "device_id": request.device_id,
            "appointments": appointments.len(),
            "clinical_records": clinical_records.len(),
            "prescriptions": prescriptions.len(),
            "inventory_items": inventory_items.len(),
            "triage_logs": triage_logs.len(),
            "follow_up_visits": follow_up_visits.len(),
        }),
        now,
    );
    session.append_audit(&entry).await?;

    session.commit().await?;

    info!(
        target: "audit",
        actor_id = %actor.actor_id,
        device_id = %request.device_id,
        since = ?since,
        "pull complete"
    );

    Ok(PullResponse {
        server_time: now,
        appointments,
        clinical_records,
        prescriptions,
        inventory_items,
        triage_logs,
        follow_up_visits,
    })
}
