//! Push orchestrator.
//!
//! Processes a client batch strictly sequentially, in submitted order,
//! inside one storage session. Each operation is dispatched to its
//! entity handler; operation-level faults become conflicts instead of
//! aborting the batch. The device checkpoint and one audit entry are
//! written through the same session before commit.

use audit_engine::AuditEntry;
use serde_json::json;
use storage_layer::SyncCheckpoint;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::handlers::{self, OpContext};
use crate::protocol::{
    Actor, Conflict, ConflictReason, PushRequest, PushResponse, MAX_BATCH_SIZE,
};
use crate::SyncEngine;

pub(crate) async fn execute(
    engine: &SyncEngine,
    actor: &Actor,
    request: PushRequest,
) -> SyncResult<PushResponse> {
    if request.device_id.trim().is_empty() {
        return Err(SyncError::Structural("device_id must not be empty".to_string()));
    }
    if request.ops.len() > MAX_BATCH_SIZE {
        return Err(SyncError::Structural(format!(
            "push batch of {} exceeds the {MAX_BATCH_SIZE}-operation cap",
            request.ops.len()
        )));
    }

    let now = engine.clock.now();
    let mut session = engine.store.begin().await?;

    let mut applied = Vec::new();
    let mut conflicts = Vec::new();

    for op in &request.ops {
        let handler = handlers::for_entity(op.entity_type);
        let mut cx = OpContext {
            session: session.as_mut(),
            cipher: &engine.cipher,
            actor,
            now,
        };

        match handler.apply(&mut cx, op).await {
            Ok(result) => applied.push(result),
            Err(SyncError::VersionConflict {
                server_version,
                server_data,
            }) => {
                conflicts.push(Conflict {
                    op_id: op.op_id.clone(),
                    entity_id: op.entity_id,
                    server_version,
                    reason: ConflictReason::VersionMismatch,
                    server_data,
                });
            }
            Err(e) if e.rejects_operation() => {
                warn!(
                    op_id = %op.op_id,
                    entity_type = op.entity_type.as_str(),
                    error = %e,
                    "operation rejected"
                );
                conflicts.push(Conflict {
                    op_id: op.op_id.clone(),
                    entity_id: op.entity_id,
                    server_version: 0,
                    reason: ConflictReason::Rejected,
                    server_data: None,
                });
            }
            // Storage and crypto faults are request failures, not
            // per-operation outcomes.
            Err(e) => return Err(e),
        }
    }

    let checkpoint = match session.get_checkpoint(actor.actor_id, &request.device_id).await? {
        Some(mut existing) => {
            existing.last_pushed_at = Some(now);
            existing.updated_at = now;
            existing
        }
        None => SyncCheckpoint {
            actor_id: actor.actor_id,
            device_id: request.device_id.clone(),
            last_pushed_at: Some(now),
            last_pulled_at: None,
            created_at: now,
            updated_at: now,
        },
    };
    session.save_checkpoint(&checkpoint).await?;

    let entry = AuditEntry::new(
        actor.actor_id,
        "sync.push",
        json!({
            "device_id": request.device_id,
            "applied_count": applied.len(),
            "conflict_count": conflicts.len(),
        }),
        now,
    );
    session.append_audit(&entry).await?;

    session.commit().await?;

    info!(
        target: "audit",
        actor_id = %actor.actor_id,
        device_id = %request.device_id,
        applied = applied.len(),
        conflicts = conflicts.len(),
        "push complete"
    );

    Ok(PushResponse { applied, conflicts })
}
