//! Administrative audit history.
//!
//! Cursor-paginated listing of the audit entries this engine writes,
//! newest first. Not part of the reconciliation protocol; admin only.

use audit_engine::AuditPage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::protocol::{Actor, ActorRole, MAX_HISTORY_LIMIT};
use crate::SyncEngine;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Entries strictly older than this timestamp; a previous page's
    /// `next_cursor`
    pub cursor: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

pub(crate) async fn execute(
    engine: &SyncEngine,
    actor: &Actor,
    request: HistoryRequest,
) -> SyncResult<AuditPage> {
    if actor.role != ActorRole::Admin {
        return Err(SyncError::Forbidden(
            "audit history is restricted to admin".to_string(),
        ));
    }

    let limit = request.limit.unwrap_or(50).clamp(1, MAX_HISTORY_LIMIT);

    let mut session = engine.store.begin().await?;
    let entries = session.audit_entries_before(request.cursor, limit).await?;
    session.commit().await?;

    let next_cursor = entries.last().map(|entry| entry.created_at);
    Ok(AuditPage {
        entries,
        next_cursor,
    })
}
