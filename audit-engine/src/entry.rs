// Audit entry types and structures
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One append-only audit record.
///
/// Sync orchestrators write one entry per push/pull call; the
/// administrative history listing reads them back newest-first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry stamped with the given wall-clock time.
    pub fn new(
        actor_id: Uuid,
        action: impl Into<String>,
        summary: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            action: action.into(),
            entity_type: None,
            entity_id: None,
            summary,
            created_at,
        }
    }

    /// Attach the entity this entry refers to
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: Option<Uuid>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = entity_id;
        self
    }
}

/// One page of the administrative audit listing.
///
/// `next_cursor` is the timestamp of the last returned entry; passing it
/// back as the next request's cursor resumes the scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub next_cursor: Option<DateTime<Utc>>,
}
