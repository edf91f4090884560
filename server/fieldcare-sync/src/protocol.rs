//! Wire types for the push/pull reconciliation protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on operations per push batch
pub const MAX_BATCH_SIZE: usize = 500;
/// Hard cap on rows per entity type in one pull
pub const MAX_PULL_ROWS: i64 = 500;
/// Hard cap on one history page
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Trusted actor identity, resolved by the authentication layer before
/// the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(actor_id: Uuid, role: ActorRole) -> Self {
        Self { actor_id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Doctor,
    FieldWorker,
    Pharmacy,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Patient => "patient",
            ActorRole::Doctor => "doctor",
            ActorRole::FieldWorker => "field_worker",
            ActorRole::Pharmacy => "pharmacy",
            ActorRole::Admin => "admin",
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(ActorRole::Patient),
            "doctor" => Ok(ActorRole::Doctor),
            "field_worker" => Ok(ActorRole::FieldWorker),
            "pharmacy" => Ok(ActorRole::Pharmacy),
            "admin" => Ok(ActorRole::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The six synchronized entity types. A closed enum: adding an entity
/// means adding a variant, a handler, and a dispatch arm, all checked at
/// compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Appointment,
    ClinicalRecord,
    Prescription,
    InventoryItem,
    TriageLog,
    FollowUpVisit,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Appointment => "appointment",
            EntityType::ClinicalRecord => "clinical_record",
            EntityType::Prescription => "prescription",
            EntityType::InventoryItem => "inventory_item",
            EntityType::TriageLog => "triage_log",
            EntityType::FollowUpVisit => "follow_up_visit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Upsert,
    Delete,
}

/// One pending client mutation. Constructed on-device, transmitted once
/// per push attempt, never persisted verbatim server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Client-generated idempotency token, unique per batch
    pub op_id: String,
    pub entity_type: EntityType,
    pub action: SyncAction,
    /// Target record; required for updates, optional for creates
    pub entity_id: Option<Uuid>,
    /// The version the client believes is current. Absent means
    /// "no base known" (create or blind upsert).
    pub base_version: Option<i64>,
    /// Entity-shaped payload
    pub data: serde_json::Value,
    pub client_timestamp: DateTime<Utc>,
}

/// Emitted when an operation is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedResult {
    pub op_id: String,
    pub entity_id: Uuid,
    pub new_version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictReason {
    VersionMismatch,
    Rejected,
}

/// Emitted when an operation is not applied. `server_data` carries the
/// full current server projection, populated only for version
/// mismatches so the client can show the user what changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub op_id: String,
    pub entity_id: Option<Uuid>,
    pub server_version: i64,
    pub reason: ConflictReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub device_id: String,
    pub ops: Vec<SyncOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResponse {
    pub applied: Vec<AppliedResult>,
    pub conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub device_id: String,
    /// Strictly-greater-than cursor from the previous pull's
    /// `server_time`
    pub since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_codes() {
        assert_eq!(
            serde_json::to_string(&EntityType::ClinicalRecord).unwrap(),
            r#""clinical_record""#
        );
        assert_eq!(
            serde_json::to_string(&EntityType::FollowUpVisit).unwrap(),
            r#""follow_up_visit""#
        );
    }

    #[test]
    fn test_conflict_reason_codes() {
        assert_eq!(
            serde_json::to_string(&ConflictReason::VersionMismatch).unwrap(),
            r#""VERSION_MISMATCH""#
        );
        assert_eq!(
            serde_json::to_string(&ConflictReason::Rejected).unwrap(),
            r#""REJECTED""#
        );
    }

    #[test]
    fn test_role_roundtrip() {
        for role in [
            ActorRole::Patient,
            ActorRole::Doctor,
            ActorRole::FieldWorker,
            ActorRole::Pharmacy,
            ActorRole::Admin,
        ] {
            assert_eq!(role.as_str().parse::<ActorRole>().unwrap(), role);
        }
    }

    #[test]
    fn test_operation_deserialization() {
        let op: SyncOperation = serde_json::from_value(json!({
            "op_id": "a",
            "entity_type": "appointment",
            "action": "upsert",
            "entity_id": null,
            "base_version": null,
            "data": {},
            "client_timestamp": "2024-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(op.entity_type, EntityType::Appointment);
        assert_eq!(op.action, SyncAction::Upsert);
        assert!(op.entity_id.is_none());
        assert!(op.base_version.is_none());
    }

    #[test]
    fn test_conflict_omits_absent_server_data() {
        let conflict = Conflict {
            op_id: "x".to_string(),
            entity_id: None,
            server_version: 0,
            reason: ConflictReason::Rejected,
            server_data: None,
        };
        let json = serde_json::to_string(&conflict).unwrap();
        assert!(!json.contains("server_data"));
    }
}
