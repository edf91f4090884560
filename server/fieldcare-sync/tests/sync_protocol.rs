//! End-to-end protocol tests against the in-memory store with real
//! field encryption.

use std::sync::Arc;

use chrono::Utc;
use crypto::Aes256GcmEncryptor;
use fieldcare_sync::{
    Actor, ActorRole, ConflictReason, EntityType, HistoryRequest, PullRequest, PushRequest,
    SyncAction, SyncEngine, SyncOperation,
};
use serde_json::{json, Value};
use storage_layer::{MemoryStore, SyncStore};
use uuid::Uuid;

fn test_engine() -> (SyncEngine, MemoryStore) {
    let store = MemoryStore::new();
    let encryptor = Aes256GcmEncryptor::new([42u8; 32]).unwrap();
    let engine = SyncEngine::new(Arc::new(store.clone()), Arc::new(encryptor));
    (engine, store)
}

fn upsert(
    op_id: &str,
    entity_type: EntityType,
    entity_id: Option<Uuid>,
    base_version: Option<i64>,
    data: Value,
) -> SyncOperation {
    SyncOperation {
        op_id: op_id.to_string(),
        entity_type,
        action: SyncAction::Upsert,
        entity_id,
        base_version,
        data,
        client_timestamp: Utc::now(),
    }
}

fn delete(
    op_id: &str,
    entity_type: EntityType,
    entity_id: Option<Uuid>,
    base_version: Option<i64>,
    data: Value,
) -> SyncOperation {
    SyncOperation {
        action: SyncAction::Delete,
        ..upsert(op_id, entity_type, entity_id, base_version, data)
    }
}

fn appointment_data(patient: Uuid, doctor: Uuid, reason: &str) -> Value {
    json!({
        "patient_id": patient,
        "doctor_id": doctor,
        "worker_id": null,
        "date": "2024-06-01",
        "time": "09:30",
        "reason": reason,
        "status": "scheduled"
    })
}

fn clinical_record_data(patient: Uuid) -> Value {
    json!({
        "patient_id": patient,
        "doctor_id": null,
        "encounter_date": "2024-05-20",
        "follow_up_date": null,
        "diagnosis": "acute bronchitis",
        "treatment": "rest and fluids",
        "notes": "re-examine if fever persists"
    })
}

fn prescription_data(patient: Uuid) -> Value {
    json!({
        "patient_id": patient,
        "prescribed_by": null,
        "pharmacy_id": null,
        "status": null,
        "notes": "take with food",
        "medicines": [
            {"name": "Amoxicillin", "dosage": "500mg", "frequency": "3x daily", "duration_days": 7}
        ]
    })
}

fn inventory_data(pharmacy: Uuid, sku: &str) -> Value {
    json!({
        "pharmacy_id": pharmacy,
        "sku": sku,
        "name": "Amoxicillin 500mg",
        "quantity": 40,
        "unit": "box",
        "expiry_date": "2025-12-31"
    })
}

async fn push_one(engine: &SyncEngine, actor: &Actor, op: SyncOperation) -> fieldcare_sync::PushResponse {
    engine
        .push(
            actor,
            PushRequest {
                device_id: "device-1".to_string(),
                ops: vec![op],
            },
        )
        .await
        .unwrap()
}

fn pull_request(since: Option<chrono::DateTime<Utc>>) -> PullRequest {
    PullRequest {
        device_id: "device-1".to_string(),
        since,
    }
}

#[tokio::test]
async fn blind_appointment_upsert_creates_version_one() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let response = push_one(
        &engine,
        &patient,
        upsert(
            "a",
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "first visit"),
        ),
    )
    .await;

    assert_eq!(response.conflicts.len(), 0);
    assert_eq!(response.applied.len(), 1);
    assert_eq!(response.applied[0].op_id, "a");
    assert_eq!(response.applied[0].new_version, 1);
}

#[tokio::test]
async fn stale_base_version_conflicts_with_server_state() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let created = push_one(
        &engine,
        &patient,
        upsert(
            "create",
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "initial"),
        ),
    )
    .await;
    let id = created.applied[0].entity_id;

    // Device A wins the race: version 1 -> 2
    let device_a = push_one(
        &engine,
        &patient,
        upsert(
            "a1",
            EntityType::Appointment,
            Some(id),
            Some(1),
            appointment_data(patient.actor_id, doctor, "rescheduled by A"),
        ),
    )
    .await;
    assert_eq!(device_a.applied[0].new_version, 2);

    // Device B still believes version 1
    let device_b = push_one(
        &engine,
        &patient,
        upsert(
            "b1",
            EntityType::Appointment,
            Some(id),
            Some(1),
            appointment_data(patient.actor_id, doctor, "rescheduled by B"),
        ),
    )
    .await;

    assert!(device_b.applied.is_empty());
    let conflict = &device_b.conflicts[0];
    assert_eq!(conflict.reason, ConflictReason::VersionMismatch);
    assert_eq!(conflict.server_version, 2);
    let server_data = conflict.server_data.as_ref().unwrap();
    assert_eq!(server_data["reason"], "rescheduled by A");
    assert_eq!(server_data["version"], 2);
}

#[tokio::test]
async fn resubmitted_batch_conflicts_instead_of_reapplying() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();
    let id = Uuid::new_v4();

    push_one(
        &engine,
        &patient,
        upsert(
            "create",
            EntityType::Appointment,
            Some(id),
            None,
            appointment_data(patient.actor_id, doctor, "initial"),
        ),
    )
    .await;

    let batch = PushRequest {
        device_id: "device-1".to_string(),
        ops: vec![upsert(
            "u1",
            EntityType::Appointment,
            Some(id),
            Some(1),
            appointment_data(patient.actor_id, doctor, "edited"),
        )],
    };

    let first = engine.push(&patient, batch.clone()).await.unwrap();
    assert_eq!(first.applied.len(), 1);
    assert_eq!(first.applied[0].new_version, 2);

    // Same bytes again: the base no longer matches, so nothing reapplies.
    let second = engine.push(&patient, batch).await.unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(second.conflicts.len(), 1);
    assert_eq!(second.conflicts[0].reason, ConflictReason::VersionMismatch);
    assert_eq!(second.conflicts[0].server_version, 2);
}

#[tokio::test]
async fn one_malformed_operation_does_not_abort_the_batch() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let mut ops = Vec::new();
    for i in 0..9 {
        ops.push(upsert(
            &format!("ok-{i}"),
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "visit"),
        ));
    }
    // Payload shaped nothing like an appointment
    ops.push(upsert(
        "bad",
        EntityType::Appointment,
        None,
        None,
        json!({"garbage": true}),
    ));

    let response = engine
        .push(
            &patient,
            PushRequest {
                device_id: "device-1".to_string(),
                ops,
            },
        )
        .await
        .unwrap();

    assert_eq!(response.applied.len(), 9);
    assert_eq!(response.conflicts.len(), 1);
    assert_eq!(response.conflicts[0].op_id, "bad");
    assert_eq!(response.conflicts[0].reason, ConflictReason::Rejected);
    assert_eq!(response.conflicts[0].server_version, 0);
}

#[tokio::test]
async fn oversized_batch_fails_the_whole_request() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let ops = (0..501)
        .map(|i| {
            upsert(
                &format!("op-{i}"),
                EntityType::Appointment,
                None,
                None,
                appointment_data(patient.actor_id, doctor, "visit"),
            )
        })
        .collect();

    let result = engine
        .push(
            &patient,
            PushRequest {
                device_id: "device-1".to_string(),
                ops,
            },
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn field_worker_prescription_upsert_is_rejected_without_mutation() {
    let (engine, _) = test_engine();
    let worker = Actor::new(Uuid::new_v4(), ActorRole::FieldWorker);
    let admin = Actor::new(Uuid::new_v4(), ActorRole::Admin);
    let patient = Uuid::new_v4();

    let response = push_one(
        &engine,
        &worker,
        upsert(
            "rx",
            EntityType::Prescription,
            None,
            None,
            prescription_data(patient),
        ),
    )
    .await;

    assert!(response.applied.is_empty());
    assert_eq!(response.conflicts[0].reason, ConflictReason::Rejected);

    // Nothing reached storage
    let snapshot = engine.pull(&admin, pull_request(None)).await.unwrap();
    assert!(snapshot.prescriptions.is_empty());
}

#[tokio::test]
async fn appointment_delete_is_always_rejected() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let created = push_one(
        &engine,
        &patient,
        upsert(
            "create",
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "visit"),
        ),
    )
    .await;
    let id = created.applied[0].entity_id;

    let response = push_one(
        &engine,
        &patient,
        delete(
            "del",
            EntityType::Appointment,
            Some(id),
            Some(1),
            appointment_data(patient.actor_id, doctor, "visit"),
        ),
    )
    .await;

    assert_eq!(response.conflicts[0].reason, ConflictReason::Rejected);
}

#[tokio::test]
async fn unparseable_encounter_date_is_rejected_not_conflicted() {
    let (engine, _) = test_engine();
    let doctor = Actor::new(Uuid::new_v4(), ActorRole::Doctor);

    let mut data = clinical_record_data(Uuid::new_v4());
    data["encounter_date"] = json!("sometime in May");

    let response = push_one(
        &engine,
        &doctor,
        upsert("cr", EntityType::ClinicalRecord, None, None, data),
    )
    .await;

    assert!(response.applied.is_empty());
    assert_eq!(response.conflicts[0].reason, ConflictReason::Rejected);
    assert!(response.conflicts[0].server_data.is_none());
}

#[tokio::test]
async fn clinical_record_update_restricted_to_creator_or_admin() {
    let (engine, _) = test_engine();
    let author = Actor::new(Uuid::new_v4(), ActorRole::Doctor);
    let other_doctor = Actor::new(Uuid::new_v4(), ActorRole::Doctor);
    let admin = Actor::new(Uuid::new_v4(), ActorRole::Admin);
    let patient = Uuid::new_v4();

    let created = push_one(
        &engine,
        &author,
        upsert(
            "create",
            EntityType::ClinicalRecord,
            None,
            None,
            clinical_record_data(patient),
        ),
    )
    .await;
    let id = created.applied[0].entity_id;

    let denied = push_one(
        &engine,
        &other_doctor,
        upsert(
            "u1",
            EntityType::ClinicalRecord,
            Some(id),
            Some(1),
            clinical_record_data(patient),
        ),
    )
    .await;
    assert_eq!(denied.conflicts[0].reason, ConflictReason::Rejected);

    let allowed = push_one(
        &engine,
        &admin,
        upsert(
            "u2",
            EntityType::ClinicalRecord,
            Some(id),
            Some(1),
            clinical_record_data(patient),
        ),
    )
    .await;
    assert_eq!(allowed.applied[0].new_version, 2);
}

#[tokio::test]
async fn inventory_delete_owner_only_and_hidden_from_pulls() {
    let (engine, _) = test_engine();
    let pharmacy_a = Actor::new(Uuid::new_v4(), ActorRole::Pharmacy);
    let pharmacy_b = Actor::new(Uuid::new_v4(), ActorRole::Pharmacy);

    let created = push_one(
        &engine,
        &pharmacy_a,
        upsert(
            "create",
            EntityType::InventoryItem,
            None,
            None,
            inventory_data(pharmacy_a.actor_id, "AMX-500"),
        ),
    )
    .await;
    let id = created.applied[0].entity_id;

    // Another pharmacy may not touch this stock
    let denied = push_one(
        &engine,
        &pharmacy_b,
        delete(
            "del-b",
            EntityType::InventoryItem,
            Some(id),
            Some(1),
            inventory_data(pharmacy_a.actor_id, "AMX-500"),
        ),
    )
    .await;
    assert_eq!(denied.conflicts[0].reason, ConflictReason::Rejected);

    // The owner may
    let allowed = push_one(
        &engine,
        &pharmacy_a,
        delete(
            "del-a",
            EntityType::InventoryItem,
            Some(id),
            Some(1),
            inventory_data(pharmacy_a.actor_id, "AMX-500"),
        ),
    )
    .await;
    assert_eq!(allowed.applied[0].new_version, 2);

    let snapshot = engine.pull(&pharmacy_a, pull_request(None)).await.unwrap();
    assert!(snapshot.inventory_items.is_empty());
}

#[tokio::test]
async fn inventory_upsert_resolves_by_pharmacy_and_sku() {
    let (engine, _) = test_engine();
    let pharmacy = Actor::new(Uuid::new_v4(), ActorRole::Pharmacy);

    let first = push_one(
        &engine,
        &pharmacy,
        upsert(
            "c1",
            EntityType::InventoryItem,
            None,
            None,
            inventory_data(pharmacy.actor_id, "PCM-650"),
        ),
    )
    .await;
    let id = first.applied[0].entity_id;

    // No entity id: the SKU lookup finds the same row and updates it.
    let mut restock = inventory_data(pharmacy.actor_id, "PCM-650");
    restock["quantity"] = json!(90);
    let second = push_one(
        &engine,
        &pharmacy,
        upsert("c2", EntityType::InventoryItem, None, None, restock),
    )
    .await;

    assert_eq!(second.applied[0].entity_id, id);
    assert_eq!(second.applied[0].new_version, 2);

    let snapshot = engine.pull(&pharmacy, pull_request(None)).await.unwrap();
    assert_eq!(snapshot.inventory_items.len(), 1);
    assert_eq!(snapshot.inventory_items[0].quantity, 90);
}

#[tokio::test]
async fn triage_create_is_idempotent_on_id() {
    let (engine, store) = test_engine();
    let worker = Actor::new(Uuid::new_v4(), ActorRole::FieldWorker);
    let id = Uuid::new_v4();
    let data = json!({
        "patient_id": Uuid::new_v4(),
        "symptoms": "fever, headache",
        "severity": "moderate"
    });

    let first = push_one(
        &engine,
        &worker,
        upsert("t1", EntityType::TriageLog, Some(id), None, data.clone()),
    )
    .await;
    assert_eq!(first.applied[0].new_version, 1);

    // Retry after a dropped response: no-op success, not a conflict.
    let second = push_one(
        &engine,
        &worker,
        upsert("t2", EntityType::TriageLog, Some(id), None, data),
    )
    .await;
    assert!(second.conflicts.is_empty());
    assert_eq!(second.applied[0].entity_id, id);

    let mut session = store.begin().await.unwrap();
    let rows = session
        .triage_logs_since(&storage_layer::RecordScope::All, None, 500)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn triage_visibility_is_asymmetric_by_recorder_role() {
    let (engine, _) = test_engine();
    let worker = Actor::new(Uuid::new_v4(), ActorRole::FieldWorker);
    let doctor = Actor::new(Uuid::new_v4(), ActorRole::Doctor);
    let patient = Uuid::new_v4();

    let data = json!({
        "patient_id": patient,
        "symptoms": "dizziness",
        "severity": "low"
    });
    push_one(&engine, &worker, upsert("w", EntityType::TriageLog, None, None, data.clone())).await;
    push_one(&engine, &doctor, upsert("d", EntityType::TriageLog, None, None, data)).await;

    let worker_view = engine.pull(&worker, pull_request(None)).await.unwrap();
    assert_eq!(worker_view.triage_logs.len(), 1);
    assert_eq!(worker_view.triage_logs[0].recorded_by_role, "field_worker");

    let doctor_view = engine.pull(&doctor, pull_request(None)).await.unwrap();
    assert_eq!(doctor_view.triage_logs.len(), 1);
    assert_eq!(doctor_view.triage_logs[0].recorded_by_role, "doctor");
}

#[tokio::test]
async fn follow_up_reassignment_is_admin_only() {
    let (engine, _) = test_engine();
    let worker = Actor::new(Uuid::new_v4(), ActorRole::FieldWorker);
    let other_worker = Uuid::new_v4();
    let admin = Actor::new(Uuid::new_v4(), ActorRole::Admin);
    let patient = Uuid::new_v4();

    let created = push_one(
        &engine,
        &worker,
        upsert(
            "create",
            EntityType::FollowUpVisit,
            None,
            None,
            json!({
                "patient_id": patient,
                "worker_id": null,
                "due_date": "2024-07-15",
                "status": null,
                "notes": "check medication adherence"
            }),
        ),
    )
    .await;
    let id = created.applied[0].entity_id;

    let denied = push_one(
        &engine,
        &worker,
        upsert(
            "w-reassign",
            EntityType::FollowUpVisit,
            Some(id),
            Some(1),
            json!({
                "patient_id": patient,
                "worker_id": other_worker,
                "due_date": "2024-07-15",
                "status": null,
                "notes": "handing over"
            }),
        ),
    )
    .await;
    assert_eq!(denied.conflicts[0].reason, ConflictReason::Rejected);

    let allowed = push_one(
        &engine,
        &admin,
        upsert(
            "a-reassign",
            EntityType::FollowUpVisit,
            Some(id),
            Some(1),
            json!({
                "patient_id": patient,
                "worker_id": other_worker,
                "due_date": "2024-07-15",
                "status": null,
                "notes": "reassigned by coordinator"
            }),
        ),
    )
    .await;
    assert_eq!(allowed.applied[0].new_version, 2);
}

#[tokio::test]
async fn patient_pull_never_contains_another_patients_rows() {
    let (engine, _) = test_engine();
    let patient_a = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let patient_b = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Actor::new(Uuid::new_v4(), ActorRole::Doctor);

    for patient in [&patient_a, &patient_b] {
        push_one(
            &engine,
            patient,
            upsert(
                "appt",
                EntityType::Appointment,
                None,
                None,
                appointment_data(patient.actor_id, doctor.actor_id, "checkup"),
            ),
        )
        .await;
        push_one(
            &engine,
            &doctor,
            upsert(
                "record",
                EntityType::ClinicalRecord,
                None,
                None,
                clinical_record_data(patient.actor_id),
            ),
        )
        .await;
        push_one(
            &engine,
            &doctor,
            upsert(
                "rx",
                EntityType::Prescription,
                None,
                None,
                prescription_data(patient.actor_id),
            ),
        )
        .await;
    }

    let snapshot = engine.pull(&patient_a, pull_request(None)).await.unwrap();

    assert_eq!(snapshot.appointments.len(), 1);
    assert!(snapshot
        .appointments
        .iter()
        .all(|a| a.patient_id == patient_a.actor_id));

    assert_eq!(snapshot.clinical_records.len(), 1);
    assert!(snapshot
        .clinical_records
        .iter()
        .all(|r| r.patient_id == patient_a.actor_id));

    assert_eq!(snapshot.prescriptions.len(), 1);
    assert!(snapshot
        .prescriptions
        .iter()
        .all(|p| p.patient_id == patient_a.actor_id));
}

#[tokio::test]
async fn pull_since_cursor_is_strict_with_no_gaps_or_duplicates() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let mut early_ids = Vec::new();
    for i in 0..3 {
        let r = push_one(
            &engine,
            &patient,
            upsert(
                &format!("early-{i}"),
                EntityType::Appointment,
                None,
                None,
                appointment_data(patient.actor_id, doctor, "early"),
            ),
        )
        .await;
        early_ids.push(r.applied[0].entity_id);
    }

    let cursor = engine.pull(&patient, pull_request(None)).await.unwrap().server_time;

    let mut late_ids = Vec::new();
    for i in 0..3 {
        let r = push_one(
            &engine,
            &patient,
            upsert(
                &format!("late-{i}"),
                EntityType::Appointment,
                None,
                None,
                appointment_data(patient.actor_id, doctor, "late"),
            ),
        )
        .await;
        late_ids.push(r.applied[0].entity_id);
    }

    let snapshot = engine
        .pull(&patient, pull_request(Some(cursor)))
        .await
        .unwrap();

    let pulled: Vec<Uuid> = snapshot.appointments.iter().map(|a| a.id).collect();
    for id in &early_ids {
        assert!(!pulled.contains(id), "rows at or before the cursor must not reappear");
    }
    for id in &late_ids {
        assert!(pulled.contains(id), "every visible later row must be present");
    }
    assert_eq!(pulled.len(), late_ids.len());
    assert!(snapshot
        .appointments
        .windows(2)
        .all(|w| w[0].updated_at <= w[1].updated_at));
}

#[tokio::test]
async fn protected_fields_are_sealed_at_rest_and_open_on_pull() {
    let (engine, store) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    let created = push_one(
        &engine,
        &patient,
        upsert(
            "a",
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "suspected pneumonia"),
        ),
    )
    .await;
    let id = created.applied[0].entity_id;

    let mut session = store.begin().await.unwrap();
    let stored = session.get_appointment(id).await.unwrap().unwrap();
    assert!(stored.reason.starts_with("ENC:"));
    assert!(!stored.reason.contains("pneumonia"));

    let snapshot = engine.pull(&patient, pull_request(None)).await.unwrap();
    assert_eq!(snapshot.appointments[0].reason, "suspected pneumonia");
}

#[tokio::test]
async fn checkpoints_are_created_then_updated_in_place() {
    let (engine, store) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let doctor = Uuid::new_v4();

    push_one(
        &engine,
        &patient,
        upsert(
            "a",
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "visit"),
        ),
    )
    .await;

    let mut session = store.begin().await.unwrap();
    let after_push = session
        .get_checkpoint(patient.actor_id, "device-1")
        .await
        .unwrap()
        .unwrap();
    assert!(after_push.last_pushed_at.is_some());
    assert!(after_push.last_pulled_at.is_none());

    engine.pull(&patient, pull_request(None)).await.unwrap();

    let mut session = store.begin().await.unwrap();
    let after_pull = session
        .get_checkpoint(patient.actor_id, "device-1")
        .await
        .unwrap()
        .unwrap();
    assert!(after_pull.last_pushed_at.is_some());
    assert!(after_pull.last_pulled_at.is_some());
    assert_eq!(after_pull.created_at, after_push.created_at);
}

#[tokio::test]
async fn history_is_admin_only_and_newest_first() {
    let (engine, _) = test_engine();
    let patient = Actor::new(Uuid::new_v4(), ActorRole::Patient);
    let admin = Actor::new(Uuid::new_v4(), ActorRole::Admin);
    let doctor = Uuid::new_v4();

    push_one(
        &engine,
        &patient,
        upsert(
            "a",
            EntityType::Appointment,
            None,
            None,
            appointment_data(patient.actor_id, doctor, "visit"),
        ),
    )
    .await;
    engine.pull(&patient, pull_request(None)).await.unwrap();

    assert!(engine
        .history(&patient, HistoryRequest::default())
        .await
        .is_err());

    let page = engine.history(&admin, HistoryRequest::default()).await.unwrap();
    assert_eq!(page.entries.len(), 2);
    assert!(page.entries[0].created_at >= page.entries[1].created_at);
    assert_eq!(page.entries[1].action, "sync.push");
    assert_eq!(page.entries[1].summary["applied_count"], 1);
    assert!(page.next_cursor.is_some());

    // The cursor pages strictly backwards
    let older = engine
        .history(
            &admin,
            HistoryRequest {
                cursor: page.next_cursor,
                limit: None,
            },
        )
        .await
        .unwrap();
    assert!(older.entries.is_empty());
}
