//! Authorization matrix.
//!
//! Rules are data, not procedure: a static table per (entity, action)
//! names the permitted roles and whether the action requires an
//! ownership relation to the target record. Handlers compute the
//! relation (owner / none) from the record they fetched; this module
//! only evaluates the table. Admin bypasses ownership checks but never
//! the entity-type role gate. A denial short-circuits the operation
//! before any storage mutation.
//!
//! `visibility` is the pull-side counterpart: the role-scoped filter for
//! each entity type, including the intentional triage-log asymmetry
//! (field workers never see triage logs recorded by doctors and vice
//! versa).

use storage_layer::RecordScope;

use crate::error::{SyncError, SyncResult};
use crate::protocol::{Actor, ActorRole, EntityType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Create,
    Update,
    Delete,
}

impl AuthAction {
    fn as_str(&self) -> &'static str {
        match self {
            AuthAction::Create => "create",
            AuthAction::Update => "update",
            AuthAction::Delete => "delete",
        }
    }
}

/// The actor's relation to the target record, computed by the entity
/// handler from the record it fetched (or from the payload on create).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owner,
    None,
}

#[derive(Debug, Clone, Copy)]
struct MutationRule {
    roles: &'static [ActorRole],
    needs_ownership: bool,
}

const APPOINTMENT_WRITERS: &[ActorRole] = &[
    ActorRole::Patient,
    ActorRole::Doctor,
    ActorRole::FieldWorker,
    ActorRole::Admin,
];
const CLINICAL_WRITERS: &[ActorRole] =
    &[ActorRole::Doctor, ActorRole::FieldWorker, ActorRole::Admin];
const PRESCRIBERS: &[ActorRole] = &[ActorRole::Doctor, ActorRole::Admin];
const STOCK_KEEPERS: &[ActorRole] = &[ActorRole::Pharmacy, ActorRole::Admin];
const TRIAGE_WRITERS: &[ActorRole] = &[
    ActorRole::Patient,
    ActorRole::Doctor,
    ActorRole::FieldWorker,
    ActorRole::Pharmacy,
    ActorRole::Admin,
];
const VISIT_PLANNERS: &[ActorRole] = &[ActorRole::FieldWorker, ActorRole::Admin];

fn mutation_rule(entity: EntityType, action: AuthAction) -> Option<MutationRule> {
    match (entity, action) {
        (EntityType::Appointment, AuthAction::Create | AuthAction::Update) => Some(MutationRule {
            roles: APPOINTMENT_WRITERS,
            needs_ownership: true,
        }),
        (EntityType::Appointment, AuthAction::Delete) => None,

        (EntityType::ClinicalRecord, AuthAction::Create) => Some(MutationRule {
            roles: CLINICAL_WRITERS,
            needs_ownership: false,
        }),
        // Updates are further restricted to the original creator
        (EntityType::ClinicalRecord, AuthAction::Update) => Some(MutationRule {
            roles: CLINICAL_WRITERS,
            needs_ownership: true,
        }),
        (EntityType::ClinicalRecord, AuthAction::Delete) => None,

        (EntityType::Prescription, AuthAction::Create) => Some(MutationRule {
            roles: PRESCRIBERS,
            needs_ownership: false,
        }),
        (EntityType::Prescription, AuthAction::Update) => Some(MutationRule {
            roles: PRESCRIBERS,
            needs_ownership: true,
        }),
        (EntityType::Prescription, AuthAction::Delete) => None,

        (EntityType::InventoryItem, _) => Some(MutationRule {
            roles: STOCK_KEEPERS,
            needs_ownership: true,
        }),

        (EntityType::TriageLog, AuthAction::Create) => Some(MutationRule {
            roles: TRIAGE_WRITERS,
            needs_ownership: false,
        }),
        (EntityType::TriageLog, AuthAction::Update | AuthAction::Delete) => None,

        (EntityType::FollowUpVisit, AuthAction::Create | AuthAction::Update) => {
            Some(MutationRule {
                roles: VISIT_PLANNERS,
                needs_ownership: true,
            })
        }
        (EntityType::FollowUpVisit, AuthAction::Delete) => None,
    }
}

/// Evaluate the matrix for one operation.
pub fn authorize(
    entity: EntityType,
    action: AuthAction,
    actor: &Actor,
    ownership: Ownership,
) -> SyncResult<()> {
    let rule = mutation_rule(entity, action).ok_or_else(|| {
        SyncError::Unsupported(format!(
            "{} is not supported for {}",
            action.as_str(),
            entity.as_str()
        ))
    })?;

    if !rule.roles.contains(&actor.role) {
        return Err(SyncError::Forbidden(format!(
            "role {} may not {} {}",
            actor.role.as_str(),
            action.as_str(),
            entity.as_str()
        )));
    }

    if rule.needs_ownership && actor.role != ActorRole::Admin && ownership != Ownership::Owner {
        return Err(SyncError::Forbidden(format!(
            "actor does not own the target {}",
            entity.as_str()
        )));
    }

    Ok(())
}

/// Pull-side visibility scope for one entity type and actor.
pub fn visibility(entity: EntityType, actor: &Actor) -> RecordScope {
    if actor.role == ActorRole::Admin {
        return RecordScope::All;
    }
    let id = actor.actor_id;
    match (entity, actor.role) {
        (EntityType::Appointment, ActorRole::Patient)
        | (EntityType::Appointment, ActorRole::Doctor)
        | (EntityType::Appointment, ActorRole::FieldWorker) => RecordScope::Participant(id),

        (EntityType::ClinicalRecord, ActorRole::Patient) => RecordScope::Patient(id),
        (EntityType::ClinicalRecord, ActorRole::Doctor) => RecordScope::AuthorOrDoctor(id),
        (EntityType::ClinicalRecord, ActorRole::FieldWorker) => RecordScope::Author(id),

        (EntityType::Prescription, ActorRole::Patient) => RecordScope::Patient(id),
        (EntityType::Prescription, ActorRole::Doctor) => RecordScope::Prescriber(id),
        (EntityType::Prescription, ActorRole::Pharmacy) => RecordScope::Pharmacy(id),

        (EntityType::InventoryItem, ActorRole::Pharmacy) => RecordScope::Pharmacy(id),

        (EntityType::TriageLog, ActorRole::Patient) => RecordScope::Patient(id),
        (EntityType::TriageLog, ActorRole::Doctor) => {
            RecordScope::AuthorRole(ActorRole::Doctor.as_str().to_string())
        }
        (EntityType::TriageLog, ActorRole::FieldWorker) => {
            RecordScope::AuthorRole(ActorRole::FieldWorker.as_str().to_string())
        }

        (EntityType::FollowUpVisit, ActorRole::Patient) => RecordScope::Patient(id),
        (EntityType::FollowUpVisit, ActorRole::FieldWorker) => RecordScope::Worker(id),

        _ => RecordScope::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn actor(role: ActorRole) -> Actor {
        Actor::new(Uuid::new_v4(), role)
    }

    #[test]
    fn test_field_worker_may_not_prescribe() {
        let result = authorize(
            EntityType::Prescription,
            AuthAction::Create,
            &actor(ActorRole::FieldWorker),
            Ownership::None,
        );
        assert!(matches!(result, Err(SyncError::Forbidden(_))));
    }

    #[test]
    fn test_admin_bypasses_ownership_but_not_entity_gate() {
        // Admin updates a prescription it did not write
        authorize(
            EntityType::Prescription,
            AuthAction::Update,
            &actor(ActorRole::Admin),
            Ownership::None,
        )
        .unwrap();

        // But delete stays unsupported even for admin
        let result = authorize(
            EntityType::Appointment,
            AuthAction::Delete,
            &actor(ActorRole::Admin),
            Ownership::Owner,
        );
        assert!(matches!(result, Err(SyncError::Unsupported(_))));
    }

    #[test]
    fn test_ownership_required_for_non_admin() {
        let doctor = actor(ActorRole::Doctor);
        assert!(matches!(
            authorize(
                EntityType::ClinicalRecord,
                AuthAction::Update,
                &doctor,
                Ownership::None
            ),
            Err(SyncError::Forbidden(_))
        ));
        authorize(
            EntityType::ClinicalRecord,
            AuthAction::Update,
            &doctor,
            Ownership::Owner,
        )
        .unwrap();
    }

    #[test]
    fn test_any_role_may_log_triage() {
        for role in [
            ActorRole::Patient,
            ActorRole::Doctor,
            ActorRole::FieldWorker,
            ActorRole::Pharmacy,
        ] {
            authorize(
                EntityType::TriageLog,
                AuthAction::Create,
                &actor(role),
                Ownership::None,
            )
            .unwrap();
        }
    }

    #[test]
    fn test_inventory_restricted_to_pharmacy_and_admin() {
        for role in [ActorRole::Patient, ActorRole::Doctor, ActorRole::FieldWorker] {
            assert!(matches!(
                authorize(
                    EntityType::InventoryItem,
                    AuthAction::Delete,
                    &actor(role),
                    Ownership::Owner
                ),
                Err(SyncError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn test_triage_visibility_asymmetry() {
        let worker = actor(ActorRole::FieldWorker);
        let doctor = actor(ActorRole::Doctor);

        assert_eq!(
            visibility(EntityType::TriageLog, &worker),
            RecordScope::AuthorRole("field_worker".to_string())
        );
        assert_eq!(
            visibility(EntityType::TriageLog, &doctor),
            RecordScope::AuthorRole("doctor".to_string())
        );
    }

    #[test]
    fn test_pharmacy_sees_no_appointments() {
        assert_eq!(
            visibility(EntityType::Appointment, &actor(ActorRole::Pharmacy)),
            RecordScope::None
        );
    }

    #[test]
    fn test_admin_sees_everything() {
        let admin = actor(ActorRole::Admin);
        for entity in [
            EntityType::Appointment,
            EntityType::ClinicalRecord,
            EntityType::Prescription,
            EntityType::InventoryItem,
            EntityType::TriageLog,
            EntityType::FollowUpVisit,
        ] {
            assert_eq!(visibility(entity, &admin), RecordScope::All);
        }
    }
}
