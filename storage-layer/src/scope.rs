//! Role-scoped visibility filters.
//!
//! The sync engine decides *what* an actor may see (the authorization
//! rules are data in the engine); storage backends only translate the
//! resulting scope into a row filter. Each entity interprets the
//! variants that make sense for it; a variant an entity does not
//! support matches nothing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordScope {
    /// Every row (admin)
    All,
    /// No rows; backends short-circuit without scanning
    None,
    /// Rows belonging to the given patient
    Patient(Uuid),
    /// Rows where the actor participates as patient, doctor, or
    /// assigned worker (appointments)
    Participant(Uuid),
    /// Rows prescribed by the given doctor
    Prescriber(Uuid),
    /// Rows owned by the given pharmacy
    Pharmacy(Uuid),
    /// Rows assigned to the given field worker
    Worker(Uuid),
    /// Rows created by the given actor
    Author(Uuid),
    /// Rows created by the actor or assigned to them as doctor
    /// (clinical records)
    AuthorOrDoctor(Uuid),
    /// Rows recorded by actors of the given role (triage-log asymmetry)
    AuthorRole(String),
}

impl RecordScope {
    pub fn is_none(&self) -> bool {
        matches!(self, RecordScope::None)
    }
}
