//! Append-only audit trail types for FieldCare Engine
//!
//! Every push and pull leaves exactly one audit entry summarizing its
//! outcome (counts, actor, device). Entries are written inside the same
//! storage transaction as the entity mutations they describe, so a crash
//! mid-batch can never produce applied mutations with no audit trail.
//! The storage layer persists entries; this crate owns their shape.

pub mod entry;
pub mod error;

pub use entry::{AuditEntry, AuditPage};
pub use error::{AuditError, AuditResult};
