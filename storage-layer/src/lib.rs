//! Transactional persistence layer for FieldCare Engine
//!
//! The sync engine owns the decision logic (authorize, version-check,
//! mutate); this crate owns making those decisions durable. It provides:
//! - the six versioned entity models plus sync checkpoints
//! - `SyncStore` / `StoreSession`: one explicit transaction object per
//!   push/pull call, with conditional (compare-and-swap) updates
//! - `RecordScope`: role-visibility filters computed by the engine and
//!   interpreted by the backends
//! - `MemoryStore` for tests and local development, `PgStore` for
//!   production (sqlx/Postgres)

pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod scope;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use models::{
    Appointment, ClinicalRecord, FollowUpVisit, InventoryItem, MedicineLine, Prescription,
    SyncCheckpoint, TriageLog,
};
pub use postgres::PgStore;
pub use scope::RecordScope;
pub use store::{StoreSession, SyncStore};
