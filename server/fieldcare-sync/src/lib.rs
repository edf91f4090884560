//! Offline-first push/pull reconciliation engine for FieldCare
//!
//! Client devices mutate clinical records while disconnected and
//! reconcile through two independent polling-style operations:
//! - **push**: a batched upload of pending local mutations, gated per
//!   entity by optimistic concurrency control and a role/ownership
//!   authorization matrix
//! - **pull**: an incremental, role-scoped snapshot of server-side
//!   changes since a checkpoint
//!
//! The engine holds no state between calls; every push/pull reads
//! current storage fresh inside one explicit transaction, and checkpoint
//! and audit writes ride in that same transaction. Conflicts are
//! detected and surfaced, never merged.

pub mod authz;
pub mod cipher;
pub mod clock;
pub mod error;
pub mod handlers;
pub mod history;
pub mod occ;
pub mod protocol;
pub mod pull;
pub mod push;

use std::sync::Arc;

use audit_engine::AuditPage;
use crypto::Encryptor;
use storage_layer::SyncStore;

pub use cipher::FieldCipher;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{SyncError, SyncResult};
pub use history::HistoryRequest;
pub use protocol::{
    Actor, ActorRole, AppliedResult, Conflict, ConflictReason, EntityType, PullRequest,
    PushRequest, PushResponse, SyncAction, SyncOperation,
};
pub use pull::PullResponse;

/// The reconciliation engine. Cheap to clone-by-Arc and safe to share:
/// all durable state lives in the store.
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    cipher: FieldCipher,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn SyncStore>, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            store,
            cipher: FieldCipher::new(encryptor),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall-clock source (deterministic tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply a batch of pending client mutations. Per-operation faults
    /// surface as conflicts in the response; only a malformed request or
    /// a storage/crypto failure fails the call itself.
    pub async fn push(
        &self,
        actor: &Actor,
        request: PushRequest,
    ) -> SyncResult<PushResponse> {
        push::execute(self, actor, request).await
    }

    /// Collect everything visible to the actor that changed after
    /// `since`.
    pub async fn pull(&self, actor: &Actor, request: PullRequest) -> SyncResult<PullResponse> {
        pull::execute(self, actor, request).await
    }

    /// Admin-only cursor-paginated audit listing.
    pub async fn history(
        &self,
        actor: &Actor,
        request: HistoryRequest,
    ) -> SyncResult<AuditPage> {
        history::execute(self, actor, request).await
    }
}
