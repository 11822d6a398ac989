//! Sync queue job model

use serde::{Deserialize, Serialize};

use crate::models::{Entity, EntityKind, LocalId, SyncAction};
use crate::util::canonical_now;

/// One pending mutation awaiting remote confirmation.
///
/// Jobs are append-only: the orchestrator flips `processed` and bumps
/// `retries`, nothing else ever mutates or deletes a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Monotonic queue position (storage-assigned)
    pub id: i64,
    pub kind: EntityKind,
    pub action: SyncAction,
    /// The entity record this mutation belongs to
    pub local_id: LocalId,
    /// Normalized payload snapshot taken at enqueue time
    pub data: serde_json::Value,
    /// Enqueue time, canonical ISO-8601
    pub timestamp: String,
    /// False until the mutation was applied remotely
    pub processed: bool,
    /// Failed attempts so far; unbounded by design
    pub retries: i64,
}

/// A job about to be enqueued, before the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncJob {
    pub kind: EntityKind,
    pub action: SyncAction,
    pub local_id: LocalId,
    pub data: serde_json::Value,
    pub timestamp: String,
}

impl NewSyncJob {
    /// Snapshot the entity's current normalized payload into a job.
    #[must_use]
    pub fn for_entity(entity: &Entity, action: SyncAction) -> Self {
        Self {
            kind: entity.kind(),
            action,
            local_id: entity.local_id(),
            data: entity.payload(),
            timestamp: canonical_now(),
        }
    }
}
