//! Shared identity and sync bookkeeping for offline-capable records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Project, Task, TimeEntry};
use crate::util::canonical_now;

/// A client-generated record identifier, using UUID v7 (time-sortable).
///
/// Assigned once at creation and immutable afterwards; this is the primary
/// key of every local record, independent of any server-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new unique local ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The three offline-capable record kinds.
///
/// Selected by exhaustive matching everywhere; the string forms exist only
/// at the storage and wire boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    TimeEntry,
    Task,
    Project,
}

impl EntityKind {
    /// Fixed processing order for a sync pass.
    pub const ALL: [Self; 3] = [Self::TimeEntry, Self::Task, Self::Project];

    /// Canonical string form, as stored in queue rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeEntry => "time_entry",
            Self::Task => "task",
            Self::Project => "project",
        }
    }

    /// Backing table name in the local store.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::TimeEntry => "time_entries",
            Self::Task => "tasks",
            Self::Project => "projects",
        }
    }

    /// Remote REST collection segment.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        // Collections mirror the table names
        self.table()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time_entry" => Ok(Self::TimeEntry),
            "task" => Ok(Self::Task),
            "project" => Ok(Self::Project),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown entity kind: {other}"
            ))),
        }
    }
}

/// The mutation type recorded on a queue job at enqueue time.
///
/// Note the request type on the wire is decided later, by whether the
/// entity holds a `server_id` when the job is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
}

impl SyncAction {
    /// Canonical string form, as stored in queue rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown sync action: {other}"
            ))),
        }
    }
}

/// Sync bookkeeping carried by every offline-capable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Client-generated primary key
    pub local_id: LocalId,
    /// Server-assigned identifier, set once a create is accepted
    pub server_id: Option<i64>,
    /// False until the remote has accepted the current record state
    pub synced: bool,
    /// Creation time, canonical ISO-8601
    pub timestamp: String,
    /// Time the current state was last accepted remotely
    pub synced_at: Option<String>,
    /// Reserved for future conflict signaling; never set by the engine
    pub conflict: bool,
}

impl SyncMeta {
    /// Bookkeeping for a freshly captured offline record.
    #[must_use]
    pub fn new() -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: None,
            synced: false,
            timestamp: canonical_now(),
            synced_at: None,
            conflict: false,
        }
    }

    /// Bookkeeping for a record the server confirmed immediately
    /// (online-first create; never persisted locally).
    #[must_use]
    pub fn server_confirmed(server_id: i64) -> Self {
        let now = canonical_now();
        Self {
            local_id: LocalId::new(),
            server_id: Some(server_id),
            synced: true,
            timestamp: now.clone(),
            synced_at: Some(now),
            conflict: false,
        }
    }
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// An offline-capable record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity {
    TimeEntry(TimeEntry),
    Task(Task),
    Project(Project),
}

impl Entity {
    /// The kind tag of this record.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::TimeEntry(_) => EntityKind::TimeEntry,
            Self::Task(_) => EntityKind::Task,
            Self::Project(_) => EntityKind::Project,
        }
    }

    /// Shared sync bookkeeping.
    #[must_use]
    pub const fn meta(&self) -> &SyncMeta {
        match self {
            Self::TimeEntry(entry) => &entry.meta,
            Self::Task(task) => &task.meta,
            Self::Project(project) => &project.meta,
        }
    }

    /// Mutable sync bookkeeping.
    pub fn meta_mut(&mut self) -> &mut SyncMeta {
        match self {
            Self::TimeEntry(entry) => &mut entry.meta,
            Self::Task(task) => &mut task.meta,
            Self::Project(project) => &mut project.meta,
        }
    }

    /// The record's primary key.
    #[must_use]
    pub const fn local_id(&self) -> LocalId {
        self.meta().local_id
    }

    /// Normalized remote payload for this record's current state.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::TimeEntry(entry) => entry.payload(),
            Self::Task(task) => task.payload(),
            Self::Project(project) => project.payload(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_unique() {
        let id1 = LocalId::new();
        let id2 = LocalId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_local_id_parse() {
        let id = LocalId::new();
        let parsed: LocalId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn sync_action_round_trips_through_str() {
        assert_eq!("create".parse::<SyncAction>().unwrap(), SyncAction::Create);
        assert_eq!("update".parse::<SyncAction>().unwrap(), SyncAction::Update);
        assert!("delete".parse::<SyncAction>().is_err());
    }

    #[test]
    fn new_meta_starts_unsynced() {
        let meta = SyncMeta::new();
        assert!(!meta.synced);
        assert_eq!(meta.server_id, None);
        assert_eq!(meta.synced_at, None);
        assert!(!meta.conflict);
        assert!(meta.timestamp.ends_with('Z'));
    }

    #[test]
    fn server_confirmed_meta_is_synced() {
        let meta = SyncMeta::server_confirmed(42);
        assert!(meta.synced);
        assert_eq!(meta.server_id, Some(42));
        assert_eq!(meta.synced_at, Some(meta.timestamp.clone()));
    }
}
