//! Time entry model

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::SyncMeta;
use crate::normalize::{normalize_optional, DateTimeInput};
use crate::util::normalize_text_option;

/// Loose input for capturing a time entry.
///
/// Date fields accept free-form strings, canonical strings, or unix
/// millisecond timestamps; anything unparsable normalizes to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeEntryDraft {
    #[serde(default)]
    pub start_time: Option<DateTimeInput>,
    #[serde(default)]
    pub end_time: Option<DateTimeInput>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub note: Option<String>,
}

/// A tracked span of time, billable against an optional project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Span start, canonical ISO-8601
    pub start_time: Option<String>,
    /// Span end, canonical ISO-8601
    pub end_time: Option<String>,
    /// Server id of the project this entry belongs to
    pub project_id: Option<i64>,
    pub note: Option<String>,
}

impl TimeEntry {
    /// Normalize a draft into a fresh unsynced record.
    #[must_use]
    pub fn from_draft(draft: TimeEntryDraft) -> Self {
        Self {
            meta: SyncMeta::new(),
            start_time: normalize_optional(draft.start_time.as_ref()),
            end_time: normalize_optional(draft.end_time.as_ref()),
            project_id: draft.project_id,
            note: normalize_text_option(draft.note),
        }
    }

    /// Replace the domain fields with a new draft; sync bookkeeping keeps
    /// the identity but drops the synced flag so the edit is re-uploaded.
    pub fn apply_draft(&mut self, draft: TimeEntryDraft) {
        self.start_time = normalize_optional(draft.start_time.as_ref());
        self.end_time = normalize_optional(draft.end_time.as_ref());
        self.project_id = draft.project_id;
        self.note = normalize_text_option(draft.note);
        self.meta.synced = false;
    }

    /// Normalized remote payload.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "local_id": self.meta.local_id.as_str(),
            "start_time": self.start_time,
            "end_time": self.end_time,
            "project_id": self.project_id,
            "note": self.note,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn from_draft_normalizes_dates_and_starts_unsynced() {
        let entry = TimeEntry::from_draft(TimeEntryDraft {
            start_time: Some("2024-01-01 09:00".into()),
            end_time: Some("2024-01-01 17:30".into()),
            project_id: Some(1),
            note: Some("  field work  ".to_string()),
        });

        assert_eq!(entry.start_time.as_deref(), Some("2024-01-01T09:00:00.000Z"));
        assert_eq!(entry.end_time.as_deref(), Some("2024-01-01T17:30:00.000Z"));
        assert_eq!(entry.project_id, Some(1));
        assert_eq!(entry.note.as_deref(), Some("field work"));
        assert!(!entry.meta.synced);
        assert_eq!(entry.meta.server_id, None);
    }

    #[test]
    fn from_draft_keeps_unparsable_dates_null() {
        let entry = TimeEntry::from_draft(TimeEntryDraft {
            start_time: Some("whenever".into()),
            ..TimeEntryDraft::default()
        });

        assert_eq!(entry.start_time, None);
        assert_eq!(entry.end_time, None);
    }

    #[test]
    fn apply_draft_resets_synced_but_keeps_identity() {
        let mut entry = TimeEntry::from_draft(TimeEntryDraft::default());
        let id = entry.meta.local_id;
        entry.meta.server_id = Some(7);
        entry.meta.synced = true;

        entry.apply_draft(TimeEntryDraft {
            note: Some("revised".to_string()),
            ..TimeEntryDraft::default()
        });

        assert_eq!(entry.meta.local_id, id);
        assert_eq!(entry.meta.server_id, Some(7));
        assert!(!entry.meta.synced);
        assert_eq!(entry.note.as_deref(), Some("revised"));
    }

    #[test]
    fn payload_carries_normalized_fields() {
        let entry = TimeEntry::from_draft(TimeEntryDraft {
            start_time: Some("2024-01-01 09:00".into()),
            project_id: Some(3),
            ..TimeEntryDraft::default()
        });

        let payload = entry.payload();
        assert_eq!(payload["start_time"], "2024-01-01T09:00:00.000Z");
        assert_eq!(payload["project_id"], 3);
        assert_eq!(payload["local_id"], entry.meta.local_id.as_str());
    }
}
