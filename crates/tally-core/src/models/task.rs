//! Task model

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::SyncMeta;
use crate::normalize::{normalize_optional, DateTimeInput};
use crate::util::normalize_text_option;

/// Status assigned when a draft leaves it unset.
pub const DEFAULT_STATUS: &str = "open";
/// Priority assigned when a draft leaves it unset.
pub const DEFAULT_PRIORITY: &str = "normal";

/// Loose input for capturing a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTimeInput>,
    #[serde(default)]
    pub project_id: Option<i64>,
}

/// A unit of work, optionally scheduled and attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub name: String,
    pub status: String,
    pub priority: String,
    /// Due instant, canonical ISO-8601
    pub due_date: Option<String>,
    /// Server id of the owning project
    pub project_id: Option<i64>,
}

impl Task {
    /// Normalize a draft into a fresh unsynced record.
    ///
    /// The name is required; everything else gets defaults.
    pub fn from_draft(draft: TaskDraft) -> Result<Self> {
        let name = require_name(&draft.name)?;
        Ok(Self {
            meta: SyncMeta::new(),
            name,
            status: normalize_text_option(draft.status)
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            priority: normalize_text_option(draft.priority)
                .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
            due_date: normalize_optional(draft.due_date.as_ref()),
            project_id: draft.project_id,
        })
    }

    /// Replace the domain fields with a new draft and drop the synced flag.
    pub fn apply_draft(&mut self, draft: TaskDraft) -> Result<()> {
        self.name = require_name(&draft.name)?;
        self.status = normalize_text_option(draft.status)
            .unwrap_or_else(|| DEFAULT_STATUS.to_string());
        self.priority = normalize_text_option(draft.priority)
            .unwrap_or_else(|| DEFAULT_PRIORITY.to_string());
        self.due_date = normalize_optional(draft.due_date.as_ref());
        self.project_id = draft.project_id;
        self.meta.synced = false;
        Ok(())
    }

    /// Normalized remote payload.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "local_id": self.meta.local_id.as_str(),
            "name": self.name,
            "status": self.status,
            "priority": self.priority,
            "due_date": self.due_date,
            "project_id": self.project_id,
        })
    }
}

fn require_name(raw: &str) -> Result<String> {
    normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| Error::InvalidInput("task name cannot be empty".to_string()))
}
