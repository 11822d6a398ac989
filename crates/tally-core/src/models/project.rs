//! Project model

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::models::SyncMeta;
use crate::util::normalize_text_option;

/// Loose input for capturing a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub name: String,
    #[serde(default)]
    pub billable: Option<bool>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub client: Option<String>,
}

/// A container for time entries and tasks, with billing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(flatten)]
    pub meta: SyncMeta,
    pub name: String,
    pub billable: bool,
    pub hourly_rate: Option<f64>,
    pub client: Option<String>,
}

impl Project {
    /// Normalize a draft into a fresh unsynced record.
    ///
    /// The name is required; billing defaults to non-billable.
    pub fn from_draft(draft: ProjectDraft) -> Result<Self> {
        let name = require_name(&draft.name)?;
        Ok(Self {
            meta: SyncMeta::new(),
            name,
            billable: draft.billable.unwrap_or(false),
            hourly_rate: draft.hourly_rate,
            client: normalize_text_option(draft.client),
        })
    }

    /// Replace the domain fields with a new draft and drop the synced flag.
    pub fn apply_draft(&mut self, draft: ProjectDraft) -> Result<()> {
        self.name = require_name(&draft.name)?;
        self.billable = draft.billable.unwrap_or(false);
        self.hourly_rate = draft.hourly_rate;
        self.client = normalize_text_option(draft.client);
        self.meta.synced = false;
        Ok(())
    }

    /// Normalized remote payload.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "local_id": self.meta.local_id.as_str(),
            "name": self.name,
            "billable": self.billable,
            "hourly_rate": self.hourly_rate,
            "client": self.client,
        })
    }
}

fn require_name(raw: &str) -> Result<String> {
    normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| Error::InvalidInput("project name cannot be empty".to_string()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn from_draft_defaults_to_non_billable() {
        let project = Project::from_draft(ProjectDraft {
            name: "Internal tooling".to_string(),
            ..ProjectDraft::default()
        })
        .unwrap();

        assert!(!project.billable);
        assert_eq!(project.hourly_rate, None);
        assert!(!project.meta.synced);
    }

    #[test]
    fn from_draft_keeps_billing_fields() {
        let project = Project::from_draft(ProjectDraft {
            name: "Acme rollout".to_string(),
            billable: Some(true),
            hourly_rate: Some(120.0),
            client: Some(" Acme Corp ".to_string()),
        })
        .unwrap();

        assert!(project.billable);
        assert_eq!(project.hourly_rate, Some(120.0));
        assert_eq!(project.client.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn from_draft_rejects_empty_name() {
        let result = Project::from_draft(ProjectDraft {
            name: String::new(),
            ..ProjectDraft::default()
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
