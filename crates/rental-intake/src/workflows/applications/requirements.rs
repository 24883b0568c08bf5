use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::ActorId;
use super::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Document,
    Information,
    Verification,
}

/// Reviewer supplied item accompanying a conditional approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDraft {
    #[serde(rename = "type")]
    pub kind: RequirementKind,
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalRequirement {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RequirementKind,
    pub description: String,
    pub required: bool,
    pub satisfied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satisfied_by: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Outstanding conditions attached to a conditionally approved application.
///
/// Items are created as one batch and only ever change by being satisfied; nothing is removed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConditionalRequirementsTracker {
    items: Vec<ConditionalRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due_date: Option<NaiveDate>,
}

impl ConditionalRequirementsTracker {
    /// Store a batch of unsatisfied requirements. Ids continue the existing sequence so earlier
    /// items are never shadowed.
    pub fn seed(
        &mut self,
        drafts: Vec<RequirementDraft>,
        due_date: Option<NaiveDate>,
    ) -> Result<(), LifecycleError> {
        if let Some(blank) = drafts
            .iter()
            .position(|draft| draft.description.trim().is_empty())
        {
            return Err(LifecycleError::validation(format!(
                "requirement #{} is missing a description",
                blank + 1
            )));
        }

        let offset = self.items.len();
        self.items
            .extend(drafts.into_iter().enumerate().map(|(index, draft)| {
                ConditionalRequirement {
                    id: format!("req-{}", offset + index + 1),
                    kind: draft.kind,
                    description: draft.description.trim().to_string(),
                    required: draft.required,
                    satisfied: false,
                    satisfied_at: None,
                    satisfied_by: None,
                    notes: None,
                }
            }));

        if due_date.is_some() {
            self.due_date = due_date;
        }

        Ok(())
    }

    /// Mark a requirement satisfied. Re-satisfying an item is a no-op that keeps the original
    /// audit fields. Returns whether anything changed.
    pub fn mark_satisfied(
        &mut self,
        requirement_id: &str,
        actor: &ActorId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, LifecycleError> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == requirement_id)
            .ok_or_else(|| LifecycleError::NotFound(format!("requirement {requirement_id}")))?;

        if item.satisfied {
            return Ok(false);
        }

        item.satisfied = true;
        item.satisfied_at = Some(now);
        item.satisfied_by = Some(actor.clone());
        item.notes = notes.filter(|note| !note.trim().is_empty());
        Ok(true)
    }

    pub fn all_required_satisfied(&self) -> bool {
        self.items
            .iter()
            .filter(|item| item.required)
            .all(|item| item.satisfied)
    }

    pub fn outstanding_required(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.required && !item.satisfied)
            .count()
    }

    pub fn get(&self, requirement_id: &str) -> Option<&ConditionalRequirement> {
        self.items.iter().find(|item| item.id == requirement_id)
    }

    pub fn items(&self) -> &[ConditionalRequirement] {
        &self.items
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
