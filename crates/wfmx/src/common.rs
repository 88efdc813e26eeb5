//! 📦 Common data structures, the building blocks of wfmx
//!
//! 🎬 COLD OPEN. INT. ISSUE TRACKER, 3:47 AM
//!
//! Forty thousand issues sit in a project. Each one thinks it knows which
//! workflow it lives on. Most of them are right. A handful are not, left behind
//! by a migration that died halfway through last quarter. Nobody noticed.
//! Until now.
//!
//! These are the typed records that travel between the stores and the engine.
//! Every row the persistence layer hands us is turned into one of these before
//! the migration code touches it, so nothing downstream ever goes fishing in a
//! bag of untyped fields hoping `"workflowId"` is spelled right. 🦆

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 🏷️ Issue type ids are strings in the wild ("1", "bug", whatever the admin typed).
pub type IssueTypeId = String;
/// 🏷️ Same deal for statuses.
pub type StatusId = String;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// 🆔 An issue's primary key.
    IssueId
);
numeric_id!(
    /// 🆔 A project's primary key.
    ProjectId
);
numeric_id!(
    /// 🆔 A workflow scheme's primary key. Drafts and assignable schemes share the sequence.
    SchemeId
);

/// 🗂️ A category of work item. One axis of the status mapping key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueType {
    pub id: IssueTypeId,
    pub name: String,
}

/// 🚦 A named state a work item can occupy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub key: String,
    pub name: String,
}

/// 🎯 One issue row, typed. `workflow_entry_id` points at the persisted workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub key: String,
    pub project_id: ProjectId,
    pub issue_type_id: IssueTypeId,
    pub status_id: StatusId,
    pub workflow_entry_id: u64,
}

/// 🪜 A step in a workflow graph. Each step links to exactly one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub id: u32,
    pub name: String,
    pub linked_status_id: StatusId,
}

/// 🕸️ A named graph of steps. Transitions don't matter to a migration, only which
/// statuses are reachable, so they are not modelled.
///
/// Equality is by name. Two workflows that share a name are the same workflow
/// as far as the migration engine is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<StepDescriptor>,
}

impl PartialEq for Workflow {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Workflow {}

impl Workflow {
    pub fn new(name: impl Into<String>, steps: Vec<StepDescriptor>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// 🔗 Every status some step links to, in step order, without duplicates.
    pub fn linked_statuses(&self) -> Vec<StatusId> {
        let mut seen = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            if !seen.contains(&step.linked_status_id) {
                seen.push(step.linked_status_id.clone());
            }
        }
        seen
    }

    pub fn links_status(&self, status_id: &str) -> bool {
        self.steps.iter().any(|step| step.linked_status_id == status_id)
    }

    /// 🪜 The step a status hangs off, if the status is reachable at all.
    pub fn linked_step(&self, status_id: &str) -> Option<&StepDescriptor> {
        self.steps
            .iter()
            .find(|step| step.linked_status_id == status_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    Activated,
    Killed,
}

/// 🧬 The persisted workflow instance behind an issue. Its `workflow_name` is what
/// wrong-workflow detection compares against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEntry {
    pub id: u64,
    pub workflow_name: String,
    pub state: EntryState,
}

/// 📍 The workflow engine's "you are here" marker for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStep {
    pub entry_id: u64,
    pub step_id: u32,
    pub status_id: StatusId,
    pub owner: Option<String>,
}

/// 📜 One field delta in the change history. Holds ids and names, never rendered prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub field_type: String,
    pub field: String,
    pub old_value: Option<String>,
    pub old_string: Option<String>,
    pub new_value: Option<String>,
    pub new_string: Option<String>,
}

impl ChangeItem {
    /// 🔧 Static (system) field change, the only kind a migration ever writes.
    pub fn static_field(
        field: &str,
        old_value: impl Into<String>,
        old_string: impl Into<String>,
        new_value: impl Into<String>,
        new_string: impl Into<String>,
    ) -> Self {
        Self {
            field_type: "jira".to_string(),
            field: field.to_string(),
            old_value: Some(old_value.into()),
            old_string: Some(old_string.into()),
            new_value: Some(new_value.into()),
            new_string: Some(new_string.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeGroup {
    pub id: u64,
    pub issue_id: IssueId,
    pub author: Option<String>,
    pub created_epoch_secs: u64,
    pub items: Vec<ChangeItem>,
}

/// 🧺 A bag of validation failures. General messages plus per-field errors,
/// both kept in insertion/sorted order so reports are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCollection {
    pub messages: Vec<String>,
    pub errors: BTreeMap<String, String>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(field.into(), message.into());
    }

    /// 🧲 Absorb another collection. Field errors from `other` win on key clashes.
    pub fn add_error_collection(&mut self, other: ErrorCollection) {
        self.messages.extend(other.messages);
        self.errors.extend(other.errors);
    }

    pub fn has_any_errors(&self) -> bool {
        !self.messages.is_empty() || !self.errors.is_empty()
    }

    /// 📃 Everything, messages first, as one flat list for reports.
    pub fn all_messages(&self) -> Vec<String> {
        self.messages
            .iter()
            .cloned()
            .chain(self.errors.values().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: u32, status: &str) -> StepDescriptor {
        StepDescriptor {
            id,
            name: format!("step-{id}"),
            linked_status_id: status.to_string(),
        }
    }

    #[test]
    fn the_one_where_linked_statuses_dedupe_but_keep_order() {
        let workflow = Workflow::new("wf", vec![step(1, "1"), step(2, "3"), step(3, "1")]);
        assert_eq!(workflow.linked_statuses(), vec!["1".to_string(), "3".to_string()]);
        assert_eq!(workflow.linked_step("3").map(|s| s.id), Some(2));
        assert!(workflow.linked_step("9").is_none());
    }

    #[test]
    fn the_one_where_workflows_are_equal_if_their_names_are() {
        // 🧪 name-only identity: different graphs, same name, same workflow.
        let a = Workflow::new("shared", vec![step(1, "1")]);
        let b = Workflow::new("shared", vec![step(7, "6"), step(8, "5")]);
        assert_eq!(a, b);
        assert_ne!(a, Workflow::new("other", vec![step(1, "1")]));
    }

    #[test]
    fn the_one_where_error_collections_merge() {
        let mut left = ErrorCollection::new();
        left.add_error_message("first");
        let mut right = ErrorCollection::new();
        right.add_error("issue-1", "second");
        assert!(!ErrorCollection::new().has_any_errors());

        left.add_error_collection(right);
        assert!(left.has_any_errors());
        assert_eq!(left.all_messages(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn the_one_where_ids_survive_a_json_map_key_trip() -> anyhow::Result<()> {
        // 🧪 snapshots key maps by id, serde_json has to turn "7" back into IssueId(7)
        let mut map = BTreeMap::new();
        map.insert(IssueId(7), "WF-7".to_string());
        let json = serde_json::to_string(&map)?;
        assert_eq!(json, r#"{"7":"WF-7"}"#);
        let back: BTreeMap<IssueId, String> = serde_json::from_str(&json)?;
        assert_eq!(back, map);
        Ok(())
    }
}
