//! 🗺️ Workflow schemes: which workflow does each issue type get?
//!
//! Two flavours. An assignable scheme is attached to projects directly. A draft is
//! a pending edit of an assignable scheme (it keeps a `parent_id`) and is what
//! admins stage before migrating a pile of projects at once.
//!
//! Resolution order for `actual_workflow`: the issue type's own mapping, then the
//! scheme's catch-all mapping, then the system default workflow.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::SchemeId;

/// 🏛️ The workflow every issue type gets when nobody configured anything.
pub const DEFAULT_WORKFLOW_NAME: &str = "jira";

/// 📏 Scheme names are capped at this many characters by the storage layer.
pub const MAX_SCHEME_NAME_LENGTH: usize = 255;

/// 🗺️ issue type id → workflow name, plus a catch-all for "everything else".
///
/// Kept as two fields instead of a map keyed by `Option<String>` because JSON
/// object keys have to be strings and the snapshot file is JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeMappings {
    #[serde(default)]
    pub default_workflow: Option<String>,
    #[serde(default)]
    pub by_issue_type: BTreeMap<String, String>,
}

impl SchemeMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, workflow: impl Into<String>) -> Self {
        self.default_workflow = Some(workflow.into());
        self
    }

    pub fn with(mut self, issue_type_id: impl Into<String>, workflow: impl Into<String>) -> Self {
        self.by_issue_type.insert(issue_type_id.into(), workflow.into());
        self
    }

    /// 🔎 Every workflow name this mapping mentions.
    pub fn workflow_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .default_workflow
            .iter()
            .chain(self.by_issue_type.values())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

pub trait WorkflowScheme: std::fmt::Debug + Clone + Send + Sync + 'static {
    /// `None` only for the system default scheme.
    fn scheme_id(&self) -> Option<SchemeId>;
    fn name(&self) -> &str;
    fn mappings(&self) -> &SchemeMappings;

    /// 🎯 The workflow name an issue type resolves to under this scheme.
    fn actual_workflow(&self, issue_type_id: &str) -> String {
        let mappings = self.mappings();
        mappings
            .by_issue_type
            .get(issue_type_id)
            .or(mappings.default_workflow.as_ref())
            .cloned()
            .unwrap_or_else(|| DEFAULT_WORKFLOW_NAME.to_string())
    }
}

/// 📌 A scheme that can be attached to a project. `id == None` is the system default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignableWorkflowScheme {
    pub id: Option<SchemeId>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mappings: SchemeMappings,
}

impl AssignableWorkflowScheme {
    /// 🏛️ The scheme every project without an explicit scheme silently uses.
    pub fn system_default() -> Self {
        Self {
            id: None,
            name: "Default Workflow Scheme".to_string(),
            description: None,
            mappings: SchemeMappings::new(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id.is_none()
    }
}

impl WorkflowScheme for AssignableWorkflowScheme {
    fn scheme_id(&self) -> Option<SchemeId> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mappings(&self) -> &SchemeMappings {
        &self.mappings
    }
}

/// ✏️ An uncommitted edit of an assignable scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftWorkflowScheme {
    pub id: SchemeId,
    pub parent_id: SchemeId,
    /// 🏷️ Drafts borrow their parent's name when displayed.
    pub name: String,
    #[serde(default)]
    pub mappings: SchemeMappings,
    #[serde(default)]
    pub last_modified_user: Option<String>,
}

impl WorkflowScheme for DraftWorkflowScheme {
    fn scheme_id(&self) -> Option<SchemeId> {
        Some(self.id)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mappings(&self) -> &SchemeMappings {
        &self.mappings
    }
}

/// 📝 "Copy of <name>", cut down to the storage limit on a char boundary.
pub fn copy_name_for(name: &str) -> String {
    format!("Copy of {name}")
        .chars()
        .take(MAX_SCHEME_NAME_LENGTH)
        .collect()
}

/// 📝 Description for a scheme made out of a draft, keeping whatever the parent said.
pub fn auto_generated_description(parent: &AssignableWorkflowScheme, generated: &str) -> String {
    match parent.description.as_deref().map(str::trim) {
        Some(existing) if !existing.is_empty() => format!("{existing} {generated}"),
        _ => generated.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme_with(mappings: SchemeMappings) -> AssignableWorkflowScheme {
        AssignableWorkflowScheme {
            id: Some(SchemeId(1)),
            name: "Dev".to_string(),
            description: None,
            mappings,
        }
    }

    #[test]
    fn the_one_where_type_mapping_beats_default_beats_system() {
        let scheme = scheme_with(
            SchemeMappings::new()
                .with("bug", "bug-flow")
                .with_default("catch-all"),
        );
        assert_eq!(scheme.actual_workflow("bug"), "bug-flow");
        assert_eq!(scheme.actual_workflow("task"), "catch-all");

        let bare = scheme_with(SchemeMappings::new().with("bug", "bug-flow"));
        assert_eq!(bare.actual_workflow("task"), DEFAULT_WORKFLOW_NAME);
        assert_eq!(
            AssignableWorkflowScheme::system_default().actual_workflow("anything"),
            DEFAULT_WORKFLOW_NAME
        );
        assert_eq!(scheme.mappings.workflow_names(), vec!["bug-flow", "catch-all"]);
    }

    #[test]
    fn the_one_where_copy_names_respect_the_length_limit() {
        assert_eq!(copy_name_for("Dev"), "Copy of Dev");
        let long = "x".repeat(400);
        assert_eq!(copy_name_for(&long).chars().count(), MAX_SCHEME_NAME_LENGTH);
    }

    #[test]
    fn the_one_where_descriptions_keep_the_parents_words() {
        let mut parent = scheme_with(SchemeMappings::new());
        assert_eq!(auto_generated_description(&parent, "(auto)"), "(auto)");
        parent.description = Some("Team flow".to_string());
        assert_eq!(auto_generated_description(&parent, "(auto)"), "Team flow (auto)");
    }
}
