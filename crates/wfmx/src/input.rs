//! 🧮 The Migration Input Calculator.
//!
//! Walks every issue type and answers three questions before anyone touches an
//! issue row:
//!
//! 1. does this type need migrating at all? (different workflow, or stragglers on
//!    the wrong one)
//! 2. which of its statuses already exist in the target workflow? (those map to
//!    themselves, no questions asked)
//! 3. which don't? (someone has to pick a destination, usually a human in a wizard)
//!
//! "Statuses in use" is deliberately generous: whatever the old workflow links,
//! plus whatever is actually sitting on persisted issues. An issue can reference a
//! status its workflow lost years ago. It still needs somewhere to go. 🦆

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::backends::MigrationStore;
use crate::common::{IssueTypeId, ProjectId, StatusId, Workflow};
use crate::error::MigrationError;
use crate::mapping::StatusMappingTable;
use crate::scheme::WorkflowScheme;

/// 📋 Everything a migration needs decided up front, for one or many projects.
#[derive(Debug, Clone, Default)]
pub struct MigrationInput {
    types_needing_migration: BTreeSet<IssueTypeId>,
    /// 🎯 target workflow per type needing migration, for validating user mappings
    target_workflows: BTreeMap<IssueTypeId, Workflow>,
    statuses_needing_mapping: BTreeMap<IssueTypeId, BTreeSet<StatusId>>,
    auto_mapped: BTreeMap<IssueTypeId, BTreeSet<StatusId>>,
    mapping: StatusMappingTable,
}

impl MigrationInput {
    pub fn types_needing_migration(&self) -> &BTreeSet<IssueTypeId> {
        &self.types_needing_migration
    }

    pub fn needs_migration(&self, issue_type_id: &str) -> bool {
        self.types_needing_migration.contains(issue_type_id)
    }

    /// 🙋 Statuses of this type a caller has to supply a destination for.
    pub fn statuses_needing_mapping(&self, issue_type_id: &str) -> BTreeSet<StatusId> {
        self.statuses_needing_mapping
            .get(issue_type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// ✅ Statuses of this type that were mapped to themselves automatically.
    pub fn auto_mapped_statuses(&self, issue_type_id: &str) -> BTreeSet<StatusId> {
        self.auto_mapped
            .get(issue_type_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn target_workflow(&self, issue_type_id: &str) -> Option<&Workflow> {
        self.target_workflows.get(issue_type_id)
    }

    /// ✍️ Accept a destination for one (type, status) pair.
    ///
    /// Only pairs this calculation offered are accepted, and only destinations the
    /// target workflow can actually hold. Anything else is a caller bug and comes
    /// back as a typed [`MigrationError`], never a silent default.
    pub fn add_user_mapping(
        &mut self,
        issue_type_id: &str,
        old_status_id: &str,
        new_status_id: &str,
    ) -> Result<()> {
        let offered = self
            .statuses_needing_mapping
            .get(issue_type_id)
            .is_some_and(|statuses| statuses.contains(old_status_id))
            || self
                .auto_mapped
                .get(issue_type_id)
                .is_some_and(|statuses| statuses.contains(old_status_id));
        if !offered {
            return Err(MigrationError::MappingNotOffered {
                issue_type_id: issue_type_id.to_string(),
                status_id: old_status_id.to_string(),
            }
            .into());
        }

        if let Some(target) = self.target_workflows.get(issue_type_id) {
            if !target.links_status(new_status_id) {
                return Err(MigrationError::NoLinkedStep {
                    workflow: target.name.clone(),
                    status_id: new_status_id.to_string(),
                }
                .into());
            }
        }

        self.mapping
            .add_mapping(issue_type_id, old_status_id, new_status_id);
        Ok(())
    }

    /// 🕳️ Needs-mapping pairs still without a destination. Empty means ready to migrate.
    pub fn unmapped_statuses(&self) -> BTreeMap<IssueTypeId, BTreeSet<StatusId>> {
        self.statuses_needing_mapping
            .iter()
            .map(|(issue_type_id, statuses)| {
                let missing: BTreeSet<StatusId> = statuses
                    .iter()
                    .filter(|status| !self.mapping.has_mapping(issue_type_id, status))
                    .cloned()
                    .collect();
                (issue_type_id.clone(), missing)
            })
            .filter(|(_, missing)| !missing.is_empty())
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.unmapped_statuses().is_empty()
    }

    pub fn mapping(&self) -> &StatusMappingTable {
        &self.mapping
    }

    pub fn into_mapping(self) -> StatusMappingTable {
        self.mapping
    }
}

/// 🧮 Computes [`MigrationInput`] from the stores. Stateless beyond its store handle.
#[derive(Debug, Clone)]
pub struct MigrationInputCalculator {
    store: Arc<dyn MigrationStore>,
}

impl MigrationInputCalculator {
    pub fn new(store: Arc<dyn MigrationStore>) -> Self {
        Self { store }
    }

    /// 🧮 Work out what moving `project_ids` from `existing` to `target` involves.
    ///
    /// Fails when any workflow either scheme names does not exist, or when a store
    /// call fails. Nothing is written.
    pub async fn calculate<E, T>(
        &self,
        project_ids: &[ProjectId],
        existing: &E,
        target: &T,
    ) -> Result<MigrationInput>
    where
        E: WorkflowScheme,
        T: WorkflowScheme,
    {
        let mut input = MigrationInput::default();
        let issue_types = self
            .store
            .issue_types()
            .await
            .context("💀 Couldn't list issue types while calculating migration input")?;

        for issue_type in issue_types {
            let type_id = issue_type.id;
            let existing_workflow = self
                .load_workflow(&existing.actual_workflow(&type_id))
                .await?;
            let target_workflow = self.load_workflow(&target.actual_workflow(&type_id)).await?;

            let strays = self
                .store
                .issues_not_on_workflow(project_ids, &type_id, &existing_workflow.name)
                .await
                .with_context(|| {
                    format!("💀 Couldn't look for wrong-workflow issues of type '{type_id}'")
                })?;
            if !strays.is_empty() {
                info!(
                    "🚩 {} issue(s) of type '{}' are not on workflow '{}'; they will be forced through migration",
                    strays.len(),
                    type_id,
                    existing_workflow.name
                );
            }
            let needs_migration = existing_workflow != target_workflow || !strays.is_empty();
            input.mapping.add_wrong_workflow_issues(strays);

            if !needs_migration {
                debug!(
                    "✅ Issue type '{}' stays on '{}', nothing to map",
                    type_id, existing_workflow.name
                );
                continue;
            }

            let mut in_use: BTreeSet<StatusId> =
                existing_workflow.linked_statuses().into_iter().collect();
            in_use.extend(
                self.store
                    .statuses_in_use(project_ids, &type_id)
                    .await
                    .with_context(|| {
                        format!("💀 Couldn't list statuses in use for issue type '{type_id}'")
                    })?,
            );

            let (valid, needs_mapping): (BTreeSet<StatusId>, BTreeSet<StatusId>) = in_use
                .into_iter()
                .partition(|status| target_workflow.links_status(status));
            for status in &valid {
                input.mapping.add_mapping(type_id.as_str(), status.as_str(), status.as_str());
            }
            debug!(
                "🧮 Issue type '{}': '{}' → '{}', {} auto-mapped, {} need mapping",
                type_id,
                existing_workflow.name,
                target_workflow.name,
                valid.len(),
                needs_mapping.len()
            );

            input.types_needing_migration.insert(type_id.clone());
            input.auto_mapped.insert(type_id.clone(), valid);
            if !needs_mapping.is_empty() {
                input
                    .statuses_needing_mapping
                    .insert(type_id.clone(), needs_mapping);
            }
            input.target_workflows.insert(type_id, target_workflow);
        }

        Ok(input)
    }

    async fn load_workflow(&self, name: &str) -> Result<Workflow> {
        self.store
            .workflow(name)
            .await
            .with_context(|| format!("💀 Couldn't load workflow '{name}'"))?
            .ok_or_else(|| MigrationError::UnknownWorkflow(name.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryStore, StoreSnapshot};
    use crate::common::{IssueId, SchemeId};
    use crate::scheme::{AssignableWorkflowScheme, SchemeMappings};

    fn scheme(id: u64, mappings: SchemeMappings) -> AssignableWorkflowScheme {
        AssignableWorkflowScheme {
            id: Some(SchemeId(id)),
            name: format!("scheme-{id}"),
            description: None,
            mappings,
        }
    }

    /// 🧪 Bug: A = {Open, In Progress, Done}, B = {Open, Done}. Task stays on A.
    fn bug_store() -> InMemoryStore {
        InMemoryStore::new(
            StoreSnapshot::new()
                .with_issue_type("bug", "Bug")
                .with_issue_type("task", "Task")
                .with_status("1", "Open")
                .with_status("3", "In Progress")
                .with_status("6", "Done")
                .with_workflow("A", &["1", "3", "6"])
                .with_workflow("B", &["1", "6"])
                .with_project(10, "WF", "Workflows")
                .with_issue(1, 10, "bug", "1", "A")
                .with_issue(2, 10, "task", "3", "A"),
        )
    }

    #[tokio::test]
    async fn the_one_where_in_progress_needs_a_new_home() -> Result<()> {
        let store = Arc::new(bug_store());
        let existing = scheme(1, SchemeMappings::new().with_default("A"));
        let target = scheme(2, SchemeMappings::new().with_default("A").with("bug", "B"));

        let mut input = MigrationInputCalculator::new(store)
            .calculate(&[ProjectId(10)], &existing, &target)
            .await?;

        assert_eq!(input.types_needing_migration().iter().collect::<Vec<_>>(), vec!["bug"]);
        assert_eq!(
            input.statuses_needing_mapping("bug"),
            BTreeSet::from(["3".to_string()])
        );
        assert_eq!(
            input.auto_mapped_statuses("bug"),
            BTreeSet::from(["1".to_string(), "6".to_string()])
        );
        assert!(!input.is_ready());

        input.add_user_mapping("bug", "3", "6")?;
        assert!(input.unmapped_statuses().is_empty());
        assert!(input.is_ready());
        assert_eq!(
            input.mapping().target_status("bug", "3").map(String::as_str),
            Some("6")
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_same_workflow_means_no_migration() -> Result<()> {
        let store = Arc::new(bug_store());
        let existing = scheme(1, SchemeMappings::new().with_default("A"));
        let target = scheme(2, SchemeMappings::new().with("bug", "A").with("task", "A"));

        let input = MigrationInputCalculator::new(store)
            .calculate(&[ProjectId(10)], &existing, &target)
            .await?;
        assert!(input.types_needing_migration().is_empty());
        assert!(input.mapping().is_empty());
        assert!(input.is_ready());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_stragglers_drag_their_type_into_migration() -> Result<()> {
        // 🧪 same workflow both sides, but issue 3 is stuck on 'B' from a failed run
        let store = InMemoryStore::new(
            bug_store()
                .snapshot()
                .await
                .with_issue(3, 10, "task", "6", "B"),
        );
        let existing = scheme(1, SchemeMappings::new().with_default("A"));

        let input = MigrationInputCalculator::new(Arc::new(store))
            .calculate(&[ProjectId(10)], &existing, &existing)
            .await?;
        assert!(input.needs_migration("task"));
        assert!(!input.needs_migration("bug"));
        assert!(input.mapping().is_issue_on_wrong_workflow(IssueId(3)));
        assert!(!input.mapping().is_issue_on_wrong_workflow(IssueId(2)));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_orphan_statuses_on_issues_still_count() -> Result<()> {
        // 🧪 issue 4 is Bug in status 9, which no workflow links. it still needs a destination.
        let store = InMemoryStore::new(
            bug_store()
                .snapshot()
                .await
                .with_status("9", "Limbo")
                .with_issue(4, 10, "bug", "9", "A"),
        );
        let existing = scheme(1, SchemeMappings::new().with_default("A"));
        let target = scheme(2, SchemeMappings::new().with_default("A").with("bug", "B"));

        let input = MigrationInputCalculator::new(Arc::new(store))
            .calculate(&[ProjectId(10)], &existing, &target)
            .await?;
        assert_eq!(
            input.statuses_needing_mapping("bug"),
            BTreeSet::from(["3".to_string(), "9".to_string()])
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_unoffered_mappings_are_refused() -> Result<()> {
        let store = Arc::new(bug_store());
        let existing = scheme(1, SchemeMappings::new().with_default("A"));
        let target = scheme(2, SchemeMappings::new().with_default("A").with("bug", "B"));
        let mut input = MigrationInputCalculator::new(store)
            .calculate(&[ProjectId(10)], &existing, &target)
            .await?;

        let err = input
            .add_user_mapping("task", "3", "6")
            .expect_err("task never needed mapping");
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::MappingNotOffered { .. })
        ));

        let err = input
            .add_user_mapping("bug", "3", "3")
            .expect_err("In Progress does not exist in B");
        assert!(matches!(
            err.downcast_ref::<MigrationError>(),
            Some(MigrationError::NoLinkedStep { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_target_workflow_fails_closed() {
        let store = Arc::new(bug_store());
        let existing = scheme(1, SchemeMappings::new().with_default("A"));
        let target = scheme(2, SchemeMappings::new().with_default("ghost"));
        let err = MigrationInputCalculator::new(store)
            .calculate(&[ProjectId(10)], &existing, &target)
            .await
            .expect_err("'ghost' is not a workflow");
        assert_eq!(
            err.downcast_ref::<MigrationError>(),
            Some(&MigrationError::UnknownWorkflow("ghost".to_string()))
        );
    }
}
