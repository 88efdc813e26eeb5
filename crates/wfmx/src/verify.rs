//! 🔬 Pre-flight checks for a single issue.
//!
//! Before a project migration mutates anything, every issue goes through
//! [`IssueVerifier::verify_for_migration`]. The question is narrow: "if we
//! migrated this issue right now, would the mapping table know where to put it,
//! and does that place exist in the target workflow?"
//!
//! Current-state integrity is a separate, optional question. The project migrator
//! never asks it: issues already in a bad state are exactly the ones a migration
//! is supposed to rescue.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::backends::MigrationStore;
use crate::common::{ErrorCollection, Issue, IssueTypeId, Workflow};
use crate::i18n::{self, I18n};
use crate::mapping::StatusMappingTable;

pub struct IssueVerifier<'a> {
    store: &'a dyn MigrationStore,
    i18n: &'a dyn I18n,
}

impl<'a> IssueVerifier<'a> {
    pub fn new(store: &'a dyn MigrationStore, i18n: &'a dyn I18n) -> Self {
        Self { store, i18n }
    }

    /// 🔬 Errors for this issue, empty when it is good to go.
    ///
    /// `target_workflow` is the workflow the issue's type resolves to under the
    /// scheme being migrated to. Only types in `types_needing_migration` are held to
    /// the mapping table; the rest keep their status and are not checked.
    pub async fn verify_for_migration(
        &self,
        issue: &Issue,
        types_needing_migration: &BTreeSet<IssueTypeId>,
        mapping: &StatusMappingTable,
        target_workflow: &Workflow,
        check_current_integrity: bool,
    ) -> Result<ErrorCollection> {
        let mut errors = ErrorCollection::new();

        if types_needing_migration.contains(&issue.issue_type_id) {
            match mapping.target_status_for(issue) {
                None => {
                    let status_name = self.status_name(&issue.status_id).await?;
                    errors.add_error_message(self.i18n.text(
                        i18n::ERROR_NO_MAPPING,
                        &[&issue.key, &status_name, &issue.issue_type_id],
                    ));
                }
                Some(target) if !target_workflow.links_status(target) => {
                    let status_name = self.status_name(target).await?;
                    errors.add_error_message(self.i18n.text(
                        i18n::ERROR_TARGET_NOT_IN_WORKFLOW,
                        &[&issue.key, &status_name, &target_workflow.name],
                    ));
                }
                Some(_) => {}
            }
        }

        if check_current_integrity {
            errors.add_error_collection(self.verify_current_integrity(issue).await?);
        }

        Ok(errors)
    }

    /// 🩺 Is the issue where its own workflow says it can be?
    async fn verify_current_integrity(&self, issue: &Issue) -> Result<ErrorCollection> {
        let mut errors = ErrorCollection::new();
        let Some(entry) = self.store.workflow_entry(issue.workflow_entry_id).await? else {
            errors.add_error_message(
                self.i18n
                    .text(i18n::ERROR_MISSING_WORKFLOW_ENTRY, &[&issue.key]),
            );
            return Ok(errors);
        };

        let links_status = self
            .store
            .workflow(&entry.workflow_name)
            .await?
            .is_some_and(|workflow| workflow.links_status(&issue.status_id));
        if !links_status {
            let status_name = self.status_name(&issue.status_id).await?;
            errors.add_error_message(self.i18n.text(
                i18n::ERROR_STATUS_NOT_IN_CURRENT_WORKFLOW,
                &[&issue.key, &status_name, &entry.workflow_name],
            ));
        }
        Ok(errors)
    }

    async fn status_name(&self, status_id: &str) -> Result<String> {
        Ok(self
            .store
            .status(status_id)
            .await?
            .map(|status| status.name)
            .unwrap_or_else(|| status_id.to_string()))
    }
}
