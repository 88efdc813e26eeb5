//! 🔌 Backends: where the real I/O happens.
//!
//! 🎭 The migration engine never touches a database. It talks to these traits,
//! one per concern: constants, issues, workflows, schemes, change history, the
//! search index and transactions. Everything gets passed in. Nothing gets looked
//! up from a magic static. The borrow checker sends its regards.
//!
//! [`MigrationStore`] bundles them so the engine can hold one
//! `Arc<dyn MigrationStore>` instead of seven handles.
//!
//! Each call is assumed to be individually atomic. Multi-call atomicity for one
//! issue comes from [`Transactional`].
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{
    ChangeItem, Issue, IssueId, IssueType, Project, ProjectId, SchemeId, Status, StatusId,
    Workflow, WorkflowEntry,
};
use crate::scheme::{AssignableWorkflowScheme, DraftWorkflowScheme, SchemeMappings};

pub mod file;
pub mod in_mem;

pub use in_mem::{InMemoryStore, StoreSnapshot};

/// 🏷️ Issue types and statuses. The "constants" every instance configures once.
#[async_trait]
pub trait ConstantsStore: Send + Sync {
    async fn issue_types(&self) -> Result<Vec<IssueType>>;
    async fn status(&self, status_id: &str) -> Result<Option<Status>>;
}

/// 🗃️ Issue rows.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// 📋 Every issue id in the project, in id order. Errors here are fatal to a migration.
    async fn issue_ids_for_project(&self, project_id: ProjectId) -> Result<Vec<IssueId>>;

    async fn find_issue(&self, issue_id: IssueId) -> Result<Option<Issue>>;

    /// 🔢 How many issues of the given types live in the project.
    async fn count_issues_of_types(
        &self,
        project_id: ProjectId,
        issue_type_ids: &[String],
    ) -> Result<usize>;

    /// 👀 Statuses actually observed on persisted issues of this type in these projects.
    async fn statuses_in_use(
        &self,
        project_ids: &[ProjectId],
        issue_type_id: &str,
    ) -> Result<BTreeSet<StatusId>>;

    /// 🚩 Issues of this type whose persisted workflow entry is NOT named `expected_workflow`.
    async fn issues_not_on_workflow(
        &self,
        project_ids: &[ProjectId],
        issue_type_id: &str,
        expected_workflow: &str,
    ) -> Result<Vec<IssueId>>;
}

/// 🕸️ Workflow definitions plus the engine state behind each issue.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn workflow(&self, name: &str) -> Result<Option<Workflow>>;

    async fn workflow_entry(&self, entry_id: u64) -> Result<Option<WorkflowEntry>>;

    /// 🔀 Move the issue onto `workflow` at `status`: new activated entry, old entry
    /// killed, current step moved to history, issue status and entry id updated.
    ///
    /// Returns `true` when the issue's indexed fields changed (its status), which is
    /// the caller's cue to reindex. Does not reindex itself.
    async fn migrate_issue_to_workflow(
        &self,
        issue: &Issue,
        workflow: &Workflow,
        status: &Status,
    ) -> Result<bool>;
}

/// 🗺️ Scheme lookup, assignment and housekeeping. Each call is atomic.
#[async_trait]
pub trait SchemeStore: Send + Sync {
    async fn project(&self, project_id: ProjectId) -> Result<Option<Project>>;

    /// 📌 The project's scheme, or the system default when none is assigned.
    async fn scheme_for_project(&self, project_id: ProjectId) -> Result<AssignableWorkflowScheme>;

    async fn scheme(&self, scheme_id: SchemeId) -> Result<Option<AssignableWorkflowScheme>>;

    async fn draft_for_parent(&self, parent_id: SchemeId) -> Result<Option<DraftWorkflowScheme>>;

    async fn projects_using(&self, scheme_id: SchemeId) -> Result<Vec<Project>>;

    /// 🔗 Attach `scheme_id` to the project, or detach to the default with `None`.
    async fn assign_scheme(&self, project_id: ProjectId, scheme_id: Option<SchemeId>) -> Result<()>;

    async fn create_scheme(
        &self,
        name: &str,
        description: Option<String>,
        mappings: SchemeMappings,
    ) -> Result<AssignableWorkflowScheme>;

    /// 🗑️ Fails if any project still uses the scheme. Takes its draft with it.
    async fn delete_scheme(&self, scheme_id: SchemeId) -> Result<()>;

    async fn delete_draft(&self, draft_id: SchemeId) -> Result<()>;

    /// ♻️ Parent takes the draft's mappings; the draft is deleted.
    async fn replace_scheme_with_draft(&self, draft_id: SchemeId) -> Result<AssignableWorkflowScheme>;
}

/// 📜 Append-only issue history.
#[async_trait]
pub trait ChangeHistoryStore: Send + Sync {
    async fn create_change_group(
        &self,
        issue_id: IssueId,
        author: Option<&str>,
        items: Vec<ChangeItem>,
    ) -> Result<()>;
}

/// 🔍 The search index gate. While held, reindex requests queue up; `release`
/// flushes them. Keeps a row that might still roll back out of the index.
#[async_trait]
pub trait IssueIndex: Send + Sync {
    async fn hold(&self);
    async fn release(&self) -> Result<()>;
    async fn reindex(&self, issue_id: IssueId) -> Result<()>;
}

/// 🧾 Short transactions, one issue wide. Never nested.
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn begin(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
}

/// 🎁 Everything the migration engine needs, in one trait object.
pub trait MigrationStore:
    ConstantsStore
    + IssueStore
    + WorkflowStore
    + SchemeStore
    + ChangeHistoryStore
    + IssueIndex
    + Transactional
    + std::fmt::Debug
{
}

impl<T> MigrationStore for T where
    T: ConstantsStore
        + IssueStore
        + WorkflowStore
        + SchemeStore
        + ChangeHistoryStore
        + IssueIndex
        + Transactional
        + std::fmt::Debug
{
}
