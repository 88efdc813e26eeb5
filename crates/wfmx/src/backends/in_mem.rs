//! # Previously, on wfmx...
//!
//! 🎬 The issues were trapped. Stranded on a workflow nobody wanted any more,
//! like travelers stuck in a connecting airport with no WiFi and a dead phone.
//! Someone had to move them. Someone had to write a store so simple it lives
//! entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! [`InMemoryStore`] implements every boundary trait in [`crate::backends`] over a
//! [`StoreSnapshot`]. Transactions are snapshot-and-restore, which is honest for a
//! store that only ever has one migration writing to it. The index gate queues
//! reindex requests while held. And because tests need to watch things go wrong
//! on purpose, issues can be poisoned, enumeration can be told to fail, the index
//! can go offline, and issues can turn up in the middle of a migration. 🦆
//!
//! ✅ No network calls. No disk I/O (that's [`super::file`]'s job). Just heap.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::backends::{
    ChangeHistoryStore, ConstantsStore, IssueIndex, IssueStore, SchemeStore, Transactional,
    WorkflowStore,
};
use crate::common::{
    ChangeGroup, ChangeItem, CurrentStep, EntryState, Issue, IssueId, IssueType, Project,
    ProjectId, SchemeId, Status, StatusId, StepDescriptor, Workflow, WorkflowEntry,
};
use crate::error::MigrationError;
use crate::scheme::{AssignableWorkflowScheme, DraftWorkflowScheme, SchemeMappings};

/// 📦 Every row the store holds. Serializable, so [`super::file`] can park it on disk.
///
/// Also doubles as a fixture builder: the `with_*` methods chain, so a test can
/// describe a whole instance in one expression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub issue_types: Vec<IssueType>,
    #[serde(default)]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub schemes: Vec<AssignableWorkflowScheme>,
    #[serde(default)]
    pub drafts: Vec<DraftWorkflowScheme>,
    #[serde(default)]
    pub project_schemes: BTreeMap<ProjectId, SchemeId>,
    #[serde(default)]
    pub issues: BTreeMap<IssueId, Issue>,
    #[serde(default)]
    pub entries: BTreeMap<u64, WorkflowEntry>,
    #[serde(default)]
    pub current_steps: Vec<CurrentStep>,
    #[serde(default)]
    pub history_steps: Vec<CurrentStep>,
    #[serde(default)]
    pub change_groups: Vec<ChangeGroup>,
    /// 🔢 Last id handed out. Shared by entries, schemes and change groups.
    #[serde(default)]
    pub next_id: u64,
}

impl StoreSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn reserve_id(&mut self, id: u64) {
        self.next_id = self.next_id.max(id);
    }

    pub fn with_issue_type(mut self, id: &str, name: &str) -> Self {
        self.issue_types.push(IssueType {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_status(mut self, id: &str, name: &str) -> Self {
        self.statuses.push(Status {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// 🕸️ A workflow with one step per status, step ids counting from 1.
    pub fn with_workflow(mut self, name: &str, status_ids: &[&str]) -> Self {
        let steps = status_ids
            .iter()
            .zip(1u32..)
            .map(|(status_id, step_id)| StepDescriptor {
                id: step_id,
                name: format!("{name}:{status_id}"),
                linked_status_id: status_id.to_string(),
            })
            .collect();
        self.workflows.push(Workflow::new(name, steps));
        self
    }

    pub fn with_project(mut self, id: u64, key: &str, name: &str) -> Self {
        self.projects.push(Project {
            id: ProjectId(id),
            key: key.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_scheme(mut self, id: u64, name: &str, mappings: SchemeMappings) -> Self {
        self.reserve_id(id);
        self.schemes.push(AssignableWorkflowScheme {
            id: Some(SchemeId(id)),
            name: name.to_string(),
            description: None,
            mappings,
        });
        self
    }

    pub fn with_draft(mut self, id: u64, parent_id: u64, mappings: SchemeMappings) -> Self {
        self.reserve_id(id);
        let name = self
            .schemes
            .iter()
            .find(|scheme| scheme.id == Some(SchemeId(parent_id)))
            .map(|scheme| scheme.name.clone())
            .unwrap_or_default();
        self.drafts.push(DraftWorkflowScheme {
            id: SchemeId(id),
            parent_id: SchemeId(parent_id),
            name,
            mappings,
            last_modified_user: None,
        });
        self
    }

    pub fn assign(mut self, project_id: u64, scheme_id: u64) -> Self {
        self.project_schemes
            .insert(ProjectId(project_id), SchemeId(scheme_id));
        self
    }

    /// 🎯 An issue living on `workflow_name` in `status_id`, with a fresh entry and
    /// current step. The workflow doesn't have to link the status: that's how
    /// tests build the "inconsistent issue" cases.
    pub fn with_issue(
        mut self,
        id: u64,
        project_id: u64,
        issue_type_id: &str,
        status_id: &str,
        workflow_name: &str,
    ) -> Self {
        let entry_id = self.alloc_id();
        self.entries.insert(
            entry_id,
            WorkflowEntry {
                id: entry_id,
                workflow_name: workflow_name.to_string(),
                state: EntryState::Activated,
            },
        );
        let step_id = self
            .workflows
            .iter()
            .find(|workflow| workflow.name == workflow_name)
            .and_then(|workflow| workflow.linked_step(status_id))
            .map(|step| step.id)
            .unwrap_or(0);
        self.current_steps.push(CurrentStep {
            entry_id,
            step_id,
            status_id: status_id.to_string(),
            owner: None,
        });
        let key = self
            .projects
            .iter()
            .find(|project| project.id == ProjectId(project_id))
            .map(|project| project.key.clone())
            .unwrap_or_else(|| "ISSUE".to_string());
        self.issues.insert(
            IssueId(id),
            Issue {
                id: IssueId(id),
                key: format!("{key}-{id}"),
                project_id: ProjectId(project_id),
                issue_type_id: issue_type_id.to_string(),
                status_id: status_id.to_string(),
                workflow_entry_id: entry_id,
            },
        );
        self
    }

    /// 🔎 Which workflow an issue's persisted entry says it is on.
    pub fn workflow_name_of(&self, issue_id: IssueId) -> Option<&str> {
        let issue = self.issues.get(&issue_id)?;
        self.entries
            .get(&issue.workflow_entry_id)
            .map(|entry| entry.workflow_name.as_str())
    }

    fn find_scheme_mut(&mut self, scheme_id: SchemeId) -> Option<&mut AssignableWorkflowScheme> {
        self.schemes
            .iter_mut()
            .find(|scheme| scheme.id == Some(scheme_id))
    }
}

/// 🔍 Index gate bookkeeping.
#[derive(Debug, Default)]
struct IndexState {
    holds: u32,
    pending: Vec<IssueId>,
    reindexed: Vec<IssueId>,
}

/// 🐣 An issue created by "someone else" right before an enumeration lists it.
#[derive(Debug, Clone)]
struct Arrival {
    on_enumeration: usize,
    id: u64,
    project_id: u64,
    issue_type_id: String,
    status_id: String,
    workflow_name: String,
}

/// 💣 Things tests want to break, and a log of what got attempted.
#[derive(Debug, Default)]
struct Faults {
    poisoned_issues: BTreeSet<IssueId>,
    /// Enumerations allowed to succeed, counted from the first call ever.
    enumeration_budget: Option<usize>,
    enumerations: usize,
    arrivals: Vec<Arrival>,
    index_offline: bool,
    migration_attempts: Vec<IssueId>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<StoreSnapshot>,
    txn: Mutex<Option<StoreSnapshot>>,
    index: Mutex<IndexState>,
    faults: Mutex<Faults>,
}

/// 📦 The whole instance, in RAM, behind an `Arc` so the engine and the test that
/// built it can both hold it. Clone is cheap and shares state.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new(snapshot: StoreSnapshot) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(snapshot),
                ..Default::default()
            }),
        }
    }

    /// 📸 A copy of every row, as of now.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.state.lock().await.clone()
    }

    /// 💣 Make every workflow migration of this issue fail.
    pub async fn poison_issue(&self, issue_id: IssueId) {
        self.inner.faults.lock().await.poisoned_issues.insert(issue_id);
    }

    /// 💣 Make issue enumeration fail, as if the database went for a walk.
    pub async fn fail_issue_enumeration(&self, fail: bool) {
        self.inner.faults.lock().await.enumeration_budget = fail.then_some(0);
    }

    /// 💣 Let the next `successes` enumerations through, fail every one after that.
    pub async fn fail_issue_enumeration_after(&self, successes: usize) {
        let mut faults = self.inner.faults.lock().await;
        faults.enumeration_budget = Some(faults.enumerations + successes);
    }

    /// 🐣 Create an issue just before the `nth` enumeration from now (1-based) runs,
    /// as if a user filed it while a migration was in flight.
    pub async fn create_issue_on_enumeration(
        &self,
        nth: usize,
        id: u64,
        project_id: u64,
        issue_type_id: &str,
        status_id: &str,
        workflow_name: &str,
    ) {
        let mut faults = self.inner.faults.lock().await;
        let on_enumeration = faults.enumerations + nth;
        faults.arrivals.push(Arrival {
            on_enumeration,
            id,
            project_id,
            issue_type_id: issue_type_id.to_string(),
            status_id: status_id.to_string(),
            workflow_name: workflow_name.to_string(),
        });
    }

    /// 💣 Every reindex and every gate release fails while the index is offline.
    pub async fn take_index_offline(&self, offline: bool) {
        self.inner.faults.lock().await.index_offline = offline;
    }

    /// 📋 Issue ids passed to `migrate_issue_to_workflow`, in call order, including failures.
    pub async fn migration_attempts(&self) -> Vec<IssueId> {
        self.inner.faults.lock().await.migration_attempts.clone()
    }

    /// 📋 Issues that actually made it into the index, in flush order.
    pub async fn reindexed(&self) -> Vec<IssueId> {
        self.inner.index.lock().await.reindexed.clone()
    }

    pub async fn is_index_held(&self) -> bool {
        self.inner.index.lock().await.holds > 0
    }

    pub async fn is_in_transaction(&self) -> bool {
        self.inner.txn.lock().await.is_some()
    }
}

#[async_trait]
impl ConstantsStore for InMemoryStore {
    async fn issue_types(&self) -> Result<Vec<IssueType>> {
        Ok(self.inner.state.lock().await.issue_types.clone())
    }

    async fn status(&self, status_id: &str) -> Result<Option<Status>> {
        let state = self.inner.state.lock().await;
        Ok(state.statuses.iter().find(|s| s.id == status_id).cloned())
    }
}

#[async_trait]
impl IssueStore for InMemoryStore {
    async fn issue_ids_for_project(&self, project_id: ProjectId) -> Result<Vec<IssueId>> {
        let arrivals = {
            let mut faults = self.inner.faults.lock().await;
            faults.enumerations += 1;
            let call = faults.enumerations;
            if faults.enumeration_budget.is_some_and(|budget| call > budget) {
                return Err(MigrationError::Injected(format!(
                    "issue enumeration for project {project_id} failed"
                ))
                .into());
            }
            let (due, later): (Vec<Arrival>, Vec<Arrival>) = std::mem::take(&mut faults.arrivals)
                .into_iter()
                .partition(|arrival| arrival.on_enumeration == call);
            faults.arrivals = later;
            due
        };
        let mut state = self.inner.state.lock().await;
        for arrival in arrivals {
            let snapshot = std::mem::take(&mut *state);
            *state = snapshot.with_issue(
                arrival.id,
                arrival.project_id,
                &arrival.issue_type_id,
                &arrival.status_id,
                &arrival.workflow_name,
            );
        }
        Ok(state
            .issues
            .values()
            .filter(|issue| issue.project_id == project_id)
            .map(|issue| issue.id)
            .collect())
    }

    async fn find_issue(&self, issue_id: IssueId) -> Result<Option<Issue>> {
        Ok(self.inner.state.lock().await.issues.get(&issue_id).cloned())
    }

    async fn count_issues_of_types(
        &self,
        project_id: ProjectId,
        issue_type_ids: &[String],
    ) -> Result<usize> {
        let state = self.inner.state.lock().await;
        Ok(state
            .issues
            .values()
            .filter(|issue| {
                issue.project_id == project_id && issue_type_ids.contains(&issue.issue_type_id)
            })
            .count())
    }

    async fn statuses_in_use(
        &self,
        project_ids: &[ProjectId],
        issue_type_id: &str,
    ) -> Result<BTreeSet<StatusId>> {
        let state = self.inner.state.lock().await;
        Ok(state
            .issues
            .values()
            .filter(|issue| {
                project_ids.contains(&issue.project_id) && issue.issue_type_id == issue_type_id
            })
            .map(|issue| issue.status_id.clone())
            .collect())
    }

    async fn issues_not_on_workflow(
        &self,
        project_ids: &[ProjectId],
        issue_type_id: &str,
        expected_workflow: &str,
    ) -> Result<Vec<IssueId>> {
        let state = self.inner.state.lock().await;
        // -- 🚩 a missing entry counts as "wrong": the issue needs a fresh one either way
        Ok(state
            .issues
            .values()
            .filter(|issue| {
                project_ids.contains(&issue.project_id) && issue.issue_type_id == issue_type_id
            })
            .filter(|issue| {
                state
                    .entries
                    .get(&issue.workflow_entry_id)
                    .is_none_or(|entry| entry.workflow_name != expected_workflow)
            })
            .map(|issue| issue.id)
            .collect())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn workflow(&self, name: &str) -> Result<Option<Workflow>> {
        let state = self.inner.state.lock().await;
        Ok(state.workflows.iter().find(|w| w.name == name).cloned())
    }

    async fn workflow_entry(&self, entry_id: u64) -> Result<Option<WorkflowEntry>> {
        Ok(self.inner.state.lock().await.entries.get(&entry_id).cloned())
    }

    async fn migrate_issue_to_workflow(
        &self,
        issue: &Issue,
        workflow: &Workflow,
        status: &Status,
    ) -> Result<bool> {
        {
            let mut faults = self.inner.faults.lock().await;
            faults.migration_attempts.push(issue.id);
            if faults.poisoned_issues.contains(&issue.id) {
                return Err(MigrationError::Injected(format!(
                    "issue {} refuses to change workflows",
                    issue.key
                ))
                .into());
            }
        }

        let mut state = self.inner.state.lock().await;
        let old_entry_id = state
            .issues
            .get(&issue.id)
            .map(|stored| stored.workflow_entry_id)
            .ok_or(MigrationError::IssueNotFound(issue.id))?;

        let step = workflow
            .linked_step(&status.id)
            .ok_or_else(|| MigrationError::NoLinkedStep {
                workflow: workflow.name.clone(),
                status_id: status.id.clone(),
            })?;
        let step_id = step.id;

        // 🧬 new activated entry on the target workflow, old one killed
        let new_entry_id = state.alloc_id();
        state.entries.insert(
            new_entry_id,
            WorkflowEntry {
                id: new_entry_id,
                workflow_name: workflow.name.clone(),
                state: EntryState::Activated,
            },
        );
        if let Some(old_entry) = state.entries.get_mut(&old_entry_id) {
            old_entry.state = EntryState::Killed;
        }

        // 📍 carry the owner over from the old current step, then retire it to history
        let old_step_index = state
            .current_steps
            .iter()
            .position(|step| step.entry_id == old_entry_id);
        let owner = match old_step_index {
            Some(index) => {
                let old_step = state.current_steps.remove(index);
                let owner = old_step.owner.clone();
                state.history_steps.push(old_step);
                owner
            }
            None => None,
        };
        state.current_steps.push(CurrentStep {
            entry_id: new_entry_id,
            step_id,
            status_id: status.id.clone(),
            owner,
        });

        let stored = state
            .issues
            .get_mut(&issue.id)
            .ok_or(MigrationError::IssueNotFound(issue.id))?;
        let status_changed = stored.status_id != status.id;
        stored.status_id = status.id.clone();
        stored.workflow_entry_id = new_entry_id;

        debug!(
            "🔀 {} moved to '{}' (entry {} → {})",
            issue.key, workflow.name, old_entry_id, new_entry_id
        );
        Ok(status_changed)
    }
}

#[async_trait]
impl SchemeStore for InMemoryStore {
    async fn project(&self, project_id: ProjectId) -> Result<Option<Project>> {
        let state = self.inner.state.lock().await;
        Ok(state.projects.iter().find(|p| p.id == project_id).cloned())
    }

    async fn scheme_for_project(&self, project_id: ProjectId) -> Result<AssignableWorkflowScheme> {
        let state = self.inner.state.lock().await;
        let Some(scheme_id) = state.project_schemes.get(&project_id) else {
            return Ok(AssignableWorkflowScheme::system_default());
        };
        state
            .schemes
            .iter()
            .find(|scheme| scheme.id == Some(*scheme_id))
            .cloned()
            .ok_or_else(|| MigrationError::SchemeNotFound(*scheme_id).into())
    }

    async fn scheme(&self, scheme_id: SchemeId) -> Result<Option<AssignableWorkflowScheme>> {
        let state = self.inner.state.lock().await;
        Ok(state
            .schemes
            .iter()
            .find(|scheme| scheme.id == Some(scheme_id))
            .cloned())
    }

    async fn draft_for_parent(&self, parent_id: SchemeId) -> Result<Option<DraftWorkflowScheme>> {
        let state = self.inner.state.lock().await;
        Ok(state
            .drafts
            .iter()
            .find(|d| d.parent_id == parent_id)
            .cloned())
    }

    async fn projects_using(&self, scheme_id: SchemeId) -> Result<Vec<Project>> {
        let state = self.inner.state.lock().await;
        Ok(state
            .projects
            .iter()
            .filter(|project| state.project_schemes.get(&project.id) == Some(&scheme_id))
            .cloned()
            .collect())
    }

    async fn assign_scheme(&self, project_id: ProjectId, scheme_id: Option<SchemeId>) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if !state.projects.iter().any(|p| p.id == project_id) {
            return Err(MigrationError::ProjectNotFound(project_id).into());
        }
        match scheme_id {
            Some(scheme_id) => {
                if !state.schemes.iter().any(|s| s.id == Some(scheme_id)) {
                    return Err(MigrationError::SchemeNotFound(scheme_id).into());
                }
                state.project_schemes.insert(project_id, scheme_id);
            }
            None => {
                state.project_schemes.remove(&project_id);
            }
        }
        Ok(())
    }

    async fn create_scheme(
        &self,
        name: &str,
        description: Option<String>,
        mappings: SchemeMappings,
    ) -> Result<AssignableWorkflowScheme> {
        let mut state = self.inner.state.lock().await;
        let id = SchemeId(state.alloc_id());
        let scheme = AssignableWorkflowScheme {
            id: Some(id),
            name: name.to_string(),
            description,
            mappings,
        };
        state.schemes.push(scheme.clone());
        Ok(scheme)
    }

    async fn delete_scheme(&self, scheme_id: SchemeId) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.project_schemes.values().any(|id| *id == scheme_id) {
            return Err(MigrationError::SchemeInUse(scheme_id).into());
        }
        let before = state.schemes.len();
        state.schemes.retain(|scheme| scheme.id != Some(scheme_id));
        if state.schemes.len() == before {
            return Err(MigrationError::SchemeNotFound(scheme_id).into());
        }
        state.drafts.retain(|draft| draft.parent_id != scheme_id);
        Ok(())
    }

    async fn delete_draft(&self, draft_id: SchemeId) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let before = state.drafts.len();
        state.drafts.retain(|draft| draft.id != draft_id);
        if state.drafts.len() == before {
            return Err(MigrationError::DraftNotFound(draft_id).into());
        }
        Ok(())
    }

    async fn replace_scheme_with_draft(&self, draft_id: SchemeId) -> Result<AssignableWorkflowScheme> {
        let mut state = self.inner.state.lock().await;
        let draft = state
            .drafts
            .iter()
            .find(|draft| draft.id == draft_id)
            .cloned()
            .ok_or(MigrationError::DraftNotFound(draft_id))?;
        let parent = state
            .find_scheme_mut(draft.parent_id)
            .ok_or(MigrationError::SchemeNotFound(draft.parent_id))?;
        parent.mappings = draft.mappings;
        let updated = parent.clone();
        state.drafts.retain(|d| d.id != draft_id);
        Ok(updated)
    }
}

#[async_trait]
impl ChangeHistoryStore for InMemoryStore {
    async fn create_change_group(
        &self,
        issue_id: IssueId,
        author: Option<&str>,
        items: Vec<ChangeItem>,
    ) -> Result<()> {
        let created_epoch_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let mut state = self.inner.state.lock().await;
        let id = state.alloc_id();
        state.change_groups.push(ChangeGroup {
            id,
            issue_id,
            author: author.map(str::to_string),
            created_epoch_secs,
            items,
        });
        Ok(())
    }
}

#[async_trait]
impl IssueIndex for InMemoryStore {
    async fn hold(&self) {
        self.inner.index.lock().await.holds += 1;
    }

    async fn release(&self) -> Result<()> {
        let offline = self.inner.faults.lock().await.index_offline;
        let mut index = self.inner.index.lock().await;
        index.holds = index.holds.saturating_sub(1);
        if offline {
            index.pending.clear();
            return Err(MigrationError::Injected("the index is offline".to_string()).into());
        }
        if index.holds == 0 {
            let flushed = std::mem::take(&mut index.pending);
            index.reindexed.extend(flushed);
        }
        Ok(())
    }

    async fn reindex(&self, issue_id: IssueId) -> Result<()> {
        if self.inner.faults.lock().await.index_offline {
            return Err(MigrationError::Injected(format!(
                "the index is offline, issue {issue_id} stays stale"
            ))
            .into());
        }
        let mut index = self.inner.index.lock().await;
        if index.holds > 0 {
            index.pending.push(issue_id);
        } else {
            index.reindexed.push(issue_id);
        }
        Ok(())
    }
}

#[async_trait]
impl Transactional for InMemoryStore {
    async fn begin(&self) -> Result<()> {
        let mut txn = self.inner.txn.lock().await;
        if txn.is_some() {
            return Err(MigrationError::TransactionAlreadyOpen.into());
        }
        *txn = Some(self.inner.state.lock().await.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut txn = self.inner.txn.lock().await;
        txn.take().ok_or(MigrationError::NoTransaction)?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut txn = self.inner.txn.lock().await;
        let saved = txn.take().ok_or(MigrationError::NoTransaction)?;
        *self.inner.state.lock().await = saved;
        Ok(())
    }
}
