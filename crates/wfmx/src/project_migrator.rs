//! 🎬 *[a project. a few thousand issues. a workflow nobody likes any more.]*
//! *[somewhere, a scheme admin clicks "Associate". the lights flicker.]*
//!
//! 🚚 The Per-Project Migrator. Three phases, always in this order:
//!
//! 1. **verify** (0..=16%): every issue is checked against the mapping table. One
//!    bad issue anywhere and the whole project stops here, before a single row
//!    is touched.
//! 2. **re-scan** (17..=22%): issues are enumerated *again*. Someone may have
//!    created one while we were verifying. It gets migrated too.
//! 3. **migrate** (23..=98%): one short transaction per issue. Failures roll back
//!    that issue only, get written down, and the loop moves on, until the
//!    failure threshold trips and we stop digging.
//!
//! Then 99% for the completion hook (usually "assign the new scheme") and 100%.
//!
//! ⚠️ The skip rule is narrow on purpose. An issue is left alone only when its
//! persisted workflow and status already equal the target pair AND it was not
//! caught on the wrong workflow. The wrong-workflow issues are the ones a re-run
//! exists to fix, so they are always rewritten. 🦆

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::backends::MigrationStore;
use crate::common::{ChangeItem, ErrorCollection, Issue, IssueId, IssueTypeId, Project, Workflow};
use crate::error::MigrationError;
use crate::i18n::{self, I18n};
use crate::mapping::StatusMappingTable;
use crate::progress::Progress;
use crate::scheme::WorkflowScheme;
use crate::verify::IssueVerifier;

/// 🔢 How many per-issue failures a project run tolerates before giving up.
pub const DEFAULT_FAILURE_THRESHOLD: usize = 10;

/// 🔧 Knobs for one project run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Reaching this many failed issues terminates the run. Zero is treated as one.
    pub failure_threshold: usize,
    /// ✍️ Written as the author of every change group.
    pub author: Option<String>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            author: None,
        }
    }
}

/// 🏁 Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// 🔬 Verification found problems. Nothing was mutated.
    ValidationErrors(ErrorCollection),
    /// 💥 The failure threshold was reached mid-migration. Earlier successes stay committed.
    FailedIssues(BTreeMap<IssueId, String>),
}

/// 📋 What a project run came back with. Failed issues map id → key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationResult {
    Success {
        failed_issues: BTreeMap<IssueId, String>,
    },
    Terminated(Termination),
}

impl MigrationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MigrationResult::Success { .. })
    }

    pub fn failed_issues(&self) -> BTreeMap<IssueId, String> {
        match self {
            MigrationResult::Success { failed_issues }
            | MigrationResult::Terminated(Termination::FailedIssues(failed_issues)) => {
                failed_issues.clone()
            }
            MigrationResult::Terminated(Termination::ValidationErrors(_)) => BTreeMap::new(),
        }
    }

    pub fn failed_issue_count(&self) -> usize {
        match self {
            MigrationResult::Success { failed_issues }
            | MigrationResult::Terminated(Termination::FailedIssues(failed_issues)) => {
                failed_issues.len()
            }
            MigrationResult::Terminated(Termination::ValidationErrors(_)) => 0,
        }
    }

    /// ✅ Success with not a single failed issue. The only result a scheme swap trusts.
    pub fn is_clean_success(&self) -> bool {
        self.is_success() && self.failed_issue_count() == 0
    }
}

/// 📊 Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub verified: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// 🪝 Runs once, after a project's issues all made it through (possibly with some failures).
#[async_trait]
pub trait OnComplete: Send + Sync + std::fmt::Debug {
    async fn on_complete(&self) -> Result<()>;
}

/// 🕳️ Completion hook that does nothing. Handy when the caller reassigns schemes itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompletion;

#[async_trait]
impl OnComplete for NoCompletion {
    async fn on_complete(&self) -> Result<()> {
        Ok(())
    }
}

enum IssueOutcome {
    Migrated,
    Skipped,
}

/// 🚚 Migrates every issue of one project onto the workflows of `target_scheme`.
#[derive(Debug)]
pub struct ProjectMigrator<T: WorkflowScheme> {
    project: Project,
    target_scheme: T,
    store: Arc<dyn MigrationStore>,
    i18n: Arc<dyn I18n>,
    settings: MigrationSettings,
    on_complete: Arc<dyn OnComplete>,
}

impl<T: WorkflowScheme> ProjectMigrator<T> {
    pub fn new(
        project: Project,
        target_scheme: T,
        store: Arc<dyn MigrationStore>,
        i18n: Arc<dyn I18n>,
        settings: MigrationSettings,
        on_complete: Arc<dyn OnComplete>,
    ) -> Self {
        Self {
            project,
            target_scheme,
            store,
            i18n,
            settings,
            on_complete,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// 🚀 Run all three phases. Infrastructure failures while enumerating issues or
    /// loading target workflows come back as `Err`; everything else is a result.
    pub async fn migrate(
        &self,
        progress: &Progress,
        types_needing_migration: &BTreeSet<IssueTypeId>,
        mapping: &StatusMappingTable,
    ) -> Result<MigrationResult> {
        let (result, _) = self
            .migrate_with_stats(progress, types_needing_migration, mapping)
            .await?;
        Ok(result)
    }

    /// 🚀 Same as [`ProjectMigrator::migrate`], plus the counters.
    pub async fn migrate_with_stats(
        &self,
        progress: &Progress,
        types_needing_migration: &BTreeSet<IssueTypeId>,
        mapping: &StatusMappingTable,
    ) -> Result<(MigrationResult, MigrationStats)> {
        let project_name = self.project.name.as_str();
        let verification = self.i18n.text(i18n::SUBTASK_VERIFICATION, &[]);
        let migration = self.i18n.text(i18n::SUBTASK_MIGRATION, &[]);
        let mut stats = MigrationStats::default();
        let mut workflows: BTreeMap<IssueTypeId, Workflow> = BTreeMap::new();

        info!(
            "🚀 Migrating project '{}' ({}) onto workflow scheme '{}'",
            self.project.key,
            self.project.id,
            self.target_scheme.name()
        );

        // -- 🔬 phase 1: verify everything before touching anything
        progress.report(
            0,
            Some(&verification),
            &self.i18n.text(i18n::PROGRESS_FIND_AFFECTED, &[project_name]),
        );
        let issue_ids = self.enumerate_issues().await?;
        progress.report(
            5,
            Some(&verification),
            &self.i18n.text(i18n::PROGRESS_FOUND_AFFECTED, &[project_name]),
        );

        let total = issue_ids.len().to_string();
        let verify_steps = progress.steps(6, 10, issue_ids.len() as u64);
        let verifier = IssueVerifier::new(self.store.as_ref(), self.i18n.as_ref());
        let mut errors = ErrorCollection::new();
        for (index, issue_id) in issue_ids.iter().enumerate() {
            let position = (index + 1).to_string();
            verify_steps.step(
                index as u64,
                Some(&verification),
                &self.i18n.text(
                    i18n::PROGRESS_VERIFY_ISSUE,
                    &[&position, &total, project_name],
                ),
            );
            let Some(issue) = self.store.find_issue(*issue_id).await? else {
                debug!("👻 Issue {} vanished before verification", issue_id);
                continue;
            };
            let target_workflow = self
                .target_workflow(&mut workflows, &issue.issue_type_id)
                .await?;
            errors.add_error_collection(
                verifier
                    .verify_for_migration(
                        &issue,
                        types_needing_migration,
                        mapping,
                        &target_workflow,
                        false,
                    )
                    .await?,
            );
            stats.verified += 1;
        }
        if errors.has_any_errors() {
            warn!(
                "🛑 Project '{}' failed verification with {} error(s); nothing was migrated",
                self.project.key,
                errors.all_messages().len()
            );
            self.report_stopped(progress, &verification);
            return Ok((
                MigrationResult::Terminated(Termination::ValidationErrors(errors)),
                stats,
            ));
        }

        // -- 🔁 phase 2: fresh scan, catches issues created while we were verifying
        progress.report(
            17,
            Some(&migration),
            &self.i18n.text(i18n::PROGRESS_FIND_AFFECTED, &[project_name]),
        );
        let issue_ids = self.enumerate_issues().await?;
        progress.report(
            22,
            Some(&migration),
            &self.i18n.text(i18n::PROGRESS_FOUND_AFFECTED, &[project_name]),
        );

        // -- 🚚 phase 3: one transaction per issue
        let threshold = self.settings.failure_threshold.max(1);
        let total = issue_ids.len().to_string();
        let migrate_steps = progress.steps(23, 75, issue_ids.len() as u64);
        let mut failed_issues: BTreeMap<IssueId, String> = BTreeMap::new();
        for (index, issue_id) in issue_ids.iter().enumerate() {
            let position = (index + 1).to_string();
            migrate_steps.step(
                index as u64,
                Some(&migration),
                &self.i18n.text(
                    i18n::PROGRESS_MIGRATE_ISSUE,
                    &[&position, &total, project_name],
                ),
            );
            let Some(issue) = self.store.find_issue(*issue_id).await? else {
                debug!("👻 Issue {} vanished before migration", issue_id);
                continue;
            };

            match self
                .migrate_issue(&issue, &mut workflows, types_needing_migration, mapping)
                .await
            {
                Ok(IssueOutcome::Migrated) => stats.migrated += 1,
                Ok(IssueOutcome::Skipped) => stats.skipped += 1,
                Err(err) => {
                    error!("💥 Issue {} failed to migrate: {:#}", issue.key, err);
                    stats.failed += 1;
                    failed_issues.insert(issue.id, issue.key.clone());
                    if failed_issues.len() >= threshold {
                        error!(
                            "🧯 Project '{}' hit {} failed issues; terminating",
                            self.project.key,
                            failed_issues.len()
                        );
                        self.report_stopped(progress, &migration);
                        return Ok((
                            MigrationResult::Terminated(Termination::FailedIssues(failed_issues)),
                            stats,
                        ));
                    }
                }
            }
        }

        progress.report(
            99,
            Some(&migration),
            &self.i18n.text(
                i18n::PROGRESS_ASSIGN_WORKFLOW,
                &[&self.target_scheme_label(), project_name],
            ),
        );
        self.on_complete.on_complete().await.with_context(|| {
            format!(
                "💀 Issues in project '{}' were migrated, but the completion step failed",
                self.project.key
            )
        })?;
        progress.report(
            100,
            Some(&migration),
            &self.i18n.text(i18n::PROGRESS_COMPLETE_IN_PROJECT, &[project_name]),
        );

        info!(
            "🏁 Project '{}' done: {} verified, {} migrated, {} skipped, {} failed",
            self.project.key, stats.verified, stats.migrated, stats.skipped, stats.failed
        );
        Ok((MigrationResult::Success { failed_issues }, stats))
    }

    /// 🏁 A terminated run still walks the bar to the end of its window.
    fn report_stopped(&self, progress: &Progress, sub_task: &str) {
        let done = self
            .i18n
            .text(i18n::PROGRESS_COMPLETE_IN_PROJECT, &[&self.project.name]);
        progress.report(99, Some(sub_task), &done);
        progress.report(100, Some(sub_task), &done);
    }

    /// 🏷️ The system default scheme is shown by the localised word, not its stored name.
    fn target_scheme_label(&self) -> String {
        match self.target_scheme.scheme_id() {
            Some(_) => self.target_scheme.name().to_string(),
            None => self.i18n.text(i18n::WORD_DEFAULT, &[]),
        }
    }

    async fn enumerate_issues(&self) -> Result<Vec<IssueId>> {
        self.store
            .issue_ids_for_project(self.project.id)
            .await
            .with_context(|| {
                format!(
                    "💀 Couldn't enumerate issues of project '{}'",
                    self.project.key
                )
            })
    }

    /// 🗺️ Target workflow for an issue type, loaded once per run.
    async fn target_workflow(
        &self,
        cache: &mut BTreeMap<IssueTypeId, Workflow>,
        issue_type_id: &str,
    ) -> Result<Workflow> {
        if let Some(workflow) = cache.get(issue_type_id) {
            return Ok(workflow.clone());
        }
        let name = self.target_scheme.actual_workflow(issue_type_id);
        let workflow = self
            .store
            .workflow(&name)
            .await?
            .ok_or(MigrationError::UnknownWorkflow(name))?;
        cache.insert(issue_type_id.to_string(), workflow.clone());
        Ok(workflow)
    }

    async fn migrate_issue(
        &self,
        issue: &Issue,
        workflows: &mut BTreeMap<IssueTypeId, Workflow>,
        types_needing_migration: &BTreeSet<IssueTypeId>,
        mapping: &StatusMappingTable,
    ) -> Result<IssueOutcome> {
        let target_workflow = self.target_workflow(workflows, &issue.issue_type_id).await?;
        let target_status_id = match mapping.target_status_for(issue) {
            Some(status_id) => status_id.clone(),
            None if !types_needing_migration.contains(&issue.issue_type_id) => {
                issue.status_id.clone()
            }
            None => {
                return Err(MigrationError::UnmappedStatus {
                    issue_type_id: issue.issue_type_id.clone(),
                    status_id: issue.status_id.clone(),
                }
                .into());
            }
        };

        let current_workflow = self
            .store
            .workflow_entry(issue.workflow_entry_id)
            .await?
            .map(|entry| entry.workflow_name);
        let on_target = current_workflow.as_deref() == Some(target_workflow.name.as_str())
            && issue.status_id == target_status_id;
        if on_target && !mapping.is_issue_on_wrong_workflow(issue.id) {
            debug!(
                "⏭️ {} already on '{}' in status '{}'",
                issue.key, target_workflow.name, target_status_id
            );
            return Ok(IssueOutcome::Skipped);
        }

        self.store.hold().await;
        let migrated = self
            .migrate_in_transaction(issue, current_workflow, &target_workflow, &target_status_id)
            .await;
        // -- 🔍 the transaction is settled either way, a stale index never fails the issue
        if let Err(err) = self.store.release().await {
            warn!(
                "⚠️ The index gate refused to release after issue {}: {:#}",
                issue.key, err
            );
        }
        migrated?;
        Ok(IssueOutcome::Migrated)
    }

    async fn migrate_in_transaction(
        &self,
        issue: &Issue,
        current_workflow: Option<String>,
        target_workflow: &Workflow,
        target_status_id: &str,
    ) -> Result<()> {
        self.store.begin().await?;
        let applied = self
            .apply_migration(issue, current_workflow, target_workflow, target_status_id)
            .await;
        let status_changed = match applied {
            Ok(status_changed) => match self.store.commit().await {
                Ok(()) => status_changed,
                Err(err) => {
                    self.rollback_quietly(issue).await;
                    return Err(err);
                }
            },
            Err(err) => {
                self.rollback_quietly(issue).await;
                return Err(err);
            }
        };
        if status_changed {
            if let Err(err) = self.store.reindex(issue.id).await {
                warn!(
                    "⚠️ Issue {} was migrated but could not be reindexed: {:#}",
                    issue.key, err
                );
            }
        }
        Ok(())
    }

    async fn rollback_quietly(&self, issue: &Issue) {
        if let Err(err) = self.store.rollback().await {
            warn!("⚠️ Rollback for issue {} failed: {:#}", issue.key, err);
        }
    }

    /// 🔀 Entry swap, then history. Returns whether the status changed.
    async fn apply_migration(
        &self,
        issue: &Issue,
        current_workflow: Option<String>,
        target_workflow: &Workflow,
        target_status_id: &str,
    ) -> Result<bool> {
        let target_status = self
            .store
            .status(target_status_id)
            .await?
            .ok_or_else(|| MigrationError::UnknownStatus(target_status_id.to_string()))?;
        let status_changed = self
            .store
            .migrate_issue_to_workflow(issue, target_workflow, &target_status)
            .await?;
        let migrated = self
            .store
            .find_issue(issue.id)
            .await?
            .ok_or(MigrationError::IssueNotFound(issue.id))?;

        let mut items = Vec::new();
        let current_name = current_workflow.unwrap_or_default();
        if current_name != target_workflow.name {
            items.push(ChangeItem::static_field(
                "Workflow",
                issue.workflow_entry_id.to_string(),
                current_name,
                migrated.workflow_entry_id.to_string(),
                target_workflow.name.clone(),
            ));
        }
        if issue.status_id != target_status.id {
            let old_status_name = self
                .store
                .status(&issue.status_id)
                .await?
                .map(|status| status.name)
                .unwrap_or_else(|| issue.status_id.clone());
            items.push(ChangeItem::static_field(
                "status",
                issue.status_id.clone(),
                old_status_name,
                target_status.id.clone(),
                target_status.name.clone(),
            ));
        }
        if !items.is_empty() {
            self.store
                .create_change_group(issue.id, self.settings.author.as_deref(), items)
                .await?;
        }
        Ok(status_changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::backends::{InMemoryStore, SchemeStore};
    use crate::common::ProjectId;
    use crate::i18n::DefaultI18n;
    use crate::progress::RecordingSink;
    use crate::scheme::{AssignableWorkflowScheme, SchemeMappings};
    use crate::test_support::{bug_to_b_mapping, fixture, scheme_by_id, NEW_SCHEME, PROJECT};

    #[derive(Debug, Default)]
    struct Flag(AtomicBool);

    #[async_trait]
    impl OnComplete for Flag {
        async fn on_complete(&self) -> Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn migrator(
        store: &InMemoryStore,
        on_complete: Arc<dyn OnComplete>,
    ) -> Result<ProjectMigrator<AssignableWorkflowScheme>> {
        let project = store
            .project(ProjectId(PROJECT))
            .await?
            .expect("💀 fixture project vanished");
        Ok(ProjectMigrator::new(
            project,
            scheme_by_id(store, NEW_SCHEME).await?,
            Arc::new(store.clone()),
            Arc::new(DefaultI18n),
            MigrationSettings {
                author: Some("admin".to_string()),
                ..MigrationSettings::default()
            },
            on_complete,
        ))
    }

    fn bug_only() -> BTreeSet<IssueTypeId> {
        BTreeSet::from(["bug".to_string()])
    }

    #[tokio::test]
    async fn the_one_where_three_issues_each_get_exactly_one_update() -> Result<()> {
        // 🧪 bugs in Open, In Progress, Done on A; B has no In Progress, mapped to Done
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3"), (3, "bug", "6")]);
        let flag = Arc::new(Flag::default());
        let (result, stats) = migrator(&store, flag.clone())
            .await?
            .migrate_with_stats(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await?;

        assert_eq!(result, MigrationResult::Success { failed_issues: BTreeMap::new() });
        assert!(flag.0.load(Ordering::SeqCst), "completion hook must run on success");
        assert_eq!(stats.migrated, 3);
        assert_eq!(store.migration_attempts().await, vec![IssueId(1), IssueId(2), IssueId(3)]);

        let snapshot = store.snapshot().await;
        for id in 1..=3 {
            assert_eq!(snapshot.workflow_name_of(IssueId(id)), Some("B"));
        }
        assert_eq!(snapshot.issues[&IssueId(2)].status_id, "6");
        assert_eq!(snapshot.change_groups.len(), 3);
        let moved = snapshot
            .change_groups
            .iter()
            .find(|group| group.issue_id == IssueId(2))
            .expect("💀 issue 2 has no history");
        let fields: Vec<&str> = moved.items.iter().map(|item| item.field.as_str()).collect();
        assert_eq!(fields, vec!["Workflow", "status"]);
        assert_eq!(moved.author.as_deref(), Some("admin"));

        // 🔍 only the issue whose status changed needed the index, and only after release
        assert_eq!(store.reindexed().await, vec![IssueId(2)]);
        assert!(!store.is_index_held().await);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_second_run_changes_nothing() -> Result<()> {
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3"), (3, "task", "3")]);
        let migrator = migrator(&store, Arc::new(NoCompletion)).await?;
        migrator
            .migrate(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await?;
        let after_first = store.snapshot().await;
        let attempts = store.migration_attempts().await.len();

        let (result, stats) = migrator
            .migrate_with_stats(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await?;
        assert!(result.is_clean_success());
        assert_eq!(stats.migrated, 0);
        assert_eq!(stats.skipped, 3);
        assert_eq!(store.migration_attempts().await.len(), attempts);
        assert_eq!(store.snapshot().await, after_first);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_wrong_workflow_issues_are_rewritten_anyway() -> Result<()> {
        // 🧪 issue 4 already sits on B in Open, exactly the target pair, but it got there
        // by a failed run and is flagged. it must be rewritten regardless.
        let store = InMemoryStore::new(
            fixture(&[(1, "bug", "1")])
                .snapshot()
                .await
                .with_issue(4, PROJECT, "bug", "1", "B"),
        );
        let old_entry = store.snapshot().await.issues[&IssueId(4)].workflow_entry_id;
        let mut mapping = bug_to_b_mapping();
        mapping.add_wrong_workflow_issues([IssueId(4)]);

        let (result, stats) = migrator(&store, Arc::new(NoCompletion))
            .await?
            .migrate_with_stats(&Progress::null(), &bug_only(), &mapping)
            .await?;
        assert!(result.is_clean_success());
        assert_eq!(stats.migrated, 2);
        assert!(store.migration_attempts().await.contains(&IssueId(4)));
        assert_ne!(
            store.snapshot().await.issues[&IssueId(4)].workflow_entry_id,
            old_entry,
            "a fresh entry proves the rewrite happened"
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_circuit_breaker_trips_at_exactly_ten() -> Result<()> {
        let issues: Vec<(u64, &str, &str)> = (1..=15).map(|id| (id, "bug", "1")).collect();
        let store = fixture(&issues);
        for id in 1..=15 {
            store.poison_issue(IssueId(id)).await;
        }
        let flag = Arc::new(Flag::default());
        let sink = Arc::new(RecordingSink::new());

        let result = migrator(&store, flag.clone())
            .await?
            .migrate(&Progress::new(sink.clone()), &bug_only(), &bug_to_b_mapping())
            .await?;

        let MigrationResult::Terminated(Termination::FailedIssues(failed)) = &result else {
            panic!("expected the breaker to trip, got {result:?}");
        };
        assert_eq!(failed.len(), 10);
        assert_eq!(failed.get(&IssueId(1)).map(String::as_str), Some("WF-1"));
        assert_eq!(store.migration_attempts().await.len(), 10, "the 11th is never attempted");
        assert!(!failed.contains_key(&IssueId(11)));
        assert!(!flag.0.load(Ordering::SeqCst));
        assert!(!store.is_in_transaction().await);
        assert!(!store.is_index_held().await);
        // 📊 a terminated run still hands its whole window back
        assert_eq!(sink.latest().map(|event| event.percent), Some(100));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_one_bad_issue_rolls_back_alone() -> Result<()> {
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3"), (3, "bug", "6")]);
        store.poison_issue(IssueId(2)).await;
        let before = store.snapshot().await.issues[&IssueId(2)].clone();

        let result = migrator(&store, Arc::new(NoCompletion))
            .await?
            .migrate(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await?;

        assert!(result.is_success());
        assert!(!result.is_clean_success());
        assert_eq!(
            result.failed_issues(),
            BTreeMap::from([(IssueId(2), "WF-2".to_string())])
        );
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.issues[&IssueId(2)], before);
        assert_eq!(snapshot.workflow_name_of(IssueId(3)), Some("B"));
        assert!(!store.is_in_transaction().await);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_verification_stops_everything_before_it_starts() -> Result<()> {
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3")]);
        let before = store.snapshot().await;
        let mut mapping = StatusMappingTable::new();
        mapping.add_mapping("bug", "1", "1");
        let sink = Arc::new(RecordingSink::new());

        let result = migrator(&store, Arc::new(NoCompletion))
            .await?
            .migrate(&Progress::new(sink.clone()), &bug_only(), &mapping)
            .await?;

        let MigrationResult::Terminated(Termination::ValidationErrors(errors)) = &result else {
            panic!("expected validation errors, got {result:?}");
        };
        assert_eq!(errors.messages.len(), 1);
        assert!(errors.messages[0].contains("WF-2"));
        assert!(store.migration_attempts().await.is_empty());
        assert_eq!(store.snapshot().await, before);
        let percents: Vec<u64> = sink.events().iter().map(|event| event.percent).collect();
        assert!(!percents.contains(&17), "no re-scan after a failed verification");
        assert_eq!(percents.last(), Some(&100));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_losing_the_issue_list_is_fatal() -> Result<()> {
        let store = fixture(&[(1, "bug", "1")]);
        store.fail_issue_enumeration(true).await;
        let err = migrator(&store, Arc::new(NoCompletion))
            .await?
            .migrate(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await
            .expect_err("no issue list, no migration");
        assert!(format!("{err:#}").contains("enumerate"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_progress_walks_the_phase_milestones() -> Result<()> {
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3")]);
        let sink = Arc::new(RecordingSink::new());
        migrator(&store, Arc::new(NoCompletion))
            .await?
            .migrate(&Progress::new(sink.clone()), &bug_only(), &bug_to_b_mapping())
            .await?;

        let percents: Vec<u64> = sink.events().iter().map(|event| event.percent).collect();
        assert_eq!(percents.first(), Some(&0));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]), "{percents:?}");
        for milestone in [5, 17, 22, 99] {
            assert!(percents.contains(&milestone), "missing {milestone} in {percents:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_dead_index_does_not_unmigrate_anything() -> Result<()> {
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3")]);
        store.take_index_offline(true).await;
        let flag = Arc::new(Flag::default());

        let (result, stats) = migrator(&store, flag.clone())
            .await?
            .migrate_with_stats(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await?;

        // 🔍 the rows are committed, so a stale index is a warning and not a failed issue
        assert!(result.is_clean_success(), "{result:?}");
        assert_eq!(stats.migrated, 2);
        assert_eq!(stats.failed, 0);
        assert!(flag.0.load(Ordering::SeqCst));
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.workflow_name_of(IssueId(2)), Some("B"));
        assert_eq!(snapshot.issues[&IssueId(2)].status_id, "6");
        assert!(store.reindexed().await.is_empty());
        assert!(!store.is_index_held().await);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_issue_filed_mid_verification_still_moves() -> Result<()> {
        let store = fixture(&[(1, "bug", "1")]);
        // 🐣 lands right before the re-scan, after verification already ran
        store.create_issue_on_enumeration(2, 7, PROJECT, "bug", "3", "A").await;

        let (result, stats) = migrator(&store, Arc::new(NoCompletion))
            .await?
            .migrate_with_stats(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await?;

        assert!(result.is_clean_success(), "{result:?}");
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.migrated, 2);
        assert_eq!(store.migration_attempts().await, vec![IssueId(1), IssueId(7)]);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.workflow_name_of(IssueId(7)), Some("B"));
        assert_eq!(snapshot.issues[&IssueId(7)].status_id, "6");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_rescan_fails_and_nothing_moves() -> Result<()> {
        let store = fixture(&[(1, "bug", "1"), (2, "bug", "3")]);
        let before = store.snapshot().await;
        store.fail_issue_enumeration_after(1).await;
        let flag = Arc::new(Flag::default());

        let err = migrator(&store, flag.clone())
            .await?
            .migrate(&Progress::null(), &bug_only(), &bug_to_b_mapping())
            .await
            .expect_err("verification passed, but the second issue list never came");
        assert!(format!("{err:#}").contains("enumerate"));
        assert!(store.migration_attempts().await.is_empty());
        assert!(!flag.0.load(Ordering::SeqCst));
        assert_eq!(store.snapshot().await, before);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_default_scheme_goes_by_its_title() -> Result<()> {
        let store = fixture(&[(1, "bug", "1")]);
        let project = store
            .project(ProjectId(PROJECT))
            .await?
            .expect("💀 fixture project vanished");
        let default_scheme = AssignableWorkflowScheme {
            mappings: SchemeMappings::new().with_default("A"),
            ..AssignableWorkflowScheme::system_default()
        };
        let sink = Arc::new(RecordingSink::new());

        let (result, stats) = ProjectMigrator::new(
            project,
            default_scheme,
            Arc::new(store.clone()),
            Arc::new(DefaultI18n),
            MigrationSettings::default(),
            Arc::new(NoCompletion),
        )
        .migrate_with_stats(&Progress::new(sink.clone()), &BTreeSet::new(), &StatusMappingTable::new())
        .await?;

        assert!(result.is_clean_success());
        assert_eq!(stats.skipped, 1);
        let assigning = sink
            .events()
            .into_iter()
            .find(|event| event.percent == 99)
            .expect("💀 no 99% event");
        assert_eq!(
            assigning.message,
            "Assigning workflow scheme 'Default' to project 'Project WF'."
        );
        Ok(())
    }
}
