//! 🧭 Scheme Migration Helpers: the layer that decides *which* projects move,
//! *where* they land, and what happens to the schemes left behind.
//!
//! Two front doors:
//!
//! - [`AssignableSchemeMigrationHelper`]: one project, onto another assignable
//!   scheme (or the system default).
//! - [`DraftSchemeMigrationHelper`]: every project on a scheme, onto that scheme's
//!   draft. With more than one project the draft is first copied into an
//!   intermediate scheme, projects move onto the copy one by one, and only when
//!   every single one came through clean does the parent take the draft's
//!   mappings and everyone moves back. Anything less and the projects that made
//!   it stay on the copy, which is a real scheme with the draft's mappings. Half
//!   migrated is a state we can live with. Half swapped is not.
//!
//! Both share one input calculation per run and skip the whole verify/migrate
//! pipeline when no issue actually needs to move. 🦆

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::backends::MigrationStore;
use crate::common::{Project, ProjectId, SchemeId};
use crate::error::MigrationError;
use crate::i18n::{self, I18n};
use crate::input::{MigrationInput, MigrationInputCalculator};
use crate::progress::Progress;
use crate::project_migrator::{
    MigrationResult, MigrationSettings, MigrationStats, OnComplete, ProjectMigrator,
};
use crate::scheme::{
    AssignableWorkflowScheme, DraftWorkflowScheme, WorkflowScheme, auto_generated_description,
    copy_name_for,
};

/// 🏷️ Overall verdict for a scheme migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    PartialFailure,
    Terminated,
}

impl OutcomeStatus {
    /// All clean → Success. Nobody succeeded → Terminated. Anything between → PartialFailure.
    pub fn from_results(results: &[ProjectOutcome]) -> Self {
        if results.iter().all(|outcome| outcome.result.is_clean_success()) {
            OutcomeStatus::Success
        } else if results.iter().any(|outcome| outcome.result.is_success()) {
            OutcomeStatus::PartialFailure
        } else {
            OutcomeStatus::Terminated
        }
    }
}

/// 📦 One project's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectOutcome {
    pub project: Project,
    pub result: MigrationResult,
    pub stats: MigrationStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeMigrationOutcome {
    pub status: OutcomeStatus,
    pub project_results: Vec<ProjectOutcome>,
    /// ✅ The requested scheme change took effect (assignment made, or parent replaced by its draft).
    pub scheme_swapped: bool,
    /// ⚡ Took the quick path: no issue needed migrating.
    pub quick: bool,
}

impl SchemeMigrationOutcome {
    fn quick() -> Self {
        Self {
            status: OutcomeStatus::Success,
            project_results: Vec::new(),
            scheme_swapped: true,
            quick: true,
        }
    }
}

/// 🧭 Where a helper is in its life. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Created,
    CalculatingInput,
    QuickMigrate,
    FullMigrate,
    Finished(OutcomeStatus),
    SchemeSwap,
    Cleanup,
}

fn enter(phase: &mut MigrationPhase, next: MigrationPhase, subject: &str) {
    info!("🧭 {}: {:?} → {:?}", subject, phase, next);
    *phase = next;
}

/// ⚙️ What both helpers share: the stores, the message bundle and the run settings.
#[derive(Debug, Clone)]
pub struct SchemeMigrationCore {
    store: Arc<dyn MigrationStore>,
    i18n: Arc<dyn I18n>,
    settings: MigrationSettings,
}

impl SchemeMigrationCore {
    pub fn new(
        store: Arc<dyn MigrationStore>,
        i18n: Arc<dyn I18n>,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            store,
            i18n,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn MigrationStore> {
        &self.store
    }

    async fn calculate<E, T>(
        &self,
        project_ids: &[ProjectId],
        existing: &E,
        target: &T,
    ) -> Result<MigrationInput>
    where
        E: WorkflowScheme,
        T: WorkflowScheme,
    {
        MigrationInputCalculator::new(Arc::clone(&self.store))
            .calculate(project_ids, existing, target)
            .await
    }

    /// 🔎 Does any issue in the project have a type that needs migrating?
    async fn has_issues_to_migrate(&self, project_id: ProjectId, input: &MigrationInput) -> Result<bool> {
        let types: Vec<String> = input.types_needing_migration().iter().cloned().collect();
        if types.is_empty() {
            return Ok(false);
        }
        Ok(self.store.count_issues_of_types(project_id, &types).await? > 0)
    }

    async fn run_project<T: WorkflowScheme>(
        &self,
        project: &Project,
        target: T,
        input: &MigrationInput,
        progress: &Progress,
        on_complete: Arc<dyn OnComplete>,
    ) -> Result<ProjectOutcome> {
        let migrator = ProjectMigrator::new(
            project.clone(),
            target,
            Arc::clone(&self.store),
            Arc::clone(&self.i18n),
            self.settings.clone(),
            on_complete,
        );
        let (result, stats) = migrator
            .migrate_with_stats(progress, input.types_needing_migration(), input.mapping())
            .await?;
        Ok(ProjectOutcome {
            project: project.clone(),
            result,
            stats,
        })
    }

    fn report_quick(&self, progress: &Progress, target_name: &str) {
        let association = self.i18n.text(i18n::SUBTASK_ASSOCIATION, &[]);
        progress.report(
            0,
            Some(&association),
            &self.i18n.text(i18n::PROGRESS_QUICK_MIGRATE, &[target_name]),
        );
    }

    fn report_complete(&self, progress: &Progress) {
        let association = self.i18n.text(i18n::SUBTASK_ASSOCIATION, &[]);
        progress.report(
            100,
            Some(&association),
            &self.i18n.text(i18n::PROGRESS_COMPLETE, &[]),
        );
    }
}

/// 🔗 Move a project onto `target_id`. If the project was the last user of a scheme
/// that has a draft, the draft is first saved as a "Copy of ..." scheme so the
/// staged edits survive the scheme going unused.
async fn reassign_project(
    store: &dyn MigrationStore,
    i18n: &dyn I18n,
    project_id: ProjectId,
    existing: &AssignableWorkflowScheme,
    target_id: Option<SchemeId>,
) -> Result<()> {
    if let Some(existing_id) = existing.id.filter(|id| Some(*id) != target_id) {
        if let Some(draft) = store.draft_for_parent(existing_id).await? {
            let users = store.projects_using(existing_id).await?;
            if users.iter().all(|project| project.id == project_id) {
                let generated = i18n.text(i18n::DRAFT_AUTO_GENERATED, &[&existing.name]);
                let copy = store
                    .create_scheme(
                        &copy_name_for(&existing.name),
                        Some(auto_generated_description(existing, &generated)),
                        draft.mappings.clone(),
                    )
                    .await?;
                store.delete_draft(draft.id).await?;
                info!(
                    "📝 Draft of '{}' saved as '{}' before its last project left",
                    existing.name, copy.name
                );
            }
        }
    }
    store
        .assign_scheme(project_id, target_id)
        .await
        .with_context(|| format!("💀 Couldn't assign a new workflow scheme to project {project_id}"))
}

/// 🪝 Completion: reassign the project (with the draft rescue above).
#[derive(Debug)]
struct ReassignProject {
    store: Arc<dyn MigrationStore>,
    i18n: Arc<dyn I18n>,
    project_id: ProjectId,
    existing: AssignableWorkflowScheme,
    target_id: Option<SchemeId>,
}

#[async_trait]
impl OnComplete for ReassignProject {
    async fn on_complete(&self) -> Result<()> {
        reassign_project(
            self.store.as_ref(),
            self.i18n.as_ref(),
            self.project_id,
            &self.existing,
            self.target_id,
        )
        .await
    }
}

/// 🪝 Completion: the parent scheme takes the draft's mappings.
#[derive(Debug)]
struct ReplaceWithDraft {
    store: Arc<dyn MigrationStore>,
    draft_id: SchemeId,
}

#[async_trait]
impl OnComplete for ReplaceWithDraft {
    async fn on_complete(&self) -> Result<()> {
        self.store.replace_scheme_with_draft(self.draft_id).await?;
        Ok(())
    }
}

/// 🪝 Completion: park the project on the intermediate copy.
#[derive(Debug)]
struct AssignToScheme {
    store: Arc<dyn MigrationStore>,
    project_id: ProjectId,
    scheme_id: SchemeId,
}

#[async_trait]
impl OnComplete for AssignToScheme {
    async fn on_complete(&self) -> Result<()> {
        self.store
            .assign_scheme(self.project_id, Some(self.scheme_id))
            .await
    }
}

/// 📌 One project, onto another assignable scheme.
#[derive(Debug)]
pub struct AssignableSchemeMigrationHelper {
    core: SchemeMigrationCore,
    project: Project,
    existing: AssignableWorkflowScheme,
    target: AssignableWorkflowScheme,
    input: MigrationInput,
    phase: MigrationPhase,
}

impl AssignableSchemeMigrationHelper {
    /// 🧮 Look everything up and calculate the input. `None` targets the system default scheme.
    pub async fn new(
        core: SchemeMigrationCore,
        project_id: ProjectId,
        target_scheme_id: Option<SchemeId>,
    ) -> Result<Self> {
        let store = Arc::clone(core.store());
        let project = store
            .project(project_id)
            .await?
            .ok_or(MigrationError::ProjectNotFound(project_id))?;
        let existing = store.scheme_for_project(project_id).await?;
        let target = match target_scheme_id {
            Some(scheme_id) => store
                .scheme(scheme_id)
                .await?
                .ok_or(MigrationError::SchemeNotFound(scheme_id))?,
            None => AssignableWorkflowScheme::system_default(),
        };

        let mut phase = MigrationPhase::Created;
        enter(&mut phase, MigrationPhase::CalculatingInput, &project.key);
        let input = core.calculate(&[project_id], &existing, &target).await?;
        Ok(Self {
            core,
            project,
            existing,
            target,
            input,
            phase,
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn target_scheme(&self) -> &AssignableWorkflowScheme {
        &self.target
    }

    pub fn input(&self) -> &MigrationInput {
        &self.input
    }

    /// ✍️ For supplying the destinations of statuses that need mapping.
    pub fn input_mut(&mut self) -> &mut MigrationInput {
        &mut self.input
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub async fn is_have_issues_to_migrate(&self) -> Result<bool> {
        self.core
            .has_issues_to_migrate(self.project.id, &self.input)
            .await
    }

    /// ⚡ Just reassign. Only safe when nothing needs migrating.
    pub async fn quick_migrate(&self) -> Result<()> {
        reassign_project(
            self.core.store.as_ref(),
            self.core.i18n.as_ref(),
            self.project.id,
            &self.existing,
            self.target.id,
        )
        .await
    }

    pub async fn migrate(&mut self, progress: &Progress) -> Result<SchemeMigrationOutcome> {
        if !self.is_have_issues_to_migrate().await? {
            enter(&mut self.phase, MigrationPhase::QuickMigrate, &self.project.key);
            self.core.report_quick(progress, &self.target.name);
            self.quick_migrate().await?;
            self.core.report_complete(progress);
            enter(
                &mut self.phase,
                MigrationPhase::Finished(OutcomeStatus::Success),
                &self.project.key,
            );
            return Ok(SchemeMigrationOutcome::quick());
        }

        enter(&mut self.phase, MigrationPhase::FullMigrate, &self.project.key);
        let on_complete = Arc::new(ReassignProject {
            store: Arc::clone(&self.core.store),
            i18n: Arc::clone(&self.core.i18n),
            project_id: self.project.id,
            existing: self.existing.clone(),
            target_id: self.target.id,
        });
        let outcome = self
            .core
            .run_project(
                &self.project,
                self.target.clone(),
                &self.input,
                progress,
                on_complete,
            )
            .await?;
        let scheme_swapped = outcome.result.is_success();
        let project_results = vec![outcome];
        let status = OutcomeStatus::from_results(&project_results);
        enter(&mut self.phase, MigrationPhase::Finished(status), &self.project.key);
        Ok(SchemeMigrationOutcome {
            status,
            project_results,
            scheme_swapped,
            quick: false,
        })
    }
}

/// ✏️ Every project on a scheme, onto that scheme's draft.
#[derive(Debug)]
pub struct DraftSchemeMigrationHelper {
    core: SchemeMigrationCore,
    parent: AssignableWorkflowScheme,
    draft: DraftWorkflowScheme,
    projects: Vec<Project>,
    input: MigrationInput,
    phase: MigrationPhase,
}

impl DraftSchemeMigrationHelper {
    pub async fn new(core: SchemeMigrationCore, parent_scheme_id: SchemeId) -> Result<Self> {
        let store = Arc::clone(core.store());
        let parent = store
            .scheme(parent_scheme_id)
            .await?
            .ok_or(MigrationError::SchemeNotFound(parent_scheme_id))?;
        let draft = store
            .draft_for_parent(parent_scheme_id)
            .await?
            .ok_or(MigrationError::DraftNotFound(parent_scheme_id))?;
        let projects = store.projects_using(parent_scheme_id).await?;

        let mut phase = MigrationPhase::Created;
        enter(&mut phase, MigrationPhase::CalculatingInput, &parent.name);
        let project_ids: Vec<ProjectId> = projects.iter().map(|project| project.id).collect();
        let input = core.calculate(&project_ids, &parent, &draft).await?;
        Ok(Self {
            core,
            parent,
            draft,
            projects,
            input,
            phase,
        })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn input(&self) -> &MigrationInput {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut MigrationInput {
        &mut self.input
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    pub async fn is_have_issues_to_migrate(&self) -> Result<bool> {
        for project in &self.projects {
            if self
                .core
                .has_issues_to_migrate(project.id, &self.input)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn migrate(&mut self, progress: &Progress) -> Result<SchemeMigrationOutcome> {
        let subject = self.parent.name.clone();
        if !self.is_have_issues_to_migrate().await? {
            enter(&mut self.phase, MigrationPhase::QuickMigrate, &subject);
            self.core.report_quick(progress, &self.parent.name);
            self.core
                .store
                .replace_scheme_with_draft(self.draft.id)
                .await?;
            self.core.report_complete(progress);
            enter(
                &mut self.phase,
                MigrationPhase::Finished(OutcomeStatus::Success),
                &subject,
            );
            return Ok(SchemeMigrationOutcome::quick());
        }

        enter(&mut self.phase, MigrationPhase::FullMigrate, &subject);
        if let [project] = self.projects.as_slice() {
            let on_complete = Arc::new(ReplaceWithDraft {
                store: Arc::clone(&self.core.store),
                draft_id: self.draft.id,
            });
            let outcome = self
                .core
                .run_project(project, self.draft.clone(), &self.input, progress, on_complete)
                .await?;
            let scheme_swapped = outcome.result.is_success();
            let project_results = vec![outcome];
            let status = OutcomeStatus::from_results(&project_results);
            enter(&mut self.phase, MigrationPhase::Finished(status), &subject);
            return Ok(SchemeMigrationOutcome {
                status,
                project_results,
                scheme_swapped,
                quick: false,
            });
        }

        self.migrate_many(progress).await
    }

    /// 🪜 Several projects, through an intermediate copy of the draft.
    async fn migrate_many(&mut self, progress: &Progress) -> Result<SchemeMigrationOutcome> {
        let subject = self.parent.name.clone();
        let store = Arc::clone(&self.core.store);
        let generated = self
            .core
            .i18n
            .text(i18n::DRAFT_AUTO_GENERATED, &[&self.parent.name]);
        let copy = store
            .create_scheme(
                &copy_name_for(&self.parent.name),
                Some(auto_generated_description(&self.parent, &generated)),
                self.draft.mappings.clone(),
            )
            .await
            .context("💀 Couldn't create the intermediate copy of the draft")?;
        let copy_id = copy.id.ok_or(MigrationError::SchemeNotFound(self.parent_id()))?;
        info!(
            "📝 Migrating {} projects of '{}' through intermediate scheme '{}'",
            self.projects.len(),
            self.parent.name,
            copy.name
        );

        let total = self.projects.len();
        let association = self.core.i18n.text(i18n::SUBTASK_ASSOCIATION, &[]);
        let mut project_results = Vec::with_capacity(total);
        for (index, project) in self.projects.iter().enumerate() {
            let start = (index * 100 / total) as u64;
            let end = ((index + 1) * 100 / total) as u64;
            let window = progress.sub_range(start, end - start);
            window.report(
                0,
                Some(&association),
                &self.core.i18n.text(
                    i18n::PROGRESS_MIGRATE_PROJECT,
                    &[&(index + 1).to_string(), &total.to_string(), &project.name],
                ),
            );
            let on_complete = Arc::new(AssignToScheme {
                store: Arc::clone(&store),
                project_id: project.id,
                scheme_id: copy_id,
            });
            match self
                .core
                .run_project(project, copy.clone(), &self.input, &window, on_complete)
                .await
            {
                Ok(outcome) => project_results.push(outcome),
                Err(err) => {
                    enter(&mut self.phase, MigrationPhase::Cleanup, &subject);
                    self.cleanup(copy_id).await?;
                    return Err(err).with_context(|| {
                        format!("💀 Migrating project '{}' failed outright", project.key)
                    });
                }
            }
        }

        let status = OutcomeStatus::from_results(&project_results);
        enter(&mut self.phase, MigrationPhase::Finished(status), &subject);

        let scheme_swapped = status == OutcomeStatus::Success;
        if scheme_swapped {
            enter(&mut self.phase, MigrationPhase::SchemeSwap, &subject);
            store.replace_scheme_with_draft(self.draft.id).await?;
            for project in &self.projects {
                store
                    .assign_scheme(project.id, self.parent.id)
                    .await
                    .with_context(|| {
                        format!("💀 Couldn't move project '{}' back to '{}'", project.key, subject)
                    })?;
            }
            store.delete_scheme(copy_id).await?;
        } else {
            warn!(
                "⚠️ Not every project of '{}' migrated cleanly; migrated projects stay on '{}'",
                subject, copy.name
            );
            enter(&mut self.phase, MigrationPhase::Cleanup, &subject);
            self.cleanup(copy_id).await?;
        }
        self.core.report_complete(progress);

        Ok(SchemeMigrationOutcome {
            status,
            project_results,
            scheme_swapped,
            quick: false,
        })
    }

    /// 🧹 Drop whichever of the copy and the parent nobody uses any more.
    /// The default scheme is never deleted.
    async fn cleanup(&self, copy_id: SchemeId) -> Result<()> {
        let store = &self.core.store;
        if store.projects_using(copy_id).await?.is_empty() {
            info!("🗑️ Intermediate scheme {} is unused, deleting it", copy_id);
            store.delete_scheme(copy_id).await?;
        }
        if let Some(parent_id) = self.parent.id {
            if store.projects_using(parent_id).await?.is_empty() {
                info!(
                    "🗑️ Scheme '{}' has no projects left, deleting it",
                    self.parent.name
                );
                store.delete_scheme(parent_id).await?;
            }
        }
        Ok(())
    }

    fn parent_id(&self) -> SchemeId {
        self.draft.parent_id
    }
}
