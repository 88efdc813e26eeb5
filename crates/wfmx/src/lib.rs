//! 🚚 wfmx: moves issues between workflows when a project changes workflow scheme.
//!
//! The engine calculates what has to change ([`input`]), checks every issue up front
//! ([`verify`]), migrates issue by issue with a failure cap ([`project_migrator`]) and
//! decides what happens to the schemes around it ([`helpers`]). Storage sits behind
//! the traits in [`backends`]. Long runs go through [`task`].
//!
//! [`run`] wires all of it to an [`app_config::AppConfig`] and a snapshot file. 🦆

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::FutureExt;
use tracing::{info, warn};

pub mod app_config;
pub mod backends;
pub mod common;
pub mod error;
pub mod helpers;
pub mod i18n;
pub mod input;
pub mod mapping;
pub mod progress;
pub mod project_migrator;
pub mod scheme;
pub mod task;
pub mod verify;

#[cfg(test)]
mod test_support;

use crate::app_config::{AppConfig, MigrationConfig, StatusMappingConfig};
use crate::backends::file;
use crate::common::{IssueTypeId, StatusId};
use crate::helpers::{
    AssignableSchemeMigrationHelper, DraftSchemeMigrationHelper, SchemeMigrationCore,
    SchemeMigrationOutcome,
};
use crate::i18n::DefaultI18n;
use crate::input::MigrationInput;
use crate::progress::{Progress, SharedSink};
use crate::task::{TaskContext, TaskManager};

/// 📋 What a run came back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// 🕳️ Issues need migrating but some statuses still have no destination.
    /// Nothing was touched.
    NotReady {
        unmapped: BTreeMap<IssueTypeId, BTreeSet<StatusId>>,
    },
    Migrated(SchemeMigrationOutcome),
}

/// 🚀 Load the snapshot, run the configured migration as a task, mirror its
/// progress into `display`, and save the snapshot back when asked to.
pub async fn run(app_config: AppConfig, display: SharedSink) -> Result<RunReport> {
    let store = file::open_store(&app_config.store.snapshot_file).await?;
    let core = SchemeMigrationCore::new(
        Arc::new(store.clone()),
        Arc::new(DefaultI18n),
        app_config.runtime.settings(),
    );

    let context = match app_config.migration {
        MigrationConfig::Assignable { project_id, .. } => TaskContext::Project(project_id),
        MigrationConfig::Draft { parent_scheme_id } => TaskContext::Scheme(parent_scheme_id),
    };
    let migration = app_config.migration.clone();
    let mappings = app_config.mappings.clone();
    let task = TaskManager::new()
        .submit(context, format!("workflow migration of {context}"), move |sink| {
            run_migration(core, migration, mappings, Progress::new(sink)).boxed()
        })
        .await?;

    let events = task.subscribe();
    let mirror = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            display.make_progress(event.percent, event.sub_task.as_deref(), &event.message);
        }
    });
    let report = task.wait().await;
    // -- 📪 the channel closes when the job ends, so the mirror always finishes
    let _ = mirror.await;
    let report = report?;

    match &report {
        RunReport::Migrated(outcome) if app_config.store.save_after => {
            info!("🏁 Migration finished with {:?}", outcome.status);
            file::save_snapshot(&store, &app_config.store.snapshot_file).await?;
        }
        RunReport::Migrated(outcome) => {
            info!(
                "🏁 Migration finished with {:?}; snapshot left as it was on disk",
                outcome.status
            );
        }
        RunReport::NotReady { unmapped } => {
            warn!(
                "🕳️ {} issue type(s) still have statuses without a destination",
                unmapped.len()
            );
        }
    }
    Ok(report)
}

async fn run_migration(
    core: SchemeMigrationCore,
    migration: MigrationConfig,
    mappings: Vec<StatusMappingConfig>,
    progress: Progress,
) -> Result<RunReport> {
    match migration {
        MigrationConfig::Assignable {
            project_id,
            target_scheme_id,
        } => {
            let mut helper =
                AssignableSchemeMigrationHelper::new(core, project_id, target_scheme_id).await?;
            apply_mappings(helper.input_mut(), &mappings)?;
            if !helper.input().is_ready() && helper.is_have_issues_to_migrate().await? {
                return Ok(RunReport::NotReady {
                    unmapped: helper.input().unmapped_statuses(),
                });
            }
            Ok(RunReport::Migrated(helper.migrate(&progress).await?))
        }
        MigrationConfig::Draft { parent_scheme_id } => {
            let mut helper = DraftSchemeMigrationHelper::new(core, parent_scheme_id).await?;
            apply_mappings(helper.input_mut(), &mappings)?;
            if !helper.input().is_ready() && helper.is_have_issues_to_migrate().await? {
                return Ok(RunReport::NotReady {
                    unmapped: helper.input().unmapped_statuses(),
                });
            }
            Ok(RunReport::Migrated(helper.migrate(&progress).await?))
        }
    }
}

fn apply_mappings(input: &mut MigrationInput, mappings: &[StatusMappingConfig]) -> Result<()> {
    for mapping in mappings {
        input
            .add_user_mapping(&mapping.issue_type, &mapping.from, &mapping.to)
            .with_context(|| {
                format!(
                    "💀 The configured mapping '{}': '{}' → '{}' was rejected",
                    mapping.issue_type, mapping.from, mapping.to
                )
            })?;
    }
    Ok(())
}
