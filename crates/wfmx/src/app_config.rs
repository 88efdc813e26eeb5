//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." said every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `WFMX_*` env vars as the base layer, an optional TOML
//! file merged on top. Which snapshot to load, how many failed issues to tolerate,
//! which migration to run and the status mappings a human picked for it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::common::{ProjectId, SchemeId};
use crate::project_migrator::{DEFAULT_FAILURE_THRESHOLD, MigrationSettings};

/// 📦 Everything one run needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub migration: MigrationConfig,
    /// 🧭 Destinations for statuses the target workflow doesn't have.
    #[serde(default)]
    pub mappings: Vec<StatusMappingConfig>,
}

/// 💾 Where the instance lives on disk.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub snapshot_file: PathBuf,
    /// Write the migrated store back to `snapshot_file` when done.
    #[serde(default = "default_save_after")]
    pub save_after: bool,
}

fn default_save_after() -> bool {
    true
}

/// 🎛️ Knobs for the migration engine itself.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,
    #[serde(default = "default_author")]
    pub author: String,
}

fn default_failure_threshold() -> usize {
    DEFAULT_FAILURE_THRESHOLD
}

fn default_author() -> String {
    "admin".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            author: default_author(),
        }
    }
}

impl RuntimeConfig {
    pub fn settings(&self) -> MigrationSettings {
        MigrationSettings {
            failure_threshold: self.failure_threshold,
            author: Some(self.author.clone()),
        }
    }
}

/// 🚚 Which migration to run.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum MigrationConfig {
    /// 📌 One project onto another scheme. No `target_scheme_id` means the system default.
    Assignable {
        project_id: ProjectId,
        #[serde(default)]
        target_scheme_id: Option<SchemeId>,
    },
    /// ✏️ Every project of `parent_scheme_id` onto its draft.
    Draft { parent_scheme_id: SchemeId },
}

/// 🧭 "Issues of `issue_type` in status `from` go to status `to`."
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StatusMappingConfig {
    pub issue_type: String,
    pub from: String,
    pub to: String,
}

/// 🚀 Load the config: env vars (WFMX_*) always, plus the TOML file when one is given.
/// TOML wins on conflicts.
///
/// 💀 Returns an error if the merged config doesn't parse, with the file name in it.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("WFMX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (WFMX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (WFMX_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_test_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("wfmx.toml");
        // 🧪 a real file, because Figment wants TOML from disk, like it's method acting
        fs::write(&path, contents)
            .expect("💀 Failed to write test config. The filesystem said 'new phone who dis'.");
        path
    }

    #[test]
    fn the_one_where_a_draft_migration_brings_its_own_mappings() {
        let dir = tempfile::tempdir().expect("💀 no temp dir, no test");
        let config_path = write_test_config(
            &dir,
            r#"
            [store]
            snapshot_file = "instance.json"
            save_after = false

            [runtime]
            failure_threshold = 3
            author = "migration-bot"

            [migration.Draft]
            parent_scheme_id = 100

            [[mappings]]
            issue_type = "bug"
            from = "3"
            to = "6"
            "#,
        );

        let app_config = load_config(Some(config_path.as_path()))
            .expect("💀 Draft config should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.store.snapshot_file, PathBuf::from("instance.json"));
        assert!(!app_config.store.save_after);
        assert_eq!(app_config.runtime.failure_threshold, 3);
        assert_eq!(
            app_config.runtime.settings().author.as_deref(),
            Some("migration-bot")
        );
        assert_eq!(
            app_config.migration,
            MigrationConfig::Draft {
                parent_scheme_id: SchemeId(100)
            }
        );
        assert_eq!(
            app_config.mappings,
            vec![StatusMappingConfig {
                issue_type: "bug".to_string(),
                from: "3".to_string(),
                to: "6".to_string(),
            }]
        );
    }

    #[test]
    fn the_one_where_a_bare_assignable_config_gets_the_stock_threshold_and_author() {
        let dir = tempfile::tempdir().expect("💀 no temp dir, no test");
        let config_path = write_test_config(
            &dir,
            r#"
            [store]
            snapshot_file = "instance.json"

            [migration.Assignable]
            project_id = 10
            "#,
        );

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(config_path.as_path()))
            .extract()
            .expect("💀 Default runtime config should exist. Serde left us on read otherwise.");

        assert!(app_config.store.save_after);
        assert_eq!(app_config.runtime, RuntimeConfig::default());
        assert_eq!(app_config.runtime.failure_threshold, 10);
        assert_eq!(
            app_config.migration,
            MigrationConfig::Assignable {
                project_id: ProjectId(10),
                target_scheme_id: None
            }
        );
        assert!(app_config.mappings.is_empty());
    }

    #[test]
    fn the_one_where_a_missing_migration_is_reported_with_the_file_name() {
        let dir = tempfile::tempdir().expect("💀 no temp dir, no test");
        let config_path = write_test_config(
            &dir,
            r#"
            [store]
            snapshot_file = "instance.json"
            "#,
        );

        let err = load_config(Some(config_path.as_path()))
            .expect_err("no migration section, no migration");
        assert!(format!("{err}").contains("wfmx.toml"));
    }

    #[test]
    fn the_one_where_toml_parses_into_the_same_shape() -> anyhow::Result<()> {
        // 🍞 plain `toml` agrees with figment about the mapping rows
        let rows: MappingRows = toml::from_str(
            r#"
            [[mappings]]
            issue_type = "task"
            from = "1"
            to = "6"
            "#,
        )?;
        assert_eq!(rows.mappings[0].to, "6");
        Ok(())
    }

    #[derive(Debug, Deserialize)]
    struct MappingRows {
        mappings: Vec<StatusMappingConfig>,
    }
}
