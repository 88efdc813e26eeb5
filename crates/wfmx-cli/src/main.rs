//! 🚀 wfmx-cli: the front door, the bouncer, the maitre d' of wfmx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin wrapper: parse args, set up logging, load config, hand over to
//! `wfmx::run`, then print what happened as a table. Like a manager. 🦆

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use tracing::error;
use tracing_subscriber::EnvFilter;
use wfmx::RunReport;
use wfmx::helpers::SchemeMigrationOutcome;
use wfmx::progress::TerminalProgressSink;
use wfmx::project_migrator::{MigrationResult, Termination};

#[derive(Parser)]
#[command(
    name = "wfmx",
    version,
    about = "Migrate issues between workflows when a project's workflow scheme changes"
)]
struct Cli {
    /// Configuration file (TOML). Missing file means env vars only.
    #[arg(default_value = "wfmx.toml")]
    config: PathBuf,
    /// Leave the snapshot file untouched, whatever the config says
    #[arg(long)]
    dry_run: bool,
}

/// 🚀 main(): where it all begins. The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = cli.config.as_path();
    let config_file_if_it_exists = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't tell whether the configuration file exists. If it's a relative path, \
             try an absolute one. Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => None,
    };

    let result = run(config_file_if_it_exists, cli.dry_run).await;

    // 💀 print the error chain in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config_file: Option<&Path>, dry_run: bool) -> Result<()> {
    let mut app_config = wfmx::app_config::load_config(config_file).context(
        "💀 In wfmx-cli, main, we couldn't load the config file. Take a look at it, \
         make sure it's correct, and that you didn't forget something obvious",
    )?;
    if dry_run {
        app_config.store.save_after = false;
    }

    let bar = Arc::new(TerminalProgressSink::new(
        app_config.store.snapshot_file.display().to_string(),
    ));
    let report = wfmx::run(app_config, bar.clone()).await?;
    bar.finish();

    println!("{}", render_report(&report));
    Ok(())
}

fn render_report(report: &RunReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    match report {
        RunReport::NotReady { unmapped } => {
            table.set_header(vec!["Issue type", "Statuses without a destination"]);
            for (issue_type, statuses) in unmapped {
                table.add_row(vec![
                    Cell::new(issue_type),
                    Cell::new(statuses.iter().cloned().collect::<Vec<_>>().join(", ")),
                ]);
            }
        }
        RunReport::Migrated(outcome) => render_outcome(&mut table, outcome),
    }
    table
}

fn render_outcome(table: &mut Table, outcome: &SchemeMigrationOutcome) {
    table.set_header(vec!["Project", "Result", "Migrated", "Skipped", "Failed issues"]);
    if outcome.quick {
        table.add_row(vec![
            Cell::new("(all)"),
            Cell::new("no issues needed migrating"),
            Cell::new(0),
            Cell::new(0),
            Cell::new("-"),
        ]);
    }
    for project in &outcome.project_results {
        let verdict = match &project.result {
            MigrationResult::Success { .. } => "success".to_string(),
            MigrationResult::Terminated(Termination::ValidationErrors(errors)) => {
                format!("verification failed:\n{}", errors.all_messages().join("\n"))
            }
            MigrationResult::Terminated(Termination::FailedIssues(_)) => {
                "terminated: too many failed issues".to_string()
            }
        };
        let failed: Vec<String> = project.result.failed_issues().into_values().collect();
        table.add_row(vec![
            Cell::new(&project.project.key),
            Cell::new(verdict),
            Cell::new(project.stats.migrated),
            Cell::new(project.stats.skipped),
            Cell::new(if failed.is_empty() {
                "-".to_string()
            } else {
                failed.join(", ")
            }),
        ]);
    }
    table.add_row(vec![
        Cell::new("overall"),
        Cell::new(format!("{:?}", outcome.status)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(if outcome.scheme_swapped {
            "scheme change applied"
        } else {
            "scheme change NOT applied"
        }),
    ]);
}
