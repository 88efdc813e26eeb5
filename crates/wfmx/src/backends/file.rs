//! 💾 The file backend: a [`StoreSnapshot`] parked on disk as JSON.
//!
//! Load it, wrap it in an [`InMemoryStore`], migrate, write it back. That's the
//! whole persistence story for the CLI. Not a database. Doesn't pretend to be one.
//!
//! ⚠️ `save_snapshot` overwrites. No warning. No backup. Just gone. He who runs
//! this without checking the output path, re-migrates in shame.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::in_mem::{InMemoryStore, StoreSnapshot};

/// 📂 Read a snapshot file.
pub async fn load_snapshot(path: &Path) -> Result<StoreSnapshot> {
    let raw = tokio::fs::read_to_string(path).await.with_context(|| {
        format!(
            "💀 The store snapshot '{}' could not be read. We stared at the path. \
             The path stared back. Check it exists and that we may read it.",
            path.display()
        )
    })?;
    let snapshot: StoreSnapshot = serde_json::from_str(&raw).with_context(|| {
        format!(
            "💀 The store snapshot '{}' is not valid snapshot JSON.",
            path.display()
        )
    })?;
    info!(
        "📂 Loaded snapshot '{}': {} projects, {} issues, {} workflows",
        path.display(),
        snapshot.projects.len(),
        snapshot.issues.len(),
        snapshot.workflows.len()
    );
    Ok(snapshot)
}

/// 🚀 Read a snapshot file straight into a ready-to-use store.
pub async fn open_store(path: &Path) -> Result<InMemoryStore> {
    Ok(InMemoryStore::new(load_snapshot(path).await?))
}

/// 💾 Write the store's current rows to `path`, pretty-printed for humans with diff tools.
pub async fn save_snapshot(store: &InMemoryStore, path: &Path) -> Result<()> {
    let snapshot = store.snapshot().await;
    let json = serde_json::to_string_pretty(&snapshot)
        .context("💀 The store snapshot refused to become JSON")?;
    tokio::fs::write(path, json).await.with_context(|| {
        format!(
            "💀 The store snapshot '{}' could not be written. \
             One of us was wrong about whether the parent directory existed.",
            path.display()
        )
    })?;
    info!("💾 Saved snapshot to '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::IssueStore;
    use crate::common::{IssueId, ProjectId};
    use crate::scheme::SchemeMappings;

    #[tokio::test]
    async fn the_one_where_a_snapshot_survives_the_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        let store = InMemoryStore::new(
            StoreSnapshot::new()
                .with_status("1", "Open")
                .with_workflow("flow", &["1"])
                .with_project(10, "WF", "Workflows")
                .with_scheme(3, "Dev", SchemeMappings::new().with("bug", "flow"))
                .assign(10, 3)
                .with_issue(1, 10, "bug", "1", "flow"),
        );

        save_snapshot(&store, &path).await?;
        let reopened = open_store(&path).await?;

        assert_eq!(reopened.snapshot().await, store.snapshot().await);
        assert_eq!(
            reopened.issue_ids_for_project(ProjectId(10)).await?,
            vec![IssueId(1)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_missing_file_says_where_it_looked() {
        let err = load_snapshot(Path::new("/definitely/not/here.json"))
            .await
            .expect_err("no file, no snapshot");
        assert!(format!("{err}").contains("/definitely/not/here.json"));
    }
}
