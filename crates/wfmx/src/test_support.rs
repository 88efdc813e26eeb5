//! 🧪 Shared fixtures. One small instance every engine test can start from.
//!
//! Issue types `bug` and `task`. Statuses Open (1), In Progress (3), Done (6).
//! Workflow A links all three, workflow B has no In Progress. The old scheme puts
//! everything on A; the new one moves bugs to B. Project 10 ("WF") uses the old
//! scheme.

use anyhow::Result;

use crate::backends::{InMemoryStore, SchemeStore, StoreSnapshot};
use crate::common::SchemeId;
use crate::mapping::StatusMappingTable;
use crate::scheme::{AssignableWorkflowScheme, SchemeMappings};

pub(crate) const PROJECT: u64 = 10;
pub(crate) const OLD_SCHEME: u64 = 100;
pub(crate) const NEW_SCHEME: u64 = 101;

pub(crate) fn base_snapshot() -> StoreSnapshot {
    StoreSnapshot::new()
        .with_issue_type("bug", "Bug")
        .with_issue_type("task", "Task")
        .with_status("1", "Open")
        .with_status("3", "In Progress")
        .with_status("6", "Done")
        .with_workflow("A", &["1", "3", "6"])
        .with_workflow("B", &["1", "6"])
        .with_scheme(OLD_SCHEME, "Old Scheme", SchemeMappings::new().with_default("A"))
        .with_scheme(
            NEW_SCHEME,
            "New Scheme",
            SchemeMappings::new().with_default("A").with("bug", "B"),
        )
}

/// 🏗️ Adds a project on the old scheme with `(id, type, status)` issues on workflow A.
pub(crate) fn with_project_issues(
    snapshot: StoreSnapshot,
    project_id: u64,
    key: &str,
    issues: &[(u64, &str, &str)],
) -> StoreSnapshot {
    issues.iter().fold(
        snapshot
            .with_project(project_id, key, &format!("Project {key}"))
            .assign(project_id, OLD_SCHEME),
        |snapshot, (id, issue_type, status)| {
            snapshot.with_issue(*id, project_id, issue_type, status, "A")
        },
    )
}

/// 📦 The base instance plus project 10 holding `issues`.
pub(crate) fn fixture(issues: &[(u64, &str, &str)]) -> InMemoryStore {
    InMemoryStore::new(with_project_issues(base_snapshot(), PROJECT, "WF", issues))
}

/// 🧭 Bug: Open → Open, In Progress → Done, Done → Done.
pub(crate) fn bug_to_b_mapping() -> StatusMappingTable {
    let mut mapping = StatusMappingTable::new();
    mapping.add_mapping("bug", "1", "1");
    mapping.add_mapping("bug", "3", "6");
    mapping.add_mapping("bug", "6", "6");
    mapping
}

pub(crate) async fn scheme_by_id(store: &InMemoryStore, id: u64) -> Result<AssignableWorkflowScheme> {
    Ok(store
        .scheme(SchemeId(id))
        .await?
        .expect("💀 fixture scheme vanished"))
}
