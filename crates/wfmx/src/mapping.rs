//! 🧭 The Status Mapping Table.
//!
//! Per (issue type, old status) → new status, plus the set of issues caught living
//! on a workflow they have no business being on. Built fresh for every migration
//! attempt by the input calculator, read by the verifier and the project migrator,
//! then thrown away. The issue rows are the real source of truth; this is just
//! the plan.

use std::collections::{BTreeMap, BTreeSet};

use crate::common::{Issue, IssueId, IssueTypeId, StatusId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusMappingTable {
    entries: BTreeMap<(IssueTypeId, StatusId), StatusId>,
    /// 🚩 Only ever grows during one attempt. There is deliberately no `remove`.
    wrong_workflow_issues: BTreeSet<IssueId>,
}

impl StatusMappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// ✍️ Record (or overwrite) where issues of `issue_type_id` in `old_status_id` end up.
    pub fn add_mapping(
        &mut self,
        issue_type_id: impl Into<IssueTypeId>,
        old_status_id: impl Into<StatusId>,
        new_status_id: impl Into<StatusId>,
    ) {
        self.entries.insert(
            (issue_type_id.into(), old_status_id.into()),
            new_status_id.into(),
        );
    }

    pub fn target_status(&self, issue_type_id: &str, old_status_id: &str) -> Option<&StatusId> {
        // -- 🔑 the tuple key wants owned Strings; a couple of tiny allocs per lookup is fine
        self.entries
            .get(&(issue_type_id.to_string(), old_status_id.to_string()))
    }

    /// 🎯 Where this issue goes, keyed by its type and its *current* status.
    pub fn target_status_for(&self, issue: &Issue) -> Option<&StatusId> {
        self.target_status(&issue.issue_type_id, &issue.status_id)
    }

    pub fn has_mapping(&self, issue_type_id: &str, old_status_id: &str) -> bool {
        self.target_status(issue_type_id, old_status_id).is_some()
    }

    pub fn add_wrong_workflow_issues(&mut self, issue_ids: impl IntoIterator<Item = IssueId>) {
        self.wrong_workflow_issues.extend(issue_ids);
    }

    pub fn is_issue_on_wrong_workflow(&self, issue_id: IssueId) -> bool {
        self.wrong_workflow_issues.contains(&issue_id)
    }

    pub fn wrong_workflow_issue_ids(&self) -> &BTreeSet<IssueId> {
        &self.wrong_workflow_issues
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 📃 (issue type, old status, new status), sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.entries
            .iter()
            .map(|((ty, old), new)| (ty.as_str(), old.as_str(), new.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ProjectId;

    #[test]
    fn the_one_where_lookups_use_type_and_current_status() {
        let mut table = StatusMappingTable::new();
        table.add_mapping("bug", "3", "6");
        table.add_mapping("task", "3", "1");

        let issue = Issue {
            id: IssueId(1),
            key: "WF-1".to_string(),
            project_id: ProjectId(1),
            issue_type_id: "bug".to_string(),
            status_id: "3".to_string(),
            workflow_entry_id: 1,
        };
        assert_eq!(table.target_status_for(&issue).map(String::as_str), Some("6"));
        assert!(table.target_status("bug", "1").is_none());
        assert_eq!(table.len(), 2);

        // 🔄 later writes win, like a last-minute ticket reassignment
        table.add_mapping("bug", "3", "1");
        assert_eq!(table.target_status("bug", "3").map(String::as_str), Some("1"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn the_one_where_wrong_workflow_issues_only_accumulate() {
        let mut table = StatusMappingTable::new();
        table.add_wrong_workflow_issues([IssueId(4), IssueId(9)]);
        table.add_wrong_workflow_issues([IssueId(4)]);
        assert!(table.is_issue_on_wrong_workflow(IssueId(9)));
        assert!(!table.is_issue_on_wrong_workflow(IssueId(5)));
        assert_eq!(table.wrong_workflow_issue_ids().len(), 2);
        assert!(table.is_empty());
    }
}
