//! 💀 The errors callers actually match on.
//!
//! Most of wfmx speaks `anyhow`: context strings stacked
//! like pancakes, printed as a chain at 3am. But a few failures are part of the
//! contract. A UI needs to know "you mapped a status that was never offered"
//! without grepping an error message. Those live here. 🦆

use thiserror::Error;

use crate::common::{IssueId, IssueTypeId, ProjectId, SchemeId, StatusId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("workflow '{0}' does not exist")]
    UnknownWorkflow(String),

    #[error("status '{status_id}' has no linked step in workflow '{workflow}'")]
    NoLinkedStep { workflow: String, status_id: StatusId },

    #[error("status '{0}' does not exist")]
    UnknownStatus(StatusId),

    #[error("no status mapping for issue type '{issue_type_id}', status '{status_id}'")]
    UnmappedStatus {
        issue_type_id: IssueTypeId,
        status_id: StatusId,
    },

    #[error(
        "status '{status_id}' of issue type '{issue_type_id}' was not offered for mapping in this migration"
    )]
    MappingNotOffered {
        issue_type_id: IssueTypeId,
        status_id: StatusId,
    },

    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),

    #[error("workflow scheme {0} not found")]
    SchemeNotFound(SchemeId),

    #[error("draft workflow scheme {0} not found")]
    DraftNotFound(SchemeId),

    #[error("cannot delete scheme {0}: it is still used by a project")]
    SchemeInUse(SchemeId),

    #[error("issue {0} not found")]
    IssueNotFound(IssueId),

    #[error("a transaction is already open")]
    TransactionAlreadyOpen,

    #[error("no transaction is open")]
    NoTransaction,

    #[error("a migration task is already running for {0}")]
    TaskAlreadyRunning(String),

    #[error("injected failure: {0}")]
    Injected(String),
}
