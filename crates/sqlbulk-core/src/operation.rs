//! Bulk operation kinds and failure strategies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkOperation {
    Insert,
    Update,
    Delete,
    Upsert,
}

impl BulkOperation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            BulkOperation::Insert => "insert",
            BulkOperation::Update => "update",
            BulkOperation::Delete => "delete",
            BulkOperation::Upsert => "upsert",
        }
    }
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to the rest of a bulk call when one unit fails to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Roll back the failing unit, keep earlier portions, stop.
    #[default]
    StopEverything,
    /// Roll back everything this call wrote, then stop.
    StopEverythingAndRollback,
    /// Roll back the failing unit, report its elements, keep going.
    IgnoreFailure,
}

impl fmt::Display for FailureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStrategy::StopEverything => "stop_everything",
            FailureStrategy::StopEverythingAndRollback => "stop_everything_and_rollback",
            FailureStrategy::IgnoreFailure => "ignore_failure",
        };
        f.write_str(name)
    }
}
