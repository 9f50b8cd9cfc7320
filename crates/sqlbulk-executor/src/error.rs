//! Errors returned by bulk operations.

use std::fmt;

use sqlbulk_core::{BulkOperation, Error, FailureStrategy, TypeMappingError};
use sqlbulk_query::SqlGenerationError;

/// The database rejected a command unit and the failure strategy stopped
/// the call.
///
/// The three element collections are `None` unless the matching
/// `keep_*_in_exception` setting is on.
pub struct BulkExecutionError<T> {
    pub operation: BulkOperation,
    pub strategy: FailureStrategy,
    /// What the driver reported.
    pub source: Error,
    /// Elements whose units succeeded before the failure.
    pub operated: Option<Vec<T>>,
    /// Elements that were never attempted.
    pub not_operated: Option<Vec<T>>,
    /// Elements of the failing unit.
    pub problem: Option<Vec<T>>,
}

impl<T> BulkExecutionError<T> {
    /// SQL text of the failing unit, when the driver reported it.
    pub fn sql(&self) -> Option<&str> {
        self.source.sql()
    }
}

impl<T> fmt::Debug for BulkExecutionError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkExecutionError")
            .field("operation", &self.operation)
            .field("strategy", &self.strategy)
            .field("source", &self.source)
            .field("operated", &self.operated.as_ref().map(Vec::len))
            .field("not_operated", &self.not_operated.as_ref().map(Vec::len))
            .field("problem", &self.problem.as_ref().map(Vec::len))
            .finish()
    }
}

impl<T> fmt::Display for BulkExecutionError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bulk {} failed ({}): {}",
            self.operation, self.strategy, self.source
        )
    }
}

impl<T> std::error::Error for BulkExecutionError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Everything a bulk operation can fail with.
pub enum BulkError<T> {
    /// No elements, or only `None` entries.
    Argument(String),
    Mapping(TypeMappingError),
    Generation(SqlGenerationError),
    Execution(BulkExecutionError<T>),
    /// Transaction control failed outside any failure strategy.
    Driver(Error),
}

impl<T> BulkError<T> {
    pub fn is_execution(&self) -> bool {
        matches!(self, BulkError::Execution(_))
    }

    pub fn as_execution(&self) -> Option<&BulkExecutionError<T>> {
        match self {
            BulkError::Execution(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_execution(self) -> Option<BulkExecutionError<T>> {
        match self {
            BulkError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for BulkError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkError::Argument(msg) => f.debug_tuple("Argument").field(msg).finish(),
            BulkError::Mapping(e) => f.debug_tuple("Mapping").field(e).finish(),
            BulkError::Generation(e) => f.debug_tuple("Generation").field(e).finish(),
            BulkError::Execution(e) => f.debug_tuple("Execution").field(e).finish(),
            BulkError::Driver(e) => f.debug_tuple("Driver").field(e).finish(),
        }
    }
}

impl<T> fmt::Display for BulkError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkError::Argument(msg) => write!(f, "Invalid argument: {}", msg),
            BulkError::Mapping(e) => write!(f, "{}", e),
            BulkError::Generation(e) => write!(f, "{}", e),
            BulkError::Execution(e) => write!(f, "{}", e),
            BulkError::Driver(e) => write!(f, "{}", e),
        }
    }
}

impl<T: 'static> std::error::Error for BulkError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BulkError::Argument(_) => None,
            BulkError::Mapping(e) => Some(e),
            BulkError::Generation(e) => Some(e),
            BulkError::Execution(e) => Some(e),
            BulkError::Driver(e) => Some(e),
        }
    }
}

impl<T> From<TypeMappingError> for BulkError<T> {
    fn from(err: TypeMappingError) -> Self {
        BulkError::Mapping(err)
    }
}

impl<T> From<SqlGenerationError> for BulkError<T> {
    fn from(err: SqlGenerationError) -> Self {
        BulkError::Generation(err)
    }
}

impl<T> From<BulkExecutionError<T>> for BulkError<T> {
    fn from(err: BulkExecutionError<T>) -> Self {
        BulkError::Execution(err)
    }
}

impl<T> From<Error> for BulkError<T> {
    fn from(err: Error) -> Self {
        BulkError::Driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbulk_core::{QueryError, QueryErrorKind};

    fn unique_violation() -> Error {
        Error::Query(QueryError {
            kind: QueryErrorKind::Constraint,
            sql: Some("insert into \"t\" (\"a\") values (1);".to_string()),
            sqlstate: Some("2067".to_string()),
            message: "UNIQUE constraint failed: t.a".to_string(),
            source: None,
        })
    }

    #[test]
    fn test_execution_error_display_and_source() {
        let err: BulkExecutionError<u8> = BulkExecutionError {
            operation: BulkOperation::Insert,
            strategy: FailureStrategy::StopEverything,
            source: unique_violation(),
            operated: None,
            not_operated: Some(vec![1, 2]),
            problem: None,
        };
        let text = err.to_string();
        assert!(text.starts_with("Bulk insert failed (stop_everything):"));
        assert!(text.contains("UNIQUE constraint failed"));
        assert_eq!(err.sql(), Some("insert into \"t\" (\"a\") values (1);"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(format!("{err:?}").contains("not_operated: Some(2)"));
    }

    #[test]
    fn test_bulk_error_conversions() {
        let err: BulkError<u8> = unique_violation().into();
        assert!(matches!(err, BulkError::Driver(_)));
        assert!(!err.is_execution());
        assert!(err.as_execution().is_none());

        let err: BulkError<u8> = BulkError::Argument("no elements".into());
        assert_eq!(err.to_string(), "Invalid argument: no elements");
        assert!(std::error::Error::source(&err).is_none());
    }
}
