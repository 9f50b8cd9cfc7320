//! Generation-time errors.

use std::fmt;

use sqlbulk_core::BulkOperation;

/// Raised when a builder cannot produce valid command text.
///
/// A single malformed element fails the whole generation: nothing is
/// skipped silently.
#[derive(Debug)]
pub struct SqlGenerationError {
    pub operation: BulkOperation,
    pub kind: SqlGenerationErrorKind,
    pub message: String,
    /// Position of the failing element in the input, nulls included.
    pub element_index: Option<usize>,
    /// Logical name of the failing property.
    pub property: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlGenerationErrorKind {
    /// No elements, or only `None` entries
    EmptyInput,
    /// Update/delete on a profile without private keys
    MissingPrivateKey,
    /// Upsert on a profile without a (non-empty) unique constraint
    MissingUniqueConstraint,
    /// Insert/update on a profile where every column is excluded
    NoWritableColumns,
    /// A single element could not be rendered
    ElementFailure,
    /// One element alone needs more parameters than a command may carry
    ParameterCeiling,
}

impl SqlGenerationError {
    pub fn new(
        operation: BulkOperation,
        kind: SqlGenerationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            element_index: None,
            property: None,
            source: None,
        }
    }

    /// Tag the error with the element and property that failed.
    pub fn at(mut self, element_index: usize, property: impl Into<String>) -> Self {
        self.element_index = Some(element_index);
        self.property = Some(property.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for SqlGenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cannot generate {} command: {}", self.operation, self.message)?;
        match (&self.property, self.element_index) {
            (Some(property), Some(index)) => {
                write!(f, " (property {} of element {})", property, index)
            }
            (None, Some(index)) => write!(f, " (element {})", index),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for SqlGenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}
