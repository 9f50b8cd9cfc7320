//! Core types and traits for sqlbulk.
//!
//! This crate provides the foundations the bulk engine is built on:
//!
//! - `Value`, `Row` and `TypeInfo` for moving data to and from the database
//! - `Connection` / `TransactionOps`, the driver boundary
//! - `EntityProfile` / `PropertyProfile`, the mapping of entity types to tables
//! - `BulkServiceOptions`, engine-wide settings plus the profile registry
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod identifiers;
pub mod operation;
pub mod options;
pub mod profile;
pub mod property;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Parameter, TransactionOps};
pub use error::{
    ConnectionError, ConnectionErrorKind, Error, QueryError, QueryErrorKind, Result,
    TransactionError, TransactionErrorKind, TypeError, TypeMappingError, TypeMappingErrorKind,
};
pub use identifiers::{
    default_table_name, parameter_name, parameter_stems, quote_ident, quote_qualified,
    sanitize_identifier, to_snake_case,
};
pub use operation::{BulkOperation, FailureStrategy};
pub use options::{
    BulkServiceOptions, BulkServiceOptionsBuilder, BulkSettings, MAX_IN_LIST_MEMBERS,
    MAX_PARAMETERS_PER_COMMAND,
};
pub use profile::{EntityProfile, EntityProfileBuilder, EntityUniqueConstraint, TableName};
pub use property::{PropertyProfile, PropertyType};
pub use row::{ColumnInfo, FromValue, Row};
pub use types::{SqlType, TypeInfo};
pub use value::Value;
