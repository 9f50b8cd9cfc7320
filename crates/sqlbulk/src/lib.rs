//! sqlbulk - bulk INSERT, UPDATE, DELETE and UPSERT for Rust entities.
//!
//! sqlbulk turns a collection of in-memory entities into as few SQL
//! commands as possible and runs them with a configurable failure strategy:
//!
//! - Entities are mapped to tables by an `EntityProfile`, built once at startup
//! - Commands respect the 65,535 bound-parameter ceiling and the 1,000-member
//!   `IN` list ceiling, splitting into several units when needed
//! - Large inputs can be cut into user portions (`maximum_sent_elements`)
//! - Database-generated values (`RETURNING`) are written back onto the entities
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlbulk::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone)]
//! struct Customer {
//!     id: i64,
//!     email: String,
//!     name: String,
//! }
//!
//! fn customer_profile() -> EntityProfile<Customer> {
//!     let mut b = EntityProfile::<Customer>::builder();
//!     b.property("id", |c| c.id, |c, v| c.id = v)
//!         .unwrap()
//!         .private_key()
//!         .auto_generated()
//!         .updated_after_insert();
//!     b.property("email", |c| c.email.clone(), |c, v| c.email = v)
//!         .unwrap()
//!         .unique();
//!     b.property("name", |c| c.name.clone(), |c, v| c.name = v)
//!         .unwrap();
//!     b.build().unwrap()
//! }
//!
//! async fn main_example(cx: &Cx, conn: &impl Connection, mut customers: Vec<Customer>) {
//!     let options = BulkServiceOptions::builder()
//!         .failure_strategy(FailureStrategy::IgnoreFailure)
//!         .maximum_sent_elements(500)
//!         .register(customer_profile())
//!         .unwrap()
//!         .build()
//!         .unwrap();
//!     let service = BulkService::new(Arc::new(options));
//!
//!     // Insert; generated ids land in `customers`
//!     let skipped = service.insert(cx, conn, customers.iter_mut()).await;
//!
//!     // Upsert on the unique email
//!     let skipped = service.upsert(cx, conn, customers.iter_mut()).await;
//!
//!     // Delete by id
//!     let skipped = service.delete(cx, conn, customers.iter_mut()).await;
//! }
//! ```
//!
//! # Crates
//!
//! - `sqlbulk-core`: values, rows, the driver boundary and the mapping model
//! - `sqlbulk-query`: command builders
//! - `sqlbulk-executor`: the orchestrator (`BulkService`)
//! - `sqlbulk-sqlite`: a reference SQLite driver

// Re-export all public types from sub-crates
pub use sqlbulk_core::{
    // asupersync re-exports
    Cx,
    Outcome,
    // Driver boundary
    ColumnInfo,
    Connection,
    Error,
    FromValue,
    Parameter,
    QueryError,
    QueryErrorKind,
    Result,
    Row,
    SqlType,
    TransactionOps,
    TypeInfo,
    Value,
    // Mapping model
    BulkOperation,
    BulkServiceOptions,
    BulkServiceOptionsBuilder,
    BulkSettings,
    EntityProfile,
    EntityProfileBuilder,
    EntityUniqueConstraint,
    FailureStrategy,
    MAX_IN_LIST_MEMBERS,
    MAX_PARAMETERS_PER_COMMAND,
    PropertyProfile,
    PropertyType,
    TableName,
    TypeMappingError,
    TypeMappingErrorKind,
};

pub use sqlbulk_query::{
    DeleteBuilder, DeleteStrategyKind, InsertBuilder, SqlCommandBuilder, SqlCommandBuilderResult,
    SqlGenerationError, SqlGenerationErrorKind, UpdateBuilder, UpsertBuilder, WhereInDeleteBuilder,
    WhereOrDeleteBuilder, generate,
};

pub use sqlbulk_executor::{BulkError, BulkExecutionError, BulkService};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlbulk::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Orchestrator
        BulkError,
        BulkExecutionError,
        BulkOperation,
        BulkService,
        BulkServiceOptions,
        // Driver boundary
        Connection,
        Cx,
        EntityProfile,
        Error,
        FailureStrategy,
        Outcome,
        Parameter,
        Row,
        TransactionOps,
        Value,
    };
}
