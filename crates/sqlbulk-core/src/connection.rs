//! Driver boundary.
//!
//! The bulk engine never talks to a database directly; it consumes these
//! traits:
//!
//! - [`Connection`] - execute parameterized text and start transactions
//! - [`TransactionOps`] - the same inside a transaction, plus commit/rollback
//! - [`Parameter`] - a named bound value referenced from the command text
//!
//! All operations integrate with asupersync's structured concurrency via `Cx` context
//! for proper cancellation handling. The connection handed to the engine is
//! already open; opening and pooling connections is the driver's business.

use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A bound parameter, referenced from the command text by name.
///
/// Names carry their `@` prefix exactly as they appear in the text
/// (e.g. `@param_email_3`). Drivers bind by name, so the order of the
/// parameter list does not need to match the order of placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: Value,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A database connection capable of executing bulk command text.
///
/// All operations are async and take a `Cx` context for cancellation support.
/// Implementations must be `Send + Sync` for use across async boundaries.
///
/// A command text may contain several `;`-terminated statements (bulk
/// updates are sent that way); [`query`](Connection::query) returns the rows
/// produced by all of them, in statement order.
///
/// # Example
///
/// ```rust,ignore
/// let params = [Parameter::new("@param_name_0", "Alice")];
/// let tx = conn.begin(&cx).await?;
/// let rows = tx
///     .query(&cx, "insert into \"users\" (\"name\") values (@param_name_0) returning \"id\";", &params)
///     .await?;
/// tx.commit(&cx).await?;
/// ```
pub trait Connection: Send + Sync {
    /// The transaction type returned by this connection.
    type Tx<'conn>: TransactionOps
    where
        Self: 'conn;

    /// Execute command text and return all rows it produced.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute command text and return the number of rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Begin a transaction.
    fn begin(&self, cx: &Cx) -> impl Future<Output = Outcome<Self::Tx<'_>, crate::Error>> + Send;

    /// Check if the connection is still valid by sending a ping.
    fn ping(&self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Check if the connection is still valid (alias for ping that returns bool).
    fn is_valid(&self, cx: &Cx) -> impl Future<Output = bool> + Send {
        async {
            match self.ping(cx).await {
                Outcome::Ok(()) => true,
                Outcome::Err(_) | Outcome::Cancelled(_) | Outcome::Panicked(_) => false,
            }
        }
    }
}

/// Trait for transaction operations.
///
/// Transactions must be explicitly committed or rolled back; dropping
/// without commit triggers automatic rollback in the driver.
pub trait TransactionOps: Send {
    /// Execute command text within this transaction and return its rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<Vec<Row>, crate::Error>> + Send;

    /// Execute command text within this transaction.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Parameter],
    ) -> impl Future<Output = Outcome<u64, crate::Error>> + Send;

    /// Commit the transaction, making all changes permanent.
    fn commit(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;

    /// Rollback the transaction, discarding all changes.
    fn rollback(self, cx: &Cx) -> impl Future<Output = Outcome<(), crate::Error>> + Send;
}
