//! Bulk command builders for sqlbulk.
//!
//! `sqlbulk-query` is the **command generation layer**. Given an
//! [`EntityProfile`] and a slice of elements it produces one or more
//! [`SqlCommandBuilderResult`] units: parameterized text, the bound
//! parameters, whether rows come back, and how many elements the unit covers.
//!
//! # Role In The Architecture
//!
//! - **Builders**: [`InsertBuilder`], [`UpdateBuilder`], [`DeleteBuilder`]
//!   (a mediator over [`WhereInDeleteBuilder`] and [`WhereOrDeleteBuilder`])
//!   and [`UpsertBuilder`].
//! - **Parameter ceiling**: every builder splits its output so no unit
//!   carries more than [`MAX_PARAMETERS_PER_COMMAND`] bound parameters.
//! - **Literals vs parameters**: non-nullable integral values are inlined to
//!   save the parameter budget; everything else is bound by name.
//!
//! The units are executed by `sqlbulk-executor`; builders never touch a
//! connection.

pub mod delete;
pub mod error;
pub mod insert;
pub mod unit;
pub mod update;
pub mod upsert;

#[cfg(test)]
pub(crate) mod test_support;

pub use delete::{DeleteBuilder, DeleteStrategyKind, WhereInDeleteBuilder, WhereOrDeleteBuilder};
pub use error::{SqlGenerationError, SqlGenerationErrorKind};
pub use insert::InsertBuilder;
pub use sqlbulk_core::{MAX_IN_LIST_MEMBERS, MAX_PARAMETERS_PER_COMMAND};
pub use unit::SqlCommandBuilderResult;
pub use update::UpdateBuilder;
pub use upsert::UpsertBuilder;

use asupersync::{Cx, Outcome};
use sqlbulk_core::{BulkOperation, EntityProfile};

/// A generator of bulk command text for one operation.
pub trait SqlCommandBuilder<T> {
    /// The operation this builder generates.
    fn operation(&self) -> BulkOperation;

    /// Generate command units, checking for cancellation first.
    ///
    /// `None` entries are skipped; a slice with no `Some` entry is an
    /// [`SqlGenerationErrorKind::EmptyInput`] error.
    fn generate(
        &self,
        cx: &Cx,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Outcome<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        if let Some(reason) = cx.cancel_reason() {
            return Outcome::Cancelled(reason);
        }
        let result = self.build(elements, profile);
        if let Ok(units) = &result {
            tracing::debug!(
                operation = %self.operation(),
                table = profile.quoted_table(),
                units = units.len(),
                "Generated command units"
            );
        }
        result.map_or_else(Outcome::Err, Outcome::Ok)
    }

    /// Generate command units.
    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError>;
}

/// Generate the units for `operation` with its builder.
pub fn generate<T>(
    cx: &Cx,
    operation: BulkOperation,
    elements: &[Option<&T>],
    profile: &EntityProfile<T>,
) -> Outcome<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
    match operation {
        BulkOperation::Insert => InsertBuilder.generate(cx, elements, profile),
        BulkOperation::Update => UpdateBuilder.generate(cx, elements, profile),
        BulkOperation::Delete => DeleteBuilder.generate(cx, elements, profile),
        BulkOperation::Upsert => UpsertBuilder.generate(cx, elements, profile),
    }
}
