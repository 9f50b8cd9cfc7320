//! Multi-row INSERT.

use sqlbulk_core::{BulkOperation, EntityProfile, PropertyProfile, quote_ident};

use crate::SqlCommandBuilder;
use crate::error::{SqlGenerationError, SqlGenerationErrorKind};
use crate::unit::{
    SqlCommandBuilderResult, UnitWriter, bound_count, present, render_value, returning_clause,
};

/// `insert into "t" ("a", "b") values (...), (...) [returning ...];`
///
/// Auto-generated columns are left out of the column list; columns flagged
/// updated-after-insert are read back.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertBuilder;

impl<T> SqlCommandBuilder<T> for InsertBuilder {
    fn operation(&self) -> BulkOperation {
        BulkOperation::Insert
    }

    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        let present = present(BulkOperation::Insert, elements)?;
        let columns = writable_columns(BulkOperation::Insert, profile)?;
        let (trailer, has_returning) = returning_clause(profile, |p| p.is_updated_after_insert());

        let mut writer = UnitWriter::new(
            BulkOperation::Insert,
            values_header(profile, &columns),
            ", ",
            trailer,
            has_returning,
        );
        write_value_rows(&mut writer, BulkOperation::Insert, &present, &columns)?;
        Ok(writer.finish())
    }
}

pub(crate) fn writable_columns<T>(
    operation: BulkOperation,
    profile: &EntityProfile<T>,
) -> Result<Vec<&PropertyProfile<T>>, SqlGenerationError> {
    let columns: Vec<_> = profile.writable_properties().collect();
    if columns.is_empty() {
        return Err(SqlGenerationError::new(
            operation,
            SqlGenerationErrorKind::NoWritableColumns,
            format!(
                "every column of {} is auto-generated",
                profile.quoted_table()
            ),
        ));
    }
    Ok(columns)
}

/// `insert into "t" ("a", "b") values `
pub(crate) fn values_header<T>(
    profile: &EntityProfile<T>,
    columns: &[&PropertyProfile<T>],
) -> String {
    let column_list = columns
        .iter()
        .map(|p| quote_ident(p.column_name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "insert into {} ({}) values ",
        profile.quoted_table(),
        column_list
    )
}

/// One `(v1, v2, ...)` row per element.
pub(crate) fn write_value_rows<T>(
    writer: &mut UnitWriter,
    operation: BulkOperation,
    present: &[(usize, &T)],
    columns: &[&PropertyProfile<T>],
) -> Result<(), SqlGenerationError> {
    let needed = bound_count(columns.iter().copied());
    for &(input_index, element) in present {
        let unit_index = writer.reserve(needed, input_index)?;
        let mut parameters = Vec::with_capacity(needed);
        let values = columns
            .iter()
            .map(|p| render_value(operation, p, element, input_index, unit_index, &mut parameters))
            .collect::<Result<Vec<_>, _>>()?;
        writer.push(&format!("({})", values.join(", ")), parameters);
    }
    Ok(())
}
