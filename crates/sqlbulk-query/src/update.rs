//! Per-element UPDATE statements, sent together.

use sqlbulk_core::{BulkOperation, EntityProfile, Parameter, PropertyProfile, quote_ident};

use crate::SqlCommandBuilder;
use crate::error::{SqlGenerationError, SqlGenerationErrorKind};
use crate::unit::{
    SqlCommandBuilderResult, UnitWriter, bound_count, present, render_value, returning_clause,
};

/// `update "t" set "a" = ..., "b" = ... where "pk" = ... [returning ...];`
/// once per element, concatenated into one command text.
///
/// Private keys select the row and auto-generated columns are never
/// written, so both stay out of the SET list.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateBuilder;

impl<T> SqlCommandBuilder<T> for UpdateBuilder {
    fn operation(&self) -> BulkOperation {
        BulkOperation::Update
    }

    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        let present = present(BulkOperation::Update, elements)?;
        let keys: Vec<&PropertyProfile<T>> = profile.private_keys().collect();
        if keys.is_empty() {
            return Err(SqlGenerationError::new(
                BulkOperation::Update,
                SqlGenerationErrorKind::MissingPrivateKey,
                format!("{} has no private key to target rows", profile.entity_name()),
            ));
        }
        let set: Vec<&PropertyProfile<T>> = profile
            .properties()
            .iter()
            .filter(|p| !p.is_private_key() && !p.is_auto_generated())
            .collect();
        if set.is_empty() {
            return Err(SqlGenerationError::new(
                BulkOperation::Update,
                SqlGenerationErrorKind::NoWritableColumns,
                format!("{} has no column to update", profile.entity_name()),
            ));
        }
        let (returning, has_returning) =
            returning_clause(profile, |p| p.is_updated_after_update());

        let needed = bound_count(set.iter().copied()) + bound_count(keys.iter().copied());
        let head = format!("update {} set ", profile.quoted_table());
        let mut writer = UnitWriter::new(
            BulkOperation::Update,
            String::new(),
            " ",
            String::new(),
            has_returning,
        );

        for &(input_index, element) in &present {
            let unit_index = writer.reserve(needed, input_index)?;
            let mut parameters = Vec::with_capacity(needed);
            let set_list =
                assignments(&set, element, input_index, unit_index, &mut parameters)?;
            let predicate =
                assignments(&keys, element, input_index, unit_index, &mut parameters)?;
            let statement = format!(
                "{}{} where {}{}",
                head,
                set_list.join(", "),
                predicate.join(" and "),
                returning
            );
            writer.push(&statement, parameters);
        }
        Ok(writer.finish())
    }
}

fn assignments<T>(
    properties: &[&PropertyProfile<T>],
    element: &T,
    input_index: usize,
    unit_index: usize,
    parameters: &mut Vec<Parameter>,
) -> Result<Vec<String>, SqlGenerationError> {
    properties
        .iter()
        .map(|p| {
            let value = render_value(
                BulkOperation::Update,
                p,
                element,
                input_index,
                unit_index,
                parameters,
            )?;
            Ok(format!("{} = {}", quote_ident(p.column_name()), value))
        })
        .collect()
}
