//! DELETE: a mediator choosing between a `where in` and a `where or`
//! strategy by the number of private keys.

use sqlbulk_core::{
    BulkOperation, EntityProfile, MAX_IN_LIST_MEMBERS, PropertyProfile, quote_ident,
};

use crate::SqlCommandBuilder;
use crate::error::{SqlGenerationError, SqlGenerationErrorKind};
use crate::unit::{SqlCommandBuilderResult, UnitWriter, bound_count, present, render_value};

/// Which delete strategy a profile gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategyKind {
    /// Exactly one private key: `where "pk" in (...)`.
    WhereIn,
    /// Composite key: `where ("a" = .. and "b" = ..) or (...)`.
    WhereOr,
}

impl DeleteStrategyKind {
    /// Dispatch on private-key cardinality. Zero keys is an error.
    pub fn for_profile<T>(profile: &EntityProfile<T>) -> Result<Self, SqlGenerationError> {
        match profile.private_key_count() {
            0 => Err(missing_key(profile)),
            1 => Ok(DeleteStrategyKind::WhereIn),
            _ => Ok(DeleteStrategyKind::WhereOr),
        }
    }
}

fn missing_key<T>(profile: &EntityProfile<T>) -> SqlGenerationError {
    SqlGenerationError::new(
        BulkOperation::Delete,
        SqlGenerationErrorKind::MissingPrivateKey,
        format!("{} has no private key to target rows", profile.entity_name()),
    )
}

/// Delete mediator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteBuilder;

impl<T> SqlCommandBuilder<T> for DeleteBuilder {
    fn operation(&self) -> BulkOperation {
        BulkOperation::Delete
    }

    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        let kind = DeleteStrategyKind::for_profile(profile)?;
        tracing::trace!(strategy = ?kind, table = profile.quoted_table(), "Delete strategy");
        match kind {
            DeleteStrategyKind::WhereIn => WhereInDeleteBuilder.build(elements, profile),
            DeleteStrategyKind::WhereOr => WhereOrDeleteBuilder.build(elements, profile),
        }
    }
}

/// `delete from "t" where "pk" in (1, 2, ...);`, at most
/// [`MAX_IN_LIST_MEMBERS`] keys per unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhereInDeleteBuilder;

impl<T> SqlCommandBuilder<T> for WhereInDeleteBuilder {
    fn operation(&self) -> BulkOperation {
        BulkOperation::Delete
    }

    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        let present = present(BulkOperation::Delete, elements)?;
        let mut keys = profile.private_keys();
        let (Some(key), None) = (keys.next(), keys.next()) else {
            return Err(SqlGenerationError::new(
                BulkOperation::Delete,
                SqlGenerationErrorKind::MissingPrivateKey,
                format!(
                    "where-in delete needs exactly one private key, {} has {}",
                    profile.entity_name(),
                    profile.private_key_count()
                ),
            ));
        };

        let header = format!(
            "delete from {} where {} in (",
            profile.quoted_table(),
            quote_ident(key.column_name())
        );
        let mut writer = UnitWriter::new(
            BulkOperation::Delete,
            header,
            ", ",
            ");".to_string(),
            false,
        )
        .max_elements(MAX_IN_LIST_MEMBERS);

        let needed = bound_count([key]);
        for &(input_index, element) in &present {
            let unit_index = writer.reserve(needed, input_index)?;
            let mut parameters = Vec::with_capacity(needed);
            let value = render_value(
                BulkOperation::Delete,
                key,
                element,
                input_index,
                unit_index,
                &mut parameters,
            )?;
            writer.push(&value, parameters);
        }
        Ok(writer.finish())
    }
}

/// `delete from "t" where ("a" = 1 and "b" = 2) or (...);`
#[derive(Debug, Clone, Copy, Default)]
pub struct WhereOrDeleteBuilder;

impl<T> SqlCommandBuilder<T> for WhereOrDeleteBuilder {
    fn operation(&self) -> BulkOperation {
        BulkOperation::Delete
    }

    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        let present = present(BulkOperation::Delete, elements)?;
        let keys: Vec<&PropertyProfile<T>> = profile.private_keys().collect();
        if keys.is_empty() {
            return Err(missing_key(profile));
        }

        let header = format!("delete from {} where ", profile.quoted_table());
        let mut writer =
            UnitWriter::new(BulkOperation::Delete, header, " or ", ";".to_string(), false);

        let needed = bound_count(keys.iter().copied());
        for &(input_index, element) in &present {
            let unit_index = writer.reserve(needed, input_index)?;
            let mut parameters = Vec::with_capacity(needed);
            let mut terms = Vec::with_capacity(keys.len());
            for key in &keys {
                let value = render_value(
                    BulkOperation::Delete,
                    key,
                    element,
                    input_index,
                    unit_index,
                    &mut parameters,
                )?;
                terms.push(format!("{} = {}", quote_ident(key.column_name()), value));
            }
            writer.push(&format!("({})", terms.join(" and ")), parameters);
        }
        Ok(writer.finish())
    }
}
