//! INSERT ... ON CONFLICT DO UPDATE.

use sqlbulk_core::{BulkOperation, EntityProfile, quote_ident};

use crate::SqlCommandBuilder;
use crate::error::{SqlGenerationError, SqlGenerationErrorKind};
use crate::insert::{values_header, writable_columns, write_value_rows};
use crate::unit::{SqlCommandBuilderResult, UnitWriter, present, returning_clause};

/// `insert into "t" (...) values (...) on conflict (<target>) do update set
/// "c" = excluded."c", ... [returning ...];`
///
/// The conflict target is `on constraint "<name>"` when the constraint is
/// named. An unnamed constraint lists every member column, not only the
/// first one, so a composite unique index such as `unique (team, member)`
/// is matched as a whole. Every written column outside the constraint is
/// refreshed from `excluded`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertBuilder;

impl<T> SqlCommandBuilder<T> for UpsertBuilder {
    fn operation(&self) -> BulkOperation {
        BulkOperation::Upsert
    }

    fn build(
        &self,
        elements: &[Option<&T>],
        profile: &EntityProfile<T>,
    ) -> Result<Vec<SqlCommandBuilderResult>, SqlGenerationError> {
        let present = present(BulkOperation::Upsert, elements)?;
        let constraint = profile
            .unique_constraint()
            .filter(|c| !c.columns().is_empty())
            .ok_or_else(|| {
                SqlGenerationError::new(
                    BulkOperation::Upsert,
                    SqlGenerationErrorKind::MissingUniqueConstraint,
                    format!("{} has no unique constraint", profile.entity_name()),
                )
            })?;
        let columns = writable_columns(BulkOperation::Upsert, profile)?;

        let target = match constraint.name() {
            Some(name) => format!("on constraint {}", quote_ident(name)),
            None => format!(
                "({})",
                constraint
                    .columns()
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        let mut refreshed: Vec<&str> = columns
            .iter()
            .map(|p| p.column_name())
            .filter(|c| !constraint.contains(c))
            .collect();
        if refreshed.is_empty() {
            // Keep the conflict branch a real update so every input row
            // still produces a RETURNING row.
            refreshed.extend(constraint.columns().first().map(String::as_str));
        }
        let assignments = refreshed
            .iter()
            .map(|c| {
                let quoted = quote_ident(c);
                format!("{} = excluded.{}", quoted, quoted)
            })
            .collect::<Vec<_>>()
            .join(", ");
        let (returning, has_returning) = returning_clause(profile, |p| {
            p.is_updated_after_insert() || p.is_updated_after_update()
        });
        let trailer = format!(" on conflict {} do update set {}{}", target, assignments, returning);

        let mut writer = UnitWriter::new(
            BulkOperation::Upsert,
            values_header(profile, &columns),
            ", ",
            trailer,
            has_returning,
        );
        write_value_rows(&mut writer, BulkOperation::Upsert, &present, &columns)?;
        Ok(writer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Customer, customer_profile, customers, unwrap_outcome};
    use asupersync::Cx;

    #[test]
    fn test_upsert_on_unnamed_constraint_lists_member_columns() {
        let profile = customer_profile();
        let items = customers(2);
        let elements: Vec<Option<&Customer>> = items.iter().map(Some).collect();

        let units = unwrap_outcome(UpsertBuilder.generate(&Cx::for_testing(), &elements, &profile));
        assert_eq!(units.len(), 1);
        assert_eq!(
            units[0].sql,
            "insert into \"sales\".\"customer\" (\"email\", \"name\", \"tier\", \"region_id\") \
             values (@param_email_0, @param_name_0, 0, @param_region_id_0), \
             (@param_email_1, @param_name_1, 1, @param_region_id_1) \
             on conflict (\"email\") do update set \"name\" = excluded.\"name\", \
             \"tier\" = excluded.\"tier\", \"region_id\" = excluded.\"region_id\" \
             returning \"id\";"
        );
        assert!(units[0].has_returning);
    }

    #[test]
    fn test_upsert_on_named_constraint() {
        let mut b = EntityProfile::<Customer>::builder();
        b.unique_constraint("customer_email_key");
        b.property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap()
            .unique();
        b.property("name", |c| c.name.clone(), |c, v| c.name = v)
            .unwrap();
        let profile = b.build().unwrap();
        let items = customers(1);

        let units = UpsertBuilder.build(&[Some(&items[0])], &profile).unwrap();
        assert!(units[0].sql.contains(
            " on conflict on constraint \"customer_email_key\" \
             do update set \"name\" = excluded.\"name\";"
        ));
        assert!(!units[0].has_returning);
    }

    #[test]
    fn test_upsert_returning_deduplicates_flags() {
        let mut b = EntityProfile::<Customer>::builder();
        b.property("id", |c| c.id, |c, v| c.id = v)
            .unwrap()
            .auto_generated()
            .updated_after_insert()
            .updated_after_update();
        b.property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap()
            .unique();
        b.property("name", |c| c.name.clone(), |c, v| c.name = v)
            .unwrap()
            .updated_after_update();
        let profile = b.build().unwrap();
        let items = customers(1);

        let units = UpsertBuilder.build(&[Some(&items[0])], &profile).unwrap();
        assert!(units[0].sql.ends_with(" returning \"id\", \"name\";"));
        assert_eq!(units[0].sql.matches("\"id\"").count(), 1);
    }

    #[test]
    fn test_upsert_all_columns_in_constraint_assigns_first_member() {
        let mut b = EntityProfile::<Customer>::builder();
        b.property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap()
            .unique();
        b.property("tier", |c| c.tier, |c, v| c.tier = v)
            .unwrap()
            .unique();
        let profile = b.build().unwrap();
        let items = customers(1);

        let units = UpsertBuilder.build(&[Some(&items[0])], &profile).unwrap();
        assert!(units[0].sql.ends_with(
            " on conflict (\"email\", \"tier\") do update set \"email\" = excluded.\"email\";"
        ));
    }

    #[test]
    fn test_upsert_on_composite_unnamed_constraint_targets_every_member() {
        let mut b = EntityProfile::<Customer>::builder();
        b.property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap()
            .unique();
        b.property("name", |c| c.name.clone(), |c, v| c.name = v)
            .unwrap();
        b.property("tier", |c| c.tier, |c, v| c.tier = v)
            .unwrap()
            .unique();
        let profile = b.build().unwrap();
        let items = customers(1);

        let units = UpsertBuilder.build(&[Some(&items[0])], &profile).unwrap();
        assert_eq!(
            units[0].sql,
            "insert into \"customer\" (\"email\", \"name\", \"tier\") \
             values (@param_email_0, @param_name_0, 0) \
             on conflict (\"email\", \"tier\") do update set \"name\" = excluded.\"name\";"
        );
    }

    #[test]
    fn test_upsert_without_constraint_fails() {
        let mut b = EntityProfile::<Customer>::builder();
        b.property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap();
        let profile = b.build().unwrap();
        let items = customers(1);

        let err = UpsertBuilder.build(&[Some(&items[0])], &profile).unwrap_err();
        assert_eq!(err.kind, SqlGenerationErrorKind::MissingUniqueConstraint);

        // A name alone, with no member columns, is not enough.
        let mut b = EntityProfile::<Customer>::builder();
        b.unique_constraint("orphan");
        b.property("email", |c| c.email.clone(), |c, v| c.email = v)
            .unwrap();
        let profile = b.build().unwrap();
        let err = UpsertBuilder.build(&[Some(&items[0])], &profile).unwrap_err();
        assert_eq!(err.kind, SqlGenerationErrorKind::MissingUniqueConstraint);
    }
}
