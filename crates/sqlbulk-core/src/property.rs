//! Property mappings and the typed value accessor.

use std::fmt;

use crate::error::{Error, Result};
use crate::identifiers::sanitize_identifier;
use crate::row::FromValue;
use crate::types::{SqlType, TypeInfo};
use crate::value::Value;

/// A Rust type a mapped property can have.
///
/// Blanket-implemented for every type that knows its SQL type, converts into
/// a [`Value`] for binding and back out of one for write-back.
pub trait PropertyType: TypeInfo + Into<Value> + FromValue + Send + Sync + 'static {}

impl<V> PropertyType for V where V: TypeInfo + Into<Value> + FromValue + Send + Sync + 'static {}

type Getter<T> = Box<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Box<dyn Fn(&mut T, &Value) -> Result<()> + Send + Sync>;

/// How one property of `T` maps to a column.
///
/// Created through [`EntityProfileBuilder::property`](crate::EntityProfileBuilder::property);
/// the flag setters are only reachable during registration, so a profile is
/// immutable once built.
pub struct PropertyProfile<T> {
    name: String,
    column: String,
    parameter_stem: String,
    column_type: SqlType,
    nullable: bool,
    inline_literal: bool,
    private_key: bool,
    auto_generated: bool,
    unique: bool,
    updated_after_insert: bool,
    updated_after_update: bool,
    getter: Getter<T>,
    setter: Setter<T>,
}

impl<T> PropertyProfile<T> {
    pub(crate) fn new<V, G, S>(name: &str, column: String, get: G, set: S) -> Self
    where
        V: PropertyType,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            parameter_stem: sanitize_identifier(&column),
            column,
            column_type: V::SQL_TYPE,
            nullable: V::NULLABLE,
            inline_literal: V::INLINE_LITERAL,
            private_key: false,
            auto_generated: false,
            unique: false,
            updated_after_insert: false,
            updated_after_update: false,
            getter: Box::new(move |element| get(element).into()),
            setter: Box::new(move |element, value| {
                set(element, V::from_value(value)?);
                Ok(())
            }),
        }
    }

    /// Override the column name (defaults to the snake-cased property name).
    pub fn column(&mut self, name: impl Into<String>) -> &mut Self {
        self.column = name.into();
        self
    }

    /// Override the column storage type.
    pub fn column_type(&mut self, sql_type: SqlType) -> &mut Self {
        self.column_type = sql_type;
        self
    }

    /// Mark the property as a row-targeting key (WHERE / delete).
    pub fn private_key(&mut self) -> &mut Self {
        self.private_key = true;
        self
    }

    /// The database computes this column; it is never written.
    pub fn auto_generated(&mut self) -> &mut Self {
        self.auto_generated = true;
        self
    }

    /// Make the property a member of the entity's unique constraint.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Read the column back (RETURNING) after an insert or upsert.
    pub fn updated_after_insert(&mut self) -> &mut Self {
        self.updated_after_insert = true;
        self
    }

    /// Read the column back (RETURNING) after an update or upsert.
    pub fn updated_after_update(&mut self) -> &mut Self {
        self.updated_after_update = true;
        self
    }

    /// Override nullability. Declaring a property nullable forces its
    /// values to be bound rather than inlined.
    pub fn nullable(&mut self, nullable: bool) -> &mut Self {
        self.nullable = nullable;
        self
    }

    /// Logical property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// Stem of this property's bound parameter names, unique within the
    /// profile. Assigned when the profile is built.
    pub fn parameter_stem(&self) -> &str {
        &self.parameter_stem
    }

    pub(crate) fn set_parameter_stem(&mut self, stem: String) {
        self.parameter_stem = stem;
    }

    pub fn sql_type(&self) -> &SqlType {
        &self.column_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_private_key(&self) -> bool {
        self.private_key
    }

    pub fn is_auto_generated(&self) -> bool {
        self.auto_generated
    }

    pub fn is_part_of_unique_constraint(&self) -> bool {
        self.unique
    }

    pub fn is_updated_after_insert(&self) -> bool {
        self.updated_after_insert
    }

    pub fn is_updated_after_update(&self) -> bool {
        self.updated_after_update
    }

    /// Whether values must travel as bound parameters.
    ///
    /// Decided from the declared Rust type: only non-nullable types that
    /// opt into inline literals (plain integers, integral enums) are
    /// rendered into the command text.
    pub fn is_dynamically_invoked(&self) -> bool {
        !self.inline_literal || self.nullable
    }

    /// Read the property from an element.
    pub fn get_value(&self, element: &T) -> Value {
        (self.getter)(element)
    }

    /// Write a database value onto an element.
    #[allow(clippy::result_large_err)]
    pub fn set_value(&self, element: &mut T, value: &Value) -> Result<()> {
        (self.setter)(element, value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(self.column.clone());
                Error::Type(te)
            }
            e => e,
        })
    }
}

impl<T> fmt::Debug for PropertyProfile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyProfile")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("column_type", &self.column_type)
            .field("nullable", &self.nullable)
            .field("private_key", &self.private_key)
            .field("auto_generated", &self.auto_generated)
            .field("unique", &self.unique)
            .field("updated_after_insert", &self.updated_after_insert)
            .field("updated_after_update", &self.updated_after_update)
            .field("dynamically_invoked", &self.is_dynamically_invoked())
            .finish_non_exhaustive()
    }
}
