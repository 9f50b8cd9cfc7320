//! Entity profiles: how an entity type maps onto a table.
//!
//! A profile is assembled once during registration with
//! [`EntityProfile::builder`] and is read-only afterwards. Derived data (the
//! quoted table identifier, the unique constraint, the per-element count of
//! bound parameters) is computed by [`EntityProfileBuilder::build`] and
//! cached on the profile.

use std::fmt;

use crate::error::{TypeMappingError, TypeMappingErrorKind};
use crate::identifiers::{default_table_name, parameter_stems, quote_qualified, to_snake_case};
use crate::operation::FailureStrategy;
use crate::property::{PropertyProfile, PropertyType};

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// The table as it appears in command text.
    pub fn quoted(&self) -> String {
        quote_qualified(self.schema.as_deref(), &self.name)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// The set of columns that jointly identify a row for upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityUniqueConstraint {
    name: Option<String>,
    columns: Vec<String>,
}

impl EntityUniqueConstraint {
    /// Declared constraint name. When absent the conflict target is the
    /// member column list.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Member columns, in property registration order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

/// Frozen mapping of entity type `T`.
pub struct EntityProfile<T> {
    entity_name: &'static str,
    table: TableName,
    quoted_table: String,
    properties: Vec<PropertyProfile<T>>,
    unique_constraint: Option<EntityUniqueConstraint>,
    maximum_sent_elements: Option<usize>,
    failure_strategy: Option<FailureStrategy>,
    bound_parameter_count: usize,
}

impl<T: 'static> EntityProfile<T> {
    /// Start registering a mapping for `T`.
    pub fn builder() -> EntityProfileBuilder<T> {
        EntityProfileBuilder::new()
    }
}

impl<T> EntityProfile<T> {
    /// Rust type name of the entity.
    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Quoted, schema-qualified table identifier.
    pub fn quoted_table(&self) -> &str {
        &self.quoted_table
    }

    /// All properties, in registration order.
    pub fn properties(&self) -> &[PropertyProfile<T>] {
        &self.properties
    }

    /// Look up a property by logical name.
    pub fn property(&self, name: &str) -> Option<&PropertyProfile<T>> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Look up a property by column name.
    pub fn property_by_column(&self, column: &str) -> Option<&PropertyProfile<T>> {
        self.properties.iter().find(|p| p.column_name() == column)
    }

    /// Properties that receive values on insert/upsert.
    pub fn writable_properties(&self) -> impl Iterator<Item = &PropertyProfile<T>> {
        self.properties.iter().filter(|p| !p.is_auto_generated())
    }

    /// Properties flagged as row-targeting keys.
    pub fn private_keys(&self) -> impl Iterator<Item = &PropertyProfile<T>> {
        self.properties.iter().filter(|p| p.is_private_key())
    }

    pub fn private_key_count(&self) -> usize {
        self.private_keys().count()
    }

    pub fn unique_constraint(&self) -> Option<&EntityUniqueConstraint> {
        self.unique_constraint.as_ref()
    }

    /// Per-type batch size override.
    pub fn maximum_sent_elements(&self) -> Option<usize> {
        self.maximum_sent_elements
    }

    /// Per-type failure strategy override.
    pub fn failure_strategy(&self) -> Option<FailureStrategy> {
        self.failure_strategy
    }

    /// Number of properties whose values are always bound.
    pub fn bound_parameter_count(&self) -> usize {
        self.bound_parameter_count
    }
}

impl<T> fmt::Debug for EntityProfile<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityProfile")
            .field("entity", &self.entity_name)
            .field("table", &self.table)
            .field("properties", &self.properties)
            .field("unique_constraint", &self.unique_constraint)
            .field("maximum_sent_elements", &self.maximum_sent_elements)
            .field("failure_strategy", &self.failure_strategy)
            .finish()
    }
}

/// Registration-phase builder for [`EntityProfile`].
///
/// ```
/// use sqlbulk_core::EntityProfile;
///
/// struct Customer {
///     id: i64,
///     email: String,
/// }
///
/// let mut builder = EntityProfile::<Customer>::builder();
/// builder.table(Some("customers"), None).unwrap();
/// builder
///     .property("id", |c| c.id, |c, v| c.id = v)
///     .unwrap()
///     .private_key()
///     .auto_generated()
///     .updated_after_insert();
/// builder
///     .property("email", |c| c.email.clone(), |c, v| c.email = v)
///     .unwrap()
///     .unique();
/// let profile = builder.build().unwrap();
///
/// assert_eq!(profile.quoted_table(), "\"customers\"");
/// assert_eq!(profile.unique_constraint().unwrap().columns(), ["email"]);
/// ```
pub struct EntityProfileBuilder<T> {
    entity_name: &'static str,
    table: Option<TableName>,
    properties: Vec<PropertyProfile<T>>,
    constraint_name: Option<String>,
    maximum_sent_elements: Option<usize>,
    failure_strategy: Option<FailureStrategy>,
}

impl<T> fmt::Debug for EntityProfileBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityProfileBuilder")
            .field("entity", &self.entity_name)
            .field("table", &self.table)
            .field("properties", &self.properties)
            .field("constraint_name", &self.constraint_name)
            .field("maximum_sent_elements", &self.maximum_sent_elements)
            .field("failure_strategy", &self.failure_strategy)
            .finish()
    }
}

impl<T: 'static> EntityProfileBuilder<T> {
    fn new() -> Self {
        Self {
            entity_name: std::any::type_name::<T>(),
            table: None,
            properties: Vec::new(),
            constraint_name: None,
            maximum_sent_elements: None,
            failure_strategy: None,
        }
    }

    /// Map a property through a typed getter/setter pair.
    ///
    /// The column defaults to the snake-cased property name; adjust it and
    /// the behavioural flags through the returned [`PropertyProfile`].
    pub fn property<V, G, S>(
        &mut self,
        name: &str,
        get: G,
        set: S,
    ) -> Result<&mut PropertyProfile<T>, TypeMappingError>
    where
        V: PropertyType,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        if self.properties.iter().any(|p| p.name() == name) {
            return Err(TypeMappingError::new(
                self.entity_name,
                TypeMappingErrorKind::DuplicateProperty,
                "property is already mapped",
            )
            .with_property(name));
        }
        self.properties
            .push(PropertyProfile::new(name, to_snake_case(name), get, set));
        let last = self.properties.len() - 1;
        Ok(&mut self.properties[last])
    }

    /// Resolve and freeze the table identifier.
    ///
    /// `None` for the name falls back to the snake-cased type name. The
    /// table can only be set once.
    pub fn table(
        &mut self,
        name: Option<&str>,
        schema: Option<&str>,
    ) -> Result<&mut Self, TypeMappingError> {
        if let Some(existing) = &self.table {
            return Err(TypeMappingError::new(
                self.entity_name,
                TypeMappingErrorKind::TableAlreadySet,
                format!("table is already set to {}", existing),
            ));
        }
        self.table = Some(TableName {
            schema: schema.map(str::to_string),
            name: name.map_or_else(default_table_name::<T>, str::to_string),
        });
        Ok(self)
    }

    /// Name the unique constraint used as the upsert conflict target.
    pub fn unique_constraint(&mut self, name: impl Into<String>) -> &mut Self {
        self.constraint_name = Some(name.into());
        self
    }

    /// Per-type batch size, overriding the engine-wide default.
    pub fn maximum_sent_elements(&mut self, size: usize) -> &mut Self {
        self.maximum_sent_elements = Some(size);
        self
    }

    /// Per-type failure strategy, overriding the engine-wide default.
    pub fn failure_strategy(&mut self, strategy: FailureStrategy) -> &mut Self {
        self.failure_strategy = Some(strategy);
        self
    }

    /// Freeze the profile.
    pub fn build(self) -> Result<EntityProfile<T>, TypeMappingError> {
        if self.properties.is_empty() {
            return Err(TypeMappingError::new(
                self.entity_name,
                TypeMappingErrorKind::NoProperties,
                "an entity profile needs at least one property",
            ));
        }
        if self.maximum_sent_elements == Some(0) {
            return Err(TypeMappingError::new(
                self.entity_name,
                TypeMappingErrorKind::InvalidConfiguration,
                "maximum sent elements must be greater than zero",
            ));
        }
        for (i, property) in self.properties.iter().enumerate() {
            let clash = self.properties[..i]
                .iter()
                .any(|p| p.column_name() == property.column_name());
            if clash {
                return Err(TypeMappingError::new(
                    self.entity_name,
                    TypeMappingErrorKind::DuplicateProperty,
                    format!("column {} is mapped twice", property.column_name()),
                )
                .with_property(property.name()));
            }
        }

        let mut properties = self.properties;
        let columns: Vec<&str> = properties.iter().map(PropertyProfile::column_name).collect();
        let stems = parameter_stems(&columns);
        for (property, stem) in properties.iter_mut().zip(stems) {
            property.set_parameter_stem(stem);
        }

        let table = self.table.unwrap_or_else(|| TableName {
            schema: None,
            name: default_table_name::<T>(),
        });
        let members: Vec<String> = properties
            .iter()
            .filter(|p| p.is_part_of_unique_constraint())
            .map(|p| p.column_name().to_string())
            .collect();
        let unique_constraint = if members.is_empty() && self.constraint_name.is_none() {
            None
        } else {
            Some(EntityUniqueConstraint {
                name: self.constraint_name,
                columns: members,
            })
        };
        let bound_parameter_count = properties
            .iter()
            .filter(|p| p.is_dynamically_invoked())
            .count();

        tracing::debug!(
            entity = self.entity_name,
            table = %table,
            properties = properties.len(),
            bound_parameters = bound_parameter_count,
            "Entity profile built"
        );

        Ok(EntityProfile {
            entity_name: self.entity_name,
            quoted_table: table.quoted(),
            table,
            properties,
            unique_constraint,
            maximum_sent_elements: self.maximum_sent_elements,
            failure_strategy: self.failure_strategy,
            bound_parameter_count,
        })
    }
}
