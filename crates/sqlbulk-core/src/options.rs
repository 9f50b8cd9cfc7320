//! Engine-wide settings and the registry of entity profiles.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypeMappingError, TypeMappingErrorKind};
use crate::operation::FailureStrategy;
use crate::profile::EntityProfile;

/// Maximum number of bound parameters in one command unit.
pub const MAX_PARAMETERS_PER_COMMAND: usize = 65_535;

/// Maximum number of members in one `IN (...)` list.
pub const MAX_IN_LIST_MEMBERS: usize = 1_000;

/// Serialisable engine-wide defaults.
///
/// ```
/// use sqlbulk_core::{BulkSettings, FailureStrategy};
///
/// let settings: BulkSettings =
///     serde_json::from_str(r#"{ "failure_strategy": "ignore_failure" }"#).unwrap();
/// assert_eq!(settings.failure_strategy, Some(FailureStrategy::IgnoreFailure));
/// assert_eq!(settings.maximum_sent_elements, None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkSettings {
    /// Elements per portion; `None` sends everything in one portion.
    pub maximum_sent_elements: Option<usize>,
    /// Default failure strategy; `None` means [`FailureStrategy::StopEverything`].
    pub failure_strategy: Option<FailureStrategy>,
    /// Attach successfully operated elements to execution errors.
    pub keep_operated_in_exception: bool,
    /// Attach never-attempted elements to execution errors.
    pub keep_not_operated_in_exception: bool,
    /// Attach the elements of the failing unit to execution errors.
    pub keep_problem_in_exception: bool,
}

/// Settings plus the frozen profile registry.
///
/// Built once at startup and shared by reference (usually behind an `Arc`)
/// with every bulk service; never mutated afterwards.
#[derive(Default)]
pub struct BulkServiceOptions {
    settings: BulkSettings,
    profiles: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl BulkServiceOptions {
    pub fn builder() -> BulkServiceOptionsBuilder {
        BulkServiceOptionsBuilder::default()
    }

    pub fn settings(&self) -> &BulkSettings {
        &self.settings
    }

    /// Profile registered for `T`.
    pub fn profile<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<EntityProfile<T>>, TypeMappingError> {
        self.profiles
            .get(&TypeId::of::<T>())
            .and_then(|p| Arc::clone(p).downcast::<EntityProfile<T>>().ok())
            .ok_or_else(|| {
                TypeMappingError::new(
                    std::any::type_name::<T>(),
                    TypeMappingErrorKind::UnregisteredEntity,
                    "entity type is not registered",
                )
            })
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.profiles.contains_key(&TypeId::of::<T>())
    }

    /// Failure strategy for `profile`: profile override, else the default,
    /// else `StopEverything`.
    pub fn failure_strategy_for<T>(&self, profile: &EntityProfile<T>) -> FailureStrategy {
        profile
            .failure_strategy()
            .or(self.settings.failure_strategy)
            .unwrap_or_default()
    }

    /// Portion size for `profile`: profile override, else the default,
    /// else unlimited (`None`).
    pub fn batch_size_for<T>(&self, profile: &EntityProfile<T>) -> Option<usize> {
        profile
            .maximum_sent_elements()
            .or(self.settings.maximum_sent_elements)
    }
}

impl std::fmt::Debug for BulkServiceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkServiceOptions")
            .field("settings", &self.settings)
            .field("registered_entities", &self.profiles.len())
            .finish()
    }
}

/// Builder for [`BulkServiceOptions`].
#[derive(Default)]
pub struct BulkServiceOptionsBuilder {
    settings: BulkSettings,
    profiles: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl BulkServiceOptionsBuilder {
    /// Replace all scalar settings, e.g. with values loaded from a file.
    pub fn settings(mut self, settings: BulkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn maximum_sent_elements(mut self, size: usize) -> Self {
        self.settings.maximum_sent_elements = Some(size);
        self
    }

    pub fn failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.settings.failure_strategy = Some(strategy);
        self
    }

    pub fn keep_operated_in_exception(mut self, keep: bool) -> Self {
        self.settings.keep_operated_in_exception = keep;
        self
    }

    pub fn keep_not_operated_in_exception(mut self, keep: bool) -> Self {
        self.settings.keep_not_operated_in_exception = keep;
        self
    }

    pub fn keep_problem_in_exception(mut self, keep: bool) -> Self {
        self.settings.keep_problem_in_exception = keep;
        self
    }

    /// Register the profile of an entity type. Each type may be registered once.
    pub fn register<T: Send + Sync + 'static>(
        mut self,
        profile: EntityProfile<T>,
    ) -> Result<Self, TypeMappingError> {
        let key = TypeId::of::<T>();
        if self.profiles.contains_key(&key) {
            return Err(TypeMappingError::new(
                profile.entity_name(),
                TypeMappingErrorKind::DuplicateEntity,
                "entity type is already registered",
            ));
        }
        tracing::debug!(
            entity = profile.entity_name(),
            table = %profile.table(),
            "Registered entity profile"
        );
        self.profiles.insert(key, Arc::new(profile));
        Ok(self)
    }

    pub fn build(self) -> Result<BulkServiceOptions, TypeMappingError> {
        if self.settings.maximum_sent_elements == Some(0) {
            return Err(TypeMappingError::new(
                "BulkServiceOptions",
                TypeMappingErrorKind::InvalidConfiguration,
                "maximum sent elements must be greater than zero",
            ));
        }
        Ok(BulkServiceOptions {
            settings: self.settings,
            profiles: self.profiles,
        })
    }
}
