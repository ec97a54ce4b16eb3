//! # Batch Registry
//!
//! Loads batch configurations from flat application properties, validates
//! them, and resolves execution configuration for any batch key, declared or
//! not.
//!
//! Two property groups are read:
//! - `bdd.story-loader.batch-<N>.*` - story resource discovery
//!   (`resource-location`, `resource-include-patterns`,
//!   `resource-exclude-patterns`)
//! - `bdd.batch-<N>.*` - execution policy (`name`, `threads`, `meta-filters`,
//!   `story-execution-timeout`, `fail-fast`)
//!
//! Declared batches are resolved eagerly at load time; undeclared batch keys
//! are manufactured on first lookup with the same default-filling rule and
//! memoized, so both paths yield identical configuration for equivalent
//! inputs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::configuration::{
    resolve_execution_configuration, BatchDefaults, BatchExecutionConfiguration, BatchKey,
    BatchResourceConfiguration, ConfigurationError, RawExecutionProperties, RawResourceProperties,
};

/// Application property namespace for resource configuration
const RESOURCE_PROPERTY_PREFIX: &str = "bdd.story-loader.";
/// Application property namespace for execution configuration
const EXECUTION_PROPERTY_PREFIX: &str = "bdd.";
const BATCH_KEY_PREFIX: &str = "batch-";

/// Registry of resolved batch configurations
///
/// Immutable after load except for the memoization of lazily manufactured
/// execution configurations, which is race-free via the concurrent map's
/// entry API.
#[derive(Debug)]
pub struct BatchRegistry {
    resource_configurations: BTreeMap<BatchKey, Arc<BatchResourceConfiguration>>,
    execution_configurations: DashMap<BatchKey, Arc<BatchExecutionConfiguration>>,
    defaults: BatchDefaults,
}

impl BatchRegistry {
    /// Load and validate batch configurations from flat properties
    ///
    /// Every declared resource configuration must carry a `resource-location`;
    /// a missing location is a fatal load error naming the batch key. All
    /// other fields are optional and default-filled, never fatal.
    pub fn from_properties(
        properties: &HashMap<String, String>,
        defaults: BatchDefaults,
    ) -> Result<Self, ConfigurationError> {
        let resource_groups = collect_batch_groups(properties, RESOURCE_PROPERTY_PREFIX);
        let execution_groups = collect_batch_groups(properties, EXECUTION_PROPERTY_PREFIX);

        let mut resource_configurations = BTreeMap::new();
        for (key, group) in resource_groups {
            let raw: RawResourceProperties = deserialize_group(&key, group)?;
            let resource_location = raw.resource_location.ok_or_else(|| {
                ConfigurationError::MissingResourceLocation {
                    batch: key.to_string(),
                }
            })?;
            resource_configurations.insert(
                key,
                Arc::new(BatchResourceConfiguration {
                    resource_location,
                    resource_include_patterns: raw.resource_include_patterns.unwrap_or_default(),
                    resource_exclude_patterns: raw.resource_exclude_patterns.unwrap_or_default(),
                }),
            );
        }

        let execution_configurations = DashMap::new();
        for (key, group) in execution_groups {
            let raw: RawExecutionProperties = deserialize_group(&key, group)?;
            let resolved = resolve_execution_configuration(&key, raw, &defaults);
            execution_configurations.insert(key, Arc::new(resolved));
        }

        info!(
            resource_batches = resource_configurations.len(),
            execution_batches = execution_configurations.len(),
            "Batch configurations loaded"
        );

        Ok(Self {
            resource_configurations,
            execution_configurations,
            defaults,
        })
    }

    /// Resource configuration declared for the given batch key
    ///
    /// Returns `None` for undeclared batches; a resource location has no
    /// sensible default, so nothing is manufactured here.
    pub fn resource_configuration(
        &self,
        key: &BatchKey,
    ) -> Option<Arc<BatchResourceConfiguration>> {
        self.resource_configurations.get(key).cloned()
    }

    /// Execution configuration for the given batch key, declared or not
    ///
    /// Declared batches were resolved at load time. An undeclared key gets a
    /// configuration manufactured on first call with the same default-filling
    /// rule and memoized for subsequent calls.
    pub fn execution_configuration(&self, key: &BatchKey) -> Arc<BatchExecutionConfiguration> {
        let entry = self
            .execution_configurations
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(batch = %key, "Manufacturing default execution configuration");
                Arc::new(resolve_execution_configuration(
                    key,
                    RawExecutionProperties::default(),
                    &self.defaults,
                ))
            });
        Arc::clone(entry.value())
    }

    /// Declared batch keys in numeric order
    pub fn batch_keys(&self) -> impl Iterator<Item = &BatchKey> {
        self.resource_configurations.keys()
    }

    /// Declared resource configurations in numeric batch key order
    pub fn resource_configurations(
        &self,
    ) -> impl Iterator<Item = (&BatchKey, &Arc<BatchResourceConfiguration>)> {
        self.resource_configurations.iter()
    }

    /// Process-wide defaults this registry fills unset fields from
    pub fn defaults(&self) -> &BatchDefaults {
        &self.defaults
    }
}

/// Group flat `<prefix>batch-<N>.<field>` properties into per-batch maps
///
/// Properties under the prefix whose batch segment does not parse as a batch
/// key are skipped with a warning rather than failing the load; they belong
/// to other configuration surfaces sharing the namespace.
fn collect_batch_groups(
    properties: &HashMap<String, String>,
    prefix: &str,
) -> BTreeMap<BatchKey, serde_json::Map<String, Value>> {
    let mut groups: BTreeMap<BatchKey, serde_json::Map<String, Value>> = BTreeMap::new();
    for (property, value) in properties {
        let Some(rest) = property.strip_prefix(prefix) else {
            continue;
        };
        if !rest.starts_with(BATCH_KEY_PREFIX) {
            continue;
        }
        let Some((batch_segment, field)) = rest.split_once('.') else {
            continue;
        };
        let key = match BatchKey::parse(batch_segment) {
            Ok(key) => key,
            Err(error) => {
                warn!(property = %property, %error, "Skipping property with unparsable batch key");
                continue;
            }
        };
        groups
            .entry(key)
            .or_default()
            .insert(field.to_owned(), Value::String(value.clone()));
    }
    groups
}

fn deserialize_group<T: serde::de::DeserializeOwned>(
    key: &BatchKey,
    group: serde_json::Map<String, Value>,
) -> Result<T, ConfigurationError> {
    serde_json::from_value(Value::Object(group)).map_err(|e| {
        ConfigurationError::InvalidPropertyValue {
            batch: key.to_string(),
            message: e.to_string(),
        }
    })
}
