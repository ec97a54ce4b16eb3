//! Integration tests for batch configuration loading, mirroring how an
//! embedding application declares batches through flat properties.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use storyrunner_core::batch::{BatchDefaults, BatchKey, BatchRegistry, ConfigurationError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

fn default_meta_filters() -> Vec<String> {
    vec!["groovy: !skip".to_string()]
}

fn defaults() -> BatchDefaults {
    BatchDefaults::new(DEFAULT_TIMEOUT, default_meta_filters(), false)
}

fn properties(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn eleven_batch_properties() -> HashMap<String, String> {
    let mut properties = HashMap::new();
    // Deliberately inserted out of order; iteration must be numeric anyway.
    for number in [1, 10, 9, 2, 3, 4, 5, 6, 7, 8, 11] {
        properties.insert(
            format!("bdd.story-loader.batch-{number}.resource-location"),
            String::new(),
        );
    }
    properties.insert("bdd.batch-1.fail-fast".to_string(), String::new());
    properties.insert(
        "bdd.batch-2.name".to_string(),
        "second batch name".to_string(),
    );
    properties.insert("bdd.batch-2.threads".to_string(), "5".to_string());
    properties.insert(
        "bdd.batch-2.story-execution-timeout".to_string(),
        "3600".to_string(),
    );
    properties.insert(
        "bdd.batch-2.meta-filters".to_string(),
        "groovy: !ignored".to_string(),
    );
    properties.insert("bdd.batch-2.fail-fast".to_string(), "true".to_string());
    properties
}

#[test]
fn all_declared_batches_are_listed_in_numeric_order() {
    let registry = BatchRegistry::from_properties(&eleven_batch_properties(), defaults()).unwrap();
    let keys: Vec<String> = registry.batch_keys().map(ToString::to_string).collect();
    let expected: Vec<String> = (1..=11).map(|n| format!("batch-{n}")).collect();
    assert_eq!(keys, expected);
}

#[test]
fn resource_configuration_defaults_to_empty_pattern_lists() {
    let registry = BatchRegistry::from_properties(&eleven_batch_properties(), defaults()).unwrap();
    let key: BatchKey = "batch-1".parse().unwrap();
    let config = registry.resource_configuration(&key).unwrap();
    assert_eq!(config.resource_location, "");
    assert!(config.resource_include_patterns.is_empty());
    assert!(config.resource_exclude_patterns.is_empty());
}

#[test]
fn declared_batch_with_empty_execution_property_gets_defaults() {
    let registry = BatchRegistry::from_properties(&eleven_batch_properties(), defaults()).unwrap();
    let key: BatchKey = "batch-1".parse().unwrap();
    let config = registry.execution_configuration(&key);
    assert_eq!(config.name, "batch-1");
    assert_eq!(config.threads, None);
    assert_eq!(config.story_execution_timeout, DEFAULT_TIMEOUT);
    assert_eq!(config.meta_filters, default_meta_filters());
    assert!(!config.fail_fast);
}

#[test]
fn declared_batch_with_full_execution_properties_keeps_them() {
    let registry = BatchRegistry::from_properties(&eleven_batch_properties(), defaults()).unwrap();
    let key: BatchKey = "batch-2".parse().unwrap();
    let config = registry.execution_configuration(&key);
    assert_eq!(config.name, "second batch name");
    assert_eq!(config.threads, Some(5));
    assert_eq!(config.story_execution_timeout, Duration::from_secs(3600));
    assert_eq!(config.meta_filters, vec!["groovy: !ignored".to_string()]);
    assert!(config.fail_fast);
}

#[test]
fn undeclared_batch_is_manufactured_with_identical_defaults() {
    let registry = BatchRegistry::from_properties(&eleven_batch_properties(), defaults()).unwrap();
    let key: BatchKey = "batch-100".parse().unwrap();
    let config = registry.execution_configuration(&key);
    assert_eq!(config.name, "batch-100");
    assert_eq!(config.threads, None);
    assert_eq!(config.story_execution_timeout, DEFAULT_TIMEOUT);
    assert_eq!(config.meta_filters, default_meta_filters());
    assert!(!config.fail_fast);

    // Memoized: repeated lookups return the same configuration.
    assert!(Arc::ptr_eq(&config, &registry.execution_configuration(&key)));
}

#[test]
fn missing_resource_location_aborts_load_with_the_batch_key() {
    let error = BatchRegistry::from_properties(
        &properties(&[(
            "bdd.story-loader.batch-4.resource-include-patterns",
            "*.story",
        )]),
        defaults(),
    )
    .unwrap_err();
    assert_eq!(
        error,
        ConfigurationError::MissingResourceLocation {
            batch: "batch-4".to_string()
        }
    );
}

/// End-to-end scenario: a batch declared only through its resource location
/// resolves execution configuration from pure process-wide defaults.
#[test]
fn resource_only_batch_resolves_default_execution_configuration() {
    let registry = BatchRegistry::from_properties(
        &properties(&[("bdd.story-loader.batch-2.resource-location", "/stories")]),
        defaults(),
    )
    .unwrap();

    let key: BatchKey = "batch-2".parse().unwrap();
    let resource = registry.resource_configuration(&key).unwrap();
    assert_eq!(resource.resource_location, "/stories");

    let execution = registry.execution_configuration(&key);
    assert_eq!(execution.name, "batch-2");
    assert_eq!(execution.threads, None);
    assert_eq!(execution.story_execution_timeout, Duration::from_secs(300));
    assert_eq!(execution.meta_filters, vec!["groovy: !skip".to_string()]);
    assert!(!execution.fail_fast);
}
