//! Batch configuration model: keys, resource discovery rules, and execution
//! policy, plus the single default-filling function shared by the eager and
//! lazy resolution paths.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Batch configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Batch '{batch}' does not have mandatory 'resource-location' property set")]
    MissingResourceLocation { batch: String },

    #[error("Invalid batch key '{key}': {reason}")]
    InvalidBatchKey { key: String, reason: String },

    #[error("Invalid property value for batch '{batch}': {message}")]
    InvalidPropertyValue { batch: String, message: String },
}

/// Identifier of a batch, `batch-<N>` with a positive numeric suffix
///
/// Ordering is by the numeric value of the suffix, not lexicographic, so
/// `batch-2` precedes `batch-11` when iterating declared batches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchKey {
    number: u32,
}

impl BatchKey {
    const PREFIX: &'static str = "batch-";

    /// Parse a batch key of the form `batch-<N>`
    pub fn parse(key: &str) -> Result<Self, ConfigurationError> {
        let suffix = key.strip_prefix(Self::PREFIX).ok_or_else(|| {
            ConfigurationError::InvalidBatchKey {
                key: key.to_owned(),
                reason: format!("expected '{}<N>' format", Self::PREFIX),
            }
        })?;
        // Canonical spellings only: "batch-01" and "batch-+1" would parse to
        // the same number as "batch-1" and silently merge property groups.
        if suffix.starts_with('0') || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigurationError::InvalidBatchKey {
                key: key.to_owned(),
                reason: "suffix must be a positive number without leading zeros".to_owned(),
            });
        }
        let number = suffix
            .parse::<u32>()
            .map_err(|e| ConfigurationError::InvalidBatchKey {
                key: key.to_owned(),
                reason: format!("suffix is not a valid number: {e}"),
            })?;
        Ok(BatchKey { number })
    }

    /// Numeric suffix of the key
    pub fn number(&self) -> u32 {
        self.number
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.number)
    }
}

impl FromStr for BatchKey {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Which story resources belong to a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResourceConfiguration {
    /// Root path/URI for story discovery; mandatory for every declared batch
    pub resource_location: String,
    /// Glob patterns selecting stories under the location; empty = include all
    pub resource_include_patterns: Vec<String>,
    /// Glob patterns excluding stories under the location
    pub resource_exclude_patterns: Vec<String>,
}

/// How a batch runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchExecutionConfiguration {
    /// Human-readable batch name; defaults to the batch key
    pub name: String,
    /// Concurrency degree; `None` means "use engine default"
    pub threads: Option<usize>,
    /// Meta-filter expressions applied to stories in this batch
    pub meta_filters: Vec<String>,
    /// Per-story execution deadline enforced by the story execution driver
    pub story_execution_timeout: Duration,
    /// Whether a failure prevents scheduling of not-yet-started stories
    pub fail_fast: bool,
}

/// Process-wide defaults supplied by the embedding application
#[derive(Debug, Clone)]
pub struct BatchDefaults {
    pub story_execution_timeout: Duration,
    pub meta_filters: Vec<String>,
    pub fail_fast: bool,
}

impl BatchDefaults {
    pub fn new(
        story_execution_timeout: Duration,
        meta_filters: Vec<String>,
        fail_fast: bool,
    ) -> Self {
        Self {
            story_execution_timeout,
            meta_filters,
            fail_fast,
        }
    }
}

/// Raw `story-loader.batch-<N>.*` properties before validation
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct RawResourceProperties {
    pub(crate) resource_location: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_list")]
    pub(crate) resource_include_patterns: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_list")]
    pub(crate) resource_exclude_patterns: Option<Vec<String>>,
}

/// Raw `batch-<N>.*` properties before default filling
///
/// Every field is optional; empty property values are treated as unset.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct RawExecutionProperties {
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub(crate) name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_threads")]
    pub(crate) threads: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_optional_list")]
    pub(crate) meta_filters: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_optional_seconds")]
    pub(crate) story_execution_timeout: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_optional_bool")]
    pub(crate) fail_fast: Option<bool>,
}

/// Fill unset execution fields from process-wide defaults
///
/// The single fill point for both resolution paths: applied at load time for
/// declared batches and at first lookup for undeclared ones, so equivalent
/// inputs yield observably identical configuration.
pub(crate) fn resolve_execution_configuration(
    key: &BatchKey,
    raw: RawExecutionProperties,
    defaults: &BatchDefaults,
) -> BatchExecutionConfiguration {
    BatchExecutionConfiguration {
        name: raw.name.unwrap_or_else(|| key.to_string()),
        threads: raw.threads,
        meta_filters: raw
            .meta_filters
            .unwrap_or_else(|| defaults.meta_filters.clone()),
        story_execution_timeout: raw
            .story_execution_timeout
            .unwrap_or(defaults.story_execution_timeout),
        fail_fast: raw.fail_fast.unwrap_or(defaults.fail_fast),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty(Option::<String>::deserialize(deserializer)?))
}

/// Positive thread count from a string property value
fn deserialize_optional_threads<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match non_empty(Option::<String>::deserialize(deserializer)?) {
        None => Ok(None),
        Some(raw) => {
            let threads = raw
                .trim()
                .parse::<usize>()
                .map_err(|e| D::Error::custom(format!("invalid thread count '{raw}': {e}")))?;
            if threads == 0 {
                return Err(D::Error::custom("thread count must be positive"));
            }
            Ok(Some(threads))
        }
    }
}

/// Comma-separated list from a string property value
fn deserialize_optional_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    match non_empty(Option::<String>::deserialize(deserializer)?) {
        None => Ok(None),
        Some(raw) => Ok(Some(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect(),
        )),
    }
}

/// Duration in whole seconds from a string property value
fn deserialize_optional_seconds<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match non_empty(Option::<String>::deserialize(deserializer)?) {
        None => Ok(None),
        Some(raw) => {
            let seconds = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| D::Error::custom(format!("invalid timeout '{raw}': {e}")))?;
            Ok(Some(Duration::from_secs(seconds)))
        }
    }
}

fn deserialize_optional_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match non_empty(Option::<String>::deserialize(deserializer)?) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<bool>()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid boolean '{raw}': {e}"))),
    }
}
