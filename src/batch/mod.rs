//! # Batch Configuration System
//!
//! Batch configuration management for story execution. A batch is a named,
//! independently configured group of test stories sharing resource discovery
//! rules and execution policy.
//!
//! ## Architecture
//!
//! - **Single fill point**: default values are applied by one pure function,
//!   whether a batch was declared in properties (filled eagerly at load time)
//!   or referenced only at run time (filled lazily on first lookup)
//! - **Explicit validation**: a declared batch without a resource location is
//!   rejected at load time with an error naming the batch key
//! - **Numeric ordering**: batch keys are ordered by the numeric value of
//!   their suffix, so `batch-2` precedes `batch-11`
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::time::Duration;
//! use storyrunner_core::batch::{BatchDefaults, BatchRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut properties = HashMap::new();
//! properties.insert(
//!     "bdd.story-loader.batch-1.resource-location".to_string(),
//!     "story".to_string(),
//! );
//! let defaults = BatchDefaults::new(Duration::from_secs(300), vec![], false);
//! let registry = BatchRegistry::from_properties(&properties, defaults)?;
//! assert_eq!(registry.batch_keys().count(), 1);
//! # Ok(())
//! # }
//! ```

pub mod configuration;
pub mod registry;

pub use configuration::{
    BatchDefaults, BatchExecutionConfiguration, BatchKey, BatchResourceConfiguration,
    ConfigurationError,
};
pub use registry::BatchRegistry;
