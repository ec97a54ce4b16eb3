//! # Structured Error Handling
//!
//! Crate-level error type aggregating the per-module error enums so callers
//! that drive a whole run can hold a single failure type.

use thiserror::Error;

use crate::batch::ConfigurationError;
use crate::context::ContextError;
use crate::execution::ExecutionError;

/// Top-level error for story runner core operations
#[derive(Debug, Error)]
pub enum StoryRunnerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, StoryRunnerError>;
