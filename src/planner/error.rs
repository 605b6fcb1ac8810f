//! Planner error types

use std::time::Duration;

use thiserror::Error;

use crate::meta::MetaError;

/// Planner error
#[derive(Error, Debug, Clone)]
pub enum PlannerError {
    /// Invalid plan structure
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Internal error
    #[error("Internal planner error: {0}")]
    Internal(String),

    /// Catalog error
    #[error("Catalog error: {0}")]
    Meta(#[from] MetaError),

    /// A column is a field in one measurement and a tag in another
    #[error("column ({column}) in measurement ({measurement}) in both fields and tags")]
    FieldTagConflict { column: String, measurement: String },

    /// Transient schema lookups kept failing past the deadline
    #[error("get schema of {measurement} failed after {elapsed:?}: {source}")]
    SchemaRetryExhausted {
        measurement: String,
        elapsed: Duration,
        source: MetaError,
    },

    /// A remote query task panicked or was cancelled
    #[error("Remote query task failed: {0}")]
    TaskFailed(String),
}

impl PlannerError {
    /// Whether the error is a missing partition, directly or via the catalog
    pub fn is_partition_not_found(&self) -> bool {
        match self {
            PlannerError::Meta(e) => e.is_partition_not_found(),
            PlannerError::SchemaRetryExhausted { source, .. } => source.is_partition_not_found(),
            _ => false,
        }
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
