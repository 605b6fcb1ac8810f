//! Planner and shard mapper configuration

use std::time::Duration;

use serde::Deserialize;

/// Default ceiling on optimizer passes per planning call
pub const DEFAULT_MAX_ITERATIONS: usize = 32;

/// Default deadline for retrying transient schema lookups
pub const DEFAULT_SCHEMA_RETRY_TIMEOUT_MS: u64 = 30_000;

/// Default pause between schema lookup attempts
pub const DEFAULT_SCHEMA_RETRY_INTERVAL_MS: u64 = 200;

/// Configuration for the heuristic planner
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Maximum number of full passes over the rule catalog
    pub max_iterations: usize,

    /// Readers use the file cursor, which computes in-series aggregates
    /// itself; a limit must then stay above them
    pub enable_file_cursor: bool,

    /// Evaluate sliding windows above the reader instead of inside it
    pub sliding_window_push_up: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            enable_file_cursor: false,
            sliding_window_push_up: false,
        }
    }
}

impl PlannerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pass ceiling (at least one pass always runs)
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_file_cursor(mut self, enabled: bool) -> Self {
        self.enable_file_cursor = enabled;
        self
    }

    pub fn with_sliding_window_push_up(mut self, enabled: bool) -> Self {
        self.sliding_window_push_up = enabled;
        self
    }
}

/// Configuration for shard mapping and schema resolution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShardMapperConfig {
    /// Give up retrying transient catalog errors after this long (ms)
    pub schema_retry_timeout_ms: u64,

    /// Sleep between retries (ms)
    pub schema_retry_interval_ms: u64,
}

impl Default for ShardMapperConfig {
    fn default() -> Self {
        Self {
            schema_retry_timeout_ms: DEFAULT_SCHEMA_RETRY_TIMEOUT_MS,
            schema_retry_interval_ms: DEFAULT_SCHEMA_RETRY_INTERVAL_MS,
        }
    }
}

impl ShardMapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema_retry_timeout(mut self, timeout: Duration) -> Self {
        self.schema_retry_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_schema_retry_interval(mut self, interval: Duration) -> Self {
        self.schema_retry_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn schema_retry_timeout(&self) -> Duration {
        Duration::from_millis(self.schema_retry_timeout_ms)
    }

    pub fn schema_retry_interval(&self) -> Duration {
        Duration::from_millis(self.schema_retry_interval_ms)
    }
}

/// Top-level configuration of the query coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub planner: PlannerConfig,
    pub mapper: ShardMapperConfig,
}

impl CoordinatorConfig {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
