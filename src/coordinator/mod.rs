//! Query coordinator
//!
//! Resolves the shards a query touches and builds the distributed
//! logical plan that fans the query out to the data nodes.
//!
//! [`ClusterShardMapper::map_shards`] walks the query sources against the
//! catalog and produces a [`ShardMapping`]: for each (database, retention
//! policy) the shards to read, grouped by the partition that will serve
//! them. [`ShardMapping::create_logical_plan`] turns that mapping into one
//! remote query per partition under a node exchange.

pub mod mapping;
pub mod shard_mapper;

pub use mapping::ShardMapping;
pub use shard_mapper::ClusterShardMapper;

use std::fmt;

/// Database and retention policy a measurement lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Source {
    pub database: String,
    pub retention_policy: String,
}

impl Source {
    pub fn new(database: impl Into<String>, retention_policy: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            retention_policy: retention_policy.into(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.retention_policy)
    }
}

/// Per-query execution context
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// Query text, copied into the options of every remote query
    pub query: Option<String>,
    /// Collect execution statistics on the data nodes
    pub analyze: bool,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }
}
