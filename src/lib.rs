//! tsplan - query planning core of a distributed time-series database
//!
//! Features:
//! - Shard mapping from query sources to partitions and data nodes
//! - Concurrent construction of per-partition remote queries
//! - Rule-based plan optimization over a memoized plan DAG

pub mod config;
pub mod coordinator;
pub mod meta;
pub mod planner;
pub mod query;
