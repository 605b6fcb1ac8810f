//! Catalog collaborator
//!
//! The shard mapper learns everything about cluster layout through
//! [`MetaClient`]: databases and their shard keys, measurements, shard
//! groups, partition placement and data nodes. [`NodeManager`] receives
//! the address of every node a query will contact.
//!
//! [`MemMetaClient`] and [`MemNodeManager`] are in-memory implementations
//! for embedding and tests.

pub mod error;
pub mod memory;
pub mod shard;
pub mod types;

pub use error::{MetaError, MetaResult};
pub use memory::MemMetaClient;
pub use types::{
    DataNode, DatabaseInfo, MeasurementInfo, MeasurementSchema, NodeId, PtId, PtInfo,
    ShardGroupInfo, ShardId, ShardInfo, ShardKeyInfo, ShardKeyType,
};

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::query::{Measurement, TimeRange};

/// Catalog service interface
#[async_trait]
pub trait MetaClient: Send + Sync {
    /// Database definition, including its shard key
    async fn database(&self, name: &str) -> MetaResult<DatabaseInfo>;

    /// Measurements matched by a source
    ///
    /// A source with a regex expands to every matching measurement; a
    /// plain source yields at most one. No match is an empty list.
    async fn measurements(&self, source: &Measurement) -> MetaResult<Vec<MeasurementInfo>>;

    /// Shard groups of a retention policy overlapping `range`, by start time
    async fn shard_groups_by_time_range(
        &self,
        database: &str,
        retention_policy: &str,
        range: TimeRange,
    ) -> MetaResult<Vec<ShardGroupInfo>>;

    /// Indexes into `group.shards` of the shards currently readable
    async fn alive_shards(&self, database: &str, group: &ShardGroupInfo) -> Vec<usize>;

    /// Field types and tags of a measurement
    async fn schema(
        &self,
        database: &str,
        retention_policy: &str,
        measurement: &str,
    ) -> MetaResult<MeasurementSchema>;

    /// Placement of every partition of a database
    async fn db_pt_view(&self, database: &str) -> MetaResult<Vec<PtInfo>>;

    async fn data_node(&self, id: NodeId) -> MetaResult<DataNode>;

    async fn data_nodes(&self) -> MetaResult<Vec<DataNode>>;
}

/// Registry of node addresses used by the transport
pub trait NodeManager: Send + Sync {
    /// Record the address of a node, replacing any previous one
    fn add(&self, id: NodeId, address: &str);
}

/// In-memory node registry
#[derive(Debug, Default)]
pub struct MemNodeManager {
    nodes: RwLock<HashMap<NodeId, String>>,
}

impl MemNodeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<String> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl NodeManager for MemNodeManager {
    fn add(&self, id: NodeId, address: &str) {
        self.nodes.write().insert(id, address.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_manager_upsert() {
        let nodes = MemNodeManager::new();
        nodes.add(1, "10.0.0.1:8400");
        nodes.add(1, "10.0.0.1:8401");
        nodes.add(2, "10.0.0.2:8400");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes.get(1).as_deref(), Some("10.0.0.1:8401"));
    }
}
