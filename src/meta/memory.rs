//! In-memory catalog

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;

use crate::query::{Measurement, TimeRange};

use super::error::{MetaError, MetaResult};
use super::types::{
    DataNode, DatabaseInfo, MeasurementInfo, MeasurementSchema, NodeId, PtInfo, ShardGroupInfo,
    ShardId,
};
use super::MetaClient;

#[derive(Debug, Default)]
struct RetentionPolicyData {
    groups: Vec<ShardGroupInfo>,
    measurements: BTreeMap<String, (MeasurementInfo, MeasurementSchema)>,
}

#[derive(Debug)]
struct DatabaseData {
    info: DatabaseInfo,
    policies: HashMap<String, RetentionPolicyData>,
    pt_view: Vec<PtInfo>,
    dead_shards: HashSet<ShardId>,
}

#[derive(Debug, Default)]
struct CatalogData {
    databases: HashMap<String, DatabaseData>,
    nodes: BTreeMap<NodeId, DataNode>,
}

/// Catalog held entirely in memory
#[derive(Debug, Default)]
pub struct MemMetaClient {
    data: RwLock<CatalogData>,
}

impl MemMetaClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a database
    pub fn create_database(&self, info: DatabaseInfo) {
        let name = info.name.clone();
        self.data.write().databases.insert(
            name,
            DatabaseData {
                info,
                policies: HashMap::new(),
                pt_view: Vec::new(),
                dead_shards: HashSet::new(),
            },
        );
    }

    fn with_database<T>(
        &self,
        database: &str,
        f: impl FnOnce(&mut DatabaseData) -> T,
    ) -> MetaResult<T> {
        let mut data = self.data.write();
        let db = data
            .databases
            .get_mut(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        Ok(f(db))
    }

    /// Register a measurement and its schema under a retention policy
    pub fn create_measurement(
        &self,
        database: &str,
        retention_policy: &str,
        info: MeasurementInfo,
        schema: MeasurementSchema,
    ) -> MetaResult<()> {
        self.with_database(database, |db| {
            db.policies
                .entry(retention_policy.to_string())
                .or_default()
                .measurements
                .insert(info.name.clone(), (info, schema));
        })
    }

    pub fn add_shard_group(
        &self,
        database: &str,
        retention_policy: &str,
        group: ShardGroupInfo,
    ) -> MetaResult<()> {
        self.with_database(database, |db| {
            let rp = db.policies.entry(retention_policy.to_string()).or_default();
            rp.groups.push(group);
            rp.groups.sort_by_key(|g| (g.start_time, g.id));
        })
    }

    pub fn set_pt_view(&self, database: &str, view: Vec<PtInfo>) -> MetaResult<()> {
        self.with_database(database, |db| db.pt_view = view)
    }

    /// Mark a shard unreadable; it is left out of `alive_shards`
    pub fn mark_shard_dead(&self, database: &str, shard_id: ShardId) -> MetaResult<()> {
        self.with_database(database, |db| {
            db.dead_shards.insert(shard_id);
        })
    }

    pub fn add_data_node(&self, node: DataNode) {
        self.data.write().nodes.insert(node.id, node);
    }
}

#[async_trait]
impl MetaClient for MemMetaClient {
    async fn database(&self, name: &str) -> MetaResult<DatabaseInfo> {
        self.data
            .read()
            .databases
            .get(name)
            .map(|db| db.info.clone())
            .ok_or_else(|| MetaError::DatabaseNotFound(name.to_string()))
    }

    async fn measurements(&self, source: &Measurement) -> MetaResult<Vec<MeasurementInfo>> {
        let data = self.data.read();
        let db = data
            .databases
            .get(&source.database)
            .ok_or_else(|| MetaError::DatabaseNotFound(source.database.clone()))?;
        let Some(rp) = db.policies.get(&source.retention_policy) else {
            return Ok(Vec::new());
        };

        match &source.regex {
            Some(pattern) => {
                let re = Regex::new(pattern)
                    .map_err(|e| MetaError::Other(format!("invalid regex {}: {}", pattern, e)))?;
                Ok(rp
                    .measurements
                    .iter()
                    .filter(|(name, _)| re.is_match(name))
                    .map(|(_, (info, _))| info.clone())
                    .collect())
            }
            None => Ok(rp
                .measurements
                .get(&source.name)
                .map(|(info, _)| vec![info.clone()])
                .unwrap_or_default()),
        }
    }

    async fn shard_groups_by_time_range(
        &self,
        database: &str,
        retention_policy: &str,
        range: TimeRange,
    ) -> MetaResult<Vec<ShardGroupInfo>> {
        let data = self.data.read();
        let db = data
            .databases
            .get(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        Ok(db
            .policies
            .get(retention_policy)
            .map(|rp| {
                rp.groups
                    .iter()
                    .filter(|g| g.time_range().overlaps(&range))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn alive_shards(&self, database: &str, group: &ShardGroupInfo) -> Vec<usize> {
        let data = self.data.read();
        let dead = data.databases.get(database).map(|db| &db.dead_shards);
        group
            .shards
            .iter()
            .enumerate()
            .filter(|(_, s)| dead.map_or(true, |d| !d.contains(&s.id)))
            .map(|(i, _)| i)
            .collect()
    }

    async fn schema(
        &self,
        database: &str,
        retention_policy: &str,
        measurement: &str,
    ) -> MetaResult<MeasurementSchema> {
        let data = self.data.read();
        let db = data
            .databases
            .get(database)
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))?;
        Ok(db
            .policies
            .get(retention_policy)
            .and_then(|rp| rp.measurements.get(measurement))
            .map(|(_, schema)| schema.clone())
            .unwrap_or_default())
    }

    async fn db_pt_view(&self, database: &str) -> MetaResult<Vec<PtInfo>> {
        self.data
            .read()
            .databases
            .get(database)
            .map(|db| db.pt_view.clone())
            .ok_or_else(|| MetaError::DatabaseNotFound(database.to_string()))
    }

    async fn data_node(&self, id: NodeId) -> MetaResult<DataNode> {
        self.data
            .read()
            .nodes
            .get(&id)
            .cloned()
            .ok_or(MetaError::NodeNotFound(id))
    }

    async fn data_nodes(&self) -> MetaResult<Vec<DataNode>> {
        Ok(self.data.read().nodes.values().cloned().collect())
    }
}
