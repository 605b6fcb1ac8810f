//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use tsplan::meta::{
    DataNode, DatabaseInfo, MeasurementInfo, MeasurementSchema, MemMetaClient, MetaClient,
    MetaError, MetaResult, NodeId, PtInfo, ShardGroupInfo,
};
use tsplan::query::{Measurement, TimeRange};

/// Initialize tracing (only first call succeeds)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsplan=warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Catalog wrapper that injects failures into selected calls
pub struct FaultyMeta {
    inner: Arc<MemMetaClient>,
    data_node_errors: Mutex<HashMap<NodeId, MetaError>>,
    /// Error returned by schema lookups and how many more times to return it
    schema_error: Mutex<Option<(MetaError, usize)>>,
    schema_calls: AtomicUsize,
}

impl FaultyMeta {
    pub fn new(inner: Arc<MemMetaClient>) -> Self {
        Self {
            inner,
            data_node_errors: Mutex::new(HashMap::new()),
            schema_error: Mutex::new(None),
            schema_calls: AtomicUsize::new(0),
        }
    }

    /// Make every `data_node(node)` call fail with `err`
    pub fn fail_data_node(&self, node: NodeId, err: MetaError) {
        self.data_node_errors.lock().insert(node, err);
    }

    /// Make the next `times` schema lookups fail with `err`
    pub fn fail_schema(&self, err: MetaError, times: usize) {
        *self.schema_error.lock() = Some((err, times));
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetaClient for FaultyMeta {
    async fn database(&self, name: &str) -> MetaResult<DatabaseInfo> {
        self.inner.database(name).await
    }

    async fn measurements(&self, source: &Measurement) -> MetaResult<Vec<MeasurementInfo>> {
        self.inner.measurements(source).await
    }

    async fn shard_groups_by_time_range(
        &self,
        database: &str,
        retention_policy: &str,
        range: TimeRange,
    ) -> MetaResult<Vec<ShardGroupInfo>> {
        self.inner
            .shard_groups_by_time_range(database, retention_policy, range)
            .await
    }

    async fn alive_shards(&self, database: &str, group: &ShardGroupInfo) -> Vec<usize> {
        self.inner.alive_shards(database, group).await
    }

    async fn schema(
        &self,
        database: &str,
        retention_policy: &str,
        measurement: &str,
    ) -> MetaResult<MeasurementSchema> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        let injected = {
            let mut slot = self.schema_error.lock();
            match slot.as_mut() {
                Some((err, remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(err.clone())
                }
                _ => None,
            }
        };
        match injected {
            Some(err) => Err(err),
            None => {
                self.inner
                    .schema(database, retention_policy, measurement)
                    .await
            }
        }
    }

    async fn db_pt_view(&self, database: &str) -> MetaResult<Vec<PtInfo>> {
        self.inner.db_pt_view(database).await
    }

    async fn data_node(&self, id: NodeId) -> MetaResult<DataNode> {
        let injected = self.data_node_errors.lock().get(&id).cloned();
        match injected {
            Some(err) => Err(err),
            None => self.inner.data_node(id).await,
        }
    }

    async fn data_nodes(&self) -> MetaResult<Vec<DataNode>> {
        self.inner.data_nodes().await
    }
}
