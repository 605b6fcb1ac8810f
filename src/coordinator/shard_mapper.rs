//! Shard resolution
//!
//! Maps query sources and a time range to the shards that hold the
//! matching data, and picks the partition that serves each shard.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::config::ShardMapperConfig;
use crate::meta::{MetaClient, NodeManager, PtId, ShardId, ShardInfo};
use crate::planner::error::PlannerResult;
use crate::query::{Expr, Measurement, QuerySource, SelectOptions, TimeRange};

use super::mapping::ShardMapping;
use super::Source;

/// Resolves query sources to shards through the catalog
pub struct ClusterShardMapper {
    meta: Arc<dyn MetaClient>,
    nodes: Arc<dyn NodeManager>,
    config: ShardMapperConfig,
    /// Picks one owner partition per shard
    rng: Mutex<Box<dyn RngCore + Send>>,
    /// Series key of the last hinted single-series query
    series_key: Mutex<Option<String>>,
}

impl ClusterShardMapper {
    pub fn new(meta: Arc<dyn MetaClient>, nodes: Arc<dyn NodeManager>) -> Self {
        Self {
            meta,
            nodes,
            config: ShardMapperConfig::default(),
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
            series_key: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: ShardMapperConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the random source used to choose among shard owners
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    /// Series key recorded by the last hinted query, if any
    pub fn series_key(&self) -> Option<String> {
        self.series_key.lock().clone()
    }

    pub fn close(&self) {
        self.series_key.lock().take();
    }

    /// Resolve the shards read by a query
    ///
    /// Measurement sources of nested queries are resolved as well. Each
    /// (database, retention policy) is mapped once; a pair without shard
    /// groups in the range still gets an (empty) entry.
    pub async fn map_shards(
        &self,
        sources: &[QuerySource],
        range: TimeRange,
        opts: &SelectOptions,
        condition: Option<&Expr>,
    ) -> PlannerResult<ShardMapping> {
        let mut measurements = Vec::new();
        collect_measurements(sources, &mut measurements);

        let mut shard_map: HashMap<Source, HashMap<PtId, Vec<ShardId>>> = HashMap::new();
        let mut envelope: Option<TimeRange> = None;

        for m in measurements {
            let db = self.meta.database(&m.database).await?;
            let matched = self.meta.measurements(m).await?;
            let Some(first) = matched.first() else {
                debug!(source = %m, "No measurement matches source");
                continue;
            };

            let source = Source::new(&m.database, &m.retention_policy);
            if shard_map.contains_key(&source) {
                continue;
            }

            let groups = self
                .meta
                .shard_groups_by_time_range(&m.database, &m.retention_policy, range)
                .await?;

            let mut by_pt: HashMap<PtId, Vec<ShardId>> = HashMap::new();
            for group in &groups {
                let group_range = group.time_range();
                envelope = Some(match envelope {
                    Some(e) => e.envelope(&group_range),
                    None => group_range,
                });

                let shard_key = db.shard_key().or_else(|| first.shard_key(group.id));
                let alive = self.meta.alive_shards(&m.database, group).await;

                let shards = if opts.hint_type.is_series_exact() {
                    let (shards, key) =
                        group.target_shards_hint_query(&first.name, condition, &alive);
                    *self.series_key.lock() = key;
                    shards
                } else {
                    group.target_shards(&first.name, shard_key, condition, &alive)
                };
                self.assign_owners(&shards, &mut by_pt);
            }

            debug!(
                source = %source,
                groups = groups.len(),
                partitions = by_pt.len(),
                "Mapped shards"
            );
            shard_map.insert(source, by_pt);
        }

        let window = envelope
            .and_then(|e| range.intersect(&e))
            .unwrap_or(range);

        Ok(ShardMapping::new(
            Arc::clone(&self.meta),
            Arc::clone(&self.nodes),
            self.config.clone(),
            shard_map,
            window,
        ))
    }

    fn assign_owners(&self, shards: &[ShardInfo], by_pt: &mut HashMap<PtId, Vec<ShardId>>) {
        let mut rng = self.rng.lock();
        for shard in shards {
            if shard.owners.is_empty() {
                warn!(shard_id = shard.id, "Shard has no owners");
                continue;
            }
            let pt_id = shard.owners[rng.gen_range(0..shard.owners.len())];
            by_pt.entry(pt_id).or_default().push(shard.id);
        }
    }
}

/// Measurement sources in FROM order, nested queries included
fn collect_measurements<'a>(sources: &'a [QuerySource], out: &mut Vec<&'a Measurement>) {
    for source in sources {
        match source {
            QuerySource::Measurement(m) => out.push(m),
            QuerySource::SubQuery(sub) => collect_measurements(&sub.sources, out),
        }
    }
}
