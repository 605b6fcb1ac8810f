//! Shard mapping and distributed plan creation
//!
//! A [`ShardMapping`] is the result of resolving a query's sources. It
//! answers schema questions for the measurements involved and builds the
//! logical plan that reads the mapped shards on the data nodes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::ShardMapperConfig;
use crate::meta::{
    MeasurementSchema, MetaClient, MetaError, NodeId, NodeManager, PtId, ShardId,
};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::{LogicalPlan, LogicalPlanBuilder, RemoteQuery};
use crate::planner::schema::QuerySchema;
use crate::query::{DataType, Measurement, ProcessorOptions, QuerySource, TimeRange};

use super::{QueryContext, Source};

/// Shards to read per partition, for each mapped source
pub type PartitionShards = HashMap<PtId, Vec<ShardId>>;

/// Field types and tag names of a source
pub type FieldDimensions = (HashMap<String, DataType>, HashSet<String>);

/// Shards resolved for one query
pub struct ShardMapping {
    meta: Arc<dyn MetaClient>,
    nodes: Arc<dyn NodeManager>,
    config: ShardMapperConfig,
    shard_map: HashMap<Source, PartitionShards>,
    /// Time window remote queries are clamped to
    time_range: TimeRange,
}

/// Outcome of the remote query tasks
#[derive(Default)]
struct FanOut {
    remote: Vec<RemoteQuery>,
    errors: Vec<PlannerError>,
}

impl ShardMapping {
    pub(crate) fn new(
        meta: Arc<dyn MetaClient>,
        nodes: Arc<dyn NodeManager>,
        config: ShardMapperConfig,
        shard_map: HashMap<Source, PartitionShards>,
        time_range: TimeRange,
    ) -> Self {
        Self {
            meta,
            nodes,
            config,
            shard_map,
            time_range,
        }
    }

    /// Shards by partition for a source, `None` when the source was not mapped
    pub fn shards(&self, source: &Source) -> Option<&PartitionShards> {
        self.shard_map.get(source)
    }

    /// Query range narrowed to the shard groups that were resolved
    pub fn shards_time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Number of data nodes in the cluster, at least one
    pub async fn node_numbers(&self) -> usize {
        match self.meta.data_nodes().await {
            Ok(nodes) => nodes.len().max(1),
            Err(e) => {
                debug!(error = %e, "Failed to list data nodes");
                1
            }
        }
    }

    /// Sources with measurement regexes expanded; nested queries are kept
    pub async fn sources(&self, sources: &[QuerySource]) -> PlannerResult<Vec<QuerySource>> {
        let mut out = Vec::new();
        for source in sources {
            match source {
                QuerySource::Measurement(m) => out.extend(self.expand(m).await?),
                QuerySource::SubQuery(_) => out.push(source.clone()),
            }
        }
        Ok(out)
    }

    async fn expand(&self, m: &Measurement) -> PlannerResult<Vec<QuerySource>> {
        Ok(self
            .meta
            .measurements(m)
            .await?
            .into_iter()
            .map(|info| QuerySource::Measurement(m.resolved(info.name)))
            .collect())
    }

    /// Forget every mapped shard
    pub fn close(&mut self) {
        self.shard_map.clear();
    }

    // ============ Schema resolution ============

    /// Schema of a measurement, retrying transient catalog errors
    ///
    /// Transient errors are retried at a fixed interval until the retry
    /// deadline passes; any other error is returned at once.
    pub async fn get_schema(
        &self,
        database: &str,
        retention_policy: &str,
        measurement: &str,
    ) -> PlannerResult<MeasurementSchema> {
        let start = Instant::now();
        loop {
            match self
                .meta
                .schema(database, retention_policy, measurement)
                .await
            {
                Ok(schema) => return Ok(schema),
                Err(e) if e.is_transient() => {
                    let elapsed = start.elapsed();
                    if elapsed >= self.config.schema_retry_timeout() {
                        return Err(PlannerError::SchemaRetryExhausted {
                            measurement: measurement.to_string(),
                            elapsed,
                            source: e,
                        });
                    }
                    warn!(database, measurement, error = %e, "Retrying schema lookup");
                    tokio::time::sleep(self.config.schema_retry_interval()).await;
                }
                Err(e) => {
                    warn!(database, measurement, error = %e, "Schema lookup failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Fields and tags of every measurement matched by a source
    ///
    /// Returns `None` when the source's database and retention policy were
    /// not mapped.
    pub async fn field_dimensions(
        &self,
        m: &Measurement,
    ) -> PlannerResult<Option<FieldDimensions>> {
        let source = Source::new(&m.database, &m.retention_policy);
        if !self.shard_map.contains_key(&source) {
            return Ok(None);
        }

        let mut fields = HashMap::new();
        let mut dimensions = HashSet::new();
        for info in self.meta.measurements(m).await? {
            let schema = self
                .get_schema(&m.database, &m.retention_policy, &info.name)
                .await?;
            for (name, code) in &schema.fields {
                if dimensions.contains(name) {
                    return Err(conflict(name, &info.name));
                }
                fields.insert(name.clone(), DataType::from_field_code(*code));
            }
            for tag in &schema.tags {
                if fields.contains_key(tag) {
                    return Err(conflict(tag, &info.name));
                }
                dimensions.insert(tag.clone());
            }
        }
        Ok(Some((fields, dimensions)))
    }

    /// Type of one column, `Unknown` when missing or on any catalog error
    pub async fn map_type(&self, m: &Measurement, field: &str) -> DataType {
        let Ok(matched) = self.meta.measurements(m).await else {
            return DataType::Unknown;
        };
        for info in matched {
            let Ok(schema) = self
                .get_schema(&m.database, &m.retention_policy, &info.name)
                .await
            else {
                return DataType::Unknown;
            };
            if let Some(code) = schema.fields.get(field) {
                return DataType::from_field_code(*code);
            }
            if schema.tags.contains(field) {
                return DataType::Tag;
            }
        }
        DataType::Unknown
    }

    /// Resolve the type of every requested column in place
    ///
    /// A column found in no matched measurement becomes `Unknown`. A column
    /// that is a field in one matched measurement and a tag in another (or
    /// both in the same one) is a conflict.
    pub async fn map_type_batch(
        &self,
        m: &Measurement,
        fields: &mut HashMap<String, DataType>,
    ) -> PlannerResult<()> {
        // Column name -> whether it resolved as a tag
        let mut resolved: HashMap<String, bool> = HashMap::new();
        for info in self.meta.measurements(m).await? {
            let schema = self
                .get_schema(&m.database, &m.retention_policy, &info.name)
                .await?;
            for (name, ty) in fields.iter_mut() {
                let field = schema.fields.get(name);
                let is_tag = schema.tags.contains(name);
                let resolved_as = match (field, is_tag) {
                    (Some(_), true) => return Err(conflict(name, &info.name)),
                    (Some(code), false) => {
                        *ty = DataType::from_field_code(*code);
                        false
                    }
                    (None, true) => {
                        *ty = DataType::Tag;
                        true
                    }
                    (None, false) => {
                        if !resolved.contains_key(name) {
                            *ty = DataType::Unknown;
                        }
                        continue;
                    }
                };
                match resolved.get(name) {
                    Some(&was_tag) if was_tag != resolved_as => {
                        return Err(conflict(name, &info.name))
                    }
                    _ => {
                        resolved.insert(name.clone(), resolved_as);
                    }
                }
            }
        }
        Ok(())
    }

    // ============ Distributed plan ============

    /// Build the plan that reads every mapped shard on its data node
    ///
    /// One remote query is created per (node, partition), concurrently.
    /// A missing partition fails the call; other per-partition failures
    /// are logged and that partition is left out. Returns `None` when no
    /// remote query could be built.
    pub async fn create_logical_plan(
        &self,
        ctx: &QueryContext,
        sources: &[QuerySource],
        schema: Arc<QuerySchema>,
    ) -> PlannerResult<Option<LogicalPlan>> {
        let mut by_node: BTreeMap<NodeId, BTreeMap<PtId, Vec<ShardId>>> = BTreeMap::new();
        let mut sources_by_pt: HashMap<PtId, Vec<QuerySource>> = HashMap::new();

        for source in sources {
            let QuerySource::Measurement(m) = source else {
                return Err(PlannerError::UnsupportedOperation(
                    "sub-query source in distributed plan".to_string(),
                ));
            };
            let Some(shards) = self
                .shard_map
                .get(&Source::new(&m.database, &m.retention_policy))
            else {
                continue;
            };
            if shards.is_empty() {
                continue;
            }

            let view = self.meta.db_pt_view(&m.database).await?;
            let expanded = self.expand(m).await?;
            for (&pt_id, shard_ids) in shards {
                let owner = view
                    .iter()
                    .find(|pt| pt.pt_id == pt_id)
                    .map(|pt| pt.owner)
                    .ok_or(MetaError::PartitionNotFound { pt_id })?;
                by_node
                    .entry(owner)
                    .or_default()
                    .entry(pt_id)
                    .or_default()
                    .extend(shard_ids);
                sources_by_pt
                    .entry(pt_id)
                    .or_default()
                    .extend(expanded.iter().cloned());
            }
        }

        let options = self.remote_options(ctx, schema.options());
        let collected = Arc::new(Mutex::new(FanOut::default()));
        let mut tasks = JoinSet::new();

        for (node_id, partitions) in by_node {
            for (pt_id, mut shard_ids) in partitions {
                shard_ids.sort_unstable();
                shard_ids.dedup();

                let mut options = options.clone();
                options.sources = sources_by_pt.remove(&pt_id).unwrap_or_default();
                let meta = Arc::clone(&self.meta);
                let nodes = Arc::clone(&self.nodes);
                let collected = Arc::clone(&collected);
                let analyze = ctx.analyze;

                tasks.spawn(async move {
                    let result = make_remote_query(
                        meta.as_ref(),
                        nodes.as_ref(),
                        node_id,
                        pt_id,
                        shard_ids,
                        options,
                        analyze,
                    )
                    .await;
                    let mut out = collected.lock();
                    match result {
                        Ok(rq) => out.remote.push(rq),
                        Err(e) => out.errors.push(e),
                    }
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                collected
                    .lock()
                    .errors
                    .push(PlannerError::TaskFailed(e.to_string()));
            }
        }

        let FanOut { mut remote, errors } = std::mem::take(&mut *collected.lock());
        for e in errors {
            error!(error = %e, "Failed to create remote query");
            if e.is_partition_not_found() {
                return Err(e);
            }
        }
        if remote.is_empty() {
            return Ok(None);
        }
        remote.sort_by_key(|rq| (rq.node_id, rq.pt_id));

        let mut plan_options = options;
        plan_options.sources = merged_sources(&remote);
        let plan_schema = Arc::new(schema.with_options(plan_options));
        let builder = LogicalPlanBuilder::new(plan_schema);

        debug!(remote_queries = remote.len(), "Building distributed plan");
        let plan: LogicalPlan = builder.create_series_plan::<LogicalPlan>()?.into();
        let plan: LogicalPlan = builder.create_measurement_plan(plan)?.into();
        let plan: LogicalPlan = builder.create_scan_plan(plan)?.into();
        let plan: LogicalPlan = builder.create_shard_plan(plan)?.into();
        let plan: LogicalPlan = builder.create_node_plan(plan, remote)?.into();
        Ok(Some(plan))
    }

    /// Options shipped with remote queries: clamped range, query text
    fn remote_options(&self, ctx: &QueryContext, options: &ProcessorOptions) -> ProcessorOptions {
        let mut options = options.clone();
        options.start_time = options.start_time.max(self.time_range.min);
        options.end_time = options.end_time.min(self.time_range.max);
        if let Some(query) = &ctx.query {
            options.query = Some(query.clone());
        }
        options
    }
}

async fn make_remote_query(
    meta: &dyn MetaClient,
    nodes: &dyn NodeManager,
    node_id: NodeId,
    pt_id: PtId,
    shard_ids: Vec<ShardId>,
    options: ProcessorOptions,
    analyze: bool,
) -> PlannerResult<RemoteQuery> {
    let database = options
        .sources
        .first()
        .and_then(QuerySource::as_measurement)
        .map(|m| m.database.clone())
        .ok_or_else(|| {
            PlannerError::InvalidPlan(format!("partition {} has no measurement source", pt_id))
        })?;

    let node = meta.data_node(node_id).await?;
    nodes.add(node_id, &node.tcp_host);

    Ok(RemoteQuery {
        database,
        pt_id,
        node_id,
        shard_ids,
        options,
        analyze,
    })
}

/// Distinct sources of all remote queries, in order of first use
fn merged_sources(remote: &[RemoteQuery]) -> Vec<QuerySource> {
    let mut merged: Vec<QuerySource> = Vec::new();
    for source in remote.iter().flat_map(|rq| rq.options.sources.iter()) {
        if !merged.contains(source) {
            merged.push(source.clone());
        }
    }
    merged
}

fn conflict(column: &str, measurement: &str) -> PlannerError {
    PlannerError::FieldTagConflict {
        column: column.to_string(),
        measurement: measurement.to_string(),
    }
}
