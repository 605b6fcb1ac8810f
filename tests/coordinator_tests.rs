//! Shard mapping and distributed plan integration tests

mod test_utils;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use test_utils::fixtures::{
    cpu, fan_out_catalog, replicated_catalog, tag_eq, three_group_catalog,
    three_group_catalog_with, DB, HOUR, RP,
};
use test_utils::{init_tracing, FaultyMeta};
use tsplan::config::ShardMapperConfig;
use tsplan::coordinator::{ClusterShardMapper, QueryContext, ShardMapping, Source};
use tsplan::meta::{
    DatabaseInfo, MeasurementInfo, MeasurementSchema, MemNodeManager, MetaClient, MetaError,
    ShardKeyInfo,
};
use tsplan::planner::{
    ExchangeType, LogicalPlan, NodeType, PlanKind, PlannerError, QuerySchema, RemoteQuery,
};
use tsplan::query::{
    DataType, Expr, Field, HintType, Measurement, ProcessorOptions, QuerySource, SelectOptions,
    TimeRange,
};

fn mapper(meta: Arc<dyn MetaClient>) -> ClusterShardMapper {
    ClusterShardMapper::new(meta, Arc::new(MemNodeManager::new()))
}

async fn map_cpu(mapper: &ClusterShardMapper, range: TimeRange) -> ShardMapping {
    mapper
        .map_shards(&[cpu().into()], range, &SelectOptions::default(), None)
        .await
        .unwrap()
}

fn all_shards(mapping: &ShardMapping) -> Vec<u64> {
    let mut shards: Vec<u64> = mapping
        .shards(&Source::new(DB, RP))
        .map(|m| m.values().flatten().copied().collect())
        .unwrap_or_default();
    shards.sort_unstable();
    shards
}

fn value_schema() -> Arc<QuerySchema> {
    Arc::new(QuerySchema::new(
        vec![Field::new(Expr::var("value", DataType::Float))],
        ProcessorOptions::default().with_sources(vec![cpu().into()]),
    ))
}

fn remote_queries(plan: &LogicalPlan) -> &[RemoteQuery] {
    match plan.kind() {
        PlanKind::Exchange {
            exchange_type: ExchangeType::Node,
            remote,
        } => remote,
        other => panic!("Expected node exchange at root, got {:?}", other),
    }
}

// ============ Shard Mapping Tests ============

#[tokio::test]
async fn test_map_shards_covers_every_shard_once() {
    init_tracing();
    let mapper = mapper(three_group_catalog());
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    assert_eq!(all_shards(&mapping), vec![1, 2, 3, 4, 5, 6]);

    let by_pt = mapping.shards(&Source::new(DB, RP)).unwrap();
    assert_eq!(by_pt.len(), 2);
    let mut pt0 = by_pt[&0].clone();
    pt0.sort_unstable();
    assert_eq!(pt0, vec![1, 3, 5]);

    assert_eq!(mapping.shards_time_range(), TimeRange::new(0, 3 * HOUR - 1));
}

#[tokio::test]
async fn test_map_shards_clamps_window_to_query_range() {
    let mapper = mapper(three_group_catalog());
    let mapping = map_cpu(&mapper, TimeRange::new(HOUR / 2, 10 * HOUR)).await;

    assert_eq!(all_shards(&mapping), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(
        mapping.shards_time_range(),
        TimeRange::new(HOUR / 2, 3 * HOUR - 1)
    );

    let mapping = map_cpu(&mapper, TimeRange::new(HOUR, 2 * HOUR - 1)).await;
    assert_eq!(all_shards(&mapping), vec![3, 4]);
}

#[tokio::test]
async fn test_map_shards_empty_vs_absent_entry() {
    let mapper = mapper(three_group_catalog());
    let mapping = map_cpu(&mapper, TimeRange::new(10 * HOUR, 11 * HOUR)).await;

    // Queried but no shard group overlaps: present and empty
    let entry = mapping.shards(&Source::new(DB, RP));
    assert!(entry.is_some_and(|m| m.is_empty()));
    assert_eq!(
        mapping.shards_time_range(),
        TimeRange::new(10 * HOUR, 11 * HOUR)
    );

    // Never queried: absent
    assert!(mapping.shards(&Source::new(DB, "other")).is_none());

    let fields = mapping.field_dimensions(&cpu()).await.unwrap();
    assert!(fields.is_some());
    let absent = Measurement::new(DB, "other", "cpu");
    assert!(mapping.field_dimensions(&absent).await.unwrap().is_none());
}

#[tokio::test]
async fn test_map_shards_skips_unmatched_measurement() {
    let mapper = mapper(three_group_catalog());
    let nope = Measurement::new(DB, RP, "nope");
    let mapping = mapper
        .map_shards(
            &[nope.into()],
            TimeRange::unbounded(),
            &SelectOptions::default(),
            None,
        )
        .await
        .unwrap();
    assert!(mapping.shards(&Source::new(DB, RP)).is_none());
}

#[tokio::test]
async fn test_map_shards_unknown_database() {
    let mapper = mapper(three_group_catalog());
    let missing = Measurement::new("nodb", RP, "cpu");
    match mapper
        .map_shards(
            &[missing.into()],
            TimeRange::unbounded(),
            &SelectOptions::default(),
            None,
        )
        .await
    {
        Err(PlannerError::Meta(MetaError::DatabaseNotFound(db))) => assert_eq!(db, "nodb"),
        _ => panic!("Expected DatabaseNotFound"),
    }
}

#[tokio::test]
async fn test_map_shards_hash_shard_key() {
    let meta = three_group_catalog_with(
        DatabaseInfo::new(DB).with_shard_key(ShardKeyInfo::hash(&["host"])),
    );
    let mapper = mapper(meta);

    let pinned = tag_eq("host", "a");
    let mapping = mapper
        .map_shards(
            &[cpu().into()],
            TimeRange::unbounded(),
            &SelectOptions::default(),
            Some(&pinned),
        )
        .await
        .unwrap();
    // One shard per group
    assert_eq!(all_shards(&mapping).len(), 3);

    let unpinned = tag_eq("region", "eu");
    let mapping = mapper
        .map_shards(
            &[cpu().into()],
            TimeRange::unbounded(),
            &SelectOptions::default(),
            Some(&unpinned),
        )
        .await
        .unwrap();
    assert_eq!(all_shards(&mapping).len(), 6);
}

#[tokio::test]
async fn test_map_shards_hint_records_series_key() {
    let mapper = mapper(three_group_catalog());
    let cond = tag_eq("host", "a");
    let opts = SelectOptions::default().with_hint(HintType::FullSeriesQuery);

    let mapping = mapper
        .map_shards(&[cpu().into()], TimeRange::unbounded(), &opts, Some(&cond))
        .await
        .unwrap();
    assert_eq!(all_shards(&mapping).len(), 3);
    assert_eq!(mapper.series_key().as_deref(), Some("cpu,host=a"));

    mapper.close();
    assert_eq!(mapper.series_key(), None);
}

#[tokio::test]
async fn test_owner_choice_is_deterministic_with_seed() {
    let meta = replicated_catalog();
    let a = mapper(meta.clone()).with_rng(StdRng::seed_from_u64(42));
    let b = mapper(meta).with_rng(StdRng::seed_from_u64(42));

    let ma = map_cpu(&a, TimeRange::unbounded()).await;
    let mb = map_cpu(&b, TimeRange::unbounded()).await;

    let source = Source::new(DB, RP);
    assert_eq!(ma.shards(&source), mb.shards(&source));
    assert_eq!(all_shards(&ma), (1..=8).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_map_shards_descends_into_sub_query() {
    let mapper = mapper(three_group_catalog());
    let sub = tsplan::query::SubQuery::new(
        vec![Field::new(Expr::var("value", DataType::Float))],
        vec![cpu().into()],
    );
    let mapping = mapper
        .map_shards(
            &[QuerySource::from(sub)],
            TimeRange::unbounded(),
            &SelectOptions::default(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(all_shards(&mapping).len(), 6);
}

// ============ Schema Tests ============

#[tokio::test]
async fn test_map_type_batch_resolves_types() {
    let mapper = mapper(three_group_catalog());
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    let mut fields: HashMap<String, DataType> = ["value", "load", "host", "missing"]
        .iter()
        .map(|name| (name.to_string(), DataType::Unknown))
        .collect();
    mapping.map_type_batch(&cpu(), &mut fields).await.unwrap();

    assert_eq!(fields["value"], DataType::Float);
    assert_eq!(fields["load"], DataType::Integer);
    assert_eq!(fields["host"], DataType::Tag);
    assert_eq!(fields["missing"], DataType::Unknown);
}

#[tokio::test]
async fn test_map_type_batch_field_tag_conflict() {
    let meta = three_group_catalog();
    meta.create_measurement(
        DB,
        RP,
        MeasurementInfo::new("disk"),
        MeasurementSchema::new()
            .with_field("device", 4)
            .with_tag("device"),
    )
    .unwrap();
    let mapper = mapper(meta);
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    let mut fields = HashMap::from([("device".to_string(), DataType::Unknown)]);
    match mapping
        .map_type_batch(&Measurement::new(DB, RP, "disk"), &mut fields)
        .await
    {
        Err(PlannerError::FieldTagConflict {
            column,
            measurement,
        }) => {
            assert_eq!(column, "device");
            assert_eq!(measurement, "disk");
        }
        _ => panic!("Expected FieldTagConflict"),
    }
}

#[tokio::test]
async fn test_map_type_batch_conflict_across_measurements() {
    let meta = three_group_catalog();
    meta.create_measurement(
        DB,
        RP,
        MeasurementInfo::new("cpz"),
        MeasurementSchema::new().with_tag("value"),
    )
    .unwrap();
    let mapper = mapper(meta);
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;
    let both = Measurement::new(DB, RP, "").with_regex("^cp");

    let mut fields = HashMap::from([("value".to_string(), DataType::Unknown)]);
    match mapping.map_type_batch(&both, &mut fields).await {
        Err(PlannerError::FieldTagConflict {
            column,
            measurement,
        }) => {
            assert_eq!(column, "value");
            assert_eq!(measurement, "cpz");
        }
        other => panic!("Expected FieldTagConflict, got {:?}", other),
    }

    // Both schema paths agree on the collision
    match mapping.field_dimensions(&both).await {
        Err(PlannerError::FieldTagConflict { column, .. }) => assert_eq!(column, "value"),
        other => panic!("Expected FieldTagConflict, got {:?}", other),
    }

    // A column defined the same way wherever it appears still resolves
    let mut fields = HashMap::from([("host".to_string(), DataType::Unknown)]);
    mapping.map_type_batch(&both, &mut fields).await.unwrap();
    assert_eq!(fields["host"], DataType::Tag);
}

#[tokio::test]
async fn test_get_schema_retries_transient_errors() {
    init_tracing();
    let faulty = Arc::new(FaultyMeta::new(three_group_catalog()));
    faulty.fail_schema(MetaError::ConnectionReset, 2);
    let mapper = mapper(faulty.clone()).with_config(
        ShardMapperConfig::new()
            .with_schema_retry_timeout(Duration::from_secs(5))
            .with_schema_retry_interval(Duration::from_millis(5)),
    );
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    let schema = mapping.get_schema(DB, RP, "cpu").await.unwrap();
    assert!(schema.tags.contains("host"));
    assert_eq!(faulty.schema_calls(), 3);
}

#[tokio::test]
async fn test_get_schema_deadline_is_fatal() {
    let faulty = Arc::new(FaultyMeta::new(three_group_catalog()));
    faulty.fail_schema(MetaError::BrokenPipe, usize::MAX);
    let mapper = mapper(faulty.clone()).with_config(
        ShardMapperConfig::new()
            .with_schema_retry_timeout(Duration::from_millis(30))
            .with_schema_retry_interval(Duration::from_millis(5)),
    );
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    match mapping.get_schema(DB, RP, "cpu").await {
        Err(PlannerError::SchemaRetryExhausted {
            measurement,
            elapsed,
            source,
        }) => {
            assert_eq!(measurement, "cpu");
            assert!(elapsed >= Duration::from_millis(30));
            assert_eq!(source, MetaError::BrokenPipe);
        }
        _ => panic!("Expected SchemaRetryExhausted"),
    }
    assert!(faulty.schema_calls() > 1);
}

#[tokio::test]
async fn test_get_schema_non_transient_error_not_retried() {
    let faulty = Arc::new(FaultyMeta::new(three_group_catalog()));
    faulty.fail_schema(MetaError::Other("schema store unavailable".to_string()), 1);
    let mapper = mapper(faulty.clone());
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    match mapping.get_schema(DB, RP, "cpu").await {
        Err(PlannerError::Meta(MetaError::Other(msg))) => {
            assert_eq!(msg, "schema store unavailable")
        }
        _ => panic!("Expected catalog error"),
    }
    assert_eq!(faulty.schema_calls(), 1);
}

#[tokio::test]
async fn test_mapping_sources_and_node_numbers() {
    let mapper = mapper(three_group_catalog());
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    let regex = Measurement::new(DB, RP, "").with_regex("^c");
    let sources = mapping.sources(&[regex.into()]).await.unwrap();
    assert_eq!(sources, vec![QuerySource::from(cpu())]);

    assert_eq!(mapping.node_numbers().await, 2);
}

// ============ Distributed Plan Tests ============

#[tokio::test]
async fn test_create_logical_plan_layers() {
    let meta = three_group_catalog();
    let nodes = Arc::new(MemNodeManager::new());
    let mapper = ClusterShardMapper::new(meta, nodes.clone());
    let mapping = map_cpu(&mapper, TimeRange::new(HOUR / 2, 10 * HOUR)).await;

    let ctx = QueryContext::new()
        .with_query("SELECT value FROM cpu")
        .with_analyze(true);
    let plan = mapping
        .create_logical_plan(&ctx, &[cpu().into()], value_schema())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        plan.spine(),
        vec![
            NodeType::Exchange,
            NodeType::Exchange,
            NodeType::Exchange,
            NodeType::Reader,
            NodeType::Series
        ]
    );

    let remote = remote_queries(&plan);
    assert_eq!(remote.len(), 2);
    assert_eq!((remote[0].node_id, remote[0].pt_id), (1, 0));
    assert_eq!(remote[0].shard_ids, vec![1, 3, 5]);
    assert_eq!((remote[1].node_id, remote[1].pt_id), (2, 1));
    assert_eq!(remote[1].shard_ids, vec![2, 4, 6]);

    let rq = &remote[0];
    assert_eq!(rq.database, DB);
    assert!(rq.analyze);
    assert_eq!(rq.options.query.as_deref(), Some("SELECT value FROM cpu"));
    assert_eq!(rq.options.start_time, HOUR / 2);
    assert_eq!(rq.options.end_time, 3 * HOUR - 1);
    assert_eq!(rq.options.sources, vec![QuerySource::from(cpu())]);

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes.get(2).as_deref(), Some("10.0.0.2:8400"));
    assert_eq!(plan.schema().sources(), &[QuerySource::from(cpu())]);
}

#[tokio::test]
async fn test_create_logical_plan_without_shards_is_none() {
    let mapper = mapper(three_group_catalog());
    let mapping = map_cpu(&mapper, TimeRange::new(10 * HOUR, 11 * HOUR)).await;

    let plan = mapping
        .create_logical_plan(&QueryContext::new(), &[cpu().into()], value_schema())
        .await
        .unwrap();
    assert!(plan.is_none());
}

#[tokio::test]
async fn test_fan_out_partition_not_found_is_fatal() {
    init_tracing();
    let faulty = Arc::new(FaultyMeta::new(fan_out_catalog(5)));
    faulty.fail_data_node(2, MetaError::PartitionNotFound { pt_id: 1 });
    faulty.fail_data_node(4, MetaError::PartitionNotFound { pt_id: 3 });
    let mapper = mapper(faulty);
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    match mapping
        .create_logical_plan(&QueryContext::new(), &[cpu().into()], value_schema())
        .await
    {
        Err(e) => assert!(e.is_partition_not_found()),
        Ok(_) => panic!("Expected partition not found"),
    }
}

#[tokio::test]
async fn test_fan_out_tolerates_connection_reset() {
    init_tracing();
    let faulty = Arc::new(FaultyMeta::new(fan_out_catalog(5)));
    faulty.fail_data_node(3, MetaError::ConnectionReset);
    let mapper = mapper(faulty);
    let mapping = map_cpu(&mapper, TimeRange::unbounded()).await;

    let plan = mapping
        .create_logical_plan(&QueryContext::new(), &[cpu().into()], value_schema())
        .await
        .unwrap()
        .unwrap();

    let remote = remote_queries(&plan);
    let nodes: Vec<u64> = remote.iter().map(|rq| rq.node_id).collect();
    assert_eq!(nodes, vec![1, 2, 4, 5]);
}
