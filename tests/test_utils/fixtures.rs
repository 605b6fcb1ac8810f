//! Catalog and query fixtures

use std::sync::Arc;

use tsplan::meta::{
    DataNode, DatabaseInfo, MeasurementInfo, MeasurementSchema, MemMetaClient, PtInfo,
    ShardGroupInfo, ShardInfo,
};
use tsplan::query::{BinaryOp, DataType, Expr, Measurement};

pub const DB: &str = "db0";
pub const RP: &str = "autogen";

/// One hour in nanoseconds
pub const HOUR: i64 = 3_600_000_000_000;

pub fn cpu() -> Measurement {
    Measurement::new(DB, RP, "cpu")
}

pub fn tag_eq(tag: &str, value: &str) -> Expr {
    Expr::binary(
        BinaryOp::Eq,
        Expr::var(tag, DataType::Tag),
        Expr::String(value.to_string()),
    )
}

fn cpu_schema() -> MeasurementSchema {
    MeasurementSchema::new()
        .with_field("value", 3)
        .with_field("load", 1)
        .with_tag("host")
        .with_tag("region")
}

fn add_nodes(meta: &MemMetaClient, count: u64) {
    for id in 1..=count {
        meta.add_data_node(DataNode {
            id,
            tcp_host: format!("10.0.0.{}:8400", id),
        });
    }
}

/// Catalog with `database` holding `cpu` under the default policy
fn base_catalog(database: DatabaseInfo) -> MemMetaClient {
    let meta = MemMetaClient::new();
    meta.create_database(database);
    meta.create_measurement(DB, RP, MeasurementInfo::new("cpu"), cpu_schema())
        .unwrap();
    meta
}

/// Three hourly shard groups of two shards each
///
/// The odd shard of each group lives on partition 0 (node 1), the even
/// shard on partition 1 (node 2).
pub fn three_group_catalog() -> Arc<MemMetaClient> {
    three_group_catalog_with(DatabaseInfo::new(DB))
}

pub fn three_group_catalog_with(database: DatabaseInfo) -> Arc<MemMetaClient> {
    let meta = base_catalog(database);
    for g in 0..3u64 {
        let start = g as i64 * HOUR;
        meta.add_shard_group(
            DB,
            RP,
            ShardGroupInfo::new(
                g + 1,
                start,
                start + HOUR - 1,
                vec![
                    ShardInfo::new(2 * g + 1, vec![0]),
                    ShardInfo::new(2 * g + 2, vec![1]),
                ],
            ),
        )
        .unwrap();
    }
    meta.set_pt_view(
        DB,
        vec![PtInfo { pt_id: 0, owner: 1 }, PtInfo { pt_id: 1, owner: 2 }],
    )
    .unwrap();
    add_nodes(&meta, 2);
    Arc::new(meta)
}

/// One shard group whose shards are each replicated on partitions 0..4
pub fn replicated_catalog() -> Arc<MemMetaClient> {
    let meta = base_catalog(DatabaseInfo::new(DB));
    let shards = (1..=8).map(|id| ShardInfo::new(id, vec![0, 1, 2, 3])).collect();
    meta.add_shard_group(DB, RP, ShardGroupInfo::new(1, 0, HOUR - 1, shards))
        .unwrap();
    meta.set_pt_view(
        DB,
        (0..4).map(|pt_id| PtInfo { pt_id, owner: 1 }).collect(),
    )
    .unwrap();
    add_nodes(&meta, 1);
    Arc::new(meta)
}

/// `count` partitions, partition `i` on node `i + 1` serving shard `i + 1`
pub fn fan_out_catalog(count: u32) -> Arc<MemMetaClient> {
    let meta = base_catalog(DatabaseInfo::new(DB));
    let shards = (0..count)
        .map(|pt| ShardInfo::new(pt as u64 + 1, vec![pt]))
        .collect();
    meta.add_shard_group(DB, RP, ShardGroupInfo::new(1, 0, HOUR - 1, shards))
        .unwrap();
    meta.set_pt_view(
        DB,
        (0..count)
            .map(|pt_id| PtInfo {
                pt_id,
                owner: pt_id as u64 + 1,
            })
            .collect(),
    )
    .unwrap();
    add_nodes(&meta, count as u64);
    Arc::new(meta)
}
