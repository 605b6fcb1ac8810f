//! Catalog value types

use std::collections::{HashMap, HashSet};

use crate::query::TimeRange;

/// Database partition id
pub type PtId = u32;

pub type ShardId = u64;

pub type NodeId = u64;

/// How rows are distributed over the shards of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShardKeyType {
    #[default]
    Hash,
    Range,
}

/// Shard key declared on a database or measurement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShardKeyInfo {
    /// Tag names forming the key, in key order
    pub shard_key: Vec<String>,
    pub key_type: ShardKeyType,
    /// First shard group this key applies to
    pub shard_group: u64,
}

impl ShardKeyInfo {
    pub fn hash(tags: &[&str]) -> Self {
        Self {
            shard_key: tags.iter().map(|t| t.to_string()).collect(),
            key_type: ShardKeyType::Hash,
            shard_group: 0,
        }
    }

    pub fn range(tags: &[&str]) -> Self {
        Self {
            shard_key: tags.iter().map(|t| t.to_string()).collect(),
            key_type: ShardKeyType::Range,
            shard_group: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.shard_key.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseInfo {
    pub name: String,
    /// Database-wide shard key; empty when measurements declare their own
    pub shard_key: ShardKeyInfo,
}

impl DatabaseInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shard_key: ShardKeyInfo::default(),
        }
    }

    pub fn with_shard_key(mut self, shard_key: ShardKeyInfo) -> Self {
        self.shard_key = shard_key;
        self
    }

    pub fn shard_key(&self) -> Option<&ShardKeyInfo> {
        (!self.shard_key.is_empty()).then_some(&self.shard_key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasurementInfo {
    pub name: String,
    /// Shard key history, ordered by `shard_group`
    pub shard_keys: Vec<ShardKeyInfo>,
}

impl MeasurementInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shard_keys: Vec::new(),
        }
    }

    pub fn with_shard_key(mut self, shard_key: ShardKeyInfo) -> Self {
        self.shard_keys.push(shard_key);
        self.shard_keys.sort_by_key(|k| k.shard_group);
        self
    }

    /// Shard key in effect for the given shard group
    pub fn shard_key(&self, group_id: u64) -> Option<&ShardKeyInfo> {
        self.shard_keys
            .iter()
            .rev()
            .find(|k| k.shard_group <= group_id && !k.is_empty())
    }
}

/// One shard of a group
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShardInfo {
    pub id: ShardId,
    /// Partitions holding a replica of the shard
    pub owners: Vec<PtId>,
    /// Inclusive lower bound of a range-sharded key
    pub min: String,
    /// Exclusive upper bound of a range-sharded key (empty = unbounded)
    pub max: String,
}

impl ShardInfo {
    pub fn new(id: ShardId, owners: Vec<PtId>) -> Self {
        Self {
            id,
            owners,
            min: String::new(),
            max: String::new(),
        }
    }

    pub fn with_key_range(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.min = min.into();
        self.max = max.into();
        self
    }

    /// Whether a range shard key falls into this shard
    pub fn contains_key(&self, key: &str) -> bool {
        self.min.as_str() <= key && (self.max.is_empty() || key < self.max.as_str())
    }
}

/// Shards covering one time interval of a retention policy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShardGroupInfo {
    pub id: u64,
    pub start_time: i64,
    pub end_time: i64,
    pub shards: Vec<ShardInfo>,
}

impl ShardGroupInfo {
    pub fn new(id: u64, start_time: i64, end_time: i64, shards: Vec<ShardInfo>) -> Self {
        Self {
            id,
            start_time,
            end_time,
            shards,
        }
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Placement of a database partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtInfo {
    pub pt_id: PtId,
    /// Data node currently serving the partition
    pub owner: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    pub id: NodeId,
    pub tcp_host: String,
}

/// Field types and tag names of one measurement
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeasurementSchema {
    /// Field name to catalog type code
    pub fields: HashMap<String, i32>,
    pub tags: HashSet<String>,
}

impl MeasurementSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, type_code: i32) -> Self {
        self.fields.insert(name.into(), type_code);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>) -> Self {
        self.tags.insert(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.tags.is_empty()
    }
}
