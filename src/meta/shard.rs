//! Target shard selection
//!
//! Picks the shards of a group that may hold rows matching a query. When
//! the condition pins every shard-key tag to one value only the shard
//! owning that key is read; otherwise every alive shard is.

use std::collections::BTreeMap;

use crate::query::Expr;

use super::types::{ShardGroupInfo, ShardInfo, ShardKeyInfo, ShardKeyType};

/// 64-bit FNV-1a
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Series key of a measurement and its tags (`cpu,host=a,region=eu`)
pub fn series_key(measurement: &str, tags: &BTreeMap<String, String>) -> String {
    let mut key = measurement.to_string();
    for (k, v) in tags {
        key.push(',');
        key.push_str(k);
        key.push('=');
        key.push_str(v);
    }
    key
}

impl ShardGroupInfo {
    fn alive(&self, alive: &[usize]) -> Vec<&ShardInfo> {
        alive.iter().filter_map(|&i| self.shards.get(i)).collect()
    }

    /// Shards to read for a regular query
    pub fn target_shards(
        &self,
        measurement: &str,
        shard_key: Option<&ShardKeyInfo>,
        condition: Option<&Expr>,
        alive: &[usize],
    ) -> Vec<ShardInfo> {
        let candidates = self.alive(alive);
        let all = || candidates.iter().map(|s| (*s).clone()).collect();

        let (Some(shard_key), Some(condition)) = (shard_key, condition) else {
            return all();
        };
        if shard_key.is_empty() || candidates.is_empty() {
            return all();
        }

        let pins = condition.tag_equalities();
        let mut key = measurement.to_string();
        for tag in &shard_key.shard_key {
            match pins.get(tag) {
                Some(value) => {
                    key.push(',');
                    key.push_str(tag);
                    key.push('=');
                    key.push_str(value);
                }
                None => return all(),
            }
        }

        match shard_key.key_type {
            ShardKeyType::Hash => {
                let idx = (fnv1a(key.as_bytes()) % candidates.len() as u64) as usize;
                vec![candidates[idx].clone()]
            }
            ShardKeyType::Range => {
                let hit: Vec<ShardInfo> = candidates
                    .iter()
                    .filter(|s| s.contains_key(&key))
                    .map(|s| (*s).clone())
                    .collect();
                if hit.is_empty() {
                    all()
                } else {
                    hit
                }
            }
        }
    }

    /// Shards to read for a query hinted to touch exactly one series
    ///
    /// The series key is built from every tag the condition pins. Returns
    /// the selected shards and that key; with no pinned tags every alive
    /// shard is read and no key is produced.
    pub fn target_shards_hint_query(
        &self,
        measurement: &str,
        condition: Option<&Expr>,
        alive: &[usize],
    ) -> (Vec<ShardInfo>, Option<String>) {
        let candidates = self.alive(alive);
        let pins = condition.map(Expr::tag_equalities).unwrap_or_default();
        if pins.is_empty() || candidates.is_empty() {
            return (candidates.into_iter().cloned().collect(), None);
        }

        let key = series_key(measurement, &pins);
        let idx = (fnv1a(key.as_bytes()) % candidates.len() as u64) as usize;
        (vec![candidates[idx].clone()], Some(key))
    }
}
