//! Castor aggregate cut
//!
//! The castor operator runs inside the storage nodes when grouping by all
//! dimensions, so the coordinator-side aggregate above it is removed.

use crate::planner::dag::Transform;
use crate::planner::error::PlannerResult;
use crate::planner::logical::ExchangeType;

use super::RuleCall;

pub(super) fn agg_cut(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let agg = call.node(0)?;
    if !agg.schema.has_castor_call() || !agg.schema.is_group_by_all_dims() {
        return Ok(None);
    }
    let Some(&child) = agg.children.first() else {
        return Ok(None);
    };
    let child_is_shard_exchange = call
        .dag()
        .node(child)
        .and_then(|n| n.exchange_type())
        == Some(ExchangeType::Shard);
    if child_is_shard_exchange || call.is_root(0)? {
        return Ok(None);
    }
    Ok(Some(Transform::existing(child)))
}
