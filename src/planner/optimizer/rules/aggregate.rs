//! Aggregate pushdown
//!
//! Partial aggregates placed below each merge point let remote readers
//! return one row per group instead of raw points.

use std::sync::Arc;

use crate::planner::dag::Transform;
use crate::planner::error::PlannerResult;
use crate::planner::logical::{ExchangeType, LogicalPlanBuilder};
use crate::planner::schema::QuerySchema;

use super::{parent_aggregates, RuleCall};

/// Calls can be split, and are not better served from pre-aggregates
fn eligible(schema: &QuerySchema) -> bool {
    schema.has_call() && schema.can_calls_pushdown() && !schema.match_pre_agg()
}

/// Castor runs in storage below a shard exchange only
///
/// Without group-by-all-dims it cannot be split at all. With it, an
/// aggregate anywhere else is removed again by the castor cut.
fn castor_declines(schema: &QuerySchema, over_shard_exchange: bool) -> bool {
    schema.has_castor_call() && !(schema.is_group_by_all_dims() && over_shard_exchange)
}

fn aggregate_above(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let node = call.node(0)?;
    let agg = LogicalPlanBuilder::new(Arc::clone(&node.schema)).create_aggregate(call.id(0)?)?;
    Ok(Some(Transform::new(agg)))
}

pub(super) fn to_exchange(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let exchange = call.node(0)?;
    let schema = &exchange.schema;
    if !eligible(schema) || exchange.is_fan_in_exchange() {
        return Ok(None);
    }
    let over_shard = exchange.exchange_type() == Some(ExchangeType::Shard);
    if castor_declines(schema, over_shard) || parent_aggregates(call, 0)? {
        return Ok(None);
    }
    aggregate_above(call)
}

pub(super) fn to_reader(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let reader = call.node(0)?;
    let schema = &reader.schema;
    if !eligible(schema) || castor_declines(schema, false) || parent_aggregates(call, 0)? {
        return Ok(None);
    }

    let builder = LogicalPlanBuilder::new(Arc::clone(schema));
    let node = if schema.has_sliding_window_call() && !call.config().sliding_window_push_up {
        builder.create_sliding_window(call.id(0)?)?
    } else {
        builder.create_aggregate(call.id(0)?)?
    };
    Ok(Some(Transform::new(node)))
}

pub(super) fn to_series(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let schema = &call.node(0)?.schema;
    if !eligible(schema) || schema.contain_series_ignore_call() || parent_aggregates(call, 0)? {
        return Ok(None);
    }
    if castor_declines(schema, false) {
        return Ok(None);
    }
    aggregate_above(call)
}
