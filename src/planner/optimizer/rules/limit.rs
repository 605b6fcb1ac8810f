//! Limit pushdown
//!
//! A query with a row limit and no aggregation can stop reading early at
//! every level: the limit is repeated above exchanges, readers and series.

use std::sync::Arc;

use crate::planner::dag::Transform;
use crate::planner::error::PlannerResult;
use crate::planner::logical::{LogicalPlanBuilder, NodeType};

use super::RuleCall;

fn limit_above(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    if call.parent_type(0)? == Some(NodeType::Limit) {
        return Ok(None);
    }
    let node = call.node(0)?;
    let limit = LogicalPlanBuilder::new(Arc::clone(&node.schema)).create_limit(call.id(0)?)?;
    Ok(Some(Transform::new(limit)))
}

pub(super) fn to_exchange(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let exchange = call.node(0)?;
    // Node and series exchanges merge complete results; they keep the
    // limit above them.
    if exchange.is_fan_in_exchange() {
        return Ok(None);
    }
    let schema = &exchange.schema;
    if !schema.has_limit() || schema.has_call() {
        return Ok(None);
    }
    limit_above(call)
}

pub(super) fn to_reader(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let schema = &call.node(0)?.schema;
    if !schema.has_limit() || schema.has_call() {
        return Ok(None);
    }
    limit_above(call)
}

pub(super) fn to_series(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let schema = &call.node(0)?.schema;
    if !schema.has_limit() {
        return Ok(None);
    }
    if call.config().enable_file_cursor && schema.has_in_series_agg() {
        return Ok(None);
    }
    limit_above(call)
}
