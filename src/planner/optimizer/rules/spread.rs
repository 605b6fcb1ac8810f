//! Aggregate spreading
//!
//! An aggregate sitting above a merge point consumes partial aggregates
//! computed below it. Its calls are rewritten to read the forwarded
//! partial columns, and partial counts are merged by summing.

use std::sync::Arc;

use crate::planner::dag::Transform;
use crate::planner::error::PlannerResult;
use crate::planner::logical::{LogicalPlanBuilder, NodeType};
use crate::planner::schema::QuerySchema;

use super::RuleCall;

fn merge_schema(schema: &QuerySchema) -> Option<Arc<QuerySchema>> {
    let merged = schema.forward_call_args().count_to_sum();
    (merged != *schema).then(|| Arc::new(merged))
}

/// Replace binding 0 by a node of the same kind reading partial results
fn spread(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let node = call.node(0)?;
    let Some(merged) = merge_schema(&node.schema) else {
        return Ok(None);
    };
    let builder = LogicalPlanBuilder::new(merged);
    let input = node.children.clone();
    let Some(&child) = input.first() else {
        return Ok(None);
    };
    let clone = match node.node_type() {
        NodeType::SlidingWindow => builder.create_sliding_window(child)?,
        _ => builder.create_aggregate(child)?,
    };
    Ok(Some(Transform::new(clone)))
}

fn splittable(schema: &QuerySchema) -> bool {
    schema.has_call() && schema.can_calls_pushdown()
}

pub(super) fn to_exchange(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let agg = call.node(0)?;
    if !splittable(&agg.schema) || agg.schema.has_castor_call() {
        return Ok(None);
    }
    // Nothing below a node or series exchange produces partials
    if call.node(1)?.is_fan_in_exchange() {
        return Ok(None);
    }
    spread(call)
}

pub(super) fn to_sort_append(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let schema = &call.node(0)?.schema;
    if !splittable(schema) || !schema.is_multi_measurements() {
        return Ok(None);
    }
    if schema.has_castor_call() && !schema.is_group_by_all_dims() {
        return Ok(None);
    }
    spread(call)
}

pub(super) fn to_reader(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let schema = &call.node(0)?.schema;
    if !splittable(schema) {
        return Ok(None);
    }
    if schema.has_castor_call() && !schema.is_group_by_all_dims() {
        return Ok(None);
    }
    if schema.match_pre_agg() || schema.contain_series_ignore_call() {
        return Ok(None);
    }
    spread(call)
}

pub(super) fn sliding_window(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let schema = &call.node(0)?.schema;
    if !schema.can_calls_pushdown() || schema.has_sub_query() {
        return Ok(None);
    }
    spread(call)
}
