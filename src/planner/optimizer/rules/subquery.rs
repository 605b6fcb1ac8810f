//! Nested query rewrites
//!
//! An outer aggregate over a plain inner projection is evaluated by the
//! inner query directly: the inner projection is rewritten to compute the
//! outer calls over the underlying fields and the outer aggregate is
//! dropped. The remaining rules place aggregates and intervals below the
//! projection of a nested query and simplify pre-aggregated readers.

use std::sync::Arc;

use crate::planner::dag::{Transform, VertexId};
use crate::planner::error::PlannerResult;
use crate::planner::logical::{LogicalPlan, LogicalPlanBuilder, NodeType};
use crate::planner::schema::QuerySchema;
use crate::query::{Expr, Field, HintType};

use super::RuleCall;

// ============ Field rewriting ============

/// Outer call over an inner projected field
///
/// A call whose argument names the projected alias reads the underlying
/// var ref instead and keeps the alias; a call over the underlying name
/// is kept as is.
pub fn call_field(projected: &Field, outer: &Field) -> Option<Field> {
    let Expr::Call { name, args } = &outer.expr else {
        return None;
    };
    let Some(Expr::VarRef {
        name: arg,
        data_type,
    }) = args.first()
    else {
        return None;
    };
    let Expr::VarRef { name: inner, .. } = &projected.expr else {
        return None;
    };

    if projected.alias() == arg {
        let mut forwarded = vec![Expr::var(inner.clone(), *data_type)];
        forwarded.extend(args.iter().skip(1).cloned());
        Some(Field::with_alias(
            Expr::call(name.clone(), forwarded),
            projected.alias(),
        ))
    } else if inner == arg {
        Some(Field::new(outer.expr.clone()))
    } else {
        None
    }
}

/// Outer var ref over an inner projected field
pub fn var_ref_field(projected: &Field, outer: &Field) -> Option<Field> {
    let Expr::VarRef {
        name: outer_name,
        data_type,
    } = &outer.expr
    else {
        return None;
    };
    let Expr::VarRef { name: inner, .. } = &projected.expr else {
        return None;
    };

    if projected.alias() == outer_name {
        Some(Field::with_alias(
            Expr::var(inner.clone(), *data_type),
            projected.alias(),
        ))
    } else if inner == outer_name {
        Some(Field::new(outer.expr.clone()))
    } else {
        None
    }
}

/// Outer binary expression with projected aliases resolved
pub fn binary_field(projected: &[Field], outer: &Field) -> Field {
    let expr = outer.expr.rewrite_var_refs(&|name| {
        projected
            .iter()
            .find(|p| !p.alias().is_empty() && p.alias() == name)
            .map(|p| p.expr.clone())
    });
    Field {
        expr,
        alias: outer.alias.clone(),
    }
}

fn pushed_field(projected: &Field, outer: &Field, all: &[Field]) -> Option<Field> {
    match &outer.expr {
        Expr::Binary { .. } => Some(binary_field(all, outer)),
        Expr::VarRef { .. } => var_ref_field(projected, outer),
        Expr::Call { .. } => call_field(projected, outer),
        _ => None,
    }
}

/// Inner projection computing the outer fields; unmatched fields are dropped
fn pushed_fields(agg: &QuerySchema, project: &QuerySchema) -> Vec<Field> {
    let projected = project.fields();
    let mut fields = Vec::new();
    for outer in agg.fields() {
        for p in projected {
            if let Some(goal) = pushed_field(p, outer, projected) {
                fields.push(goal);
                if matches!(outer.expr, Expr::Binary { .. }) {
                    break;
                }
            }
        }
    }
    fields
}

/// Aggregate schema reduced to references to its own output columns
fn column_refs(agg: &QuerySchema) -> QuerySchema {
    let fields = agg
        .fields()
        .iter()
        .zip(agg.column_names())
        .map(|(f, column)| {
            let name = if f.alias().is_empty() {
                column.clone()
            } else {
                f.alias().to_string()
            };
            Field {
                expr: Expr::var(name, agg.derive_type(&f.expr)),
                alias: f.alias.clone(),
            }
        })
        .collect();
    agg.with_fields(fields, agg.column_names().to_vec())
}

fn can_push(agg: &QuerySchema, project: &QuerySchema) -> bool {
    if project.has_group_by() {
        return false;
    }
    if project.sources().len() > 1 || agg.sources().len() > 1 {
        return false;
    }
    if !agg.has_call() || project.has_call() {
        return false;
    }
    if agg.has_sliding_window_call() {
        return false;
    }
    if project.has_math() || project.has_string() || project.has_binary() {
        return false;
    }
    agg.can_calls_pushdown() && !agg.has_interval() && !project.has_limit()
}

// ============ Rules ============

pub(super) fn agg_pushdown(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let agg = call.node(0)?;
    let project = call.node(2)?;
    if !can_push(&agg.schema, &project.schema) || call.is_root(0)? {
        return Ok(None);
    }
    let Some(&child) = agg.children.first() else {
        return Ok(None);
    };

    let project_schema = project.schema.with_fields(
        pushed_fields(&agg.schema, &project.schema),
        agg.schema.column_names().to_vec(),
    );
    let agg_schema = Arc::new(column_refs(&agg.schema));

    let mut transform =
        Transform::existing(child).with_rewrite(call.id(2)?, Arc::new(project_schema));

    // Vertices built from the aggregate's schema now read its columns:
    // every ancestor, and the nodes between it and the inner projection
    let dag = call.dag();
    let agg_id = call.id(0)?;
    let shares_schema = |id: VertexId| dag.node(id).is_some_and(|n| n.schema == agg.schema);
    let mut cur = dag.parent(agg_id);
    while let Some(p) = cur {
        if shares_schema(p) {
            transform = transform.with_rewrite(p, Arc::clone(&agg_schema));
        }
        cur = dag.parent(p);
    }
    let mut cur = dag.parent(call.id(2)?);
    while let Some(v) = cur.filter(|&v| v != agg_id) {
        if shares_schema(v) {
            transform = transform.with_rewrite(v, Arc::clone(&agg_schema));
        }
        cur = dag.parent(v);
    }
    Ok(Some(transform))
}

pub(super) fn agg_to_project(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let node = call.node(0)?;
    if matches!(
        node.node_type(),
        NodeType::Aggregate | NodeType::Interval | NodeType::SlidingWindow
    ) {
        return Ok(None);
    }
    if !node.schema.has_call() || call.is_root(0)? {
        return Ok(None);
    }
    if call.parent_type(0)? == Some(NodeType::Aggregate) {
        return Ok(None);
    }
    let agg = LogicalPlanBuilder::new(Arc::clone(&node.schema)).create_aggregate(call.id(0)?)?;
    Ok(Some(Transform::new(agg)))
}

pub(super) fn interval_to_project(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let node = call.node(0)?;
    if node.node_type() != NodeType::Aggregate || call.is_root(0)? {
        return Ok(None);
    }
    if call.parent_type(0)? == Some(NodeType::Interval) {
        return Ok(None);
    }
    let interval =
        LogicalPlanBuilder::new(Arc::clone(&node.schema)).create_interval(call.id(0)?)?;
    Ok(Some(Transform::new(interval)))
}

pub(super) fn reader_update(call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
    let exchange = call.node(0)?;
    let schema = &exchange.schema;
    if !schema.match_pre_agg() || schema.has_interval() {
        return Ok(None);
    }
    if schema.options().hint_type != HintType::None {
        return Ok(None);
    }

    let builder = LogicalPlanBuilder::new(Arc::clone(schema));
    let series: LogicalPlan = builder.create_series_plan::<LogicalPlan>()?.into();
    let reader: LogicalPlan = builder.create_measurement_plan(series)?.into();
    if call.dag().subtree(call.id(0)?)? == reader {
        return Ok(None);
    }
    Ok(Some(Transform::tree(reader)))
}
