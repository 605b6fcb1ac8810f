//! EXPLAIN output formatting
//!
//! Formats logical plans as indented text for logs and tests.

use std::fmt::Write;

use crate::planner::logical::{LogicalPlan, PlanKind};

/// Format a logical plan for EXPLAIN output
pub struct ExplainOutput;

impl ExplainOutput {
    /// Format a plan as a string, one node per line
    pub fn format(plan: &LogicalPlan) -> String {
        let mut output = String::new();
        let _ = Self::format_node(plan, 0, &mut output);
        output
    }

    fn format_node(plan: &LogicalPlan, indent: usize, out: &mut String) -> std::fmt::Result {
        let prefix = "  ".repeat(indent);
        let schema = plan.schema();
        let fields: Vec<String> = schema.fields().iter().map(|f| f.to_string()).collect();

        match plan.kind() {
            PlanKind::Exchange {
                exchange_type,
                remote,
            } => {
                write!(out, "{}Exchange({})", prefix, exchange_type)?;
                if !remote.is_empty() {
                    let pts: Vec<String> = remote
                        .iter()
                        .map(|rq| format!("{}@{}", rq.pt_id, rq.node_id))
                        .collect();
                    write!(out, " remote=[{}]", pts.join(", "))?;
                }
                writeln!(out)?;
            }
            PlanKind::Limit => {
                let opts = schema.options();
                writeln!(
                    out,
                    "{}Limit: limit={}, offset={}",
                    prefix, opts.limit, opts.offset
                )?;
            }
            PlanKind::Interval => {
                writeln!(out, "{}Interval: {}ns", prefix, schema.options().interval)?;
            }
            other => {
                writeln!(
                    out,
                    "{}{}: [{}]",
                    prefix,
                    other.node_type(),
                    fields.join(", ")
                )?;
            }
        }

        for child in plan.children() {
            Self::format_node(child, indent + 1, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::logical::LogicalPlanBuilder;
    use crate::planner::schema::QuerySchema;
    use crate::query::{DataType, Expr, Field, ProcessorOptions};
    use std::sync::Arc;

    #[test]
    fn test_explain_indents_children() {
        let schema = Arc::new(QuerySchema::new(
            vec![Field::new(Expr::call(
                "count",
                vec![Expr::var("value", DataType::Float)],
            ))],
            ProcessorOptions::default().with_limit(10, 0),
        ));
        let b = LogicalPlanBuilder::new(schema);
        let series: LogicalPlan = b.create_series_plan::<LogicalPlan>().unwrap().into();
        let agg: LogicalPlan = b.create_aggregate(series).unwrap().into();
        let limit: LogicalPlan = b.create_limit(agg).unwrap().into();

        let explain = ExplainOutput::format(&limit);
        assert_eq!(
            explain,
            "Limit: limit=10, offset=0\n  Aggregate: [count(value)]\n    Series: [count(value)]\n"
        );
    }
}
