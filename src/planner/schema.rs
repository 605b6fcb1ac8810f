//! Per-node query schema
//!
//! A `QuerySchema` describes what a plan node produces: the projected
//! fields, their output column names and the processor options. Every
//! predicate the optimizer consults is derived from that state on demand,
//! so a rewritten schema can never disagree with its own field list.
//! Schemas are immutable values; rewrites return a new schema.

use std::collections::HashMap;

use crate::query::functions::{self, CASTOR, SLIDING_WINDOW};
use crate::query::{DataType, Expr, Field, ProcessorOptions, QuerySource};

/// Fields, output columns and options of a plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySchema {
    fields: Vec<Field>,
    column_names: Vec<String>,
    options: ProcessorOptions,
}

impl QuerySchema {
    /// Create a schema whose column names are derived from the fields
    ///
    /// Duplicate names get a numeric suffix (`max`, `max_1`, ...).
    pub fn new(fields: Vec<Field>, options: ProcessorOptions) -> Self {
        let column_names = Self::derive_column_names(&fields);
        Self {
            fields,
            column_names,
            options,
        }
    }

    fn derive_column_names(fields: &[Field]) -> Vec<String> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        fields
            .iter()
            .map(|f| {
                let base = f.name();
                let n = seen.entry(base.clone()).or_insert(0);
                let name = if *n == 0 {
                    base
                } else {
                    format!("{}_{}", base, n)
                };
                *n += 1;
                name
            })
            .collect()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn sources(&self) -> &[QuerySource] {
        &self.options.sources
    }

    /// New schema with a replaced field list and column names
    pub fn with_fields(&self, fields: Vec<Field>, column_names: Vec<String>) -> Self {
        Self {
            fields,
            column_names,
            options: self.options.clone(),
        }
    }

    /// New schema with replaced options
    pub fn with_options(&self, options: ProcessorOptions) -> Self {
        Self {
            fields: self.fields.clone(),
            column_names: self.column_names.clone(),
            options,
        }
    }

    /// Names of aggregate and transform calls in the field list
    fn calls(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().flat_map(|f| {
            f.expr
                .call_names()
                .into_iter()
                .filter(|n| functions::is_aggregate(n) || functions::is_transform(n))
        })
    }

    fn any_call(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.fields
            .iter()
            .any(|f| f.expr.call_names().into_iter().any(&pred))
    }

    pub fn has_call(&self) -> bool {
        self.calls().next().is_some()
    }

    pub fn has_limit(&self) -> bool {
        self.options.has_limit()
    }

    pub fn has_interval(&self) -> bool {
        self.options.has_interval()
    }

    pub fn has_group_by(&self) -> bool {
        !self.options.dimensions.is_empty() || self.options.group_by_all_dims
    }

    pub fn is_group_by_all_dims(&self) -> bool {
        self.options.is_group_by_all_dims()
    }

    /// All calls may run below an exchange and be merged above it
    pub fn can_calls_pushdown(&self) -> bool {
        self.has_call() && self.calls().all(functions::can_pushdown)
    }

    /// Contains an ML operator call, which cannot be split across nodes
    pub fn has_castor_call(&self) -> bool {
        self.any_call(|n| n.eq_ignore_ascii_case(CASTOR))
    }

    pub fn has_sliding_window_call(&self) -> bool {
        self.any_call(|n| n.eq_ignore_ascii_case(SLIDING_WINDOW))
    }

    /// Every call can be answered from pre-aggregated metadata
    pub fn match_pre_agg(&self) -> bool {
        if !self.has_call() || self.options.has_field_condition || self.has_group_by() {
            return false;
        }
        self.fields.iter().all(|f| match &f.expr {
            Expr::Call { name, args } => {
                functions::is_pre_agg(name)
                    && args.len() == 1
                    && matches!(args[0], Expr::VarRef { .. })
            }
            _ => false,
        })
    }

    pub fn has_in_series_agg(&self) -> bool {
        self.any_call(functions::is_in_series)
    }

    pub fn contain_series_ignore_call(&self) -> bool {
        self.any_call(functions::is_series_ignore)
    }

    pub fn is_multi_measurements(&self) -> bool {
        self.options.sources.len() > 1
    }

    pub fn has_sub_query(&self) -> bool {
        self.options.sources.iter().any(QuerySource::is_sub_query)
    }

    pub fn has_math(&self) -> bool {
        self.any_call(functions::is_math)
    }

    pub fn has_string(&self) -> bool {
        self.any_call(functions::is_string)
    }

    /// Some field is a binary expression
    pub fn has_binary(&self) -> bool {
        self.fields.iter().any(|f| {
            let mut expr = &f.expr;
            while let Expr::Paren(inner) = expr {
                expr = inner;
            }
            matches!(expr, Expr::Binary { .. })
        })
    }

    /// Result type of an expression evaluated against this schema
    pub fn derive_type(&self, expr: &Expr) -> DataType {
        match expr {
            Expr::VarRef { data_type, .. } => *data_type,
            Expr::Call { name, args } => {
                let first = || {
                    args.first()
                        .map(|a| self.derive_type(a))
                        .unwrap_or(DataType::Unknown)
                };
                match name.to_ascii_lowercase().as_str() {
                    "count" | "strlen" => DataType::Integer,
                    "str" | "substr" => DataType::String,
                    "mean" | "median" | "stddev" | "integral" | "castor" => DataType::Float,
                    n if functions::is_transform(n) || functions::is_math(n) => DataType::Float,
                    _ => first(),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                if !op.is_arithmetic() {
                    return DataType::Boolean;
                }
                match (self.derive_type(lhs), self.derive_type(rhs)) {
                    (DataType::Integer, DataType::Integer) => DataType::Integer,
                    (DataType::Unsigned, DataType::Unsigned) => DataType::Unsigned,
                    (l, r) if l.is_numeric() && r.is_numeric() => DataType::Float,
                    _ => DataType::Unknown,
                }
            }
            Expr::Paren(inner) => self.derive_type(inner),
            Expr::Integer(_) | Expr::Duration(_) => DataType::Integer,
            Expr::String(_) => DataType::String,
            Expr::Boolean(_) => DataType::Boolean,
            Expr::Wildcard => DataType::Unknown,
        }
    }

    /// Point every aggregate call at the partial result produced below
    ///
    /// A call that forms a whole field reads the field's own column; a
    /// call nested in a larger expression reads `<column>_<n>`. Applying
    /// this twice yields the same schema.
    pub fn forward_call_args(&self) -> Self {
        let fields = self
            .fields
            .iter()
            .zip(&self.column_names)
            .map(|(f, column)| {
                let mut ordinal = 0;
                Field {
                    expr: self.forward_expr(&f.expr, column, &mut ordinal, true),
                    alias: f.alias.clone(),
                }
            })
            .collect();
        self.with_fields(fields, self.column_names.clone())
    }

    fn forward_expr(&self, expr: &Expr, column: &str, ordinal: &mut usize, top: bool) -> Expr {
        match expr {
            Expr::Call { name, args } if functions::is_aggregate(name) => {
                let input = if top {
                    column.to_string()
                } else {
                    *ordinal += 1;
                    format!("{}_{}", column, ordinal)
                };
                let mut forwarded = vec![Expr::var(input, self.derive_type(expr))];
                forwarded.extend(args.iter().skip(1).cloned());
                Expr::Call {
                    name: name.clone(),
                    args: forwarded,
                }
            }
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(self.forward_expr(lhs, column, ordinal, false)),
                rhs: Box::new(self.forward_expr(rhs, column, ordinal, false)),
            },
            Expr::Paren(inner) => {
                Expr::Paren(Box::new(self.forward_expr(inner, column, ordinal, false)))
            }
            other => other.clone(),
        }
    }

    /// Merge partial counts by summing them
    pub fn count_to_sum(&self) -> Self {
        fn rewrite(expr: &Expr) -> Expr {
            match expr {
                Expr::Call { name, args } => Expr::Call {
                    name: if name.eq_ignore_ascii_case("count") {
                        "sum".to_string()
                    } else {
                        name.clone()
                    },
                    args: args.iter().map(rewrite).collect(),
                },
                Expr::Binary { op, lhs, rhs } => Expr::Binary {
                    op: *op,
                    lhs: Box::new(rewrite(lhs)),
                    rhs: Box::new(rewrite(rhs)),
                },
                Expr::Paren(inner) => Expr::Paren(Box::new(rewrite(inner))),
                other => other.clone(),
            }
        }

        let fields = self
            .fields
            .iter()
            .map(|f| Field {
                expr: rewrite(&f.expr),
                alias: f.alias.clone(),
            })
            .collect();
        self.with_fields(fields, self.column_names.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{BinaryOp, Measurement};

    fn value() -> Expr {
        Expr::var("value", DataType::Float)
    }

    fn schema(fields: Vec<Field>) -> QuerySchema {
        QuerySchema::new(fields, ProcessorOptions::default())
    }

    #[test]
    fn test_column_names_deduplicated() {
        let s = schema(vec![
            Field::new(Expr::call("max", vec![value()])),
            Field::new(Expr::call("max", vec![Expr::var("other", DataType::Float)])),
        ]);
        assert_eq!(s.column_names(), &["max".to_string(), "max_1".to_string()]);
    }

    #[test]
    fn test_call_predicates() {
        let s = schema(vec![Field::new(Expr::call("count", vec![value()]))]);
        assert!(s.has_call());
        assert!(s.can_calls_pushdown());
        assert!(s.match_pre_agg());
        assert!(!s.has_castor_call());

        let raw = schema(vec![Field::new(value())]);
        assert!(!raw.has_call());
        assert!(!raw.can_calls_pushdown());
        assert!(!raw.match_pre_agg());

        let stddev = schema(vec![Field::new(Expr::call("stddev", vec![value()]))]);
        assert!(!stddev.can_calls_pushdown());
    }

    #[test]
    fn test_match_pre_agg_rejects_field_condition_and_group_by() {
        let fields = vec![Field::new(Expr::call("sum", vec![value()]))];
        let cond = Expr::binary(BinaryOp::Gt, value(), Expr::Integer(1));
        let filtered = QuerySchema::new(
            fields.clone(),
            ProcessorOptions::default().with_condition(cond, true),
        );
        assert!(!filtered.match_pre_agg());

        let grouped = QuerySchema::new(
            fields,
            ProcessorOptions::default().with_dimensions(vec!["host".into()]),
        );
        assert!(!grouped.match_pre_agg());
    }

    #[test]
    fn test_forward_and_count_to_sum() {
        let s = schema(vec![Field::new(Expr::call("count", vec![value()]))]);
        let spread = s.forward_call_args().count_to_sum();
        assert_eq!(spread.fields()[0].expr.to_string(), "sum(count)");
        assert_eq!(spread.column_names(), s.column_names());

        // Rewriting an already merged schema changes nothing
        let again = spread.forward_call_args().count_to_sum();
        assert_eq!(again, spread);
    }

    #[test]
    fn test_forward_nested_calls() {
        let s = schema(vec![Field::with_alias(
            Expr::binary(
                BinaryOp::Add,
                Expr::call("count", vec![value()]),
                Expr::call("max", vec![value()]),
            ),
            "total",
        )]);
        let forwarded = s.forward_call_args();
        assert_eq!(
            forwarded.fields()[0].expr.to_string(),
            "count(total_1) + max(total_2)"
        );
        assert!(forwarded.has_binary());
    }

    #[test]
    fn test_multi_measurement_and_sub_query() {
        let opts = ProcessorOptions::default().with_sources(vec![
            Measurement::new("db", "rp", "cpu").into(),
            Measurement::new("db", "rp", "mem").into(),
        ]);
        let s = QuerySchema::new(vec![Field::new(value())], opts);
        assert!(s.is_multi_measurements());
        assert!(!s.has_sub_query());
    }

    #[test]
    fn test_derive_type() {
        let s = schema(vec![]);
        assert_eq!(
            s.derive_type(&Expr::call("count", vec![value()])),
            DataType::Integer
        );
        assert_eq!(
            s.derive_type(&Expr::call("max", vec![Expr::var("v", DataType::Integer)])),
            DataType::Integer
        );
        assert_eq!(
            s.derive_type(&Expr::binary(
                BinaryOp::Mul,
                Expr::var("v", DataType::Integer),
                value()
            )),
            DataType::Float
        );
    }
}
