//! Function classification
//!
//! The planner never evaluates functions; it only needs to know which
//! family a call belongs to in order to decide where it may run.

/// Aggregate (selector included) functions computed over a window of points
const AGGREGATE_FUNCTIONS: &[&str] = &[
    "count",
    "sum",
    "min",
    "max",
    "mean",
    "first",
    "last",
    "spread",
    "percentile",
    "median",
    "mode",
    "distinct",
    "top",
    "bottom",
    "sample",
    "stddev",
    "integral",
    "sliding_window",
    "castor",
];

/// Transformations over the output of another call
const TRANSFORM_FUNCTIONS: &[&str] = &[
    "derivative",
    "non_negative_derivative",
    "difference",
    "non_negative_difference",
    "moving_average",
    "cumulative_sum",
    "elapsed",
    "holt_winters",
    "holt_winters_with_fit",
];

/// Aggregates that need every point of a group on one node
const NON_PUSHDOWN_AGGREGATES: &[&str] = &["stddev", "integral"];

/// Aggregates answerable from stored pre-aggregated metadata
const PRE_AGG_FUNCTIONS: &[&str] = &["count", "sum", "min", "max", "mean", "first", "last"];

/// Aggregates whose result ignores series boundaries
const SERIES_IGNORE_FUNCTIONS: &[&str] = &[
    "percentile",
    "median",
    "mode",
    "distinct",
    "sample",
    "top",
    "bottom",
];

/// Aggregates a file cursor can compute while reading one series
const IN_SERIES_FUNCTIONS: &[&str] = &["first", "last", "min", "max", "count", "sum"];

const MATH_FUNCTIONS: &[&str] = &[
    "abs", "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "exp", "log", "ln", "log2",
    "log10", "sqrt", "pow", "floor", "ceil", "round",
];

const STRING_FUNCTIONS: &[&str] = &["str", "strlen", "substr"];

/// Name of the sliding window aggregate
pub const SLIDING_WINDOW: &str = "sliding_window";

/// Name of the ML operator that cannot be split across nodes
pub const CASTOR: &str = "castor";

fn contains(set: &[&str], name: &str) -> bool {
    set.iter().any(|f| f.eq_ignore_ascii_case(name))
}

pub fn is_aggregate(name: &str) -> bool {
    contains(AGGREGATE_FUNCTIONS, name)
}

pub fn is_transform(name: &str) -> bool {
    contains(TRANSFORM_FUNCTIONS, name)
}

/// Whether a call can run below an exchange and be merged afterwards
pub fn can_pushdown(name: &str) -> bool {
    !contains(NON_PUSHDOWN_AGGREGATES, name) && !is_transform(name)
}

pub fn is_pre_agg(name: &str) -> bool {
    contains(PRE_AGG_FUNCTIONS, name)
}

pub fn is_series_ignore(name: &str) -> bool {
    contains(SERIES_IGNORE_FUNCTIONS, name)
}

pub fn is_in_series(name: &str) -> bool {
    contains(IN_SERIES_FUNCTIONS, name)
}

pub fn is_math(name: &str) -> bool {
    contains(MATH_FUNCTIONS, name)
}

pub fn is_string(name: &str) -> bool {
    contains(STRING_FUNCTIONS, name)
}
