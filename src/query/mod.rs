//! Query model
//!
//! Typed representation of a parsed time-series query as seen by the
//! planner: expressions, projected fields, sources and processor options.
//! Parsing itself happens upstream; this module only carries the result.

pub mod expr;
pub mod functions;
pub mod options;
pub mod source;

pub use expr::{BinaryOp, DataType, Expr, Field};
pub use options::{HintType, ProcessorOptions, SelectOptions};
pub use source::{Measurement, QuerySource, SubQuery, TimeRange};
