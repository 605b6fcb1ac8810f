//! Query planner
//!
//! Logical plans, the memoized plan DAG and the heuristic optimizer.
//!
//! ## Pipeline
//!
//! ```text
//! ShardMapping::create_logical_plan() → LogicalPlan
//!   → HeuPlanner::set_root() → Dag
//!   → HeuPlanner::find_best_exp() → rules applied to a fixpoint
//!   → HeuPlanner::best_plan() → LogicalPlan (optimized)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use tsplan::planner::{HeuPlanner, RuleCatalog};
//!
//! let mut planner = HeuPlanner::new(RuleCatalog::coordinator(), config);
//! let optimized = planner.optimize(&plan)?;
//! println!("{}", ExplainOutput::format(&optimized));
//! ```

pub mod dag;
pub mod error;
pub mod explain;
pub mod logical;
pub mod optimizer;
pub mod schema;

pub use dag::{Dag, DagNode, Transform, VertexId};
pub use error::{PlannerError, PlannerResult};
pub use explain::ExplainOutput;
pub use logical::{ExchangeType, LogicalPlan, LogicalPlanBuilder, NodeType, PlanKind, RemoteQuery};
pub use optimizer::{HeuPlanner, RuleCatalog, RuleCategory, RuleId};
pub use schema::QuerySchema;
