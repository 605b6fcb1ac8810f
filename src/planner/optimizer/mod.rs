//! Heuristic plan optimizer
//!
//! Rewrites a logical plan with a fixed catalog of rules until no rule
//! applies. One pass visits every rule category in priority order and
//! tries each rule of the category against every live vertex. Passes
//! repeat until a pass changes nothing or the configured ceiling is hit.

pub mod operand;
pub mod rules;

pub use operand::Operand;
pub use rules::{RuleCall, RuleCatalog, RuleCategory, RuleId};

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::planner::dag::{Dag, DagNode};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::LogicalPlan;

/// Rule-driven optimizer over a memoized plan DAG
pub struct HeuPlanner {
    catalog: RuleCatalog,
    config: PlannerConfig,
    dag: Option<Dag>,
    /// Rules already applied to a structurally equal match this session
    applied: HashSet<(RuleId, DagNode)>,
}

impl HeuPlanner {
    pub fn new(catalog: RuleCatalog, config: PlannerConfig) -> Self {
        Self {
            catalog,
            config,
            dag: None,
            applied: HashSet::new(),
        }
    }

    /// Planner with every rule and default settings
    pub fn with_all_rules() -> Self {
        Self::new(RuleCatalog::all(), PlannerConfig::default())
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn dag(&self) -> Option<&Dag> {
        self.dag.as_ref()
    }

    /// Load the plan to optimize, starting a new session
    pub fn set_root(&mut self, plan: &LogicalPlan) -> PlannerResult<()> {
        self.dag = Some(Dag::from_plan(plan)?);
        self.applied.clear();
        Ok(())
    }

    /// Apply rules to a fixpoint, returning the number of transforms made
    pub fn find_best_exp(&mut self) -> PlannerResult<usize> {
        let Some(mut dag) = self.dag.take() else {
            return Err(PlannerError::Internal("no plan set".to_string()));
        };
        let result = self.run(&mut dag);
        self.dag = Some(dag);
        result
    }

    fn run(&mut self, dag: &mut Dag) -> PlannerResult<usize> {
        let start = Instant::now();
        let mut total = 0;
        let mut passes = 0;

        loop {
            if passes >= self.config.max_iterations.max(1) {
                warn!(
                    passes,
                    transforms = total,
                    "Optimizer stopped at iteration ceiling"
                );
                break;
            }
            passes += 1;

            let mut changed = 0;
            for category in RuleCategory::ALL {
                let rules: Vec<RuleId> = self.catalog.rules_of(category).collect();
                for rule in rules {
                    changed += self.apply_rule(dag, rule)?;
                }
            }
            total += changed;
            if changed == 0 {
                break;
            }
        }

        debug!(
            passes,
            transforms = total,
            vertices = dag.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Optimizer finished"
        );
        Ok(total)
    }

    /// Try one rule at every vertex live when the rule started
    fn apply_rule(&mut self, dag: &mut Dag, rule: RuleId) -> PlannerResult<usize> {
        let operand = rule.operand();
        let mut applied = 0;

        for id in dag.preorder() {
            let Some(bindings) = operand.matches(dag, id) else {
                continue;
            };
            let Some(node) = dag.node(id).cloned() else {
                continue;
            };
            let key = (rule, node);
            if self.applied.contains(&key) {
                continue;
            }

            let call = RuleCall::new(dag, bindings, &self.config);
            let Some(transform) = rule.on_match(&call)? else {
                continue;
            };
            if dag.transform(id, transform)? {
                debug!(rule = rule.name(), vertex = id.index(), "Rule applied");
                self.applied.insert(key);
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Current plan of the session
    pub fn best_plan(&self) -> PlannerResult<LogicalPlan> {
        self.dag
            .as_ref()
            .ok_or_else(|| PlannerError::Internal("no plan set".to_string()))?
            .to_plan()
    }

    /// Optimize a plan in a fresh session
    pub fn optimize(&mut self, plan: &LogicalPlan) -> PlannerResult<LogicalPlan> {
        self.set_root(plan)?;
        self.find_best_exp()?;
        self.best_plan()
    }
}
