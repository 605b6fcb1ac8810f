//! Optimization rules
//!
//! Every rule is a pattern ([`Operand`]) plus a rewrite. The rewrite
//! inspects the bound vertices and either declines (`Ok(None)`) or
//! returns a [`Transform`] for the planner to apply to the DAG.

mod aggregate;
mod castor;
mod limit;
mod spread;
pub mod subquery;

use std::fmt;

use crate::config::PlannerConfig;
use crate::planner::dag::{Dag, DagNode, Transform, VertexId};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::NodeType;

use super::operand::Operand;

/// Rule groups, in the order a pass visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleCategory {
    PushdownLimit,
    PushdownAgg,
    SpreadAgg,
    SubQuery,
    CastorPushdown,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 5] = [
        RuleCategory::PushdownLimit,
        RuleCategory::PushdownAgg,
        RuleCategory::SpreadAgg,
        RuleCategory::SubQuery,
        RuleCategory::CastorPushdown,
    ];
}

/// Identity of a rewrite rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleId {
    LimitPushdownToExchange,
    LimitPushdownToReader,
    LimitPushdownToSeries,
    AggPushdownToExchange,
    AggPushdownToReader,
    AggPushdownToSeries,
    AggSpreadToExchange,
    AggSpreadToSortAppend,
    AggSpreadToReader,
    SlideWindowSpread,
    AggPushDownToSubQuery,
    AggToProjectInSubQuery,
    IntervalToProjectInSubQuery,
    ReaderUpdateInSubQuery,
    CastorAggCut,
}

impl RuleId {
    pub fn name(&self) -> &'static str {
        match self {
            RuleId::LimitPushdownToExchange => "limit_pushdown_to_exchange",
            RuleId::LimitPushdownToReader => "limit_pushdown_to_reader",
            RuleId::LimitPushdownToSeries => "limit_pushdown_to_series",
            RuleId::AggPushdownToExchange => "agg_pushdown_to_exchange",
            RuleId::AggPushdownToReader => "agg_pushdown_to_reader",
            RuleId::AggPushdownToSeries => "agg_pushdown_to_series",
            RuleId::AggSpreadToExchange => "agg_spread_to_exchange",
            RuleId::AggSpreadToSortAppend => "agg_spread_to_sort_append",
            RuleId::AggSpreadToReader => "agg_spread_to_reader",
            RuleId::SlideWindowSpread => "slide_window_spread",
            RuleId::AggPushDownToSubQuery => "agg_pushdown_to_subquery",
            RuleId::AggToProjectInSubQuery => "agg_to_project_in_subquery",
            RuleId::IntervalToProjectInSubQuery => "interval_to_project_in_subquery",
            RuleId::ReaderUpdateInSubQuery => "reader_update_in_subquery",
            RuleId::CastorAggCut => "castor_agg_cut",
        }
    }

    pub fn category(&self) -> RuleCategory {
        match self {
            RuleId::LimitPushdownToExchange
            | RuleId::LimitPushdownToReader
            | RuleId::LimitPushdownToSeries => RuleCategory::PushdownLimit,
            RuleId::AggPushdownToExchange
            | RuleId::AggPushdownToReader
            | RuleId::AggPushdownToSeries => RuleCategory::PushdownAgg,
            RuleId::AggSpreadToExchange
            | RuleId::AggSpreadToSortAppend
            | RuleId::AggSpreadToReader
            | RuleId::SlideWindowSpread => RuleCategory::SpreadAgg,
            RuleId::AggPushDownToSubQuery
            | RuleId::AggToProjectInSubQuery
            | RuleId::IntervalToProjectInSubQuery
            | RuleId::ReaderUpdateInSubQuery => RuleCategory::SubQuery,
            RuleId::CastorAggCut => RuleCategory::CastorPushdown,
        }
    }

    pub fn operand(&self) -> Operand {
        use NodeType::*;
        match self {
            RuleId::LimitPushdownToExchange | RuleId::AggPushdownToExchange => {
                Operand::subtree(Exchange)
            }
            RuleId::LimitPushdownToReader | RuleId::AggPushdownToReader => {
                Operand::subtree(Reader)
            }
            RuleId::LimitPushdownToSeries | RuleId::AggPushdownToSeries => {
                Operand::subtree(Series)
            }
            RuleId::AggSpreadToExchange => {
                Operand::exact(Aggregate, vec![Operand::subtree(Exchange)])
            }
            RuleId::AggSpreadToSortAppend => {
                Operand::exact(Aggregate, vec![Operand::subtree(SortAppend)])
            }
            RuleId::AggSpreadToReader => Operand::exact(
                Aggregate,
                vec![Operand::exact(Reader, vec![Operand::subtree(Exchange)])],
            ),
            RuleId::SlideWindowSpread => Operand::subtree(SlidingWindow),
            RuleId::AggPushDownToSubQuery => Operand::descendant(
                Aggregate,
                Operand::descendant(SubQuery, Operand::subtree(Project)),
            ),
            RuleId::AggToProjectInSubQuery | RuleId::IntervalToProjectInSubQuery => {
                Operand::after(Project)
            }
            RuleId::ReaderUpdateInSubQuery => Operand::exact(
                Exchange,
                vec![Operand::descendant(Reader, Operand::subtree(Series))],
            ),
            RuleId::CastorAggCut => Operand::subtree(Aggregate),
        }
    }

    /// Rewrite for a successful pattern match
    pub fn on_match(&self, call: &RuleCall<'_>) -> PlannerResult<Option<Transform>> {
        match self {
            RuleId::LimitPushdownToExchange => limit::to_exchange(call),
            RuleId::LimitPushdownToReader => limit::to_reader(call),
            RuleId::LimitPushdownToSeries => limit::to_series(call),
            RuleId::AggPushdownToExchange => aggregate::to_exchange(call),
            RuleId::AggPushdownToReader => aggregate::to_reader(call),
            RuleId::AggPushdownToSeries => aggregate::to_series(call),
            RuleId::AggSpreadToExchange => spread::to_exchange(call),
            RuleId::AggSpreadToSortAppend => spread::to_sort_append(call),
            RuleId::AggSpreadToReader => spread::to_reader(call),
            RuleId::SlideWindowSpread => spread::sliding_window(call),
            RuleId::AggPushDownToSubQuery => subquery::agg_pushdown(call),
            RuleId::AggToProjectInSubQuery => subquery::agg_to_project(call),
            RuleId::IntervalToProjectInSubQuery => subquery::interval_to_project(call),
            RuleId::ReaderUpdateInSubQuery => subquery::reader_update(call),
            RuleId::CastorAggCut => castor::agg_cut(call),
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A pattern match handed to a rule
pub struct RuleCall<'a> {
    dag: &'a Dag,
    bindings: Vec<VertexId>,
    config: &'a PlannerConfig,
}

impl<'a> RuleCall<'a> {
    pub fn new(dag: &'a Dag, bindings: Vec<VertexId>, config: &'a PlannerConfig) -> Self {
        Self {
            dag,
            bindings,
            config,
        }
    }

    pub fn dag(&self) -> &'a Dag {
        self.dag
    }

    pub fn config(&self) -> &'a PlannerConfig {
        self.config
    }

    /// Vertex bound at position `i` of the pattern
    pub fn id(&self, i: usize) -> PlannerResult<VertexId> {
        self.bindings
            .get(i)
            .copied()
            .ok_or_else(|| PlannerError::Internal(format!("no binding {}", i)))
    }

    pub fn node(&self, i: usize) -> PlannerResult<&'a DagNode> {
        let id = self.id(i)?;
        self.dag
            .node(id)
            .ok_or_else(|| PlannerError::Internal(format!("binding {} is not live", i)))
    }

    /// Type of the parent of binding `i`, `None` at the root
    pub fn parent_type(&self, i: usize) -> PlannerResult<Option<NodeType>> {
        let id = self.id(i)?;
        Ok(self
            .dag
            .parent(id)
            .and_then(|p| self.dag.node(p))
            .map(|n| n.node_type()))
    }

    pub fn is_root(&self, i: usize) -> PlannerResult<bool> {
        Ok(self.dag.parent(self.id(i)?).is_none())
    }
}

/// Ordered set of rules used by a planner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleCatalog {
    rules: Vec<RuleId>,
}

impl RuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_rules(rules: &[RuleId]) -> Self {
        Self {
            rules: rules.to_vec(),
        }
    }

    /// Rules run by the coordinator over a distributed query plan
    pub fn coordinator() -> Self {
        Self::from_rules(&[
            RuleId::LimitPushdownToExchange,
            RuleId::LimitPushdownToReader,
            RuleId::LimitPushdownToSeries,
            RuleId::AggPushdownToExchange,
            RuleId::AggPushdownToReader,
            RuleId::AggPushdownToSeries,
            RuleId::AggSpreadToExchange,
            RuleId::AggSpreadToSortAppend,
            RuleId::AggSpreadToReader,
            RuleId::SlideWindowSpread,
            RuleId::CastorAggCut,
        ])
    }

    /// Rules rewriting nested queries
    pub fn subquery() -> Self {
        Self::from_rules(&[
            RuleId::AggPushDownToSubQuery,
            RuleId::AggToProjectInSubQuery,
            RuleId::IntervalToProjectInSubQuery,
            RuleId::ReaderUpdateInSubQuery,
        ])
    }

    pub fn all() -> Self {
        let mut rules = Self::coordinator().rules;
        rules.extend(Self::subquery().rules);
        Self { rules }
    }

    /// Register a rule; a rule can only be registered once
    pub fn add(&mut self, rule: RuleId) -> PlannerResult<()> {
        if self.contains(rule) {
            return Err(PlannerError::InvalidPlan(format!(
                "rule {} already registered",
                rule
            )));
        }
        self.rules.push(rule);
        Ok(())
    }

    pub fn contains(&self, rule: RuleId) -> bool {
        self.rules.contains(&rule)
    }

    /// Rules of one category in registration order
    pub fn rules_of(&self, category: RuleCategory) -> impl Iterator<Item = RuleId> + '_ {
        self.rules
            .iter()
            .copied()
            .filter(move |r| r.category() == category)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// ============ Shared predicates ============

/// Parent of binding `i` already performs an aggregation
fn parent_aggregates(call: &RuleCall<'_>, i: usize) -> PlannerResult<bool> {
    Ok(matches!(
        call.parent_type(i)?,
        Some(NodeType::Aggregate) | Some(NodeType::SlidingWindow)
    ))
}
