//! Logical plan builder
//!
//! Creates plan nodes carrying one schema. The builder is generic over the
//! input type, so the shard mapper builds owned trees with it and rewrite
//! rules build DAG nodes whose inputs are vertex ids.

use std::sync::Arc;

use super::{ExchangeType, PlanKind, PlanNode, RemoteQuery};
use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::schema::QuerySchema;

/// Builder for logical plan nodes
pub struct LogicalPlanBuilder {
    schema: Arc<QuerySchema>,
}

impl LogicalPlanBuilder {
    pub fn new(schema: Arc<QuerySchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<QuerySchema> {
        &self.schema
    }

    fn unary<C>(&self, kind: PlanKind, input: C) -> PlanNode<C> {
        PlanNode::new(kind, Arc::clone(&self.schema), vec![input])
    }

    fn exchange<C>(&self, exchange_type: ExchangeType, input: C) -> PlanNode<C> {
        self.unary(
            PlanKind::Exchange {
                exchange_type,
                remote: Vec::new(),
            },
            input,
        )
    }

    /// Leaf reading individual series
    pub fn create_series_plan<C>(&self) -> PlannerResult<PlanNode<C>> {
        Ok(PlanNode::new(
            PlanKind::Series,
            Arc::clone(&self.schema),
            Vec::new(),
        ))
    }

    /// Measurement reader over series
    pub fn create_measurement_plan<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.unary(PlanKind::Reader, input))
    }

    /// Reader-level exchange
    pub fn create_scan_plan<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.exchange(ExchangeType::Reader, input))
    }

    /// Shard-level exchange
    pub fn create_shard_plan<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.exchange(ExchangeType::Shard, input))
    }

    /// Series-level exchange
    pub fn create_series_exchange<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.exchange(ExchangeType::Series, input))
    }

    /// Partition-level exchange
    pub fn create_partition_plan<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.exchange(ExchangeType::Partition, input))
    }

    /// Node-level exchange fanning out to remote partitions
    pub fn create_node_plan<C>(
        &self,
        input: C,
        remote: Vec<RemoteQuery>,
    ) -> PlannerResult<PlanNode<C>> {
        if remote.is_empty() {
            return Err(PlannerError::InvalidPlan(
                "node exchange without remote queries".to_string(),
            ));
        }
        Ok(self.unary(
            PlanKind::Exchange {
                exchange_type: ExchangeType::Node,
                remote,
            },
            input,
        ))
    }

    pub fn create_limit<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.unary(PlanKind::Limit, input))
    }

    pub fn create_aggregate<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        if !self.schema.has_call() {
            return Err(PlannerError::InvalidPlan(
                "aggregate without calls".to_string(),
            ));
        }
        Ok(self.unary(PlanKind::Aggregate, input))
    }

    pub fn create_sliding_window<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        if !self.schema.has_sliding_window_call() {
            return Err(PlannerError::InvalidPlan(
                "sliding window without sliding_window call".to_string(),
            ));
        }
        Ok(self.unary(PlanKind::SlidingWindow, input))
    }

    pub fn create_interval<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.unary(PlanKind::Interval, input))
    }

    pub fn create_project<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.unary(PlanKind::Project, input))
    }

    pub fn create_subquery<C>(&self, input: C) -> PlannerResult<PlanNode<C>> {
        Ok(self.unary(PlanKind::SubQuery, input))
    }

    /// Concatenation of per-measurement inputs
    pub fn create_sort_append<C>(&self, inputs: Vec<C>) -> PlannerResult<PlanNode<C>> {
        if inputs.is_empty() {
            return Err(PlannerError::InvalidPlan(
                "sort append without inputs".to_string(),
            ));
        }
        Ok(PlanNode::new(
            PlanKind::SortAppend,
            Arc::clone(&self.schema),
            inputs,
        ))
    }
}
