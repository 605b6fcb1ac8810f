//! Logical plan representation
//!
//! A plan node is an operator kind, the schema of what it produces and
//! its ordered inputs. `PlanNode` is generic over the input type so the
//! same node shape serves both the owned tree ([`LogicalPlan`]) and the
//! optimizer DAG, where inputs are vertex ids.

pub mod builder;

pub use builder::LogicalPlanBuilder;

use std::fmt;
use std::sync::Arc;

use crate::meta::{NodeId, PtId, ShardId};
use crate::planner::schema::QuerySchema;
use crate::query::ProcessorOptions;

/// Fan-in level of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeType {
    /// Merges the results of remote nodes
    Node,
    /// Merges the shards of one partition
    Shard,
    /// Merges the readers of one shard
    Reader,
    /// Merges the chunks of one series
    Series,
    /// Merges the partitions of one node
    Partition,
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExchangeType::Node => "node",
            ExchangeType::Shard => "shard",
            ExchangeType::Reader => "reader",
            ExchangeType::Series => "series",
            ExchangeType::Partition => "partition",
        };
        f.write_str(name)
    }
}

/// Sub-query shipped to the node serving one partition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteQuery {
    pub database: String,
    pub pt_id: PtId,
    pub node_id: NodeId,
    pub shard_ids: Vec<ShardId>,
    /// Options with sources narrowed to the partition's measurements
    pub options: ProcessorOptions,
    /// Collect execution statistics
    pub analyze: bool,
}

/// Operator of a plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlanKind {
    /// Reads the points of individual series
    Series,
    /// Reads a measurement within a shard
    Reader,
    /// Merges the outputs of a lower level
    Exchange {
        exchange_type: ExchangeType,
        /// Remote sub-queries, only on node exchanges
        remote: Vec<RemoteQuery>,
    },
    Aggregate,
    /// Groups rows into GROUP BY time buckets
    Interval,
    SlidingWindow,
    Project,
    /// Boundary of a nested query
    SubQuery,
    /// Concatenates the outputs of several measurements
    SortAppend,
    Limit,
}

/// Operator type without payload, used for pattern matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Series,
    Reader,
    Exchange,
    Aggregate,
    Interval,
    SlidingWindow,
    Project,
    SubQuery,
    SortAppend,
    Limit,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl PlanKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            PlanKind::Series => NodeType::Series,
            PlanKind::Reader => NodeType::Reader,
            PlanKind::Exchange { .. } => NodeType::Exchange,
            PlanKind::Aggregate => NodeType::Aggregate,
            PlanKind::Interval => NodeType::Interval,
            PlanKind::SlidingWindow => NodeType::SlidingWindow,
            PlanKind::Project => NodeType::Project,
            PlanKind::SubQuery => NodeType::SubQuery,
            PlanKind::SortAppend => NodeType::SortAppend,
            PlanKind::Limit => NodeType::Limit,
        }
    }

    pub fn exchange_type(&self) -> Option<ExchangeType> {
        match self {
            PlanKind::Exchange { exchange_type, .. } => Some(*exchange_type),
            _ => None,
        }
    }
}

/// One operator with its schema and inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanNode<C> {
    pub kind: PlanKind,
    pub schema: Arc<QuerySchema>,
    pub children: Vec<C>,
}

impl<C> PlanNode<C> {
    pub fn new(kind: PlanKind, schema: Arc<QuerySchema>, children: Vec<C>) -> Self {
        Self {
            kind,
            schema,
            children,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn exchange_type(&self) -> Option<ExchangeType> {
        self.kind.exchange_type()
    }

    /// Whether this is a node- or series-level exchange
    pub fn is_fan_in_exchange(&self) -> bool {
        matches!(
            self.exchange_type(),
            Some(ExchangeType::Node) | Some(ExchangeType::Series)
        )
    }

    /// Same operator and schema over different inputs
    pub fn with_children<D>(&self, children: Vec<D>) -> PlanNode<D> {
        PlanNode {
            kind: self.kind.clone(),
            schema: Arc::clone(&self.schema),
            children,
        }
    }

    pub fn with_schema(self, schema: Arc<QuerySchema>) -> Self {
        Self { schema, ..self }
    }
}

/// Owned logical plan tree
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalPlan(PlanNode<LogicalPlan>);

impl From<PlanNode<LogicalPlan>> for LogicalPlan {
    fn from(node: PlanNode<LogicalPlan>) -> Self {
        LogicalPlan(node)
    }
}

impl LogicalPlan {
    pub fn node(&self) -> &PlanNode<LogicalPlan> {
        &self.0
    }

    pub fn into_node(self) -> PlanNode<LogicalPlan> {
        self.0
    }

    pub fn kind(&self) -> &PlanKind {
        &self.0.kind
    }

    pub fn node_type(&self) -> NodeType {
        self.0.node_type()
    }

    pub fn schema(&self) -> &Arc<QuerySchema> {
        &self.0.schema
    }

    pub fn children(&self) -> &[LogicalPlan] {
        &self.0.children
    }

    /// Single input of a unary node
    pub fn input(&self) -> Option<&LogicalPlan> {
        match self.0.children.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(LogicalPlan::node_count).sum::<usize>()
    }

    /// Node types along the leftmost path, root first
    pub fn spine(&self) -> Vec<NodeType> {
        let mut types = vec![self.node_type()];
        let mut cur = self;
        while let Some(child) = cur.children().first() {
            types.push(child.node_type());
            cur = child;
        }
        types
    }
}
