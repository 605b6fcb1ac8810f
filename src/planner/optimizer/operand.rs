//! Rule patterns
//!
//! An [`Operand`] is a small tree of node-type constraints. Matching one
//! against a vertex yields the bound vertices in operand pre-order, so
//! binding 0 is always the vertex the pattern is rooted at.

use crate::planner::dag::{Dag, VertexId};
use crate::planner::logical::NodeType;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// Node of the type whose children match the operands position by position
    Exact(NodeType, Vec<Operand>),
    /// Node of the type; children unconstrained
    Subtree(NodeType),
    /// Node of the type with some strict descendant matching the operand
    Descendant(NodeType, Box<Operand>),
    /// Any node below a node of the type
    After(NodeType),
}

impl Operand {
    pub fn exact(node_type: NodeType, children: Vec<Operand>) -> Self {
        Operand::Exact(node_type, children)
    }

    pub fn subtree(node_type: NodeType) -> Self {
        Operand::Subtree(node_type)
    }

    pub fn descendant(node_type: NodeType, inner: Operand) -> Self {
        Operand::Descendant(node_type, Box::new(inner))
    }

    pub fn after(node_type: NodeType) -> Self {
        Operand::After(node_type)
    }

    /// Match at `id`, returning the bound vertices
    pub fn matches(&self, dag: &Dag, id: VertexId) -> Option<Vec<VertexId>> {
        let mut bindings = Vec::new();
        self.bind(dag, id, &mut bindings).then_some(bindings)
    }

    fn bind(&self, dag: &Dag, id: VertexId, bindings: &mut Vec<VertexId>) -> bool {
        let Some(node) = dag.node(id) else {
            return false;
        };
        match self {
            Operand::Exact(t, children) => {
                if node.node_type() != *t || node.children.len() != children.len() {
                    return false;
                }
                let mark = bindings.len();
                bindings.push(id);
                for (operand, child) in children.iter().zip(&node.children) {
                    if !operand.bind(dag, *child, bindings) {
                        bindings.truncate(mark);
                        return false;
                    }
                }
                true
            }
            Operand::Subtree(t) => {
                if node.node_type() != *t {
                    return false;
                }
                bindings.push(id);
                true
            }
            Operand::Descendant(t, inner) => {
                if node.node_type() != *t {
                    return false;
                }
                let mark = bindings.len();
                bindings.push(id);
                let mut stack: Vec<VertexId> = node.children.iter().rev().copied().collect();
                while let Some(d) = stack.pop() {
                    if inner.bind(dag, d, bindings) {
                        return true;
                    }
                    stack.extend(dag.children(d).iter().rev().copied());
                }
                bindings.truncate(mark);
                false
            }
            Operand::After(t) => {
                let mut cur = dag.parent(id);
                while let Some(p) = cur {
                    if dag.node(p).map(|n| n.node_type()) == Some(*t) {
                        bindings.push(id);
                        return true;
                    }
                    cur = dag.parent(p);
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::logical::{LogicalPlan, LogicalPlanBuilder};
    use crate::planner::schema::QuerySchema;
    use crate::query::{DataType, Expr, Field, ProcessorOptions};
    use std::sync::Arc;

    fn dag() -> Dag {
        let schema = Arc::new(QuerySchema::new(
            vec![Field::new(Expr::var("value", DataType::Float))],
            ProcessorOptions::default(),
        ));
        let b = LogicalPlanBuilder::new(schema);
        let series: LogicalPlan = b.create_series_plan::<LogicalPlan>().unwrap().into();
        let reader: LogicalPlan = b.create_measurement_plan(series).unwrap().into();
        let scan: LogicalPlan = b.create_scan_plan(reader).unwrap().into();
        let project: LogicalPlan = b.create_project(scan).unwrap().into();
        Dag::from_plan(&project).unwrap()
    }

    #[test]
    fn test_exact_and_subtree() {
        let dag = dag();
        let order = dag.preorder();
        let op = Operand::exact(
            NodeType::Exchange,
            vec![Operand::subtree(NodeType::Reader)],
        );
        assert_eq!(op.matches(&dag, order[1]), Some(vec![order[1], order[2]]));
        assert_eq!(op.matches(&dag, order[0]), None);
    }

    #[test]
    fn test_descendant() {
        let dag = dag();
        let order = dag.preorder();
        let op = Operand::descendant(NodeType::Project, Operand::subtree(NodeType::Series));
        assert_eq!(op.matches(&dag, order[0]), Some(vec![order[0], order[3]]));
        let none = Operand::descendant(NodeType::Project, Operand::subtree(NodeType::Limit));
        assert_eq!(none.matches(&dag, order[0]), None);
    }

    #[test]
    fn test_after() {
        let dag = dag();
        let order = dag.preorder();
        let op = Operand::after(NodeType::Project);
        assert_eq!(op.matches(&dag, order[0]), None);
        assert_eq!(op.matches(&dag, order[3]), Some(vec![order[3]]));
    }
}
