//! Memoized plan DAG
//!
//! The optimizer works on an arena of vertices. Each vertex holds one
//! [`PlanNode`] whose inputs are vertex ids, plus a back-reference to its
//! single parent. A hash-consing table maps every node to its vertex, so
//! two structurally equal subtrees always share one id and equality of
//! whole subtrees reduces to equality of node keys.
//!
//! Invariants after every operation: acyclic, one root, one parent per
//! non-root vertex, no two vertices structurally equal, no vertex that is
//! unreachable from the root.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::planner::error::{PlannerError, PlannerResult};
use crate::planner::logical::{LogicalPlan, PlanNode};
use crate::planner::schema::QuerySchema;

/// Index of a vertex in the arena
///
/// Ids are never reused within one DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

impl VertexId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Node keyed by vertex ids, the unit of memoization
pub type DagNode = PlanNode<VertexId>;

#[derive(Debug)]
struct Vertex {
    node: DagNode,
    parent: Option<VertexId>,
}

/// What a matched vertex is replaced with
#[derive(Debug, Clone)]
pub enum Target {
    /// A node over existing vertices
    New(DagNode),
    /// A vertex inside the matched subtree
    Existing(VertexId),
    /// A fresh tree; nodes equal to existing vertices reuse them
    Tree(LogicalPlan),
}

/// Rewrite produced by a rule
#[derive(Debug, Clone)]
pub struct Transform {
    /// Schema replacements applied to live vertices
    pub rewrites: Vec<(VertexId, Arc<QuerySchema>)>,
    pub target: Target,
}

impl Transform {
    pub fn new(node: DagNode) -> Self {
        Self {
            rewrites: Vec::new(),
            target: Target::New(node),
        }
    }

    pub fn existing(id: VertexId) -> Self {
        Self {
            rewrites: Vec::new(),
            target: Target::Existing(id),
        }
    }

    pub fn tree(plan: LogicalPlan) -> Self {
        Self {
            rewrites: Vec::new(),
            target: Target::Tree(plan),
        }
    }

    pub fn with_rewrite(mut self, id: VertexId, schema: Arc<QuerySchema>) -> Self {
        self.rewrites.push((id, schema));
        self
    }
}

/// Arena of plan vertices with a memo table
#[derive(Debug)]
pub struct Dag {
    vertices: Vec<Option<Vertex>>,
    memo: HashMap<DagNode, VertexId>,
    root: VertexId,
}

impl Dag {
    /// Load a plan tree
    ///
    /// Fails when two subtrees of the plan are structurally equal, since a
    /// shared vertex would need two parents.
    pub fn from_plan(plan: &LogicalPlan) -> PlannerResult<Self> {
        let mut dag = Dag {
            vertices: Vec::new(),
            memo: HashMap::new(),
            root: VertexId(0),
        };
        dag.root = dag.insert_tree(plan)?;
        Ok(dag)
    }

    fn insert_tree(&mut self, plan: &LogicalPlan) -> PlannerResult<VertexId> {
        let children = plan
            .children()
            .iter()
            .map(|c| self.insert_tree(c))
            .collect::<PlannerResult<Vec<_>>>()?;
        let node = plan.node().with_children(children);
        if self.memo.contains_key(&node) {
            return Err(PlannerError::InvalidPlan(format!(
                "duplicate {} subtree",
                node.node_type()
            )));
        }
        let id = self.push(node);
        for child in self.children(id).to_vec() {
            if let Some(v) = self.vertices[child.0].as_mut() {
                v.parent = Some(id);
            }
        }
        Ok(id)
    }

    /// Add a parentless vertex for a node known to be absent from the memo
    fn push(&mut self, node: DagNode) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.memo.insert(node.clone(), id);
        self.vertices.push(Some(Vertex { node, parent: None }));
        id
    }

    fn vertex(&self, id: VertexId) -> PlannerResult<&Vertex> {
        self.vertices
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| PlannerError::Internal(format!("vertex {} is not live", id.0)))
    }

    fn vertex_mut(&mut self, id: VertexId) -> PlannerResult<&mut Vertex> {
        self.vertices
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| PlannerError::Internal(format!("vertex {} is not live", id.0)))
    }

    pub fn root(&self) -> VertexId {
        self.root
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.vertex(id).is_ok()
    }

    pub fn node(&self, id: VertexId) -> Option<&DagNode> {
        self.vertex(id).ok().map(|v| &v.node)
    }

    pub fn parent(&self, id: VertexId) -> Option<VertexId> {
        self.vertex(id).ok().and_then(|v| v.parent)
    }

    pub fn children(&self, id: VertexId) -> &[VertexId] {
        self.vertex(id)
            .map(|v| v.node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Vertex holding a node structurally equal to `node`
    pub fn lookup(&self, node: &DagNode) -> Option<VertexId> {
        self.memo.get(node).copied()
    }

    /// Number of live vertices
    pub fn len(&self) -> usize {
        self.vertices.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live vertices in pre-order from the root
    pub fn preorder(&self) -> Vec<VertexId> {
        let mut order = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !self.contains(id) {
                continue;
            }
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Whether `ancestor` lies strictly above `id`
    pub fn is_ancestor(&self, ancestor: VertexId, id: VertexId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Whether `id` is `top` or one of its descendants
    pub fn in_subtree(&self, top: VertexId, id: VertexId) -> bool {
        top == id || self.is_ancestor(top, id)
    }

    pub fn to_plan(&self) -> PlannerResult<LogicalPlan> {
        self.subtree(self.root)
    }

    /// Owned copy of the subtree rooted at `id`
    pub fn subtree(&self, id: VertexId) -> PlannerResult<LogicalPlan> {
        let vertex = self.vertex(id)?;
        let children = vertex
            .node
            .children
            .iter()
            .map(|c| self.subtree(*c))
            .collect::<PlannerResult<Vec<_>>>()?;
        Ok(vertex.node.with_children(children).into())
    }

    /// Replace the schema of a vertex in place
    pub fn rewrite_schema(&mut self, id: VertexId, schema: Arc<QuerySchema>) -> PlannerResult<()> {
        let old = self.vertex(id)?.node.clone();
        if *old.schema == *schema {
            return Ok(());
        }
        let new = old.clone().with_schema(schema);
        if let Some(other) = self.lookup(&new) {
            if other != id {
                return Err(PlannerError::InvalidPlan(format!(
                    "schema rewrite of vertex {} duplicates vertex {}",
                    id.0, other.0
                )));
            }
        }
        self.memo.remove(&old);
        self.memo.insert(new.clone(), id);
        self.vertex_mut(id)?.node = new;
        Ok(())
    }

    /// Whether a memo hit may be adopted by a rewrite of `matched`
    ///
    /// Only vertices detached by the rewrite (inside the matched subtree)
    /// or not yet attached anywhere can gain a new parent.
    fn can_reuse(&self, matched: VertexId, hit: VertexId) -> bool {
        if hit == matched {
            return false;
        }
        self.in_subtree(matched, hit) || (hit != self.root && self.parent(hit).is_none())
    }

    /// Intern a node; `None` when it equals a vertex that cannot be reused
    fn intern(&mut self, matched: VertexId, node: DagNode) -> Option<VertexId> {
        match self.lookup(&node) {
            Some(hit) if self.can_reuse(matched, hit) => Some(hit),
            Some(_) => None,
            None => Some(self.push(node)),
        }
    }

    fn intern_tree(&mut self, matched: VertexId, plan: &LogicalPlan) -> Option<VertexId> {
        let mut children = Vec::with_capacity(plan.children().len());
        for child in plan.children() {
            children.push(self.intern_tree(matched, child)?);
        }
        self.intern(matched, plan.node().with_children(children))
    }

    /// Replace `matched` by the target of a rule rewrite
    ///
    /// Returns `Ok(false)` when the rewrite is declined: the result equals
    /// the matched vertex, or equals a vertex it cannot take over.
    pub fn transform(&mut self, matched: VertexId, transform: Transform) -> PlannerResult<bool> {
        self.vertex(matched)?;
        for (id, _) in &transform.rewrites {
            self.vertex(*id)?;
        }

        let target = match transform.target {
            Target::Existing(id) => {
                self.vertex(id)?;
                if id == matched || !self.in_subtree(matched, id) {
                    return Ok(false);
                }
                Some(id)
            }
            Target::New(node) => {
                for child in &node.children {
                    self.vertex(*child)?;
                }
                self.intern(matched, node)
            }
            Target::Tree(plan) => self.intern_tree(matched, &plan),
        };
        let Some(target) = target else {
            self.sweep()?;
            return Ok(false);
        };

        let parent = self.parent(matched);
        if let Some(p) = parent {
            let mut rekeyed = self.vertex(p)?.node.clone();
            if let Some((_, schema)) = transform.rewrites.iter().rev().find(|(id, _)| *id == p) {
                rekeyed.schema = Arc::clone(schema);
            }
            replace_child(&mut rekeyed, matched, target);
            if matches!(self.lookup(&rekeyed), Some(other) if other != p) {
                self.sweep()?;
                return Ok(false);
            }
        }

        for (id, schema) in transform.rewrites {
            self.rewrite_schema(id, schema)?;
        }

        match parent {
            Some(p) => {
                let old = self.vertex(p)?.node.clone();
                let mut new = old.clone();
                replace_child(&mut new, matched, target);
                self.memo.remove(&old);
                self.memo.insert(new.clone(), p);
                self.vertex_mut(p)?.node = new;
            }
            None => self.root = target,
        }

        self.sweep()?;
        Ok(true)
    }

    /// Drop unreachable vertices and recompute parent links
    fn sweep(&mut self) -> PlannerResult<()> {
        let mut reachable = HashSet::new();
        let mut parents: HashMap<VertexId, VertexId> = HashMap::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            for &child in self.children(id) {
                if parents.insert(child, id).is_some() {
                    return Err(PlannerError::Internal(format!(
                        "vertex {} has two parents",
                        child.0
                    )));
                }
                stack.push(child);
            }
        }

        for (idx, slot) in self.vertices.iter_mut().enumerate() {
            let id = VertexId(idx);
            if slot.is_some() && !reachable.contains(&id) {
                if let Some(v) = slot.take() {
                    self.memo.remove(&v.node);
                }
            } else if let Some(v) = slot.as_mut() {
                v.parent = parents.get(&id).copied();
            }
        }
        Ok(())
    }
}

fn replace_child(node: &mut DagNode, from: VertexId, to: VertexId) {
    for child in node.children.iter_mut() {
        if *child == from {
            *child = to;
        }
    }
}
