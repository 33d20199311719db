use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::graph::model::{Axis, Edge, EdgeKind, EdgeWeight, Node, NodeId, NodeKind};

/// A curated study objective: a named, priority-ordered member set.
/// Read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    /// Member nodes in curated priority order.
    pub members: Vec<NodeId>,
}

/// Read interface the engine consumes from the content/graph layer.
pub trait GraphSource: Send + Sync {
    fn node_exists(&self, id: NodeId) -> bool;
    fn node(&self, id: NodeId) -> Option<&Node>;
    fn edges_from(&self, id: NodeId) -> &[Edge];
    /// Sources of Dependency edges targeting `id` (scheduling gates).
    fn dependencies_of(&self, id: NodeId) -> &[NodeId];
    /// Numeric hints such as "importance" or "difficulty".
    fn metadata(&self, id: NodeId, key: &str) -> Option<f64>;
    /// Active goals in curated priority order.
    fn goals(&self) -> &[Goal];

    /// Members of one goal, keeping the curated order.
    fn nodes_by_goal(&self, goal_id: &str) -> Option<&[NodeId]> {
        self.goals()
            .iter()
            .find(|goal| goal.id == goal_id)
            .map(|goal| goal.members.as_slice())
    }
}

/// Arena-backed in-memory graph: nodes indexed by integer id, adjacency
/// keyed by source id. Built once at ingestion, then shared read-only.
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    nodes: Vec<Node>,
    adjacency: HashMap<NodeId, Vec<Edge>>,
    dependency_sources: HashMap<NodeId, Vec<NodeId>>,
    edge_keys: HashSet<(NodeId, NodeId)>,
    metadata: HashMap<NodeId, HashMap<String, f64>>,
    goals: Vec<Goal>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a content node; returns its arena id.
    pub fn add_node(&mut self, kind: NodeKind, label: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind,
            axis: None,
            content: None,
            label: label.into(),
        });
        id
    }

    /// Insert a Knowledge node pairing `content` with a learning axis.
    pub fn add_knowledge(
        &mut self,
        content: NodeId,
        axis: Axis,
        label: impl Into<String>,
    ) -> EngineResult<NodeId> {
        if !self.node_exists(content) {
            return Err(EngineError::NotFound(format!(
                "content node {content} does not exist"
            )));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            id,
            kind: NodeKind::Knowledge,
            axis: Some(axis),
            content: Some(content),
            label: label.into(),
        });
        Ok(id)
    }

    /// Insert an edge. Edges are keyed by (source, target); duplicates and
    /// dangling endpoints are rejected.
    pub fn add_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        kind: EdgeKind,
        weight: EdgeWeight,
    ) -> EngineResult<()> {
        if !self.node_exists(source) {
            return Err(EngineError::NotFound(format!(
                "edge source {source} does not exist"
            )));
        }
        if !self.node_exists(target) {
            return Err(EngineError::NotFound(format!(
                "edge target {target} does not exist"
            )));
        }
        if !self.edge_keys.insert((source, target)) {
            return Err(EngineError::Validation(format!(
                "edge {source} -> {target} already exists"
            )));
        }
        if kind == EdgeKind::Dependency {
            self.dependency_sources.entry(target).or_default().push(source);
        }
        self.adjacency.entry(source).or_default().push(Edge {
            source,
            target,
            kind,
            weight,
        });
        Ok(())
    }

    pub fn set_metadata(&mut self, id: NodeId, key: impl Into<String>, value: f64) {
        self.metadata.entry(id).or_default().insert(key.into(), value);
    }

    pub fn add_goal(&mut self, goal: Goal) -> EngineResult<()> {
        for member in &goal.members {
            if !self.node_exists(*member) {
                return Err(EngineError::NotFound(format!(
                    "goal {} member {member} does not exist",
                    goal.id
                )));
            }
        }
        self.goals.push(goal);
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_keys.len()
    }
}

impl GraphSource for InMemoryGraph {
    fn node_exists(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    fn edges_from(&self, id: NodeId) -> &[Edge] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn dependencies_of(&self, id: NodeId) -> &[NodeId] {
        self.dependency_sources
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn metadata(&self, id: NodeId, key: &str) -> Option<f64> {
        self.metadata.get(&id).and_then(|m| m.get(key)).copied()
    }

    fn goals(&self) -> &[Goal] {
        &self.goals
    }
}
