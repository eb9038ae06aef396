// Build Graph
// Nodes, checkpoints, and the shared graph the walker executes

pub mod builder;
pub mod snapshot;

pub use builder::{CheckpointPlan, GraphBuilder, GraphDocument, NodeSpec};
pub use snapshot::{CheckpointSnapshot, GraphSnapshot, NodeSnapshot};

use crate::lifecycle::{Lifecycle, NodeStatus, ReadinessGate};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Name of the marker node every graph starts with
pub const START: &str = "START";

/// Name of the marker node every graph ends with
pub const END: &str = "END";

/// Error type for graph construction
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Circular dependency detected
    CyclicDependency,
    /// Reference to an unknown node
    UnknownDependency,
    /// Two nodes share a name
    DuplicateNode,
    /// Checkpoint plan does not match the declared dependencies
    InvalidStructure,
    /// Graph document could not be read or parsed
    InvalidDocument,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    pub fn cyclic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::CyclicDependency,
        }
    }

    pub fn unknown_dependency(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::UnknownDependency,
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::DuplicateNode,
        }
    }

    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::InvalidStructure,
        }
    }

    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::InvalidDocument,
        }
    }
}

/// What a node does when it runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkItem {
    /// START/END sentinel, executes nothing
    Marker,
    /// Shell commands run in order, stopping at the first failure
    Shell { commands: Vec<String> },
    /// Work dispatched to a named executor
    Plugin {
        name: String,
        #[serde(default)]
        params: serde_json::Map<String, serde_json::Value>,
    },
}

/// A single unit of work in the build graph
#[derive(Debug)]
pub struct Node {
    name: String,
    description: String,
    depends_on: Vec<String>,
    work: WorkItem,
    lifecycle: Lifecycle,
}

impl Node {
    pub(crate) fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        depends_on: Vec<String>,
        work: WorkItem,
    ) -> Self {
        let name = name.into();
        Self {
            lifecycle: Lifecycle::new(name.clone()),
            name,
            description: description.into(),
            depends_on,
            work,
        }
    }

    pub(crate) fn marker(name: &str) -> Self {
        Self::new(name, "", Vec::new(), WorkItem::Marker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub fn work(&self) -> &WorkItem {
        &self.work
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn status(&self) -> NodeStatus {
        self.lifecycle.status()
    }

    pub fn message(&self) -> Option<String> {
        self.lifecycle.message()
    }
}

/// Link from a fan-out checkpoint to one of its nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: usize,
}

/// One step of the linearized graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Exactly one node
    Sequential(usize),
    /// Nodes that may run concurrently, in dependency order
    FanOut(Vec<Edge>),
}

impl Checkpoint {
    pub fn targets(&self) -> Vec<usize> {
        match self {
            Checkpoint::Sequential(index) => vec![*index],
            Checkpoint::FanOut(edges) => edges.iter().map(|edge| edge.target).collect(),
        }
    }
}

/// Build graph with its checkpoint sequence.
///
/// Structure is immutable once built; only node lifecycles change while the
/// graph is walked, so the graph is shared as `Arc<Graph>`.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    indices: HashMap<String, usize>,
    checkpoints: Vec<Checkpoint>,
}

impl Graph {
    pub(crate) fn from_parts(nodes: Vec<Node>, checkpoints: Vec<Checkpoint>) -> Self {
        let indices = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();
        Self {
            nodes,
            indices,
            checkpoints,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.indices.get(name).map(|&i| &self.nodes[i])
    }

    /// Node at an index taken from one of this graph's checkpoints
    pub fn node_at(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Gate that resolves once every dependency of the node is terminal
    pub fn readiness_gate(&self, index: usize) -> ReadinessGate {
        let upstream = self.nodes[index]
            .depends_on
            .iter()
            .filter_map(|dep| self.indices.get(dep))
            .map(|&i| self.nodes[i].lifecycle.watch())
            .collect();
        ReadinessGate::new(upstream)
    }

    /// Human readable name of a checkpoint, e.g. `build` or `lint, test`
    pub fn checkpoint_label(&self, checkpoint: &Checkpoint) -> String {
        checkpoint
            .targets()
            .into_iter()
            .map(|i| self.nodes[i].name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Point-in-time view of every node's status
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        self.snapshot().to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Graph {
        GraphBuilder::new()
            .node(NodeSpec::shell("fetch", "clone sources", ["git fetch"]))
            .node(NodeSpec::shell("build", "compile", ["make"]).depends_on(["fetch"]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_markers_wrap_user_nodes() {
        let graph = chain();
        let names: Vec<&str> = graph.nodes().iter().map(|n| n.name()).collect();

        assert_eq!(names, vec![START, "fetch", "build", END]);
        assert_eq!(graph.node(START).unwrap().work(), &WorkItem::Marker);
        assert_eq!(graph.checkpoints().first(), Some(&Checkpoint::Sequential(0)));
        assert_eq!(graph.checkpoints().last(), Some(&Checkpoint::Sequential(3)));
    }

    #[test]
    fn test_checkpoint_label() {
        let graph = GraphBuilder::new()
            .node(NodeSpec::shell("lint", "", ["true"]))
            .node(NodeSpec::shell("test", "", ["true"]))
            .build()
            .unwrap();

        assert_eq!(graph.checkpoint_label(&graph.checkpoints()[1]), "lint, test");
        assert_eq!(graph.checkpoint_label(&graph.checkpoints()[2]), END);
    }

    #[test]
    fn test_readiness_gate_tracks_dependencies() {
        let graph = chain();
        let fetch = graph.node("fetch").unwrap();
        let gate = graph.readiness_gate(2);
        assert!(!gate.is_resolved());

        fetch.lifecycle().mark_waiting().unwrap();
        fetch.lifecycle().start().unwrap();
        fetch.lifecycle().succeed().unwrap();

        assert!(graph.readiness_gate(2).is_resolved());
    }

    #[test]
    fn test_work_item_serialization() {
        let item = WorkItem::Shell {
            commands: vec!["make".to_string()],
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "shell");
        assert_eq!(json["commands"][0], "make");

        let plugin: WorkItem =
            serde_json::from_str(r#"{"type": "plugin", "name": "docker"}"#).unwrap();
        assert!(matches!(plugin, WorkItem::Plugin { ref name, ref params } if name == "docker" && params.is_empty()));
    }
}
