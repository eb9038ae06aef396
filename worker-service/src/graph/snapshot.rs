// Graph Snapshot
// Serializable point-in-time view of a graph, sent with every status report

use super::{Checkpoint, Graph};
use crate::lifecycle::NodeStatus;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckpointSnapshot {
    Sequential { node: String },
    FanOut { edges: Vec<String> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub checkpoints: Vec<CheckpointSnapshot>,
}

impl GraphSnapshot {
    /// Read every node's current state. Concurrent transitions may land
    /// between reads; each node's entry is internally consistent.
    pub fn capture(graph: &Graph) -> Self {
        let nodes = graph
            .nodes()
            .iter()
            .map(|node| {
                let state = node.lifecycle().state();
                NodeSnapshot {
                    name: node.name().to_string(),
                    description: node.description().to_string(),
                    status: state.status,
                    message: state.message,
                }
            })
            .collect();

        let checkpoints = graph
            .checkpoints()
            .iter()
            .map(|checkpoint| match checkpoint {
                Checkpoint::Sequential(i) => CheckpointSnapshot::Sequential {
                    node: graph.node_at(*i).name().to_string(),
                },
                Checkpoint::FanOut(edges) => CheckpointSnapshot::FanOut {
                    edges: edges
                        .iter()
                        .map(|edge| graph.node_at(edge.target).name().to_string())
                        .collect(),
                },
            })
            .collect();

        Self { nodes, checkpoints }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|node| node.name == name)
    }

    pub fn statuses(&self) -> BTreeMap<String, NodeStatus> {
        self.nodes
            .iter()
            .map(|node| (node.name.clone(), node.status))
            .collect()
    }
}
